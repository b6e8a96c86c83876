//! HTTP handlers for identity-service.

pub mod admin;
pub mod auth;
pub mod org;
pub mod user;
