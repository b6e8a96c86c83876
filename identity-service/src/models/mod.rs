pub mod account;
pub mod policy;

pub use account::{
    Account, AccountResponse, AccountStatus, NewAccount, OrgMembership, ProfileUpdate, UserType,
};
pub use policy::{Domain, GroupingFact, PermissionFact, Subject};
