use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::utils::parse_access_duration;

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub lifecycle: LifecycleConfig,
    pub frontend: FrontendConfig,
    pub smtp: Option<SmtpConfig>,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Clone)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("access_token_expiry_minutes", &self.access_token_expiry_minutes)
            .field("refresh_token_expiry_days", &self.refresh_token_expiry_days)
            .finish()
    }
}

/// Account lifecycle knobs.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Confirmation window, measured from account creation.
    pub confirmation_ttl_hours: i64,
    pub cleanup_interval: Duration,
    /// The only email domain allowed to self-signup, without the `@`.
    pub corporate_domain: String,
    pub default_role: String,
}

impl LifecycleConfig {
    pub fn confirmation_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.confirmation_ttl_hours)
    }

    /// Case-insensitive `@<corporate_domain>` suffix check.
    pub fn is_corporate_email(&self, email: &str) -> bool {
        let suffix = format!("@{}", self.corporate_domain.to_lowercase());
        email.trim().to_lowercase().ends_with(&suffix)
    }
}

#[derive(Debug, Clone)]
pub struct FrontendConfig {
    pub base_url: String,
    pub confirm_url: String,
    pub set_password_url: String,
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from: String,
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub signup_attempts: u32,
    pub signup_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
    /// Key limits on `x-forwarded-for`; only safe behind a proxy that overwrites it.
    pub trust_forwarded_for: bool,
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let cleanup_interval = {
            let raw = get_env("CLEANUP_INTERVAL", Some("1h"), is_prod)?;
            let interval = parse_access_duration(&raw).map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("CLEANUP_INTERVAL: {}", e))
            })?;
            interval.to_std().map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("CLEANUP_INTERVAL: {}", e))
            })?
        };

        let frontend_base = get_env("FRONTEND_URL", Some("http://localhost:3000"), is_prod)?;

        let smtp = match env::var("SMTP_HOST").ok().filter(|h| !h.is_empty()) {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_env("SMTP_PORT", Some("587"), false)?,
                user: get_env("SMTP_USER", None, false)?,
                password: get_env("SMTP_PASSWORD", None, false)?,
                from: get_env("SMTP_FROM", None, false)?,
            }),
            None => None,
        };

        let config = IdentityConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|e| !e.is_empty()),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", Some("1"), is_prod)?,
            },
            jwt: JwtConfig {
                access_secret: get_env("JWT_SECRET", None, is_prod)?,
                refresh_secret: get_env("JWT_REFRESH_SECRET", None, is_prod)?,
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    Some("15"),
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env(
                    "JWT_REFRESH_TOKEN_EXPIRY_DAYS",
                    Some("7"),
                    is_prod,
                )?,
            },
            lifecycle: LifecycleConfig {
                confirmation_ttl_hours: parse_env(
                    "CONFIRMATION_TOKEN_TTL_HOURS",
                    Some("24"),
                    is_prod,
                )?,
                cleanup_interval,
                corporate_domain: get_env(
                    "CORPORATE_EMAIL_DOMAIN",
                    Some("madagascarairlines.com"),
                    is_prod,
                )?
                .trim_start_matches('@')
                .to_lowercase(),
                default_role: get_env("DEFAULT_USER_ROLE", Some("user"), is_prod)?,
            },
            frontend: FrontendConfig {
                confirm_url: get_env(
                    "FRONTEND_CONFIRM_URL",
                    Some(&format!("{}/confirm", frontend_base)),
                    is_prod,
                )?,
                set_password_url: get_env(
                    "FRONTEND_SET_PASSWORD_URL",
                    Some(&format!("{}/set-password", frontend_base)),
                    is_prod,
                )?,
                base_url: frontend_base,
            },
            smtp,
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            },
            rate_limit: RateLimitConfig {
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", Some("5"), is_prod)?,
                login_window_seconds: parse_env(
                    "RATE_LIMIT_LOGIN_WINDOW_SECONDS",
                    Some("900"),
                    is_prod,
                )?,
                signup_attempts: parse_env("RATE_LIMIT_SIGNUP_ATTEMPTS", Some("3"), is_prod)?,
                signup_window_seconds: parse_env(
                    "RATE_LIMIT_SIGNUP_WINDOW_SECONDS",
                    Some("3600"),
                    is_prod,
                )?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", Some("100"), is_prod)?,
                global_ip_window_seconds: parse_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?,
                trust_forwarded_for: parse_env(
                    "RATE_LIMIT_TRUST_FORWARDED_FOR",
                    Some("false"),
                    false,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.access_secret.is_empty() || self.jwt.refresh_secret.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_SECRET and JWT_REFRESH_SECRET must not be empty"
            )));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"
            )));
        }

        if self.lifecycle.confirmation_ttl_hours <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "CONFIRMATION_TOKEN_TTL_HOURS must be positive"
            )));
        }

        if self.lifecycle.corporate_domain.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "CORPORATE_EMAIL_DOMAIN must not be empty"
            )));
        }

        if self.environment == Environment::Prod {
            if self.jwt.access_secret.len() < 32 || self.jwt.refresh_secret.len() < 32 {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "JWT secrets must be at least 32 bytes in production"
                )));
            }

            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.jwt.access_secret == self.jwt.refresh_secret {
                tracing::warn!("JWT_SECRET and JWT_REFRESH_SECRET are identical");
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: Option<&str>, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    get_env(key, default, is_prod)?
        .trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
