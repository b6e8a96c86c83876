pub mod duration;
pub mod password;
pub mod token;
pub mod validation;

pub use duration::{parse_access_duration, DurationParseError};
pub use password::{hash_password, verify_password, Password, PasswordHashString};
pub use token::generate_confirmation_token;
pub use validation::{normalize_email, ValidatedJson};
