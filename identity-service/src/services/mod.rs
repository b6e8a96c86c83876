pub mod cleanup;
pub mod error;
pub mod jwt;
pub mod lifecycle;
pub mod notifier;
pub mod policy;
pub mod store;

pub use cleanup::PendingAccountSweeper;
pub use error::{LifecycleError, NotifyError, PolicyError, StoreError, TokenError};
pub use jwt::{AccessClaims, TokenPair, TokenService};
pub use lifecycle::{AccountLifecycle, Invitation, LifecycleService};
pub use notifier::{LogNotifier, MockNotifier, NotificationKind, Notifier, SmtpNotifier};
pub use policy::{InMemoryPolicyStore, PgPolicyStore, PolicyEngine, PolicyStore};
pub use store::{AccountStore, InMemoryAccountStore, PgAccountStore};
