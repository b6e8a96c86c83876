use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::services::error::StoreError;
use crate::services::store::AccountStore;

/// Periodically deletes accounts that stayed pending past the confirmation TTL.
/// Best effort: failures are logged and the next tick tries again.
pub struct PendingAccountSweeper {
    store: Arc<dyn AccountStore>,
    interval: std::time::Duration,
    ttl: Duration,
    shutdown_token: CancellationToken,
}

impl PendingAccountSweeper {
    pub fn new(store: Arc<dyn AccountStore>, interval: std::time::Duration, ttl: Duration) -> Self {
        Self {
            store,
            interval,
            ttl,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// One sweep. Returns the number of accounts removed.
    pub async fn run_once(&self) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - self.ttl;
        self.store.delete_expired_pending(cutoff).await
    }

    /// Spawn the sweep loop. The first sweep runs immediately.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let sweeper = Arc::clone(self);
        let shutdown = self.shutdown_token.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweeper.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(interval_secs = sweeper.interval.as_secs(), "Pending account sweeper started");

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("Pending account sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        match sweeper.run_once().await {
                            Ok(0) => tracing::debug!("No expired pending accounts"),
                            Ok(removed) => tracing::info!(removed, "Deleted expired pending accounts"),
                            Err(e) => tracing::error!(error = %e, "Pending account sweep failed"),
                        }
                    }
                }
            }
        })
    }

    pub fn shutdown(&self) {
        self.shutdown_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewAccount, UserType};
    use crate::services::store::InMemoryAccountStore;

    async fn seed(store: &InMemoryAccountStore, email: &str, age: Duration) -> i64 {
        let account = store
            .create_account(NewAccount {
                email: email.to_string(),
                password_hash: Some("h".to_string()),
                full_name: None,
                role: "user".to_string(),
                user_type: UserType::Internal,
                confirmation_token: format!("token-{}", email),
                access_expires_at: None,
            })
            .await
            .unwrap();
        store
            .update_account(account.id, |a| a.created_at = Utc::now() - age)
            .unwrap();
        account.id
    }

    #[tokio::test]
    async fn test_run_once_removes_only_stale_pending() {
        let store = Arc::new(InMemoryAccountStore::new());
        let stale = seed(&store, "stale@corp.example", Duration::hours(25)).await;
        let fresh = seed(&store, "fresh@corp.example", Duration::hours(1)).await;

        let sweeper = PendingAccountSweeper::new(
            store.clone(),
            std::time::Duration::from_secs(3600),
            Duration::hours(24),
        );
        assert_eq!(sweeper.run_once().await.unwrap(), 1);
        assert!(store.find_by_id(stale).await.unwrap().is_none());
        assert!(store.find_by_id(fresh).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_loop_sweeps_and_stops_on_shutdown() {
        let store = Arc::new(InMemoryAccountStore::new());
        let stale = seed(&store, "stale@corp.example", Duration::hours(48)).await;

        let sweeper = Arc::new(PendingAccountSweeper::new(
            store.clone(),
            std::time::Duration::from_millis(10),
            Duration::hours(24),
        ));
        let handle = sweeper.start();

        for _ in 0..100 {
            if store.find_by_id(stale).await.unwrap().is_none() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(store.find_by_id(stale).await.unwrap().is_none());

        sweeper.shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
