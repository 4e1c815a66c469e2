//! In-process wallet row locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Hands out one async mutex per (user, currency) wallet and acquires
/// pairs of them in a deterministic order.
///
/// Two settlements touching the same wallet pair serialize here; the
/// lexicographic currency ordering makes the acquisition order identical
/// across call sites, so opposite-direction trades for the same user
/// cannot deadlock each other.
#[derive(Debug, Default)]
pub struct WalletLockManager {
    locks: Mutex<HashMap<(i64, String), Arc<AsyncMutex<()>>>>,
}

/// Guards for both wallets of one settlement. Released on drop, after the
/// settlement transaction commits or aborts.
#[derive(Debug)]
pub struct WalletPairGuard {
    _first: OwnedMutexGuard<()>,
    _second: OwnedMutexGuard<()>,
}

impl WalletLockManager {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire both wallet locks for a user, in lexicographic currency
    /// order regardless of argument order.
    ///
    /// The two currencies must differ; request validation guarantees the
    /// base currency never equals the quote currency.
    pub async fn lock_pair(
        &self,
        user_id: i64,
        currency_a: &str,
        currency_b: &str,
    ) -> WalletPairGuard {
        debug_assert_ne!(currency_a, currency_b, "wallet pair must differ");

        let (first, second) = if currency_a <= currency_b {
            (currency_a, currency_b)
        } else {
            (currency_b, currency_a)
        };

        let first_handle = self.handle(user_id, first);
        let second_handle = self.handle(user_id, second);

        let first_guard = first_handle.lock_owned().await;
        let second_guard = second_handle.lock_owned().await;

        WalletPairGuard {
            _first: first_guard,
            _second: second_guard,
        }
    }

    fn handle(&self, user_id: i64, currency: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(
            locks
                .entry((user_id, currency.to_string()))
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }
}
