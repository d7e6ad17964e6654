use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::Scope;

type LockTable = Arc<Mutex<HashMap<Scope, Arc<AsyncMutex<()>>>>>;

/// Per-scope mutual exclusion shared by audits and remediation.
///
/// At most one holder per scope at a time; different scopes never contend.
/// Cloning shares the same lock table. An entry lives only while a guard
/// holds it or a caller waits on it.
#[derive(Clone, Default)]
pub struct ScopeLocks {
    table: LockTable,
}

/// Held for the lifetime of one audit or one transaction
pub struct ScopeGuard {
    scope: Scope,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    table: LockTable,
}

impl ScopeGuard {
    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.guard.take();

        let mut table = self.table.lock().unwrap_or_else(|p| p.into_inner());
        // Table entry plus ours; any other count is a waiter
        if Arc::strong_count(&self.lock) == 2 {
            table.remove(&self.scope);
        }
    }
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, scope: &Scope) -> Arc<AsyncMutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(|p| p.into_inner());
        Arc::clone(table.entry(scope.clone()).or_default())
    }

    fn guard(&self, scope: &Scope, lock: Arc<AsyncMutex<()>>, guard: OwnedMutexGuard<()>) -> ScopeGuard {
        ScopeGuard {
            scope: scope.clone(),
            lock,
            guard: Some(guard),
            table: Arc::clone(&self.table),
        }
    }

    pub async fn acquire(&self, scope: &Scope) -> ScopeGuard {
        let lock = self.entry(scope);
        let guard = Arc::clone(&lock).lock_owned().await;
        self.guard(scope, lock, guard)
    }

    /// Returns `None` if the scope is currently held
    pub fn try_acquire(&self, scope: &Scope) -> Option<ScopeGuard> {
        let lock = self.entry(scope);
        let acquired = Arc::clone(&lock).try_lock_owned();
        match acquired {
            Ok(guard) => Some(self.guard(scope, lock, guard)),
            Err(_) => {
                drop(lock);
                self.release_unused(scope);
                None
            }
        }
    }

    /// Number of scopes currently held or waited on
    pub fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release_unused(&self, scope: &Scope) {
        let mut table = self.table.lock().unwrap_or_else(|p| p.into_inner());
        if table.get(scope).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            table.remove(scope);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_scope_is_exclusive() {
        let locks = ScopeLocks::new();
        let scope = Scope::site("https://contoso.sharepoint.com/sites/hr");

        let guard = locks.acquire(&scope).await;
        assert_eq!(guard.scope(), &scope);
        assert!(locks.try_acquire(&scope).is_none());

        drop(guard);
        assert!(locks.try_acquire(&scope).is_some());
    }

    #[tokio::test]
    async fn test_different_scopes_do_not_contend() {
        let locks = ScopeLocks::new();
        let _hr = locks.acquire(&Scope::site("https://contoso.sharepoint.com/sites/hr")).await;
        assert!(locks
            .try_acquire(&Scope::site("https://contoso.sharepoint.com/sites/finance"))
            .is_some());
    }

    #[tokio::test]
    async fn test_waiter_proceeds_after_release() {
        let locks = ScopeLocks::new();
        let scope = Scope::tenant("contoso");
        let guard = locks.acquire(&scope).await;

        let waiter = {
            let locks = locks.clone();
            let scope = scope.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(&scope).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_released_scopes_leave_the_table() {
        let locks = ScopeLocks::new();
        for name in ["hr", "finance", "legal"] {
            let _guard = locks
                .acquire(&Scope::site(format!("https://contoso.sharepoint.com/sites/{}", name)))
                .await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());

        let scope = Scope::tenant("contoso");
        let held = locks.acquire(&scope).await;
        assert!(locks.try_acquire(&scope).is_none());
        assert_eq!(locks.len(), 1);
        drop(held);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_entry_survives_while_waiter_pending() {
        let locks = ScopeLocks::new();
        let scope = Scope::tenant("contoso");
        let guard = locks.acquire(&scope).await;

        let waiter = {
            let locks = locks.clone();
            let scope = scope.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(&scope).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard);
        assert_eq!(locks.len(), 1);
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}
