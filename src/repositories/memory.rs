use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::Account;
use crate::repositories::AccountRepository;

/// プロセス内のアカウントストア
///
/// `DATABASE_URL` 未設定時とテストで使う。
#[derive(Debug, Default)]
pub struct InMemoryAccountRepository {
    accounts: Mutex<HashMap<Uuid, Account>>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Account>> {
        self.accounts.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 保存済みのバージョン
    pub fn version_of(&self, id: Uuid) -> Option<i64> {
        self.lock().get(&id).map(|a| a.version)
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn create_account(&self, email: &str) -> Result<Account, RepositoryError> {
        let mut accounts = self.lock();
        if accounts.values().any(|a| a.email.eq_ignore_ascii_case(email)) {
            return Err(RepositoryError::EmailAlreadyExists);
        }

        let account = Account::new(email);
        accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn find_account(&self, id: Uuid) -> Result<Option<Account>, RepositoryError> {
        Ok(self.lock().get(&id).cloned())
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, RepositoryError> {
        Ok(self
            .lock()
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update_account(&self, account: &Account) -> Result<Account, RepositoryError> {
        let mut accounts = self.lock();
        let stored = accounts
            .get_mut(&account.id)
            .ok_or(RepositoryError::NotFound)?;

        // 検査と書き込みは同じロック内で行う
        if stored.version != account.version {
            tracing::warn!(
                account_id = %account.id,
                expected = account.version,
                actual = stored.version,
                "アカウント更新の競合"
            );
            return Err(RepositoryError::Conflict);
        }

        let mut updated = account.clone();
        updated.version += 1;
        updated.updated_at = OffsetDateTime::now_utc();
        *stored = updated.clone();
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_find() {
        let repo = InMemoryAccountRepository::new();
        let account = repo.create_account("alice@example.com").await.unwrap();

        let found = repo.find_account(account.id).await.unwrap().unwrap();
        assert_eq!(found.email, "alice@example.com");
        let found = repo
            .find_account_by_email("ALICE@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, account.id);
        assert!(repo.find_account(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let repo = InMemoryAccountRepository::new();
        repo.create_account("alice@example.com").await.unwrap();
        assert!(matches!(
            repo.create_account("alice@example.com").await,
            Err(RepositoryError::EmailAlreadyExists)
        ));
        assert!(matches!(
            repo.create_account("Alice@Example.COM").await,
            Err(RepositoryError::EmailAlreadyExists)
        ));
    }

    #[tokio::test]
    async fn test_find_by_email_ignores_case() {
        let repo = InMemoryAccountRepository::new();
        let account = repo.create_account("Alice@example.com").await.unwrap();
        let found = repo
            .find_account_by_email("alice@EXAMPLE.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, account.id);
    }

    #[tokio::test]
    async fn test_update_bumps_version() {
        let repo = InMemoryAccountRepository::new();
        let account = repo.create_account("alice@example.com").await.unwrap();

        let updated = repo.update_account(&account).await.unwrap();
        assert_eq!(updated.version, account.version + 1);
        assert_eq!(repo.version_of(account.id), Some(updated.version));
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let repo = InMemoryAccountRepository::new();
        let account = repo.create_account("alice@example.com").await.unwrap();

        repo.update_account(&account).await.unwrap();
        assert!(matches!(
            repo.update_account(&account).await,
            Err(RepositoryError::Conflict)
        ));
    }

    #[tokio::test]
    async fn test_update_missing_account() {
        let repo = InMemoryAccountRepository::new();
        let account = Account::new("ghost@example.com");
        assert!(matches!(
            repo.update_account(&account).await,
            Err(RepositoryError::NotFound)
        ));
    }
}
