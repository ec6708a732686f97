use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::{Account, RecoveryCodeSet, TwoFactor};
use crate::repositories::AccountRepository;
use crate::services::SecretCipher;

const ACCOUNT_COLUMNS: &str = "id, email, two_factor_enabled, secret_encrypted, recovery_code_digests, \
     two_factor_enabled_at, version, created_at, updated_at";

/// `lower(email)` に張った一意インデックス
const EMAIL_UNIQUE_INDEX: &str = "accounts_email_key";

/// accounts テーブルの行
///
/// シークレットは AES-256-GCM で暗号化、リカバリーコードはダイジェストのみ保存
#[derive(Debug, FromRow)]
struct AccountRow {
    id: Uuid,
    email: String,
    two_factor_enabled: bool,
    secret_encrypted: Option<Vec<u8>>,
    recovery_code_digests: Vec<String>,
    two_factor_enabled_at: Option<OffsetDateTime>,
    version: i64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

/// PostgreSQL のアカウントストア
#[derive(Clone)]
pub struct PgAccountRepository {
    pool: PgPool,
    cipher: SecretCipher,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool, cipher: SecretCipher) -> Self {
        Self { pool, cipher }
    }

    fn to_account(&self, row: AccountRow) -> Result<Account, RepositoryError> {
        let two_factor = match (row.two_factor_enabled, row.secret_encrypted, row.two_factor_enabled_at) {
            (false, _, _) => TwoFactor::Disabled,
            (true, Some(encrypted), Some(enabled_at)) => {
                let secret = self.cipher.decrypt(&encrypted).map_err(|e| {
                    tracing::error!(error = ?e, account_id = %row.id, "シークレット復号エラー");
                    RepositoryError::Corrupt("secret could not be decrypted".to_string())
                })?;
                TwoFactor::Enabled {
                    secret,
                    recovery_codes: RecoveryCodeSet::from_digests(row.recovery_code_digests),
                    enabled_at,
                }
            }
            (true, _, _) => {
                tracing::error!(account_id = %row.id, "2FA有効だがシークレットがない");
                return Err(RepositoryError::Corrupt(
                    "two-factor enabled without secret".to_string(),
                ));
            }
        };

        Ok(Account {
            id: row.id,
            email: row.email,
            two_factor,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn create_account(&self, email: &str) -> Result<Account, RepositoryError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "INSERT INTO accounts (email) VALUES ($1) RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            // 一意インデックス違反チェック（大文字小文字は区別しない）
            if let sqlx::Error::Database(db_err) = &e
                && db_err.constraint() == Some(EMAIL_UNIQUE_INDEX)
            {
                return RepositoryError::EmailAlreadyExists;
            }
            RepositoryError::Database(e)
        })?;

        self.to_account(row)
    }

    async fn find_account(&self, id: Uuid) -> Result<Option<Account>, RepositoryError> {
        sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| self.to_account(row))
        .transpose()
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, RepositoryError> {
        sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| self.to_account(row))
        .transpose()
    }

    /// バージョン一致を条件に更新（楽観ロック）
    async fn update_account(&self, account: &Account) -> Result<Account, RepositoryError> {
        let (enabled, secret_encrypted, digests, enabled_at) = match &account.two_factor {
            TwoFactor::Disabled => (false, None, Vec::new(), None),
            TwoFactor::Enabled {
                secret,
                recovery_codes,
                enabled_at,
            } => {
                let encrypted = self.cipher.encrypt(secret).map_err(|e| {
                    tracing::error!(error = ?e, account_id = %account.id, "シークレット暗号化エラー");
                    RepositoryError::Corrupt("secret could not be encrypted".to_string())
                })?;
                (
                    true,
                    Some(encrypted),
                    recovery_codes.digests().to_vec(),
                    Some(*enabled_at),
                )
            }
        };

        let row = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            UPDATE accounts
            SET email = $2,
                two_factor_enabled = $3,
                secret_encrypted = $4,
                recovery_code_digests = $5,
                two_factor_enabled_at = $6,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $7
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(account.id)
        .bind(&account.email)
        .bind(enabled)
        .bind(secret_encrypted)
        .bind(digests)
        .bind(enabled_at)
        .bind(account.version)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => self.to_account(row),
            None => {
                let exists: bool =
                    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM accounts WHERE id = $1)")
                        .bind(account.id)
                        .fetch_one(&self.pool)
                        .await?;
                if exists {
                    tracing::warn!(account_id = %account.id, "アカウント更新の競合");
                    Err(RepositoryError::Conflict)
                } else {
                    Err(RepositoryError::NotFound)
                }
            }
        }
    }
}
