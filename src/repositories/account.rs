use async_trait::async_trait;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::Account;

/// アカウントストア
///
/// 二要素認証の状態遷移の境界（有効化・無効化・リカバリーコード消費）でのみ更新される。
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// 新しいアカウントを作成
    ///
    /// # Errors
    /// - メールアドレス重複時: `RepositoryError::EmailAlreadyExists`
    async fn create_account(&self, email: &str) -> Result<Account, RepositoryError>;

    /// アカウントIDで検索
    async fn find_account(&self, id: Uuid) -> Result<Option<Account>, RepositoryError>;

    /// メールアドレスで検索
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, RepositoryError>;

    /// アカウントを更新
    ///
    /// 保存済みの `version` が `account.version` と一致する場合のみ書き込み、
    /// バージョンを +1 した更新後のアカウントを返す。
    ///
    /// # Errors
    /// - バージョン不一致時: `RepositoryError::Conflict`
    /// - 存在しない場合: `RepositoryError::NotFound`
    async fn update_account(&self, account: &Account) -> Result<Account, RepositoryError>;
}
