use uuid::Uuid;

use crate::models::Account;

/// 認証済みの呼び出し元
///
/// グローバルな「現在のユーザー」を持たず、各操作に明示的に渡す。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub account_id: Uuid,
    pub email: String,
}

impl Session {
    pub fn for_account(account: &Account) -> Self {
        Self {
            account_id: account.id,
            email: account.email.clone(),
        }
    }
}
