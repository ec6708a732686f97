use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::{RecoveryCodeSet, Secret};

/// アカウントの二要素認証状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TwoFactorState {
    Disabled,
    /// セットアップ開始済み・コード確認待ち（アカウントにはまだ紐付かない）
    PendingSetup,
    Enabled,
}

/// アカウントに紐付いた二要素認証の資格情報
///
/// シークレットとリカバリーコードは有効時にのみ存在する。
#[derive(Debug, Clone, Default)]
pub enum TwoFactor {
    #[default]
    Disabled,
    Enabled {
        secret: Secret,
        recovery_codes: RecoveryCodeSet,
        enabled_at: OffsetDateTime,
    },
}

impl TwoFactor {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled { .. })
    }

    pub fn recovery_codes_remaining(&self) -> usize {
        match self {
            Self::Disabled => 0,
            Self::Enabled { recovery_codes, .. } => recovery_codes.len(),
        }
    }
}

/// アカウント
///
/// `version` は楽観ロック用。更新のたびにストア側で +1 される。
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub two_factor: TwoFactor,
    pub version: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Account {
    pub fn new(email: &str) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            email: email.to_string(),
            two_factor: TwoFactor::Disabled,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
