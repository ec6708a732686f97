use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::services::two_factor::PendingSetup;

/// 確認待ちセットアップの保管所
///
/// HTTP のセットアップ開始と確定のリクエストをまたいで候補シークレットを保持する。
/// `take` は取り出すと同時に削除するため、確定に失敗した候補は再利用されない。
#[derive(Clone)]
pub struct PendingSetupRegistry {
    inner: Arc<Mutex<HashMap<Uuid, PendingSetup>>>,
    ttl: Duration,
}

impl PendingSetupRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, PendingSetup>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_expired(&self, pending: &PendingSetup, now: OffsetDateTime) -> bool {
        pending.created_at + self.ttl <= now
    }

    /// 保存（同じアカウントの既存の候補は置き換える）
    pub fn insert(&self, pending: PendingSetup) {
        self.lock().insert(pending.account_id, pending);
    }

    /// 取り出して削除。期限切れなら None
    pub fn take(&self, account_id: Uuid, now: OffsetDateTime) -> Option<PendingSetup> {
        let pending = self.lock().remove(&account_id)?;
        if self.is_expired(&pending, now) {
            tracing::info!(account_id = %account_id, "期限切れのセットアップを破棄");
            return None;
        }
        Some(pending)
    }

    /// 削除せずに参照用の複製を返す
    pub fn peek(&self, account_id: Uuid, now: OffsetDateTime) -> Option<PendingSetup> {
        self.lock()
            .get(&account_id)
            .filter(|p| !self.is_expired(p, now))
            .cloned()
    }

    pub fn discard(&self, account_id: Uuid) {
        self.lock().remove(&account_id);
    }

    /// 期限切れの候補をまとめて削除し、削除数を返す
    pub fn purge_expired(&self, now: OffsetDateTime) -> usize {
        let mut inner = self.lock();
        let before = inner.len();
        inner.retain(|_, p| p.created_at + self.ttl > now);
        before - inner.len()
    }
}
