use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use time::OffsetDateTime;

use crate::error::TwoFactorError;

/// 壁時計
///
/// 時間ウィンドウの計算に使う唯一の外部依存。
pub trait Clock: Send + Sync {
    fn now(&self) -> Result<OffsetDateTime, TwoFactorError>;
}

/// OSのシステム時刻
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<OffsetDateTime, TwoFactorError> {
        let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).map_err(|e| {
            tracing::error!(error = ?e, "システム時刻取得エラー");
            TwoFactorError::ClockUnavailable
        })?;

        let secs = i64::try_from(elapsed.as_secs()).map_err(|_| TwoFactorError::ClockUnavailable)?;
        OffsetDateTime::from_unix_timestamp(secs).map_err(|e| {
            tracing::error!(error = ?e, "システム時刻が範囲外");
            TwoFactorError::ClockUnavailable
        })
    }
}

/// 任意の時刻に固定できる時計
#[derive(Debug)]
pub struct FixedClock {
    unix: AtomicI64,
}

impl FixedClock {
    pub fn at(unix: i64) -> Self {
        Self {
            unix: AtomicI64::new(unix),
        }
    }

    pub fn set(&self, unix: i64) {
        self.unix.store(unix, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.unix.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Result<OffsetDateTime, TwoFactorError> {
        OffsetDateTime::from_unix_timestamp(self.unix.load(Ordering::SeqCst))
            .map_err(|_| TwoFactorError::ClockUnavailable)
    }
}
