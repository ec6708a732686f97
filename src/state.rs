use std::sync::Arc;

use crate::config::Config;
use crate::error::AppError;
use crate::repositories::AccountRepository;
use crate::services::{
    Clock, PendingSetupRegistry, SystemClock, TotpEngine, TwoFactorService,
};

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// アプリケーション設定（Arc で共有）
    pub config: Arc<Config>,
    /// 二要素認証サービス
    pub two_factor: TwoFactorService,
    /// 確認待ちセットアップ
    pub pending_setups: PendingSetupRegistry,
    /// 時間ウィンドウ計算に使う時計
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// 新しい AppState を作成
    pub fn new(repo: Arc<dyn AccountRepository>, config: Config) -> Result<Self, AppError> {
        Self::with_clock(repo, config, Arc::new(SystemClock))
    }

    /// 時計を指定して AppState を作成
    pub fn with_clock(
        repo: Arc<dyn AccountRepository>,
        config: Config,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let params = config.totp_params()?;
        let recovery = config.recovery_code_generator()?;
        let window_radius = config.window_radius()?;
        let pending_setup_ttl = config.pending_setup_ttl()?;
        let engine = TotpEngine::new(config.totp_issuer.clone(), params);

        let two_factor = TwoFactorService::new(repo, engine)
            .with_recovery_codes(recovery)
            .with_secret_bytes(config.secret_bytes)
            .with_window_radius(window_radius);

        let pending_setups = PendingSetupRegistry::new(pending_setup_ttl);

        tracing::info!(
            issuer = %config.totp_issuer,
            algorithm = %params.algorithm,
            digits = params.digits,
            period = params.period,
            window_radius,
            "二要素認証サービスを初期化"
        );

        Ok(Self {
            config: Arc::new(config),
            two_factor,
            pending_setups,
            clock,
        })
    }
}
