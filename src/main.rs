use std::net::SocketAddr;
use std::sync::Arc;

use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use otpgate::{
    config::Config,
    handlers,
    repositories::{AccountRepository, InMemoryAccountRepository, PgAccountRepository},
    services::SecretCipher,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ログ初期化（JSON形式、環境変数でレベル制御）
    init_tracing();

    tracing::info!("otpgate 起動中...");

    // 設定読み込み
    let config = Config::load().map_err(|e| {
        tracing::error!(error = ?e, "設定の読み込みに失敗");
        anyhow::anyhow!("Failed to load config: {}", e)
    })?;

    tracing::info!(host = %config.host, port = %config.port, "設定読み込み完了");

    // サーバーアドレスを先に構築（config が move される前に）
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| {
            tracing::error!(error = ?e, "アドレスのパースに失敗");
            anyhow::anyhow!("Failed to parse address: {}", e)
        })?;

    let repo = build_repository(&config).await?;

    // AppState 構築
    let state = AppState::new(repo, config).map_err(|e| {
        tracing::error!(error = ?e, "AppState の構築に失敗");
        anyhow::anyhow!("Failed to create AppState: {}", e)
    })?;

    spawn_pending_setup_sweeper(state.clone());

    // Router 構築
    let app = handlers::create_router(state);

    // サーバー起動
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        tracing::error!(error = ?e, addr = %addr, "ポートのバインドに失敗");
        anyhow::anyhow!("Failed to bind to {}: {}", addr, e)
    })?;

    tracing::info!(addr = %addr, "サーバー起動");

    // Graceful shutdown 対応
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, "サーバーエラー");
            anyhow::anyhow!("Server error: {}", e)
        })?;

    tracing::info!("サーバー終了");

    Ok(())
}

/// tracing の初期化（JSON形式）
fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,otpgate=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// アカウントストアの構築
///
/// DATABASE_URL があれば PostgreSQL、なければインメモリ
async fn build_repository(config: &Config) -> anyhow::Result<Arc<dyn AccountRepository>> {
    let Some(database_url) = &config.database_url else {
        tracing::warn!("DATABASE_URL 未設定: インメモリのアカウントストアを使用");
        return Ok(Arc::new(InMemoryAccountRepository::new()));
    };

    let encryption_key = config.encryption_key.as_ref().ok_or_else(|| {
        tracing::error!("DATABASE_URL 使用時は ENCRYPTION_KEY が必須");
        anyhow::anyhow!("ENCRYPTION_KEY is required when DATABASE_URL is set")
    })?;
    let cipher = SecretCipher::new(encryption_key.expose_secret())
        .map_err(|e| anyhow::anyhow!("Failed to create cipher: {}", e))?;

    // データベース接続プール作成
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url.expose_secret())
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, "データベース接続に失敗");
            anyhow::anyhow!("Failed to connect to database: {}", e)
        })?;

    tracing::info!("データベース接続完了");

    Ok(Arc::new(PgAccountRepository::new(db_pool, cipher)))
}

/// 期限切れの確認待ちセットアップを定期的に削除
fn spawn_pending_setup_sweeper(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            let now = match state.clock.now() {
                Ok(now) => now,
                Err(e) => {
                    tracing::error!(error = ?e, "時刻取得に失敗（セットアップ掃除をスキップ）");
                    continue;
                }
            };
            let purged = state.pending_setups.purge_expired(now);
            if purged > 0 {
                tracing::debug!(purged, "期限切れセットアップを削除");
            }
        }
    });
}

/// Graceful shutdown シグナル待機
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = ?e, "Ctrl+C ハンドラーのインストールに失敗");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "SIGTERM ハンドラーのインストールに失敗");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("SIGTERM received, starting graceful shutdown");
        }
    }
}
