use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

pub mod accounts;
pub mod health;
pub mod two_factor;

pub use accounts::create_account;
pub use health::health_check;
pub use two_factor::{
    confirm_2fa, disable_2fa, regenerate_recovery_codes, setup_2fa, status_2fa, verify_2fa,
};

/// Router の構築
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/accounts", post(create_account))
        // 二要素認証
        .route("/api/2fa/status/{user_id}", get(status_2fa))
        .route("/api/2fa/setup", post(setup_2fa))
        .route("/api/2fa/confirm", post(confirm_2fa))
        .route("/api/2fa/verify", post(verify_2fa))
        .route("/api/2fa/disable", post(disable_2fa))
        .route("/api/2fa/recovery-codes", post(regenerate_recovery_codes))
        .with_state(state)
}
