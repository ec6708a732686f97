use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::TwoFactorState;
use crate::services::two_factor::{
    ConfirmOutcome, DisableOutcome, RegenerateOutcome, VerifyOutcome,
};
use crate::state::AppState;

/// 入力コードの最大長（TOTPコード・リカバリーコード共通）
const MAX_CODE_LENGTH: usize = 32;

// === 2FA Status ===

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: TwoFactorState,
    pub recovery_codes_remaining: usize,
}

/// GET /api/2fa/status/{user_id}
pub async fn status_2fa(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<StatusResponse>, AppError> {
    let now = state.clock.now()?;
    let session = state.two_factor.session_for(user_id).await?;
    let pending = state.pending_setups.peek(user_id, now);

    let status = state.two_factor.status(&session, pending.as_ref()).await?;

    Ok(Json(StatusResponse {
        state: status.state,
        recovery_codes_remaining: status.recovery_codes_remaining,
    }))
}

// === 2FA Setup ===

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct SetupResponse {
    pub secret: String,
    pub provisioning_uri: String,
    pub recovery_codes: Vec<String>,
}

/// POST /api/2fa/setup
///
/// 2FA設定を開始（シークレット・リカバリーコード生成、otpauth URI返却）
///
/// # Security
/// - シークレット平文・リカバリーコードはログ出力禁止
/// - この時点ではアカウントに保存しない
pub async fn setup_2fa(
    State(state): State<AppState>,
    Json(request): Json<SetupRequest>,
) -> Result<Json<SetupResponse>, AppError> {
    let now = state.clock.now()?;
    let session = state.two_factor.session_for(request.user_id).await?;

    let started = state.two_factor.begin_setup(&session, now).await?;
    state.pending_setups.insert(started.pending);

    Ok(Json(SetupResponse {
        secret: started.secret,
        provisioning_uri: started.provisioning_uri,
        recovery_codes: started.recovery_codes,
    }))
}

// === 2FA Confirm ===

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub user_id: Uuid,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub enabled: bool,
}

/// POST /api/2fa/confirm
///
/// 2FA設定確認（初回コード検証で有効化）
///
/// # Security
/// - コードはログ出力禁止
/// - 失敗した候補は破棄され、セットアップからやり直しになる
pub async fn confirm_2fa(
    State(state): State<AppState>,
    Json(request): Json<CodeRequest>,
) -> Result<Json<ConfirmResponse>, AppError> {
    validate_code(&request.code)?;

    let now = state.clock.now()?;
    let session = state.two_factor.session_for(request.user_id).await?;
    let pending = state
        .pending_setups
        .take(request.user_id, now)
        .ok_or(AppError::SetupNotStarted)?;

    let attempt = state
        .two_factor
        .confirm_setup(&session, pending, &request.code, now)
        .await?;

    match attempt.outcome {
        ConfirmOutcome::Enabled => Ok(Json(ConfirmResponse { enabled: true })),
        ConfirmOutcome::Rejected => Err(AppError::TotpInvalid),
    }
}

// === 2FA Verify ===

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyMethod {
    Totp,
    RecoveryCode,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub verified: bool,
    pub method: VerifyMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_codes_remaining: Option<usize>,
}

/// POST /api/2fa/verify
///
/// ログイン時の2FA検証（TOTPコードまたはリカバリーコード）
pub async fn verify_2fa(
    State(state): State<AppState>,
    Json(request): Json<CodeRequest>,
) -> Result<Json<VerifyResponse>, AppError> {
    validate_code(&request.code)?;

    let now = state.clock.now()?;
    let session = state.two_factor.session_for(request.user_id).await?;

    let attempt = state
        .two_factor
        .verify(&session, &request.code, now)
        .await?;

    match attempt.outcome {
        VerifyOutcome::Accepted { .. } => Ok(Json(VerifyResponse {
            verified: true,
            method: VerifyMethod::Totp,
            recovery_codes_remaining: None,
        })),
        VerifyOutcome::RecoveryUsed { remaining } => Ok(Json(VerifyResponse {
            verified: true,
            method: VerifyMethod::RecoveryCode,
            recovery_codes_remaining: Some(remaining),
        })),
        VerifyOutcome::Rejected => Err(AppError::TotpInvalid),
    }
}

// === 2FA Disable ===

#[derive(Debug, Serialize)]
pub struct DisableResponse {
    pub disabled: bool,
}

/// POST /api/2fa/disable
///
/// 2FA無効化
///
/// # Security
/// - TOTPコード確認必須（リカバリーコード不可）
pub async fn disable_2fa(
    State(state): State<AppState>,
    Json(request): Json<CodeRequest>,
) -> Result<Json<DisableResponse>, AppError> {
    validate_code(&request.code)?;

    let now = state.clock.now()?;
    let session = state.two_factor.session_for(request.user_id).await?;

    let attempt = state
        .two_factor
        .disable(&session, &request.code, now)
        .await?;

    match attempt.outcome {
        DisableOutcome::Disabled => {
            state.pending_setups.discard(request.user_id);
            Ok(Json(DisableResponse { disabled: true }))
        }
        DisableOutcome::Rejected => Err(AppError::TotpInvalid),
    }
}

// === Recovery Codes ===

#[derive(Debug, Serialize)]
pub struct RecoveryCodesResponse {
    pub recovery_codes: Vec<String>,
}

/// POST /api/2fa/recovery-codes
///
/// リカバリーコード再発行（TOTPコード確認必須）
pub async fn regenerate_recovery_codes(
    State(state): State<AppState>,
    Json(request): Json<CodeRequest>,
) -> Result<Json<RecoveryCodesResponse>, AppError> {
    validate_code(&request.code)?;

    let now = state.clock.now()?;
    let session = state.two_factor.session_for(request.user_id).await?;

    let attempt = state
        .two_factor
        .regenerate_recovery_codes(&session, &request.code, now)
        .await?;

    match attempt.outcome {
        RegenerateOutcome::Regenerated { recovery_codes } => {
            Ok(Json(RecoveryCodesResponse { recovery_codes }))
        }
        RegenerateOutcome::Rejected => Err(AppError::TotpInvalid),
    }
}

// === Helper Functions ===

/// コードバリデーション
///
/// 桁数や文字種の検査はしない（リカバリーコードも受け付けるため）
fn validate_code(code: &str) -> Result<(), AppError> {
    if code.trim().is_empty() {
        return Err(AppError::Validation("認証コードは必須です".to_string()));
    }
    if code.len() > MAX_CODE_LENGTH {
        return Err(AppError::Validation(
            "認証コードが長すぎます".to_string(),
        ));
    }
    Ok(())
}
