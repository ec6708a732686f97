use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct CreateAccountResponse {
    pub id: Uuid,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// POST /api/accounts
///
/// アカウント作成ハンドラー
pub async fn create_account(
    State(state): State<AppState>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<Json<CreateAccountResponse>, AppError> {
    validate_email(&request.email)?;

    let account = state
        .two_factor
        .create_account(request.email.trim())
        .await?;

    Ok(Json(CreateAccountResponse {
        id: account.id,
        email: account.email,
        created_at: account.created_at,
    }))
}

/// メールアドレスのバリデーション
fn validate_email(email: &str) -> Result<(), AppError> {
    if email.trim().is_empty() {
        return Err(AppError::Validation("メールアドレスは必須です".to_string()));
    }
    if !email.contains('@') {
        return Err(AppError::Validation(
            "有効なメールアドレスを入力してください".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_empty_email() {
        assert!(validate_email("").is_err());
    }

    #[test]
    fn test_validate_invalid_email() {
        assert!(validate_email("invalid-email").is_err());
    }

    #[test]
    fn test_validate_valid_email() {
        assert!(validate_email("test@example.com").is_ok());
    }
}
