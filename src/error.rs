use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// 二要素認証コアのエラー
///
/// コード不一致はエラーではなく通常の結果値（`*Outcome::Rejected`）として返す。
/// ここに並ぶのは呼び出し側が区別して扱う必要のある状態のみ。
#[derive(Debug, thiserror::Error)]
pub enum TwoFactorError {
    #[error("シークレットのエンコードが不正です")]
    InvalidSecretEncoding,

    #[error("システム時刻を取得できません")]
    ClockUnavailable,

    #[error("リカバリーコードが残っていません")]
    RecoveryCodeExhausted,

    #[error("同時更新が競合しました")]
    ConcurrentMutationConflict,

    #[error("乱数生成器を利用できません")]
    EntropyUnavailable,

    #[error("パラメータが不正です: {0}")]
    InvalidParameters(String),

    #[error("アカウントが見つかりません")]
    AccountNotFound,

    #[error("このメールアドレスは既に使用されています")]
    EmailAlreadyExists,

    #[error("二要素認証は既に有効です")]
    AlreadyEnabled,

    #[error("二要素認証が有効化されていません")]
    NotEnabled,

    #[error("セットアップ情報が別のアカウントのものです")]
    SetupMismatch,

    #[error("ストレージエラー")]
    Storage(#[source] anyhow::Error),
}

/// アカウントストアのエラー
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("アカウントが見つかりません")]
    NotFound,

    /// 楽観ロックのバージョン不一致
    #[error("バージョンが競合しました")]
    Conflict,

    #[error("このメールアドレスは既に使用されています")]
    EmailAlreadyExists,

    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),

    #[error("保存データが破損しています: {0}")]
    Corrupt(String),
}

impl From<RepositoryError> for TwoFactorError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => Self::AccountNotFound,
            RepositoryError::Conflict => Self::ConcurrentMutationConflict,
            RepositoryError::EmailAlreadyExists => Self::EmailAlreadyExists,
            other => Self::Storage(anyhow::Error::new(other)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    #[error("認証コードが無効です")]
    TotpInvalid,

    #[error("二要素認証の設定が開始されていません")]
    SetupNotStarted,

    #[error(transparent)]
    TwoFactor(#[from] TwoFactorError),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::TotpInvalid => (
                StatusCode::UNAUTHORIZED,
                "認証コードが正しくありません".to_string(),
            ),
            Self::SetupNotStarted => (
                StatusCode::BAD_REQUEST,
                "二要素認証の設定を最初からやり直してください".to_string(),
            ),
            Self::Internal(e) => {
                tracing::error!(error = ?e, "内部エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::TwoFactor(e) => two_factor_status(e),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

fn two_factor_status(e: &TwoFactorError) -> (StatusCode, String) {
    match e {
        TwoFactorError::AccountNotFound => (
            StatusCode::NOT_FOUND,
            "アカウントが見つかりません".to_string(),
        ),
        TwoFactorError::EmailAlreadyExists | TwoFactorError::AlreadyEnabled => {
            (StatusCode::CONFLICT, e.to_string())
        }
        TwoFactorError::ConcurrentMutationConflict => (
            StatusCode::CONFLICT,
            "他のリクエストと競合しました。再試行してください".to_string(),
        ),
        TwoFactorError::NotEnabled | TwoFactorError::SetupMismatch => {
            (StatusCode::BAD_REQUEST, e.to_string())
        }
        TwoFactorError::InvalidParameters(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        TwoFactorError::RecoveryCodeExhausted => (
            StatusCode::FORBIDDEN,
            "リカバリーコードを使い切りました。二要素認証を再設定してください".to_string(),
        ),
        TwoFactorError::InvalidSecretEncoding
        | TwoFactorError::ClockUnavailable
        | TwoFactorError::EntropyUnavailable
        | TwoFactorError::Storage(_) => {
            tracing::error!(error = ?e, "二要素認証の内部エラー");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "内部エラーが発生しました".to_string(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_conflict_maps_to_concurrent_mutation() {
        let e: TwoFactorError = RepositoryError::Conflict.into();
        assert!(matches!(e, TwoFactorError::ConcurrentMutationConflict));
    }

    #[test]
    fn test_repository_corrupt_maps_to_storage() {
        let e: TwoFactorError = RepositoryError::Corrupt("bad secret".to_string()).into();
        assert!(matches!(e, TwoFactorError::Storage(_)));
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::TotpInvalid, StatusCode::UNAUTHORIZED),
            (
                AppError::TwoFactor(TwoFactorError::AlreadyEnabled),
                StatusCode::CONFLICT,
            ),
            (
                AppError::TwoFactor(TwoFactorError::RecoveryCodeExhausted),
                StatusCode::FORBIDDEN,
            ),
            (
                AppError::TwoFactor(TwoFactorError::ClockUnavailable),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AppError::Validation("x".to_string()),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
