use secrecy::SecretBox;
use serde::Deserialize;
use time::Duration;

use crate::error::TwoFactorError;
use crate::services::generator::{
    DEFAULT_RECOVERY_CODE_COUNT, DEFAULT_RECOVERY_CODE_LENGTH, DEFAULT_SECRET_BYTES,
    RecoveryCodeGenerator,
};
use crate::services::hmac::HashAlgorithm;
use crate::services::totp::{DEFAULT_DIGITS, DEFAULT_PERIOD, TotpParams};
use crate::services::two_factor::{DEFAULT_WINDOW_RADIUS, MAX_WINDOW_RADIUS};

#[derive(Debug, Deserialize)]
pub struct Config {
    /// 未設定ならインメモリのアカウントストアを使う
    #[serde(default)]
    pub database_url: Option<SecretBox<String>>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    // 2FA (TOTP) 設定
    /// TOTP発行者名（認証アプリに表示される）
    pub totp_issuer: String,
    /// AES-256暗号化キー（Base64エンコード、32バイト）。DB利用時は必須
    pub encryption_key: Option<SecretBox<String>>,
    #[serde(default = "default_totp_algorithm")]
    pub totp_algorithm: String,
    #[serde(default = "default_totp_digits")]
    pub totp_digits: u32,
    #[serde(default = "default_totp_period")]
    pub totp_period: u64,
    /// ログイン検証で許容する前後のウィンドウ数
    #[serde(default = "default_totp_window_radius")]
    pub totp_window_radius: u64,
    #[serde(default = "default_secret_bytes")]
    pub secret_bytes: usize,

    // リカバリーコード設定
    #[serde(default = "default_recovery_code_count")]
    pub recovery_code_count: usize,
    #[serde(default = "default_recovery_code_length")]
    pub recovery_code_length: usize,

    /// セットアップ開始から確定までの有効期限
    #[serde(default = "default_pending_setup_ttl_secs")]
    pub pending_setup_ttl_secs: i64,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_PENDING_SETUP_TTL_SECS: i64 = 600;
const MAX_PENDING_SETUP_TTL_SECS: i64 = 86_400;

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_totp_algorithm() -> String {
    HashAlgorithm::Sha1.to_string()
}

fn default_totp_digits() -> u32 {
    DEFAULT_DIGITS
}

fn default_totp_period() -> u64 {
    DEFAULT_PERIOD
}

fn default_totp_window_radius() -> u64 {
    DEFAULT_WINDOW_RADIUS
}

fn default_secret_bytes() -> usize {
    DEFAULT_SECRET_BYTES
}

fn default_recovery_code_count() -> usize {
    DEFAULT_RECOVERY_CODE_COUNT
}

fn default_recovery_code_length() -> usize {
    DEFAULT_RECOVERY_CODE_LENGTH
}

fn default_pending_setup_ttl_secs() -> i64 {
    DEFAULT_PENDING_SETUP_TTL_SECS
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    /// TOTPパラメータを検証して返す
    pub fn totp_params(&self) -> Result<TotpParams, TwoFactorError> {
        TotpParams::new(
            self.totp_algorithm.parse()?,
            self.totp_digits,
            self.totp_period,
        )
    }

    pub fn recovery_code_generator(&self) -> Result<RecoveryCodeGenerator, TwoFactorError> {
        RecoveryCodeGenerator::new(self.recovery_code_count, self.recovery_code_length)
    }

    /// ログイン検証のウィンドウ半径（最大 `MAX_WINDOW_RADIUS`）
    pub fn window_radius(&self) -> Result<u64, TwoFactorError> {
        if self.totp_window_radius > MAX_WINDOW_RADIUS {
            return Err(TwoFactorError::InvalidParameters(format!(
                "window radius must be at most {MAX_WINDOW_RADIUS}, got {}",
                self.totp_window_radius
            )));
        }
        Ok(self.totp_window_radius)
    }

    pub fn pending_setup_ttl(&self) -> Result<Duration, TwoFactorError> {
        if !(1..=MAX_PENDING_SETUP_TTL_SECS).contains(&self.pending_setup_ttl_secs) {
            return Err(TwoFactorError::InvalidParameters(format!(
                "pending setup TTL must be between 1 and {MAX_PENDING_SETUP_TTL_SECS} seconds, got {}",
                self.pending_setup_ttl_secs
            )));
        }
        Ok(Duration::seconds(self.pending_setup_ttl_secs))
    }
}
