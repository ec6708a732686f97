use time::OffsetDateTime;

use crate::error::TwoFactorError;
use crate::models::{Code, Secret};
use crate::services::hmac::{HashAlgorithm, hmac};

pub const DEFAULT_PERIOD: u64 = 30;
pub const DEFAULT_DIGITS: u32 = 6;

/// TOTPのパラメータ（アルゴリズム・桁数・周期）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotpParams {
    pub algorithm: HashAlgorithm,
    pub digits: u32,
    pub period: u64,
}

impl Default for TotpParams {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::Sha1,
            digits: DEFAULT_DIGITS,
            period: DEFAULT_PERIOD,
        }
    }
}

impl TotpParams {
    /// パラメータを検証して作成
    ///
    /// 桁数は RFC 4226 の推奨範囲 6〜8
    pub fn new(algorithm: HashAlgorithm, digits: u32, period: u64) -> Result<Self, TwoFactorError> {
        if !(6..=8).contains(&digits) {
            return Err(TwoFactorError::InvalidParameters(format!(
                "digits must be between 6 and 8, got {digits}"
            )));
        }
        if period == 0 {
            return Err(TwoFactorError::InvalidParameters(
                "period must be at least 1 second".to_string(),
            ));
        }
        Ok(Self {
            algorithm,
            digits,
            period,
        })
    }
}

/// UNIX時刻（秒）を取得
///
/// エポック以前の時刻は時刻源の異常として扱う
pub fn epoch_seconds(now: OffsetDateTime) -> Result<u64, TwoFactorError> {
    u64::try_from(now.unix_timestamp()).map_err(|_| {
        tracing::error!(timestamp = now.unix_timestamp(), "エポック以前のシステム時刻");
        TwoFactorError::ClockUnavailable
    })
}

/// 時間カウンタ = floor(epoch / period)
pub fn time_counter(epoch: u64, period: u64) -> u64 {
    epoch / period
}

/// HOTP（RFC 4226）: カウンタからコードを計算
pub fn hotp(
    secret: &[u8],
    counter: u64,
    algorithm: HashAlgorithm,
    digits: u32,
) -> Result<Code, TwoFactorError> {
    let mac = hmac(algorithm, secret, &counter.to_be_bytes())?;
    let value = dynamic_truncate(&mac)?;
    Ok(Code::new(value % 10u32.pow(digits), digits))
}

/// 動的切り詰め: 末尾バイトの下位4ビットをオフセットとして4バイトを取り出し、最上位ビットを落とす
fn dynamic_truncate(mac: &[u8]) -> Result<u32, TwoFactorError> {
    let last = mac.last().ok_or(TwoFactorError::InvalidSecretEncoding)?;
    let offset = usize::from(last & 0x0F);
    let chunk: [u8; 4] = mac
        .get(offset..offset + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or(TwoFactorError::InvalidSecretEncoding)?;
    Ok(u32::from_be_bytes(chunk) & 0x7FFF_FFFF)
}

/// TOTP（RFC 6238）: 時刻からコードを計算
pub fn compute_code(
    secret: &Secret,
    epoch: u64,
    params: &TotpParams,
) -> Result<Code, TwoFactorError> {
    hotp(
        secret.expose_bytes(),
        time_counter(epoch, params.period),
        params.algorithm,
        params.digits,
    )
}

/// 認証アプリ向けの otpauth URI を構築
///
/// 発行者名とアカウント名はパーセントエンコードする
pub fn provisioning_uri(
    secret: &Secret,
    account_label: &str,
    issuer: &str,
    params: &TotpParams,
) -> String {
    let issuer = urlencoding::encode(issuer);
    let label = urlencoding::encode(account_label);
    format!(
        "otpauth://totp/{issuer}:{label}?secret={}&issuer={issuer}&algorithm={}&digits={}&period={}",
        secret.to_base32(),
        params.algorithm,
        params.digits,
        params.period,
    )
}

/// TOTP エンジン
///
/// # Security
/// - シークレット平文・コードはログに出力しない
#[derive(Debug, Clone)]
pub struct TotpEngine {
    issuer: String,
    params: TotpParams,
}

impl TotpEngine {
    pub fn new(issuer: String, params: TotpParams) -> Self {
        Self { issuer, params }
    }

    pub fn params(&self) -> &TotpParams {
        &self.params
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn compute_code(&self, secret: &Secret, epoch: u64) -> Result<Code, TwoFactorError> {
        compute_code(secret, epoch, &self.params)
    }

    pub fn provisioning_uri(&self, secret: &Secret, account_label: &str) -> String {
        provisioning_uri(secret, account_label, &self.issuer, &self.params)
    }

    /// 入力コードが時間ウィンドウ内のいずれかと一致するか検査
    ///
    /// `behind` 個前から `ahead` 個先までのウィンドウを比較し、一致したウィンドウの
    /// 現在からのオフセットを返す。形式が不正な入力（桁数違い・数字以外）は計算せずに不一致。
    pub fn match_window(
        &self,
        secret: &Secret,
        submitted: &str,
        epoch: u64,
        behind: u64,
        ahead: u64,
    ) -> Result<Option<i64>, TwoFactorError> {
        if !self.is_well_formed(submitted) {
            return Ok(None);
        }

        let current = time_counter(epoch, self.params.period);
        let first = current.saturating_sub(behind);
        let last = current.saturating_add(ahead);

        let mut matched = None;
        for counter in first..=last {
            let code = hotp(
                secret.expose_bytes(),
                counter,
                self.params.algorithm,
                self.params.digits,
            )?;
            // 一致しても残りのウィンドウを計算し終えてから返す
            if code.matches(submitted) && matched.is_none() {
                matched = Some(counter as i64 - current as i64);
            }
        }

        Ok(matched)
    }

    fn is_well_formed(&self, submitted: &str) -> bool {
        submitted.len() == self.params.digits as usize
            && submitted.bytes().all(|b| b.is_ascii_digit())
    }
}
