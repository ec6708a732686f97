use std::fmt;

use secrecy::{ExposeSecret, SecretBox};
use subtle::ConstantTimeEq;

use crate::error::TwoFactorError;
use crate::services::base32;

/// TOTPの共有シークレット
///
/// 生成後は不変。再設定時は新しいシークレットで置き換える。
/// Debug 出力では中身を表示しない。
pub struct Secret(SecretBox<Vec<u8>>);

impl Secret {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(SecretBox::new(Box::new(bytes)))
    }

    /// Base32表記から復元
    ///
    /// 1バイトもデコードできない入力は `InvalidSecretEncoding`
    pub fn from_base32(encoded: &str) -> Result<Self, TwoFactorError> {
        let bytes = base32::decode(encoded)?;
        if bytes.is_empty() {
            return Err(TwoFactorError::InvalidSecretEncoding);
        }
        Ok(Self::from_bytes(bytes))
    }

    pub fn expose_bytes(&self) -> &[u8] {
        self.0.expose_secret()
    }

    /// 認証アプリに表示するBase32表記
    pub fn to_base32(&self) -> String {
        base32::encode(self.expose_bytes())
    }

    pub fn len(&self) -> usize {
        self.expose_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.expose_bytes().is_empty()
    }
}

impl Clone for Secret {
    fn clone(&self) -> Self {
        Self::from_bytes(self.expose_bytes().to_vec())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

/// 固定桁数の10進ワンタイムコード（ゼロ埋め）
#[derive(Clone, PartialEq, Eq)]
pub struct Code(String);

impl Code {
    pub(crate) fn new(value: u32, digits: u32) -> Self {
        Self(format!("{:0width$}", value, width = digits as usize))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 入力コードと定数時間で比較
    pub fn matches(&self, submitted: &str) -> bool {
        self.0.as_bytes().ct_eq(submitted.as_bytes()).into()
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Code({} digits)", self.0.len())
    }
}
