//! シークレットとリカバリーコードの生成
//!
//! 乱数はすべてOSのCSPRNG（`OsRng`）から取得する。

use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::TwoFactorError;
use crate::models::{RecoveryCodeSet, Secret};

pub const DEFAULT_SECRET_BYTES: usize = 20;
pub const MIN_SECRET_BYTES: usize = 16;

pub const DEFAULT_RECOVERY_CODE_COUNT: usize = 10;
pub const DEFAULT_RECOVERY_CODE_LENGTH: usize = 8;
pub const MAX_RECOVERY_CODE_COUNT: usize = 100;
/// 1文字5ビット。6文字で30ビット
pub const MIN_RECOVERY_CODE_LENGTH: usize = 6;

// 紛らわしい 0, O, 1, I を除いた32文字
const RECOVERY_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// `byte_length` バイトのランダムシークレットを生成
pub fn generate_secret(byte_length: usize) -> Result<Secret, TwoFactorError> {
    if byte_length < MIN_SECRET_BYTES {
        return Err(TwoFactorError::InvalidParameters(format!(
            "secret must be at least {MIN_SECRET_BYTES} bytes, got {byte_length}"
        )));
    }

    let mut bytes = vec![0u8; byte_length];
    fill_random(&mut bytes)?;
    Ok(Secret::from_bytes(bytes))
}

fn fill_random(buf: &mut [u8]) -> Result<(), TwoFactorError> {
    OsRng.try_fill_bytes(buf).map_err(|e| {
        tracing::error!(error = %e, "OS乱数生成器からの読み出しに失敗");
        TwoFactorError::EntropyUnavailable
    })
}

/// 既定の長さのリカバリーコードを `count` 個生成
pub fn generate_recovery_codes(count: usize) -> Result<IssuedRecoveryCodes, TwoFactorError> {
    RecoveryCodeGenerator::new(count, DEFAULT_RECOVERY_CODE_LENGTH)?.generate()
}

/// 発行したリカバリーコード（平文）
///
/// 利用者への表示用。保存には [`IssuedRecoveryCodes::to_set`] のダイジェスト集合を使う。
#[derive(Clone)]
pub struct IssuedRecoveryCodes {
    codes: Vec<String>,
}

impl IssuedRecoveryCodes {
    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    /// 読みやすさのため4文字ごとに `-` で区切った表示形式
    pub fn display_codes(&self) -> Vec<String> {
        self.codes
            .iter()
            .map(|code| {
                code.as_bytes()
                    .chunks(4)
                    .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
                    .collect::<Vec<_>>()
                    .join("-")
            })
            .collect()
    }

    pub fn to_set(&self) -> RecoveryCodeSet {
        RecoveryCodeSet::from_plain(&self.codes)
    }
}

impl std::fmt::Debug for IssuedRecoveryCodes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedRecoveryCodes")
            .field("count", &self.codes.len())
            .finish()
    }
}

/// リカバリーコード生成器
#[derive(Debug, Clone)]
pub struct RecoveryCodeGenerator {
    count: usize,
    length: usize,
}

impl Default for RecoveryCodeGenerator {
    fn default() -> Self {
        Self {
            count: DEFAULT_RECOVERY_CODE_COUNT,
            length: DEFAULT_RECOVERY_CODE_LENGTH,
        }
    }
}

impl RecoveryCodeGenerator {
    pub fn new(count: usize, length: usize) -> Result<Self, TwoFactorError> {
        if !(1..=MAX_RECOVERY_CODE_COUNT).contains(&count) {
            return Err(TwoFactorError::InvalidParameters(format!(
                "recovery code count must be between 1 and {MAX_RECOVERY_CODE_COUNT}, got {count}"
            )));
        }
        if length < MIN_RECOVERY_CODE_LENGTH {
            return Err(TwoFactorError::InvalidParameters(format!(
                "recovery codes must be at least {MIN_RECOVERY_CODE_LENGTH} characters, got {length}"
            )));
        }
        Ok(Self { count, length })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// 互いに重複しないコードを `count` 個生成
    ///
    /// 重複した場合は引き直す
    pub fn generate(&self) -> Result<IssuedRecoveryCodes, TwoFactorError> {
        let mut codes: Vec<String> = Vec::with_capacity(self.count);
        let mut buf = vec![0u8; self.length];

        while codes.len() < self.count {
            fill_random(&mut buf)?;
            // 256 は 32 で割り切れるため下位5ビットで一様に選べる
            let code: String = buf
                .iter()
                .map(|b| RECOVERY_ALPHABET[usize::from(b & 0x1F)] as char)
                .collect();
            if !codes.contains(&code) {
                codes.push(code);
            }
        }

        Ok(IssuedRecoveryCodes { codes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_secret_length() {
        let secret = generate_secret(DEFAULT_SECRET_BYTES).unwrap();
        assert_eq!(secret.len(), 20);
        // Base32エンコードされた20バイト = 32文字
        assert_eq!(secret.to_base32().len(), 32);
    }

    #[test]
    fn test_generate_secret_is_random() {
        let a = generate_secret(DEFAULT_SECRET_BYTES).unwrap();
        let b = generate_secret(DEFAULT_SECRET_BYTES).unwrap();
        assert_ne!(a.expose_bytes(), b.expose_bytes());
    }

    #[test]
    fn test_generate_secret_rejects_short_length() {
        assert!(generate_secret(10).is_err());
    }

    #[test]
    fn test_generate_recovery_codes() {
        let issued = RecoveryCodeGenerator::default().generate().unwrap();
        assert_eq!(issued.codes().len(), 10);
        assert!(issued.codes().iter().all(|c| c.len() == 8));
        assert!(
            issued
                .codes()
                .iter()
                .all(|c| c.bytes().all(|b| RECOVERY_ALPHABET.contains(&b)))
        );
    }

    #[test]
    fn test_generate_recovery_codes_with_count() {
        let issued = generate_recovery_codes(3).unwrap();
        assert_eq!(issued.codes().len(), 3);
        assert!(generate_recovery_codes(0).is_err());
    }

    #[test]
    fn test_recovery_codes_are_unique() {
        let issued = RecoveryCodeGenerator::new(50, 6).unwrap().generate().unwrap();
        let mut codes = issued.codes().to_vec();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), 50);
    }

    #[test]
    fn test_display_codes() {
        let issued = IssuedRecoveryCodes {
            codes: vec!["ABCD2345".to_string(), "ABCDEF".to_string()],
        };
        assert_eq!(issued.display_codes(), vec!["ABCD-2345", "ABCD-EF"]);
    }

    #[test]
    fn test_to_set_accepts_display_form() {
        let issued = RecoveryCodeGenerator::default().generate().unwrap();
        let set = issued.to_set();
        assert_eq!(set.len(), 10);
        for shown in issued.display_codes() {
            assert!(set.contains(&shown));
        }
    }

    #[test]
    fn test_generator_validation() {
        assert!(RecoveryCodeGenerator::new(0, 8).is_err());
        assert!(RecoveryCodeGenerator::new(MAX_RECOVERY_CODE_COUNT + 1, 8).is_err());
        assert!(RecoveryCodeGenerator::new(MAX_RECOVERY_CODE_COUNT, 6).is_ok());
        assert!(RecoveryCodeGenerator::new(10, 5).is_err());
        assert!(RecoveryCodeGenerator::new(5, 10).is_ok());
    }
}
