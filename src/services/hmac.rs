use std::fmt;
use std::str::FromStr;

use ::hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::error::TwoFactorError;

/// HMACに使うハッシュ関数
///
/// 標準のTOTPプロファイルはSHA-1。認証アプリによってはSHA-256/512も扱える。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HashAlgorithm {
    #[default]
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// otpauth URI の `algorithm` パラメータ表記
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha512 => "SHA512",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = TwoFactorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "").as_str() {
            "SHA1" => Ok(Self::Sha1),
            "SHA256" => Ok(Self::Sha256),
            "SHA512" => Ok(Self::Sha512),
            other => Err(TwoFactorError::InvalidParameters(format!(
                "unsupported hash algorithm: {other}"
            ))),
        }
    }
}

/// HMAC(key, message) を計算
///
/// inner/outer pad 構成の標準HMAC（RFC 2104）。純粋関数。
pub fn hmac(
    algorithm: HashAlgorithm,
    key: &[u8],
    message: &[u8],
) -> Result<Vec<u8>, TwoFactorError> {
    // Hmac は任意長の鍵を受け付けるため new_from_slice は実質失敗しない
    let digest = match algorithm {
        HashAlgorithm::Sha1 => {
            let mut mac = Hmac::<Sha1>::new_from_slice(key)
                .map_err(|_| TwoFactorError::InvalidSecretEncoding)?;
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
        HashAlgorithm::Sha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(key)
                .map_err(|_| TwoFactorError::InvalidSecretEncoding)?;
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
        HashAlgorithm::Sha512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(key)
                .map_err(|_| TwoFactorError::InvalidSecretEncoding)?;
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
    };

    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn test_hmac_sha1_rfc2202_case1() {
        let mac = hmac(HashAlgorithm::Sha1, &[0x0b; 20], b"Hi There").unwrap();
        assert_eq!(hex(&mac), "b617318655057264e28bc0b6fb378c8ef146be00");
    }

    #[test]
    fn test_hmac_sha1_rfc2202_case2() {
        let mac = hmac(
            HashAlgorithm::Sha1,
            b"Jefe",
            b"what do ya want for nothing?",
        )
        .unwrap();
        assert_eq!(hex(&mac), "effcdf6ae5eb2fa2d27416d5f184df9c259a7c79");
    }

    #[test]
    fn test_hmac_sha256_rfc4231_case2() {
        let mac = hmac(
            HashAlgorithm::Sha256,
            b"Jefe",
            b"what do ya want for nothing?",
        )
        .unwrap();
        assert_eq!(
            hex(&mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_digest_lengths() {
        assert_eq!(hmac(HashAlgorithm::Sha1, b"k", b"m").unwrap().len(), 20);
        assert_eq!(hmac(HashAlgorithm::Sha256, b"k", b"m").unwrap().len(), 32);
        assert_eq!(hmac(HashAlgorithm::Sha512, b"k", b"m").unwrap().len(), 64);
    }

    #[test]
    fn test_hmac_differs_from_plain_hash_of_concatenation() {
        use sha1::Digest;

        let mac = hmac(HashAlgorithm::Sha1, b"key", b"message").unwrap();
        let naive = Sha1::digest(b"keymessage");
        assert_ne!(mac, naive.to_vec());
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!("SHA1".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha1);
        assert_eq!(
            "sha-256".parse::<HashAlgorithm>().unwrap(),
            HashAlgorithm::Sha256
        );
        assert_eq!(
            "Sha512".parse::<HashAlgorithm>().unwrap(),
            HashAlgorithm::Sha512
        );
        assert!("md5".parse::<HashAlgorithm>().is_err());
    }
}
