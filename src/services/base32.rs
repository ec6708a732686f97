//! RFC 4648 Base32（パディングなし）
//!
//! 認証アプリとの互換のため、デコードは寛容に行う:
//! 大文字小文字を区別せず、アルファベット外の文字（空白、`-`、`=` など）は読み飛ばす。

use std::sync::LazyLock;

use data_encoding::{BASE32_NOPAD, DecodeError, Encoding, Specification, SpecificationError};

use crate::error::TwoFactorError;

const ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// 末尾の余りビットが0でなくても受け付けるデコーダー
static LENIENT: LazyLock<Result<Encoding, SpecificationError>> = LazyLock::new(|| {
    let mut spec = Specification::new();
    spec.symbols.push_str(ALPHABET);
    spec.check_trailing_bits = false;
    spec.encoding()
});

/// バイト列をBase32文字列にエンコード
///
/// 最後のグループは0ビットで埋める。パディング文字は付けない。
pub fn encode(bytes: &[u8]) -> String {
    BASE32_NOPAD.encode(bytes)
}

/// Base32文字列をバイト列にデコード
///
/// 8ビットに満たない末尾のビットは捨てる。
pub fn decode(input: &str) -> Result<Vec<u8>, TwoFactorError> {
    let mut symbols: Vec<u8> = input
        .bytes()
        .map(|c| c.to_ascii_uppercase())
        .filter(|c| symbol_value(*c).is_some())
        .collect();

    // 1, 3, 6 文字余りの最後の1文字は1バイトにならないビットだけを持つ
    if matches!(symbols.len() % 8, 1 | 3 | 6) {
        symbols.pop();
    }

    let encoding = LENIENT.as_ref().map_err(|e| {
        tracing::error!(error = %e, "Base32デコーダーの構築に失敗");
        TwoFactorError::InvalidSecretEncoding
    })?;
    encoding.decode(&symbols).map_err(|e: DecodeError| {
        tracing::debug!(error = %e, "Base32デコードに失敗");
        TwoFactorError::InvalidSecretEncoding
    })
}

fn symbol_value(c: u8) -> Option<u8> {
    match c.to_ascii_uppercase() {
        c @ b'A'..=b'Z' => Some(c - b'A'),
        c @ b'2'..=b'7' => Some(c - b'2' + 26),
        _ => None,
    }
}
