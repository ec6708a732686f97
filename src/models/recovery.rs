use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// リカバリーコードの集合
///
/// 平文は保持せず、正規化したコードのSHA-256ダイジェスト（hex）のみを持つ。
/// 平文はセットアップ時に一度だけ利用者へ表示される。
/// 各コードは一度きり: `consume` に成功したコードは集合から取り除かれる。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryCodeSet {
    digests: Vec<String>,
}

impl RecoveryCodeSet {
    /// 平文コードから集合を作成
    pub fn from_plain<S: AsRef<str>>(codes: &[S]) -> Self {
        Self {
            digests: codes
                .iter()
                .map(|c| digest(&normalize(c.as_ref())))
                .collect(),
        }
    }

    /// 保存済みダイジェストから復元
    pub fn from_digests(digests: Vec<String>) -> Self {
        Self { digests }
    }

    pub fn digests(&self) -> &[String] {
        &self.digests
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// 入力コードに一致する位置を返す
    pub fn position(&self, submitted: &str) -> Option<usize> {
        let normalized = normalize(submitted);
        if normalized.is_empty() {
            return None;
        }
        let candidate = digest(&normalized);

        // 全要素を比較してから結果を返す
        let mut found = None;
        for (index, stored) in self.digests.iter().enumerate() {
            if bool::from(stored.as_bytes().ct_eq(candidate.as_bytes())) && found.is_none() {
                found = Some(index);
            }
        }
        found
    }

    pub fn contains(&self, submitted: &str) -> bool {
        self.position(submitted).is_some()
    }

    /// 一致するコードを取り除く。取り除いた場合のみ true
    pub fn consume(&mut self, submitted: &str) -> bool {
        match self.position(submitted) {
            Some(index) => {
                self.digests.remove(index);
                true
            }
            None => false,
        }
    }
}

/// 入力の正規化: 前後空白・区切りの `-`・空白を除去し大文字化
pub fn normalize(code: &str) -> String {
    code.chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn digest(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}
