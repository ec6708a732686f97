use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::TwoFactorError;
use crate::models::{Account, RecoveryCodeSet, Secret, Session, TwoFactor, TwoFactorState};
use crate::repositories::AccountRepository;
use crate::services::generator::{self, RecoveryCodeGenerator};
use crate::services::totp::{TotpEngine, epoch_seconds};

pub const DEFAULT_WINDOW_RADIUS: u64 = 2;
pub const MAX_WINDOW_RADIUS: u64 = 10;

/// セットアップ確認時に許容する過去ウィンドウ数（時計の遅れ分）
const SETUP_WINDOWS_BEHIND: u64 = 1;

/// 確認待ちのセットアップ
///
/// 候補シークレットとリカバリーコードを保持するだけで、アカウントには紐付いていない。
/// `confirm_setup` に値で渡すため、確認に失敗すると破棄される。
#[derive(Debug, Clone)]
pub struct PendingSetup {
    pub account_id: Uuid,
    pub secret: Secret,
    pub recovery_codes: RecoveryCodeSet,
    pub created_at: OffsetDateTime,
}

/// `begin_setup` の結果
///
/// `secret`・`recovery_codes` は利用者への表示用で、この時点でしか平文を得られない。
#[derive(Debug)]
pub struct SetupStarted {
    pub pending: PendingSetup,
    pub secret: String,
    pub provisioning_uri: String,
    pub recovery_codes: Vec<String>,
}

/// 検証試行の記録
///
/// 外部のレート制限・ロックアウトが判断できるよう、アカウント・時刻・結果を返す。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt<O> {
    pub account_id: Uuid,
    pub at: OffsetDateTime,
    pub outcome: O,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Enabled,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// 時間ウィンドウ内のコードと一致（`window_offset` は現在からのずれ）
    Accepted { window_offset: i64 },
    /// リカバリーコードを消費して認証
    RecoveryUsed { remaining: usize },
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableOutcome {
    Disabled,
    Rejected,
}

/// リカバリーコード再発行の結果
#[derive(Debug)]
pub enum RegenerateOutcome {
    Regenerated { recovery_codes: Vec<String> },
    Rejected,
}

pub trait Succeeded {
    fn succeeded(&self) -> bool;
}

impl Succeeded for ConfirmOutcome {
    fn succeeded(&self) -> bool {
        matches!(self, Self::Enabled)
    }
}

impl Succeeded for VerifyOutcome {
    fn succeeded(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

impl Succeeded for DisableOutcome {
    fn succeeded(&self) -> bool {
        matches!(self, Self::Disabled)
    }
}

impl Succeeded for RegenerateOutcome {
    fn succeeded(&self) -> bool {
        matches!(self, Self::Regenerated { .. })
    }
}

impl<O: Succeeded> Attempt<O> {
    pub fn succeeded(&self) -> bool {
        self.outcome.succeeded()
    }
}

/// 二要素認証の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TwoFactorStatus {
    pub state: TwoFactorState,
    pub recovery_codes_remaining: usize,
}

/// 二要素認証サービス
///
/// Disabled → PendingSetup → Enabled → Disabled の状態遷移を扱う。
/// アカウントストアはセットアップ確定・無効化・リカバリーコード消費の境界でのみ更新し、
/// 更新は楽観ロックで直前の検査と不可分にする。
///
/// # Security
/// - シークレット・コード・リカバリーコードはログに出力しない
#[derive(Clone)]
pub struct TwoFactorService {
    repo: Arc<dyn AccountRepository>,
    engine: TotpEngine,
    recovery: RecoveryCodeGenerator,
    secret_bytes: usize,
    window_radius: u64,
}

impl TwoFactorService {
    pub fn new(repo: Arc<dyn AccountRepository>, engine: TotpEngine) -> Self {
        Self {
            repo,
            engine,
            recovery: RecoveryCodeGenerator::default(),
            secret_bytes: generator::DEFAULT_SECRET_BYTES,
            window_radius: DEFAULT_WINDOW_RADIUS,
        }
    }

    pub fn with_recovery_codes(mut self, recovery: RecoveryCodeGenerator) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_secret_bytes(mut self, secret_bytes: usize) -> Self {
        self.secret_bytes = secret_bytes;
        self
    }

    pub fn with_window_radius(mut self, window_radius: u64) -> Self {
        self.window_radius = window_radius;
        self
    }

    pub fn engine(&self) -> &TotpEngine {
        &self.engine
    }

    /// アカウントを作成
    pub async fn create_account(&self, email: &str) -> Result<Account, TwoFactorError> {
        let account = self.repo.create_account(email).await?;
        tracing::info!(account_id = %account.id, "アカウント作成");
        Ok(account)
    }

    /// アカウントIDからセッションを構築
    pub async fn session_for(&self, account_id: Uuid) -> Result<Session, TwoFactorError> {
        let account = self.load(account_id).await?;
        Ok(Session::for_account(&account))
    }

    /// 現在の状態を取得
    ///
    /// 呼び出し側が確認待ちのセットアップを持っていれば PendingSetup
    pub async fn status(
        &self,
        session: &Session,
        pending: Option<&PendingSetup>,
    ) -> Result<TwoFactorStatus, TwoFactorError> {
        let account = self.load(session.account_id).await?;
        let state = match (&account.two_factor, pending) {
            (TwoFactor::Enabled { .. }, _) => TwoFactorState::Enabled,
            (TwoFactor::Disabled, Some(p)) if p.account_id == account.id => {
                TwoFactorState::PendingSetup
            }
            (TwoFactor::Disabled, _) => TwoFactorState::Disabled,
        };

        Ok(TwoFactorStatus {
            state,
            recovery_codes_remaining: account.two_factor.recovery_codes_remaining(),
        })
    }

    /// セットアップを開始
    ///
    /// 新しいシークレットとリカバリーコードを生成する。保存・有効化はしない。
    pub async fn begin_setup(
        &self,
        session: &Session,
        now: OffsetDateTime,
    ) -> Result<SetupStarted, TwoFactorError> {
        let account = self.load(session.account_id).await?;
        if account.two_factor.is_enabled() {
            return Err(TwoFactorError::AlreadyEnabled);
        }

        let secret = generator::generate_secret(self.secret_bytes)?;
        let issued = self.recovery.generate()?;
        let provisioning_uri = self.engine.provisioning_uri(&secret, &session.email);

        tracing::info!(account_id = %account.id, "2FA設定開始");

        Ok(SetupStarted {
            secret: secret.to_base32(),
            provisioning_uri,
            recovery_codes: issued.display_codes(),
            pending: PendingSetup {
                account_id: account.id,
                secret,
                recovery_codes: issued.to_set(),
                created_at: now,
            },
        })
    }

    /// セットアップを確定
    ///
    /// 現在または直前のウィンドウのコードのみ受け付ける（先のウィンドウは見ない）。
    /// 一致すればシークレットとリカバリーコードをアカウントに紐付けて有効化する。
    pub async fn confirm_setup(
        &self,
        session: &Session,
        pending: PendingSetup,
        submitted: &str,
        now: OffsetDateTime,
    ) -> Result<Attempt<ConfirmOutcome>, TwoFactorError> {
        if pending.account_id != session.account_id {
            tracing::warn!(
                account_id = %session.account_id,
                pending_account_id = %pending.account_id,
                "別アカウントのセットアップ情報"
            );
            return Err(TwoFactorError::SetupMismatch);
        }

        let epoch = epoch_seconds(now)?;
        let matched = self.engine.match_window(
            &pending.secret,
            submitted.trim(),
            epoch,
            SETUP_WINDOWS_BEHIND,
            0,
        )?;

        let Some(window_offset) = matched else {
            tracing::warn!(account_id = %session.account_id, success = false, "2FA有効化失敗: コード不一致");
            return Ok(self.attempt(session, now, ConfirmOutcome::Rejected));
        };

        let mut account = self.load(session.account_id).await?;
        if account.two_factor.is_enabled() {
            return Err(TwoFactorError::AlreadyEnabled);
        }

        account.two_factor = TwoFactor::Enabled {
            secret: pending.secret,
            recovery_codes: pending.recovery_codes,
            enabled_at: now,
        };
        self.repo.update_account(&account).await?;

        tracing::info!(account_id = %account.id, window_offset, success = true, "2FA有効化完了");

        Ok(self.attempt(session, now, ConfirmOutcome::Enabled))
    }

    /// ログイン時の検証
    ///
    /// ±`window_radius` のウィンドウで一致しなければリカバリーコードを照合する。
    /// リカバリーコードは一致した時点で消費し、以後そのコードは使えない。
    pub async fn verify(
        &self,
        session: &Session,
        submitted: &str,
        now: OffsetDateTime,
    ) -> Result<Attempt<VerifyOutcome>, TwoFactorError> {
        let epoch = epoch_seconds(now)?;
        let mut account = self.load(session.account_id).await?;
        let submitted = submitted.trim();

        let TwoFactor::Enabled {
            secret,
            recovery_codes,
            ..
        } = &mut account.two_factor
        else {
            return Err(TwoFactorError::NotEnabled);
        };

        if let Some(window_offset) = self.engine.match_window(
            secret,
            submitted,
            epoch,
            self.window_radius,
            self.window_radius,
        )? {
            tracing::info!(account_id = %session.account_id, window_offset, success = true, "2FA検証成功");
            return Ok(self.attempt(session, now, VerifyOutcome::Accepted { window_offset }));
        }

        if recovery_codes.is_empty() {
            tracing::warn!(account_id = %session.account_id, success = false, "2FA検証失敗: リカバリーコード残数0");
            return Err(TwoFactorError::RecoveryCodeExhausted);
        }

        if !recovery_codes.consume(submitted) {
            tracing::warn!(account_id = %session.account_id, success = false, "2FA検証失敗: コード不一致");
            return Ok(self.attempt(session, now, VerifyOutcome::Rejected));
        }

        let remaining = recovery_codes.len();
        self.repo.update_account(&account).await?;

        tracing::info!(
            account_id = %session.account_id,
            remaining,
            success = true,
            "2FA検証成功: リカバリーコード使用"
        );

        Ok(self.attempt(session, now, VerifyOutcome::RecoveryUsed { remaining }))
    }

    /// 二要素認証を無効化
    ///
    /// 時間ウィンドウのコードのみ受け付け、リカバリーコードは使えない。
    /// 成功するとシークレットとリカバリーコードを破棄する。
    pub async fn disable(
        &self,
        session: &Session,
        submitted: &str,
        now: OffsetDateTime,
    ) -> Result<Attempt<DisableOutcome>, TwoFactorError> {
        let mut account = self.load(session.account_id).await?;
        if self.check_totp(&account, submitted, now)?.is_none() {
            tracing::warn!(account_id = %session.account_id, success = false, "2FA無効化失敗: コード不一致");
            return Ok(self.attempt(session, now, DisableOutcome::Rejected));
        }

        account.two_factor = TwoFactor::Disabled;
        self.repo.update_account(&account).await?;

        tracing::info!(account_id = %session.account_id, success = true, "2FA無効化完了");

        Ok(self.attempt(session, now, DisableOutcome::Disabled))
    }

    /// リカバリーコードを再発行
    ///
    /// 無効化と同じく時間ウィンドウのコードが必要。既存のコードはすべて置き換える。
    pub async fn regenerate_recovery_codes(
        &self,
        session: &Session,
        submitted: &str,
        now: OffsetDateTime,
    ) -> Result<Attempt<RegenerateOutcome>, TwoFactorError> {
        let mut account = self.load(session.account_id).await?;
        if self.check_totp(&account, submitted, now)?.is_none() {
            tracing::warn!(account_id = %session.account_id, success = false, "リカバリーコード再発行失敗: コード不一致");
            return Ok(self.attempt(session, now, RegenerateOutcome::Rejected));
        }

        let issued = self.recovery.generate()?;
        if let TwoFactor::Enabled { recovery_codes, .. } = &mut account.two_factor {
            *recovery_codes = issued.to_set();
        }
        self.repo.update_account(&account).await?;

        tracing::info!(account_id = %session.account_id, success = true, "リカバリーコード再発行");

        Ok(self.attempt(
            session,
            now,
            RegenerateOutcome::Regenerated {
                recovery_codes: issued.display_codes(),
            },
        ))
    }

    /// 有効なアカウントについて時間ウィンドウのみで照合
    fn check_totp(
        &self,
        account: &Account,
        submitted: &str,
        now: OffsetDateTime,
    ) -> Result<Option<i64>, TwoFactorError> {
        let epoch = epoch_seconds(now)?;
        let TwoFactor::Enabled { secret, .. } = &account.two_factor else {
            return Err(TwoFactorError::NotEnabled);
        };

        self.engine.match_window(
            secret,
            submitted.trim(),
            epoch,
            self.window_radius,
            self.window_radius,
        )
    }

    async fn load(&self, account_id: Uuid) -> Result<Account, TwoFactorError> {
        self.repo
            .find_account(account_id)
            .await?
            .ok_or(TwoFactorError::AccountNotFound)
    }

    fn attempt<O>(&self, session: &Session, at: OffsetDateTime, outcome: O) -> Attempt<O> {
        Attempt {
            account_id: session.account_id,
            at,
            outcome,
        }
    }
}
