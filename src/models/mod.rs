pub mod account;
pub mod recovery;
pub mod secret;
pub mod session;

pub use account::{Account, TwoFactor, TwoFactorState};
pub use recovery::RecoveryCodeSet;
pub use secret::{Code, Secret};
pub use session::Session;
