pub mod base32;
pub mod clock;
pub mod generator;
pub mod hmac;
pub mod pending;
pub mod secret_cipher;
pub mod totp;
pub mod two_factor;

pub use clock::{Clock, FixedClock, SystemClock};
pub use generator::RecoveryCodeGenerator;
pub use pending::PendingSetupRegistry;
pub use secret_cipher::SecretCipher;
pub use totp::{TotpEngine, TotpParams};
pub use two_factor::{PendingSetup, TwoFactorService};
