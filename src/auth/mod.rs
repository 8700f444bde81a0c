//! Session authentication for MoneyForward ME.
//!
//! The login protocol is multi-stage and risk-adaptive: email page, password
//! page, then optionally an emailed one-time passcode and an account
//! selector. This module owns that protocol end to end: the pure URL
//! classifier ([`stage`]), the passcode rendezvous ([`OtpRelay`]), the
//! per-attempt state machine ([`LoginFlow`]) and the retrying, single-flight
//! façade ([`Authenticator`]).

mod authenticator;
mod flow;
mod otp;
pub mod stage;

pub use authenticator::{Authenticator, BrowserLoginDriver, LoginDriver};
pub use flow::{LoginFlow, SelectionStrategy};
pub use otp::OtpRelay;

/// Authentication failure taxonomy.
///
/// Everything except `Initialization` and `Terminal` is retryable at the
/// attempt level; the retry loop lives in [`Authenticator::login`].
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The browser engine could not start. Fatal, never retried.
    #[error("browser engine failed to initialize: {0}")]
    Initialization(String),

    /// An expected field or control never appeared.
    #[error("timed out waiting for selector {selector:?}")]
    SelectorTimeout { selector: String },

    /// The site rejected the supplied one-time passcode.
    #[error("one-time passcode was rejected as incorrect")]
    IncorrectPasscode,

    /// No passcode was deposited within the wait window. Distinct from
    /// `IncorrectPasscode` so operators can tell "code never arrived" from
    /// "code was wrong".
    #[error("no one-time passcode was provided within {timeout_secs}s")]
    PasscodeTimeout { timeout_secs: u64 },

    /// The flow ran to completion but the session did not verify as
    /// authenticated.
    #[error("login flow completed but the session did not verify")]
    VerificationFailed,

    /// All attempts exhausted. Wraps the last underlying cause.
    #[error("authentication failed after {attempts} attempts")]
    Terminal {
        attempts: u32,
        #[source]
        source: Box<AuthError>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AuthError {
    /// Errors that abort the retry loop instead of feeding it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AuthError::Initialization(_) | AuthError::Terminal { .. })
    }
}
