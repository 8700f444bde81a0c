//! The authenticator façade.
//!
//! This is what the rest of the crate calls: "is the session usable?" and
//! "make it usable". It owns the retry schedule and the process-wide
//! guarantee that only one login or validation-plus-login runs at a time.

use std::sync::Arc;
use std::time::Duration;

use crate::browser::{current_url, settle, BrowserHandle};
use crate::clock::{Sleeper, TokioSleeper};

use super::flow::LoginFlow;
use super::stage;
use super::AuthError;

const MAX_ATTEMPTS: u32 = 3;

/// Fixed (not exponential-random) so externally observed retry timing stays
/// predictable for monitoring.
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(5),
    Duration::from_secs(15),
    Duration::from_secs(45),
];

/// One login attempt plus the session probe, behind a trait so the retry
/// and single-flight logic is testable without a browser.
#[async_trait::async_trait]
pub trait LoginDriver: Send + Sync {
    /// Run one full login attempt, opening and closing its own page.
    async fn attempt(&self, attempt: u32) -> Result<(), AuthError>;

    /// Probe whether the current session is usable. Fail-closed: any fault
    /// reads as "not valid", never an error.
    async fn session_valid(&self) -> bool;
}

/// Production driver: runs the [`LoginFlow`] against pages from the shared
/// persistent context.
pub struct BrowserLoginDriver {
    browser: Arc<BrowserHandle>,
    flow: LoginFlow,
    probe_url: String,
}

impl BrowserLoginDriver {
    /// `probe_url` must be a route that only renders for an authenticated
    /// session (the portfolio page); an invalid session gets redirected to
    /// the identity provider instead.
    pub fn new(browser: Arc<BrowserHandle>, flow: LoginFlow, probe_url: String) -> Self {
        Self {
            browser,
            flow,
            probe_url,
        }
    }
}

#[async_trait::async_trait]
impl LoginDriver for BrowserLoginDriver {
    async fn attempt(&self, attempt: u32) -> Result<(), AuthError> {
        tracing::info!(attempt, "Login attempt started");

        let page = self
            .browser
            .new_page()
            .await
            .map_err(|e| AuthError::Initialization(e.to_string()))?;

        let outcome = self.flow.run(&page).await;

        if let Err(err) = page.close().await {
            tracing::warn!(error = %err, "Error closing login page");
        }

        outcome?;

        // The flow's final URL check is only a hint; a fresh probe is the
        // definitive success signal.
        if !self.session_valid().await {
            tracing::warn!(attempt, "Login verification probe failed");
            return Err(AuthError::VerificationFailed);
        }

        Ok(())
    }

    async fn session_valid(&self) -> bool {
        let page = match self.browser.new_page().await {
            Ok(page) => page,
            Err(err) => {
                tracing::warn!(error = %err, "Session probe could not open a page");
                return false;
            }
        };

        let result = async {
            page.goto(self.probe_url.as_str()).await?;
            settle(&page).await?;
            current_url(&page).await
        }
        .await;

        if let Err(err) = page.close().await {
            tracing::warn!(error = %err, "Error closing probe page");
        }

        match result {
            Ok(url) => {
                let valid = stage::is_authenticated(&url);
                tracing::info!(valid, url, "Session validity checked");
                valid
            }
            Err(err) => {
                tracing::warn!(error = %err, "Session validation error, treating as invalid");
                false
            }
        }
    }
}

/// Retrying, single-flight authentication façade.
pub struct Authenticator {
    driver: Arc<dyn LoginDriver>,
    sleeper: Arc<dyn Sleeper>,
    // Serializes validate-then-login so concurrent callers await the
    // in-flight login instead of racing their own attempts (and their own
    // passcode waits) against the same account.
    gate: tokio::sync::Mutex<()>,
}

impl Authenticator {
    pub fn new(driver: Arc<dyn LoginDriver>) -> Self {
        Self::with_sleeper(driver, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(driver: Arc<dyn LoginDriver>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            driver,
            sleeper,
            gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Fresh probe of the current session. Never errors.
    pub async fn is_session_valid(&self) -> bool {
        self.driver.session_valid().await
    }

    /// Make the session usable, logging in if the probe says it is not.
    ///
    /// Callers arriving while a login is in flight wait for it and then
    /// re-probe, so one login serves all of them.
    pub async fn ensure_authenticated(&self) -> Result<(), AuthError> {
        let _guard = self.gate.lock().await;

        if self.driver.session_valid().await {
            return Ok(());
        }

        tracing::info!("Session invalid, re-authentication required");
        self.login_locked().await
    }

    /// Run the login protocol with retries regardless of current session
    /// state.
    pub async fn login(&self) -> Result<(), AuthError> {
        let _guard = self.gate.lock().await;
        self.login_locked().await
    }

    async fn login_locked(&self) -> Result<(), AuthError> {
        let mut last_error = None;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.driver.attempt(attempt).await {
                Ok(()) => {
                    tracing::info!(attempt, "Login successful");
                    return Ok(());
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "Login attempt failed");

                    if attempt < MAX_ATTEMPTS {
                        let delay = RETRY_DELAYS[(attempt - 1) as usize];
                        tracing::info!(delay_secs = delay.as_secs(), "Retrying login");
                        self.sleeper.sleep(delay).await;
                    }

                    last_error = Some(err);
                }
            }
        }

        Err(AuthError::Terminal {
            attempts: MAX_ATTEMPTS,
            source: Box::new(last_error.unwrap_or(AuthError::VerificationFailed)),
        })
    }
}
