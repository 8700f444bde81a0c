use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mfbridge::auth::{AuthError, Authenticator, LoginDriver, OtpRelay};
use mfbridge::clock::Sleeper;
use tokio::sync::Mutex;

/// Records requested delays instead of sleeping.
#[derive(Default)]
struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

#[async_trait::async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().await.push(duration);
    }
}

impl RecordingSleeper {
    async fn recorded_secs(&self) -> Vec<u64> {
        self.sleeps.lock().await.iter().map(|d| d.as_secs()).collect()
    }
}

/// Scripted driver: pops one result per attempt, tracks the session flag.
struct ScriptedDriver {
    outcomes: Mutex<Vec<Result<(), AuthError>>>,
    attempts: AtomicU32,
    valid: AtomicBool,
    attempt_delay: Duration,
}

impl ScriptedDriver {
    fn new(outcomes: Vec<Result<(), AuthError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes),
            attempts: AtomicU32::new(0),
            valid: AtomicBool::new(false),
            attempt_delay: Duration::ZERO,
        }
    }

    fn attempts_made(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LoginDriver for ScriptedDriver {
    async fn attempt(&self, _attempt: u32) -> Result<(), AuthError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.attempt_delay.is_zero() {
            tokio::time::sleep(self.attempt_delay).await;
        }
        let outcome = self
            .outcomes
            .lock()
            .await
            .pop()
            .unwrap_or(Err(AuthError::VerificationFailed));
        if outcome.is_ok() {
            self.valid.store(true, Ordering::SeqCst);
        }
        outcome
    }

    async fn session_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }
}

fn authenticator(
    driver: Arc<ScriptedDriver>,
    sleeper: Arc<RecordingSleeper>,
) -> Authenticator {
    Authenticator::with_sleeper(driver, sleeper)
}

// Outcomes are popped from the back.
fn outcomes(script: Vec<Result<(), AuthError>>) -> Vec<Result<(), AuthError>> {
    let mut script = script;
    script.reverse();
    script
}

#[tokio::test]
async fn first_attempt_success_sleeps_never() {
    let driver = Arc::new(ScriptedDriver::new(outcomes(vec![Ok(())])));
    let sleeper = Arc::new(RecordingSleeper::default());
    let auth = authenticator(Arc::clone(&driver), Arc::clone(&sleeper));

    auth.login().await.unwrap();

    assert_eq!(driver.attempts_made(), 1);
    assert!(sleeper.recorded_secs().await.is_empty());
}

#[tokio::test]
async fn delays_escalate_between_failed_attempts() {
    let driver = Arc::new(ScriptedDriver::new(outcomes(vec![
        Err(AuthError::VerificationFailed),
        Err(AuthError::SelectorTimeout {
            selector: "#submitto".to_string(),
        }),
        Ok(()),
    ])));
    let sleeper = Arc::new(RecordingSleeper::default());
    let auth = authenticator(Arc::clone(&driver), Arc::clone(&sleeper));

    auth.login().await.unwrap();

    assert_eq!(driver.attempts_made(), 3);
    assert_eq!(sleeper.recorded_secs().await, vec![5, 15]);
}

#[tokio::test]
async fn exhausted_attempts_return_terminal_with_last_cause() {
    let driver = Arc::new(ScriptedDriver::new(outcomes(vec![
        Err(AuthError::VerificationFailed),
        Err(AuthError::VerificationFailed),
        Err(AuthError::IncorrectPasscode),
    ])));
    let sleeper = Arc::new(RecordingSleeper::default());
    let auth = authenticator(Arc::clone(&driver), Arc::clone(&sleeper));

    let err = auth.login().await.unwrap_err();

    assert_eq!(driver.attempts_made(), 3);
    // No sleep after the final failure; nothing is waiting on another try.
    assert_eq!(sleeper.recorded_secs().await, vec![5, 15]);
    match err {
        AuthError::Terminal { attempts, source } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*source, AuthError::IncorrectPasscode));
        }
        other => panic!("expected Terminal, got {other:?}"),
    }
}

#[tokio::test]
async fn fatal_errors_abort_without_retrying() {
    let driver = Arc::new(ScriptedDriver::new(outcomes(vec![
        Err(AuthError::Initialization("no usable chrome".to_string())),
        Ok(()),
    ])));
    let sleeper = Arc::new(RecordingSleeper::default());
    let auth = authenticator(Arc::clone(&driver), Arc::clone(&sleeper));

    let err = auth.login().await.unwrap_err();

    assert!(matches!(err, AuthError::Initialization(_)));
    assert_eq!(driver.attempts_made(), 1);
    assert!(sleeper.recorded_secs().await.is_empty());
}

#[tokio::test]
async fn ensure_authenticated_skips_login_when_session_is_valid() {
    let driver = Arc::new(ScriptedDriver::new(outcomes(vec![Ok(())])));
    driver.valid.store(true, Ordering::SeqCst);
    let sleeper = Arc::new(RecordingSleeper::default());
    let auth = authenticator(Arc::clone(&driver), sleeper);

    auth.ensure_authenticated().await.unwrap();

    assert_eq!(driver.attempts_made(), 0);
}

/// Driver whose attempts wait on a real passcode relay and reject whatever
/// code arrives, like a site turning down the submitted OTP.
struct RelayBackedDriver {
    relay_path: PathBuf,
    codes_seen: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl LoginDriver for RelayBackedDriver {
    async fn attempt(&self, _attempt: u32) -> Result<(), AuthError> {
        let relay =
            OtpRelay::new(&self.relay_path).with_poll_interval(Duration::from_millis(20));
        let code = relay.await_code(Duration::from_millis(500)).await?;
        self.codes_seen.lock().await.push(code);
        Err(AuthError::IncorrectPasscode)
    }

    async fn session_valid(&self) -> bool {
        false
    }
}

#[tokio::test]
async fn rejected_passcode_gets_a_fresh_relay_wait_on_the_next_attempt() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("otp-code.txt");

    // Leftover artifact from an earlier run; the first wait must discard it
    // rather than submit it.
    std::fs::write(&path, "999999").unwrap();

    let driver = Arc::new(RelayBackedDriver {
        relay_path: path.clone(),
        codes_seen: Mutex::new(Vec::new()),
    });
    let sleeper = Arc::new(RecordingSleeper::default());
    let driver_arc: Arc<dyn LoginDriver> = driver.clone();
    let auth = Authenticator::with_sleeper(driver_arc, sleeper);

    let depositor = tokio::spawn({
        let path = path.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            std::fs::write(&path, "000000").unwrap();
        }
    });

    let err = auth.login().await.unwrap_err();
    depositor.await.unwrap();

    // The deposited code was consumed exactly once; the retries after the
    // rejection ran fresh waits that timed out instead of replaying it.
    assert_eq!(*driver.codes_seen.lock().await, vec!["000000".to_string()]);
    assert!(!path.exists());
    match err {
        AuthError::Terminal { attempts, source } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*source, AuthError::PasscodeTimeout { .. }));
        }
        other => panic!("expected Terminal, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_callers_share_a_single_login() {
    let mut driver = ScriptedDriver::new(outcomes(vec![Ok(())]));
    driver.attempt_delay = Duration::from_millis(50);
    let driver = Arc::new(driver);
    let sleeper = Arc::new(RecordingSleeper::default());
    let auth = Arc::new(authenticator(Arc::clone(&driver), sleeper));

    let a = tokio::spawn({
        let auth = Arc::clone(&auth);
        async move { auth.ensure_authenticated().await }
    });
    let b = tokio::spawn({
        let auth = Arc::clone(&auth);
        async move { auth.ensure_authenticated().await }
    });

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    // The second caller waits out the first login and re-probes instead of
    // starting its own attempt.
    assert_eq!(driver.attempts_made(), 1);
}
