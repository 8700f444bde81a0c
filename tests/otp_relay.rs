use std::time::Duration;

use mfbridge::auth::{AuthError, OtpRelay};
use tempfile::TempDir;

fn fast_relay(dir: &TempDir) -> OtpRelay {
    OtpRelay::new(dir.path().join("otp-code.txt"))
        .with_poll_interval(Duration::from_millis(20))
}

#[tokio::test]
async fn deposited_code_is_returned_and_consumed() {
    let dir = TempDir::new().unwrap();
    let relay = fast_relay(&dir);
    let path = relay.path().to_path_buf();

    let waiter = tokio::spawn(async move {
        let dir_path = path;
        let relay = OtpRelay::new(&dir_path).with_poll_interval(Duration::from_millis(20));
        relay.await_code(Duration::from_secs(5)).await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    std::fs::write(dir.path().join("otp-code.txt"), "123456\n").unwrap();

    let code = waiter.await.unwrap().unwrap();
    assert_eq!(code, "123456");
    // Single consumption: the artifact is gone.
    assert!(!dir.path().join("otp-code.txt").exists());
}

#[tokio::test]
async fn missing_code_times_out_with_the_passcode_error_kind() {
    let dir = TempDir::new().unwrap();
    let relay = fast_relay(&dir);

    let err = relay
        .await_code(Duration::from_millis(150))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::PasscodeTimeout { .. }));
}

#[tokio::test]
async fn stale_artifact_is_discarded_before_the_wait() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("otp-code.txt");

    // Leftover code from a previous attempt must not be replayed.
    std::fs::write(&path, "000000").unwrap();

    let relay = fast_relay(&dir);
    let err = relay
        .await_code(Duration::from_millis(150))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::PasscodeTimeout { .. }));
    assert!(!path.exists());
}

#[tokio::test]
async fn fresh_deposit_after_stale_cleanup_is_served() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("otp-code.txt");
    std::fs::write(&path, "stale-code").unwrap();

    let write_path = path.clone();
    let waiter = tokio::spawn(async move {
        let relay = OtpRelay::new(&write_path).with_poll_interval(Duration::from_millis(20));
        relay.await_code(Duration::from_secs(5)).await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    std::fs::write(&path, "654321").unwrap();

    assert_eq!(waiter.await.unwrap().unwrap(), "654321");
}

#[tokio::test]
async fn empty_artifact_is_not_treated_as_a_code() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("otp-code.txt");

    let write_path = path.clone();
    let waiter = tokio::spawn(async move {
        let relay = OtpRelay::new(&write_path).with_poll_interval(Duration::from_millis(20));
        relay.await_code(Duration::from_millis(300)).await
    });

    // Whitespace-only content does not count; the wait keeps polling.
    std::fs::write(&path, "  \n").unwrap();

    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, AuthError::PasscodeTimeout { .. }));
}
