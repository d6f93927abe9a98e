//! Rollback policy and outcome recording, exercised through the mock
//! transactioner

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use atomos_errors::{DeploymentError, Error};
use atomos_install::Installer;
use atomos_transaction::mock::{MockTransactioner, Phase};
use atomos_types::{Deployment, OsSource};

// Target locks are process-wide, so each test installs against its own
// device.
fn deployment(device: &str) -> Deployment {
    let mut d = Deployment::default_layout(OsSource::tar("/srv/os.tar.gz"));
    d.disks[0].device = PathBuf::from(device);
    d
}

fn deployment_with_hook(device: &str) -> Deployment {
    let mut d = deployment(device);
    d.cfg_script = Some(PathBuf::from("/usr/bin/setup.sh"));
    d
}

fn installer(mock: &MockTransactioner) -> Installer {
    Installer::new(Box::new(mock.clone()))
}

#[tokio::test]
async fn successful_install_runs_phases_in_order() {
    let mock = MockTransactioner::new();
    let mut installer = installer(&mock);
    let mut d = deployment_with_hook("/dev/test-order");

    let outcome = installer
        .install(&CancellationToken::new(), &mut d)
        .await
        .unwrap();

    assert_eq!(outcome.transaction_id, 1);
    assert_eq!(
        mock.calls(),
        vec![
            Phase::Init,
            Phase::Start,
            Phase::Update,
            Phase::Hook,
            Phase::Commit
        ]
    );
    assert!(!mock.rollback_called());
}

#[tokio::test]
async fn digest_is_recorded_on_the_deployment_source() {
    let mock = MockTransactioner::new();
    let mut installer = installer(&mock);
    let mut d = deployment("/dev/test-digest");

    let outcome = installer
        .install(&CancellationToken::new(), &mut d)
        .await
        .unwrap();

    assert_eq!(outcome.digest, Some(mock.digest()));
    assert_eq!(d.source_os.digest(), Some(&mock.digest()));
}

#[tokio::test]
async fn hook_is_skipped_without_cfg_script() {
    let mock = MockTransactioner::new();
    let mut installer = installer(&mock);
    let mut d = deployment("/dev/test-nohook");

    installer
        .install(&CancellationToken::new(), &mut d)
        .await
        .unwrap();

    assert!(!mock.calls().contains(&Phase::Hook));
}

#[tokio::test]
async fn init_failure_is_not_rolled_back() {
    let mock = MockTransactioner::new();
    mock.fail_on(Phase::Init, "slot budget exhausted");
    let mut installer = installer(&mock);
    let mut d = deployment("/dev/test-init-fail");

    let err = installer
        .install(&CancellationToken::new(), &mut d)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("slot budget exhausted"));
    assert!(!mock.rollback_called());
    assert!(d.source_os.digest().is_none());
}

#[tokio::test]
async fn start_failure_is_not_rolled_back() {
    let mock = MockTransactioner::new();
    mock.fail_on(Phase::Start, "mkdir refused");
    let mut installer = installer(&mock);
    let mut d = deployment("/dev/test-start-fail");

    let err = installer
        .install(&CancellationToken::new(), &mut d)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("mkdir refused"));
    assert!(!mock.rollback_called());
}

#[tokio::test]
async fn update_failure_rolls_back_exactly_once() {
    let mock = MockTransactioner::new();
    mock.fail_on(Phase::Update, "source unreadable");
    let mut installer = installer(&mock);
    let mut d = deployment("/dev/test-update-fail");

    let err = installer
        .install(&CancellationToken::new(), &mut d)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("source unreadable"));
    assert_eq!(mock.rollback_calls(), 1);
    assert!(!mock.calls().contains(&Phase::Commit));
    assert!(d.source_os.digest().is_none());
}

#[tokio::test]
async fn hook_failure_rolls_back() {
    let mock = MockTransactioner::new();
    mock.fail_on(Phase::Hook, "script exited 1");
    let mut installer = installer(&mock);
    let mut d = deployment_with_hook("/dev/test-hook-fail");

    let err = installer
        .install(&CancellationToken::new(), &mut d)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("script exited 1"));
    assert_eq!(mock.rollback_calls(), 1);
    assert!(!mock.calls().contains(&Phase::Commit));
}

#[tokio::test]
async fn commit_failure_rolls_back() {
    let mock = MockTransactioner::new();
    mock.fail_on(Phase::Commit, "rename failed");
    let mut installer = installer(&mock);
    let mut d = deployment("/dev/test-commit-fail");

    let err = installer
        .install(&CancellationToken::new(), &mut d)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("rename failed"));
    assert_eq!(mock.rollback_calls(), 1);
}

#[tokio::test]
async fn rollback_failure_never_masks_the_phase_error() {
    let mock = MockTransactioner::new();
    mock.fail_on(Phase::Update, "source unreadable");
    mock.fail_on(Phase::Rollback, "cleanup refused");
    let mut installer = installer(&mock);
    let mut d = deployment("/dev/test-rollback-fail");

    let err = installer
        .install(&CancellationToken::new(), &mut d)
        .await
        .unwrap_err();

    // The caller sees the update failure, not the rollback failure.
    assert!(err.to_string().contains("source unreadable"));
}

#[tokio::test]
async fn cancellation_mid_transaction_rolls_back() {
    let mock = MockTransactioner::new();
    let mut installer = installer(&mock);
    let mut d = deployment_with_hook("/dev/test-cancel");

    // The mock ignores the token, so the first enforced boundary is the
    // one between update and the hook.
    let token = CancellationToken::new();
    token.cancel();

    let err = installer.install(&token, &mut d).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(mock.rollback_calls(), 1);
    assert!(!mock.calls().contains(&Phase::Commit));
}

#[tokio::test]
async fn invalid_deployment_fails_before_any_phase() {
    let mock = MockTransactioner::new();
    let mut installer = installer(&mock);
    // No device filled in
    let mut d = Deployment::default_layout(OsSource::tar("/srv/os.tar.gz"));

    let err = installer
        .install(&CancellationToken::new(), &mut d)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("device"));
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn concurrent_install_against_same_target_is_refused() {
    let first = MockTransactioner::new();
    let gate = Arc::new(Semaphore::new(0));
    first.gate_update(gate.clone());

    let mut blocked_installer = installer(&first);
    let handle = tokio::spawn(async move {
        let mut d = deployment("/dev/test-busy");
        blocked_installer
            .install(&CancellationToken::new(), &mut d)
            .await
    });

    // Wait until the first install holds the target and is parked in
    // update.
    while !first.calls().contains(&Phase::Update) {
        tokio::task::yield_now().await;
    }

    let second = MockTransactioner::new();
    let mut other_installer = installer(&second);
    let mut d = deployment("/dev/test-busy");
    let err = other_installer
        .install(&CancellationToken::new(), &mut d)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Deployment(DeploymentError::TargetBusy { .. })
    ));
    assert!(second.calls().is_empty());

    gate.add_permits(1);
    handle.await.unwrap().unwrap();
}
