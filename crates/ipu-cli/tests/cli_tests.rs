use ipu_cli::actors::TargetRepositories;
use ipu_cli::commands::{answer, execute, snapshot};
use ipu_cli::{exit_code_for, IpuConfig, RunArgs};
use ipu_engine::{
    Answerfile, ContextStore, ExecutionKind, ExecutionState, FileContextStore, RunOutcome,
};
use ipu_model::Model;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::fs;
use tempfile::TempDir;

const RHEL_8_10: &str = "NAME=\"Red Hat Enterprise Linux\"\nID=\"rhel\"\nVERSION_ID=\"8.10\"\n";

fn host(os_release: &str) -> (TempDir, IpuConfig) {
    let dir = tempfile::tempdir().unwrap();
    let release = dir.path().join("os-release");
    fs::write(&release, os_release).unwrap();
    let config = IpuConfig {
        store_dir: dir.path().join("store"),
        log_dir: dir.path().join("log"),
        answerfile: dir.path().join("answerfile.toml"),
        os_release: release,
        require_root: false,
        ..IpuConfig::default()
    };
    (dir, config)
}

fn no_env() -> BTreeMap<String, String> {
    BTreeMap::new()
}

#[tokio::test]
async fn preupgrade_stops_after_reports() {
    let (_dir, config) = host(RHEL_8_10);
    let result = execute(
        ExecutionKind::Preupgrade,
        &RunArgs::default(),
        &config,
        &mut no_env(),
    )
    .await
    .unwrap();

    assert_eq!(
        result.outcome,
        RunOutcome::Stopped {
            phase: "Reports".into()
        }
    );
    assert_eq!(result.exit_code(), 0);
    let executed = result.executed_actors();
    for actor in [
        "ipu_workflow_config",
        "check_upgrade_path",
        "target_repositories",
        "report_summary",
    ] {
        assert!(executed.contains(&actor), "{actor} did not run");
    }
    assert!(result.inhibitors().is_empty());
}

#[tokio::test]
async fn unsupported_target_is_inhibited() {
    let (_dir, config) = host(RHEL_8_10);
    let args = RunArgs {
        target: Some("10.0".into()),
        ..RunArgs::default()
    };
    let result = execute(ExecutionKind::Preupgrade, &args, &config, &mut no_env())
        .await
        .unwrap();

    assert_eq!(
        result.outcome,
        RunOutcome::Inhibited {
            phase: "Checks".into(),
            inhibitors: 1
        }
    );
    assert_eq!(result.exit_code(), 1);
    let inhibitor = result.inhibitors()[0];
    assert_eq!(inhibitor.title, "Unsupported upgrade path");
    assert_eq!(inhibitor.remediation.as_deref(), Some("Choose one of: 9.4, 9.6"));
}

#[tokio::test]
async fn skipping_rhsm_without_repositories_inhibits_at_reports() {
    let (_dir, config) = host(RHEL_8_10);
    let args = RunArgs {
        no_rhsm: true,
        ..RunArgs::default()
    };
    let result = execute(ExecutionKind::Preupgrade, &args, &config, &mut no_env())
        .await
        .unwrap();

    assert!(matches!(
        result.outcome,
        RunOutcome::Inhibited { ref phase, .. } if phase == "Reports"
    ));
    let titles: Vec<_> = result.reports.iter().map(|r| r.title.as_str()).collect();
    assert!(titles.contains(&"Skipped using subscription-manager"));
    assert!(titles.contains(&"No target repositories"));
}

#[tokio::test]
async fn upgrade_suspends_and_resumes_until_completed() {
    let (_dir, config) = host(RHEL_8_10);
    let args = RunArgs {
        enable_repos: vec!["extras".into()],
        ..RunArgs::default()
    };

    let first = execute(ExecutionKind::Upgrade, &args, &config, &mut no_env())
        .await
        .unwrap();
    assert!(matches!(
        first.outcome,
        RunOutcome::AwaitingReboot { ref phase, .. } if phase == "InterimPreparation"
    ));
    assert_eq!(first.state, ExecutionState::AwaitingReboot);

    let store = FileContextStore::new(&config.store_dir);
    let journal = store.load_journal(&first.execution_id).unwrap();
    let repos = journal
        .messages
        .iter()
        .find(|m| m.is(&TargetRepositories::message_type()))
        .unwrap()
        .decode::<TargetRepositories>()
        .unwrap();
    assert_eq!(repos.repos, vec!["baseos-9", "appstream-9", "extras"]);

    let resume = RunArgs {
        resume: true,
        ..RunArgs::default()
    };
    let mut restored = no_env();
    let second = execute(ExecutionKind::Upgrade, &resume, &config, &mut restored)
        .await
        .unwrap();
    assert_eq!(second.execution_id, first.execution_id);
    assert!(matches!(
        second.outcome,
        RunOutcome::AwaitingReboot { ref phase, .. } if phase == "Finalization"
    ));
    assert_eq!(restored.get("IPU_TARGET_VERSION").map(String::as_str), Some("9.6"));
    assert_eq!(restored.get("IPU_ENABLE_REPOS").map(String::as_str), Some("extras"));

    let third = execute(ExecutionKind::Upgrade, &resume, &config, &mut no_env())
        .await
        .unwrap();
    assert_eq!(third.outcome, RunOutcome::Completed);
    assert_eq!(third.state, ExecutionState::Completed);
}

#[tokio::test]
async fn inhibited_preupgrade_resumes_from_checks() {
    let (_dir, config) = host(RHEL_8_10);
    let args = RunArgs {
        target: Some("10.0".into()),
        ..RunArgs::default()
    };
    let first = execute(ExecutionKind::Preupgrade, &args, &config, &mut no_env())
        .await
        .unwrap();
    assert_eq!(first.state, ExecutionState::Failed);

    let resume = RunArgs {
        resume: true,
        ..RunArgs::default()
    };
    let mut restored = no_env();
    let second = execute(ExecutionKind::Preupgrade, &resume, &config, &mut restored)
        .await
        .unwrap();
    assert_eq!(second.execution_id, first.execution_id);
    assert_eq!(second.kind, ExecutionKind::Preupgrade);
    assert_eq!(
        second.outcome,
        RunOutcome::Inhibited {
            phase: "Checks".into(),
            inhibitors: 1
        }
    );
    assert_eq!(restored.get("IPU_TARGET_VERSION").map(String::as_str), Some("10.0"));
    let executed = second.executed_actors();
    assert!(executed.contains(&"check_upgrade_path"));
    assert!(!executed.contains(&"ipu_workflow_config"));
}

#[tokio::test]
async fn resume_without_previous_run_is_a_command_error() {
    let (_dir, config) = host(RHEL_8_10);
    let args = RunArgs {
        resume: true,
        ..RunArgs::default()
    };
    let err = execute(ExecutionKind::Upgrade, &args, &config, &mut no_env())
        .await
        .unwrap_err();
    assert_eq!(exit_code_for(&err), 2);
    assert!(err.to_string().contains("no previous run to resume"));
}

#[tokio::test]
async fn missing_os_release_is_a_command_error() {
    let (_dir, mut config) = host(RHEL_8_10);
    config.os_release = config.store_dir.join("absent");
    let err = execute(
        ExecutionKind::Preupgrade,
        &RunArgs::default(),
        &config,
        &mut no_env(),
    )
    .await
    .unwrap_err();
    assert_eq!(exit_code_for(&err), 2);
}

#[test]
fn snapshot_prefers_flag_over_environment() {
    let (_dir, config) = host(RHEL_8_10);
    let vars = || {
        vec![
            ("IPU_TARGET_VERSION".to_string(), "9.4".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ]
    };

    let from_env = snapshot(&RunArgs::default(), &config, vars()).unwrap();
    assert_eq!(from_env.source_version, "8.10");
    assert_eq!(from_env.target_version, "9.4");
    assert!(!from_env.env.contains_key("PATH"));

    let args = RunArgs {
        target: Some("9.6".into()),
        no_rhsm: true,
        ..RunArgs::default()
    };
    let from_flag = snapshot(&args, &config, vars()).unwrap();
    assert_eq!(from_flag.target_version, "9.6");
    assert_eq!(from_flag.env.get("IPU_TARGET_VERSION").map(String::as_str), Some("9.6"));
    assert_eq!(from_flag.env.get("IPU_NO_RHSM").map(String::as_str), Some("1"));
    assert!(from_flag.flags.no_rhsm);
}

#[test]
fn answers_are_recorded() {
    let (_dir, config) = host(RHEL_8_10);
    answer(
        &config,
        &[
            "remove_pam_pkcs11.confirm=true".to_string(),
            "authselect_check.confirm=false".to_string(),
        ],
    )
    .unwrap();

    let answers = Answerfile::load(&config.answerfile).unwrap();
    assert_eq!(
        answers.get("remove_pam_pkcs11", "confirm"),
        Some(&toml::Value::Boolean(true))
    );
    assert_eq!(
        answers.get("authselect_check", "confirm"),
        Some(&toml::Value::Boolean(false))
    );

    let err = answer(&config, &["missing-equals".to_string()]).unwrap_err();
    assert_eq!(exit_code_for(&anyhow::Error::from(err)), 2);
}
