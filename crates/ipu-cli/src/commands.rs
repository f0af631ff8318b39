//! Subcommand execution

use crate::actors;
use crate::cli::RunArgs;
use crate::config::IpuConfig;
use crate::logging;
use crate::os_release::OsRelease;
use crate::workflow::{self, PREUPGRADE_LAST_PHASE};
use clap::ArgMatches;
use ipu_engine::{
    capture_env, AnswerfileError, Answerfile, CommandError, ConfigurationSnapshot,
    DispatchFilters, EngineError, EnvironmentSink, ExecutionKind, FileContextStore,
    ProcessEnvironment, RunFlags, RunOptions, RunOutcome, RunRequest, RunResult, WorkflowRunner,
};

/// Run the selected subcommand, returning the process exit code
///
/// # Errors
/// Any failure that prevented the run from producing a result.
pub async fn dispatch(matches: &ArgMatches) -> anyhow::Result<i32> {
    match matches.subcommand() {
        Some(("preupgrade", args)) => {
            run(ExecutionKind::Preupgrade, &RunArgs::from_matches(args)).await
        }
        Some(("upgrade", args)) => run(ExecutionKind::Upgrade, &RunArgs::from_matches(args)).await,
        Some(("answer", args)) => {
            let config = IpuConfig::load()?;
            let assignments: Vec<String> = args
                .get_many::<String>("section")
                .map(|values| values.cloned().collect())
                .unwrap_or_default();
            answer(&config, &assignments)?;
            println!("Recorded {} answer(s) in {}", assignments.len(), config.answerfile.display());
            Ok(0)
        }
        _ => Ok(2),
    }
}

/// Exit code for an error returned by [`dispatch`]
#[must_use]
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.downcast_ref::<EngineError>() {
        e.exit_code()
    } else if err.downcast_ref::<CommandError>().is_some() {
        2
    } else if let Some(e) = err.downcast_ref::<AnswerfileError>() {
        match e {
            AnswerfileError::Persistence(_) => 3,
            _ => 2,
        }
    } else {
        1
    }
}

async fn run(kind: ExecutionKind, args: &RunArgs) -> anyhow::Result<i32> {
    let config = IpuConfig::load()?;
    let _log_guard = logging::init(
        logging::console_level(args.debug, args.verbose),
        Some(&config.log_dir),
        kind,
    );
    if config.require_root {
        ensure_root()?;
    }

    let result = execute(kind, args, &config, &mut ProcessEnvironment).await?;
    print_result(&result);
    Ok(result.exit_code())
}

/// Run the workflow for `kind`
///
/// Fresh runs capture the configuration from the host; `--resume` picks up
/// the most recent run of the same kind. Answers recorded by actors are
/// written back to the answerfile.
///
/// # Errors
/// Configuration, registry, engine and answerfile failures.
pub async fn execute(
    kind: ExecutionKind,
    args: &RunArgs,
    config: &IpuConfig,
    env: &mut dyn EnvironmentSink,
) -> anyhow::Result<RunResult> {
    let workflow = workflow::inplace_upgrade()?;
    let registry = actors::builtin_registry(config)?;
    let store = FileContextStore::new(&config.store_dir);
    let mut answers = Answerfile::load(&config.answerfile)?;

    let request = if args.resume {
        RunRequest::Resume { kind, id: None }
    } else {
        RunRequest::Fresh {
            kind,
            configuration: snapshot(args, config, std::env::vars())?,
        }
    };
    let options = RunOptions {
        filters: DispatchFilters {
            whitelist_experimental: args.whitelist_experimental.iter().cloned().collect(),
            ..DispatchFilters::default()
        },
        until_phase: (kind == ExecutionKind::Preupgrade).then(|| PREUPGRADE_LAST_PHASE.to_string()),
    };

    let result = WorkflowRunner::new(&workflow, &registry, &store)
        .run(request, &options, &mut answers, env)
        .await?;
    answers.save(&config.answerfile)?;
    Ok(result)
}

/// Configuration of a fresh run
///
/// The target is `--target`, then `IPU_TARGET_VERSION`, then the configured
/// default for the installed version. Flags are recorded both as
/// [`RunFlags`] and as the `IPU_*` variables they imply.
///
/// # Errors
/// [`CommandError::Precondition`] when the installed version cannot be read
/// or no target can be chosen.
pub fn snapshot<I>(
    args: &RunArgs,
    config: &IpuConfig,
    vars: I,
) -> Result<ConfigurationSnapshot, CommandError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let release = OsRelease::load(&config.os_release)?;
    let mut env = capture_env(vars);
    env.extend(args.implied_env());

    let requested = args
        .target
        .as_deref()
        .or_else(|| env.get("IPU_TARGET_VERSION").map(String::as_str));
    let target = config.target_for(&release.version_id, requested)?;
    env.insert("IPU_TARGET_VERSION".to_string(), target.clone());

    let flags = RunFlags {
        no_rhsm: args.no_rhsm,
        debug: args.debug,
        verbose: args.verbose,
        enable_repos: args.enable_repos.clone(),
        whitelist_experimental: args.whitelist_experimental.clone(),
    };
    tracing::info!(
        source = %release.version_id,
        target = %target,
        os = %release.id,
        "starting from installed system"
    );
    Ok(
        ConfigurationSnapshot::new(release.version_id, target, std::env::consts::ARCH)
            .with_flags(flags)
            .with_env(env),
    )
}

/// Record answers given as `section.key=value`
///
/// # Errors
/// Malformed assignments or an unreadable/unwritable answerfile.
pub fn answer(config: &IpuConfig, assignments: &[String]) -> Result<(), AnswerfileError> {
    let mut answers = Answerfile::load(&config.answerfile)?;
    for assignment in assignments {
        answers.apply_assignment(assignment)?;
    }
    answers.save(&config.answerfile)
}

fn ensure_root() -> Result<(), CommandError> {
    match effective_uid() {
        Ok(0) => Ok(()),
        Ok(_) => Err(CommandError::Precondition(
            "root privileges are required".to_string(),
        )),
        Err(e) => Err(CommandError::Precondition(format!(
            "cannot determine effective user: {e}"
        ))),
    }
}

/// Owner of `/proc/self`, which is the effective uid of this process
fn effective_uid() -> std::io::Result<u32> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata("/proc/self").map(|meta| meta.uid())
}

fn print_result(result: &RunResult) {
    if !result.reports.is_empty() {
        println!("Reports:");
        for report in &result.reports {
            println!("  [{}] {}: {}", report.severity, report.title, report.summary);
            if let Some(remediation) = &report.remediation {
                println!("      remediation: {remediation}");
            }
        }
        println!();
    }

    println!("Execution {} ({}): {}", result.execution_id, result.kind, result.state);
    match &result.outcome {
        RunOutcome::AwaitingReboot { .. } => {
            println!("{}", result.outcome);
            println!("Reboot the system, then run `ipu upgrade --resume` to continue.");
        }
        RunOutcome::Failed {
            retryable: true, ..
        } => {
            println!("{}", result.outcome);
            println!("Fix the reported problem and run `ipu {} --resume`.", result.kind);
        }
        RunOutcome::Inhibited { .. } => {
            println!("{}", result.outcome);
            println!("Resolve the inhibitors above and run the command again.");
        }
        outcome => println!("{outcome}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_uid_matches_process_owner() {
        use std::os::unix::fs::MetadataExt;
        let dir = tempfile::tempdir().unwrap();
        let created = dir.path().join("owned");
        std::fs::write(&created, b"").unwrap();
        let owner = std::fs::metadata(&created).unwrap().uid();
        assert_eq!(effective_uid().unwrap(), owner);
    }
}
