//! Built-in actors
//!
//! The minimal set every installation ships: facts about the requested
//! upgrade, sanity checks that can inhibit it, the target repository list
//! and a report summary.

use crate::config::IpuConfig;
use crate::workflow::{tags, WORKFLOW_TAG};
use async_trait::async_trait;
use ipu_engine::{Actor, ActorContext, ActorDescriptor, ActorRegistry, ActorStop};
use ipu_model::{Field, FieldKind, Group, Model, ModelRegistry, Report, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Architectures the upgrade supports
pub const SUPPORTED_ARCHITECTURES: &[&str] = &["x86_64", "aarch64", "ppc64le", "s390x"];

/// The upgrade as requested, resolved against flags and environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpuConfigFacts {
    /// Installed version
    pub source_version: String,
    /// Requested target version
    pub target_version: String,
    /// Machine architecture
    pub architecture: String,
    /// subscription-manager is not used
    pub skip_rhsm: bool,
    /// Additional target repositories
    pub enable_repos: Vec<String>,
}

impl Model for IpuConfigFacts {
    const NAME: &'static str = "IPUConfig";
    const TOPIC: &'static str = "SystemInfoTopic";

    fn fields() -> Vec<Field> {
        vec![
            Field::required("source_version", FieldKind::String),
            Field::required("target_version", FieldKind::String),
            Field::required("architecture", FieldKind::String),
            Field::required("skip_rhsm", FieldKind::Boolean),
            Field::required("enable_repos", FieldKind::List),
        ]
    }
}

/// Repositories the target transaction will use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRepositories {
    /// Repository ids
    pub repos: Vec<String>,
}

impl Model for TargetRepositories {
    const NAME: &'static str = "TargetRepositories";
    const TOPIC: &'static str = "TransactionTopic";

    fn fields() -> Vec<Field> {
        vec![Field::required("repos", FieldKind::List)]
    }
}

fn is_set(value: Option<&str>) -> bool {
    matches!(value, Some("1" | "true" | "yes"))
}

fn required_facts(ctx: &ActorContext<'_>) -> Result<IpuConfigFacts, ActorStop> {
    ctx.consume_one::<IpuConfigFacts>()?
        .ok_or_else(|| ActorStop::recoverable("no IPUConfig message on the bus"))
}

struct WorkflowConfig;

#[async_trait]
impl Actor for WorkflowConfig {
    async fn process(&self, ctx: &mut ActorContext<'_>) -> Result<(), ActorStop> {
        let config = ctx.configuration();
        let target_version = ctx
            .env("IPU_TARGET_VERSION")
            .map_or_else(|| config.target_version.clone(), str::to_string);
        let mut enable_repos = config.flags.enable_repos.clone();
        if let Some(extra) = ctx.env("IPU_ENABLE_REPOS") {
            for repo in extra.split(',').map(str::trim).filter(|r| !r.is_empty()) {
                if !enable_repos.iter().any(|r| r == repo) {
                    enable_repos.push(repo.to_string());
                }
            }
        }

        let facts = IpuConfigFacts {
            source_version: config.source_version.clone(),
            target_version,
            architecture: config.architecture.clone(),
            skip_rhsm: config.flags.no_rhsm || is_set(ctx.env("IPU_NO_RHSM")),
            enable_repos,
        };
        tracing::debug!(?facts, "resolved upgrade configuration");
        ctx.produce(&facts)?;
        Ok(())
    }
}

struct CheckArchitecture;

#[async_trait]
impl Actor for CheckArchitecture {
    async fn process(&self, ctx: &mut ActorContext<'_>) -> Result<(), ActorStop> {
        let facts = required_facts(ctx)?;
        if SUPPORTED_ARCHITECTURES.contains(&facts.architecture.as_str()) {
            return Ok(());
        }
        ctx.report(
            &Report::inhibitor(
                "Unsupported architecture",
                format!(
                    "The upgrade is not supported on {} machines",
                    facts.architecture
                ),
            )
            .with_group(Group::Sanity)
            .with_key("check_architecture.unsupported"),
        )?;
        Ok(())
    }
}

struct CheckUpgradePath {
    upgrade_paths: BTreeMap<String, Vec<String>>,
}

#[async_trait]
impl Actor for CheckUpgradePath {
    async fn process(&self, ctx: &mut ActorContext<'_>) -> Result<(), ActorStop> {
        let facts = required_facts(ctx)?;
        let supported = self
            .upgrade_paths
            .get(&facts.source_version)
            .cloned()
            .unwrap_or_default();
        if supported.contains(&facts.target_version) {
            return Ok(());
        }

        let remediation = if supported.is_empty() {
            format!(
                "Version {} cannot be upgraded in place",
                facts.source_version
            )
        } else {
            format!("Choose one of: {}", supported.join(", "))
        };
        ctx.report(
            &Report::inhibitor(
                "Unsupported upgrade path",
                format!(
                    "Upgrade from {} to {} is not supported",
                    facts.source_version, facts.target_version
                ),
            )
            .with_group(Group::Sanity)
            .with_remediation(remediation)
            .with_key("check_upgrade_path.unsupported"),
        )?;
        Ok(())
    }
}

struct CheckSkipRhsm;

#[async_trait]
impl Actor for CheckSkipRhsm {
    async fn process(&self, ctx: &mut ActorContext<'_>) -> Result<(), ActorStop> {
        let facts = required_facts(ctx)?;
        if !facts.skip_rhsm {
            return Err(ActorStop::recoverable("subscription-manager is in use"));
        }
        ctx.report(
            &Report::new(
                "Skipped using subscription-manager",
                "Target repositories must be provided by the operator",
            )
            .with_severity(Severity::Low)
            .with_group(Group::Repository)
            .with_key("check_skip_rhsm.skipped"),
        )?;
        Ok(())
    }
}

struct TargetRepositoriesResolver;

#[async_trait]
impl Actor for TargetRepositoriesResolver {
    async fn process(&self, ctx: &mut ActorContext<'_>) -> Result<(), ActorStop> {
        let facts = required_facts(ctx)?;
        let major = facts
            .target_version
            .split('.')
            .next()
            .unwrap_or(&facts.target_version);

        let mut repos = Vec::new();
        if !facts.skip_rhsm {
            repos.push(format!("baseos-{major}"));
            repos.push(format!("appstream-{major}"));
        }
        repos.extend(facts.enable_repos.iter().cloned());
        if repos.is_empty() {
            ctx.report(
                &Report::inhibitor(
                    "No target repositories",
                    "subscription-manager is skipped and no repository was enabled",
                )
                .with_group(Group::Repository)
                .with_remediation("Pass --enablerepo for every target repository")
                .with_key("target_repositories.empty"),
            )?;
            return Ok(());
        }
        ctx.produce(&TargetRepositories { repos })?;
        Ok(())
    }
}

struct ReportSummary;

#[async_trait]
impl Actor for ReportSummary {
    async fn process(&self, ctx: &mut ActorContext<'_>) -> Result<(), ActorStop> {
        let mut inhibitors = 0_usize;
        let mut total = 0_usize;
        for report in ctx.consume::<Report>()? {
            let report = report?;
            total += 1;
            if report.is_inhibitor() {
                inhibitors += 1;
            }
        }
        tracing::info!(total, inhibitors, "report summary");
        Ok(())
    }
}

fn descriptor(name: &str, phase_tag: &str) -> ipu_engine::ActorDescriptorBuilder {
    ActorDescriptor::builder(name).tag(WORKFLOW_TAG).tag(phase_tag)
}

/// Models used by the built-in actors
///
/// # Errors
/// Only if a model name clashes with a built-in.
pub fn models() -> Result<ModelRegistry, ipu_model::ModelError> {
    let mut models = ModelRegistry::with_builtins();
    models.register::<IpuConfigFacts>()?;
    models.register::<TargetRepositories>()?;
    Ok(models)
}

/// Registry with every built-in actor
///
/// # Errors
/// Model or actor registration failures.
pub fn builtin_registry(config: &IpuConfig) -> anyhow::Result<ActorRegistry> {
    let mut registry = ActorRegistry::new(models()?);
    registry.register_all([
        descriptor("ipu_workflow_config", tags::FACTS)
            .description("Resolve the requested upgrade from configuration and environment")
            .produces::<IpuConfigFacts>()
            .build(WorkflowConfig),
        descriptor("check_architecture", tags::CHECKS)
            .description("Inhibit the upgrade on unsupported architectures")
            .consumes::<IpuConfigFacts>()
            .produces::<Report>()
            .build(CheckArchitecture),
        descriptor("check_upgrade_path", tags::CHECKS)
            .description("Inhibit unsupported source and target combinations")
            .consumes::<IpuConfigFacts>()
            .produces::<Report>()
            .build(CheckUpgradePath {
                upgrade_paths: config.upgrade_paths.clone(),
            }),
        descriptor("check_skip_rhsm", tags::CHECKS)
            .description("Report that subscription-manager is skipped")
            .consumes::<IpuConfigFacts>()
            .produces::<Report>()
            .build(CheckSkipRhsm),
        descriptor("target_repositories", tags::TARGET_FACTS)
            .description("Collect the repositories of the target transaction")
            .consumes::<IpuConfigFacts>()
            .produces::<TargetRepositories>()
            .produces::<Report>()
            .build(TargetRepositoriesResolver),
        descriptor("report_summary", tags::REPORTS)
            .description("Log a summary of the collected reports")
            .consumes::<Report>()
            .build(ReportSummary),
    ])?;
    Ok(registry)
}
