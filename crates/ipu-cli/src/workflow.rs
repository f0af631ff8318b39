//! The in-place upgrade workflow

use ipu_engine::{ErrorPolicy, Phase, RetryPolicy, Workflow, WorkflowError};

/// Workflow name recorded in execution contexts
pub const WORKFLOW_NAME: &str = "IPUWorkflow";
/// Tag every built-in actor carries
pub const WORKFLOW_TAG: &str = "IPUWorkflowTag";
/// Last phase of a `preupgrade` run
pub const PREUPGRADE_LAST_PHASE: &str = "Reports";

/// Phase tags
#[allow(missing_docs)]
pub mod tags {
    pub const FACTS: &str = "FactsPhaseTag";
    pub const CHECKS: &str = "ChecksPhaseTag";
    pub const TARGET_FACTS: &str = "TargetTransactionFactsPhaseTag";
    pub const REPORTS: &str = "ReportsPhaseTag";
    pub const DOWNLOAD: &str = "DownloadPhaseTag";
    pub const INTERIM_PREPARATION: &str = "InterimPreparationPhaseTag";
    pub const RPM_UPGRADE: &str = "RPMUpgradePhaseTag";
    pub const FINALIZATION: &str = "FinalizationPhaseTag";
    pub const FIRST_BOOT: &str = "FirstBootPhaseTag";
}

/// Build the workflow
///
/// Everything up to `Reports` is analysis; inhibitors stop the run after
/// `Checks` and again after `Reports`. `Download` may be retried;
/// from `InterimPreparation` on the system is being changed and a failed
/// phase cannot be resumed.
///
/// # Errors
/// Never in practice; the phase list is static.
pub fn inplace_upgrade() -> Result<Workflow, WorkflowError> {
    Workflow::builder(WORKFLOW_NAME, WORKFLOW_TAG)
        .phase(Phase::new("FactsCollection", tags::FACTS))
        .phase(Phase::new("Checks", tags::CHECKS).stop_if_inhibited())
        .phase(Phase::new("TargetTransactionFactsCollection", tags::TARGET_FACTS))
        .phase(
            Phase::new("Reports", tags::REPORTS)
                .with_error_policy(ErrorPolicy::ReportOnly)
                .stop_if_inhibited(),
        )
        .phase(Phase::new("Download", tags::DOWNLOAD))
        .phase(
            Phase::new("InterimPreparation", tags::INTERIM_PREPARATION)
                .with_retry_policy(RetryPolicy::Disabled)
                .restart(),
        )
        .phase(
            Phase::new("RPMUpgrade", tags::RPM_UPGRADE).with_retry_policy(RetryPolicy::Disabled),
        )
        .phase(
            Phase::new("Finalization", tags::FINALIZATION)
                .with_retry_policy(RetryPolicy::Disabled)
                .request_restart(),
        )
        .phase(Phase::new("FirstBoot", tags::FIRST_BOOT))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preupgrade_stops_before_changes() {
        let workflow = inplace_upgrade().unwrap();
        let reports = workflow.position(PREUPGRADE_LAST_PHASE).unwrap();
        let first_change = workflow.position("InterimPreparation").unwrap();
        assert!(reports < first_change);
        assert!(workflow.phases()[..=reports]
            .iter()
            .all(|p| p.retry_policy() == RetryPolicy::RetryPhase));
    }

    #[test]
    fn test_reboot_phases() {
        let workflow = inplace_upgrade().unwrap();
        let rebooting: Vec<_> = workflow
            .phases()
            .iter()
            .filter(|p| p.flags().wants_reboot())
            .map(Phase::name)
            .collect();
        assert_eq!(rebooting, vec!["InterimPreparation", "Finalization"]);
    }
}
