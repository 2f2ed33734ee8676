//! Update Run State Machine
//!
//! Stages of a single update or downgrade run. A run is never persisted:
//! it advances once from `Idle` to `Installed`, or stops at a failure or
//! a terminal selection outcome.

use serde::Serialize;
use std::fmt;
use tracing::info;

use super::error::{EXIT_NO_UPDATES, EXIT_SUCCESS};
use super::model::{Domain, UpdateMode};
use super::version::FirmwareVersion;

/// Stage reached by a run, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Idle,
    MetadataRefreshed,
    CandidatesBuilt,
    Selected,
    Downloaded,
    AuthenticityChecked,
    Transferred,
    Installed,
}

impl RunStage {
    /// Work performed to enter this stage.
    pub fn activity(&self) -> &'static str {
        match self {
            Self::Idle => "startup",
            Self::MetadataRefreshed => "metadata refresh",
            Self::CandidatesBuilt => "device enumeration",
            Self::Selected => "selection",
            Self::Downloaded => "download",
            Self::AuthenticityChecked => "authenticity check",
            Self::Transferred => "transfer",
            Self::Installed => "install",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.activity())
    }
}

/// Progress marker threaded through one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    pub mode: UpdateMode,
    pub stage: RunStage,
    /// Stages entered so far, `Idle` excluded
    pub trail: Vec<RunStage>,
}

impl RunState {
    pub fn start(mode: UpdateMode) -> Self {
        Self {
            mode,
            stage: RunStage::Idle,
            trail: Vec::new(),
        }
    }

    /// Move to a later stage. Stages may be skipped but never revisited.
    pub fn advance(mut self, next: RunStage) -> Self {
        debug_assert!(next > self.stage, "{:?} -> {:?}", self.stage, next);
        info!(mode = ?self.mode, from = ?self.stage, to = ?next, "run stage");
        self.stage = next;
        self.trail.push(next);
        self
    }
}

/// What a completed install changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallReport {
    pub domain: Domain,
    pub device: String,
    pub mode: UpdateMode,
    pub previous_version: Option<FirmwareVersion>,
    pub installed_version: FirmwareVersion,
    pub stages: Vec<RunStage>,
}

/// Terminal result of a run that did not fail.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Installed(InstallReport),
    /// No eligible release in any active domain
    NoCandidates,
    /// The operator declined to choose
    Abandoned,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Installed(_) => EXIT_SUCCESS,
            Self::NoCandidates | Self::Abandoned => EXIT_NO_UPDATES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        let state = RunState::start(UpdateMode::Update);
        assert_eq!(state.stage, RunStage::Idle);

        let state = state
            .advance(RunStage::MetadataRefreshed)
            .advance(RunStage::CandidatesBuilt)
            .advance(RunStage::Selected)
            .advance(RunStage::Downloaded)
            .advance(RunStage::Installed);
        assert_eq!(state.stage, RunStage::Installed);
        assert_eq!(state.mode, UpdateMode::Update);
        assert_eq!(state.trail.len(), 5);
        assert_eq!(state.trail.last(), Some(&RunStage::Installed));
    }

    #[test]
    #[should_panic]
    #[cfg(debug_assertions)]
    fn test_stage_cannot_go_back() {
        RunState::start(UpdateMode::Downgrade)
            .advance(RunStage::Selected)
            .advance(RunStage::CandidatesBuilt);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunOutcome::NoCandidates.exit_code(), 99);
        assert_eq!(RunOutcome::Abandoned.exit_code(), 99);
        let report = InstallReport {
            domain: Domain::AdminVm,
            device: "ColorHug2".to_string(),
            mode: UpdateMode::Update,
            previous_version: FirmwareVersion::parse("2.0.6").ok(),
            installed_version: FirmwareVersion::parse("2.0.7").unwrap(),
            stages: vec![RunStage::Installed],
        };
        assert_eq!(RunOutcome::Installed(report).exit_code(), 0);
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(RunOutcome::Abandoned).unwrap();
        assert_eq!(json, serde_json::json!({"outcome": "abandoned"}));
    }
}
