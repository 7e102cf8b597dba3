//! Health check support for the mod host.
//!
//! Combines the orchestrator's switch state with a host snapshot into a
//! liveness, readiness and full health report.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::host::HostSnapshot;
use crate::patch::{PatchIdentity, SwitchState};

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Detailed health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub ready: bool,
    pub patch: String,
    pub switching: bool,
    /// Error of the last failed switch while the host is degraded.
    pub switch_error: Option<String>,
    pub mods_installed: usize,
    pub mods_loaded: usize,
    pub mods_failed: usize,
    pub mods_excluded: usize,
    pub sessions: usize,
    pub dispatches: usize,
    pub uptime_secs: u64,
}

/// Health check configuration.
#[derive(Debug, Clone, Default)]
pub struct HealthConfig {
    /// Report not ready while no mod is loaded.
    pub require_mods_loaded: bool,
    /// Report degraded when a mod was excluded by dependency resolution.
    pub exclusions_degrade: bool,
}

/// Aggregates health information from the orchestrator and host.
pub struct HealthChecker {
    config: HealthConfig,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
        }
    }

    /// Check liveness: process is responsive.
    pub fn is_alive(&self) -> bool {
        true
    }

    /// Check readiness: mods are settled on a resource set.
    pub fn is_ready(&self, switch: &SwitchState, host: &HostSnapshot) -> bool {
        if *switch != SwitchState::Stable {
            return false;
        }
        !(self.config.require_mods_loaded && host.loaded == 0)
    }

    /// Generate full health report.
    pub fn report(
        &self,
        patch: &PatchIdentity,
        switch: &SwitchState,
        host: &HostSnapshot,
    ) -> HealthReport {
        let switch_error = match switch {
            SwitchState::Degraded { error } => Some(error.clone()),
            _ => None,
        };

        HealthReport {
            state: self.compute_state(switch, host),
            ready: self.is_ready(switch, host),
            patch: patch.to_string(),
            switching: matches!(switch, SwitchState::Switching { .. }),
            switch_error,
            mods_installed: host.installed,
            mods_loaded: host.loaded,
            mods_failed: host.failed,
            mods_excluded: host.excluded,
            sessions: host.sessions,
            dispatches: host.dispatches,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    fn compute_state(&self, switch: &SwitchState, host: &HostSnapshot) -> HealthState {
        match switch {
            SwitchState::Degraded { .. } => return HealthState::Unhealthy,
            SwitchState::Switching { .. } => return HealthState::Degraded,
            SwitchState::Stable => {}
        }
        if host.failed > 0 {
            return HealthState::Degraded;
        }
        if self.config.exclusions_degrade && host.excluded > 0 {
            return HealthState::Degraded;
        }
        if self.config.require_mods_loaded && host.loaded == 0 {
            return HealthState::Degraded;
        }
        HealthState::Healthy
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}
