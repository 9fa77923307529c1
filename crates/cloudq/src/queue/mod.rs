//! Queue profiles: the policy containers that jobs are admitted against.

pub mod admission;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Set;
use crate::capacity::{CapacityClass, capacity_class};
use crate::common::error::{ErrorCode, ValidationError};
use crate::job::JobParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueMode {
    #[default]
    Fifo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScalingMode {
    /// Capacity is provisioned for exactly one job and torn down with it.
    SingleJob,
    /// Capacity is shared by a batch of jobs and drained when idle.
    Batch,
}

/// Externally-driven lifecycle of a queue profile. Transitions are applied
/// from provisioning outcomes by the state tracker; the policy engine only
/// evaluates admissibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueStatus {
    #[default]
    Idle,
    Active,
    Blocked,
}

/// ACLs and limits of a queue profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueManagementParams {
    pub allowed_instance_types: Set<String>,
    pub excluded_instance_types: Set<String>,
    /// Job parameter names the submitter may not override from the profile
    /// default.
    pub restricted_parameters: Set<String>,
    pub allowed_security_groups: Set<String>,
    pub allowed_instance_profiles: Set<String>,
    /// 0 = unlimited.
    pub max_running_jobs: u32,
    /// 0 = unlimited.
    pub max_provisioned_instances: u32,
    pub wait_on_any_job_with_license: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueProfile {
    /// Immutable key.
    pub name: String,
    pub title: String,
    pub queues: Set<String>,
    pub queue_mode: QueueMode,
    pub scaling_mode: ScalingMode,
    pub keep_forever: bool,
    /// Minutes of idleness before ephemeral capacity is terminated.
    pub terminate_when_idle: u32,
    pub default_job_params: JobParams,
    pub queue_management_params: QueueManagementParams,
    pub enabled: bool,
    pub status: QueueStatus,
    pub projects: Set<String>,
}

impl QueueProfile {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            title: name.clone(),
            name,
            queues: Set::new(),
            queue_mode: QueueMode::Fifo,
            scaling_mode: ScalingMode::Batch,
            keep_forever: false,
            terminate_when_idle: 0,
            default_job_params: JobParams::default(),
            queue_management_params: QueueManagementParams::default(),
            enabled: true,
            status: QueueStatus::Idle,
            projects: Set::new(),
        }
    }

    /// Single-job scaling tears capacity down with the job, so an idle
    /// timeout has nothing to apply to and is forced to 0.
    pub fn normalize(&mut self) {
        if self.scaling_mode == ScalingMode::SingleJob && self.terminate_when_idle != 0 {
            log::debug!(
                "Queue profile {}: forcing terminate_when_idle to 0 for single-job scaling",
                self.name
            );
            self.terminate_when_idle = 0;
        }
    }

    pub fn capacity_class(&self) -> CapacityClass {
        capacity_class(self.keep_forever, self.terminate_when_idle)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.terminate_when_idle > 0)
            .then(|| Duration::from_secs(self.terminate_when_idle as u64 * 60))
    }
}

/// Validates a queue profile for create/update. All problems are collected;
/// an empty result means the profile is acceptable.
pub fn validate_profile(profile: &QueueProfile) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let invalid = |message: String| ValidationError::new(ErrorCode::InvalidParams, message);

    if profile.name.trim().is_empty() {
        errors.push(invalid("queue profile name must not be empty".to_string()));
    }
    if profile.queues.is_empty() {
        errors.push(invalid(format!(
            "queue profile {} must manage at least one queue",
            profile.name
        )));
    }

    let params = &profile.default_job_params;
    if params.spot && params.spot_allocation_count > params.nodes {
        errors.push(invalid(format!(
            "spot allocation count {} exceeds node count {}",
            params.spot_allocation_count, params.nodes
        )));
    }
    if params.instance_types.is_empty() {
        errors.push(invalid(
            "default job parameters must name at least one instance type".to_string(),
        ));
    }

    let acl = &profile.queue_management_params;
    let mut conflicting: Vec<&String> = acl
        .allowed_instance_types
        .intersection(&acl.excluded_instance_types)
        .collect();
    conflicting.sort();
    if !conflicting.is_empty() {
        errors.push(ValidationError::new(
            ErrorCode::AclViolation,
            format!(
                "instance types both allowed and excluded: {}",
                conflicting.into_iter().cloned().collect::<Vec<_>>().join(", ")
            ),
        ));
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn profile() -> QueueProfile {
        let mut profile = QueueProfile::new("hpc");
        profile.queues.insert("hpc-main".to_string());
        profile.default_job_params.instance_types = smallvec!["c5.large".to_string()];
        profile
    }

    #[test]
    fn valid_profile_passes() {
        assert!(validate_profile(&profile()).is_empty());
    }

    #[test]
    fn validation_collects_all_errors() {
        let mut profile = QueueProfile::new(" ");
        profile.default_job_params.spot = true;
        profile.default_job_params.nodes = 1;
        profile.default_job_params.spot_allocation_count = 5;
        let errors = validate_profile(&profile);
        // empty name, no queues, spot count > nodes, no instance types
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().all(|e| e.code == ErrorCode::InvalidParams));
    }

    #[test]
    fn allowed_and_excluded_overlap_is_flagged() {
        let mut profile = profile();
        let acl = &mut profile.queue_management_params;
        acl.allowed_instance_types.insert("c5.large".to_string());
        acl.excluded_instance_types.insert("c5.large".to_string());
        let errors = validate_profile(&profile);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::AclViolation);
    }

    #[test]
    fn single_job_scaling_forces_zero_idle_timeout() {
        let mut profile = profile();
        profile.scaling_mode = ScalingMode::SingleJob;
        profile.terminate_when_idle = 30;
        profile.normalize();
        assert_eq!(profile.terminate_when_idle, 0);
        assert!(profile.idle_timeout().is_none());
    }

    #[test]
    fn keep_forever_profile_is_shared_capacity() {
        let mut profile = profile();
        profile.keep_forever = true;
        profile.terminate_when_idle = 60;
        assert_eq!(profile.capacity_class(), CapacityClass::Shared);
    }
}
