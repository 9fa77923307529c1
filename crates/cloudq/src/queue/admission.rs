//! Admission: checking a job request against a queue profile's policy before
//! provisioning.
//!
//! Admission only evaluates; it never executes provisioning. Violations of
//! one stage are collected completely before the request is rejected, so a
//! submitter fixing their request sees every problem at once rather than one
//! per attempt.

use crate::common::error::{ErrorCode, ValidationError};
use crate::job::{JobParams, SubmittedJobParams};
use crate::queue::QueueProfile;

/// Point-in-time usage counts of a queue profile's queues. The counts may be
/// maintained by a separate process; admission against them is advisory and
/// is re-checked at actual provisioning time.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueUsage {
    pub running_jobs: u32,
    pub provisioned_instances: u32,
}

/// A job request as seen by admission.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionRequest<'a> {
    pub params: &'a SubmittedJobParams,
    pub security_group: Option<&'a str>,
    pub instance_profile: Option<&'a str>,
}

/// Evaluates an incoming job request against a queue profile.
///
/// On success the fully merged job parameters are returned; on rejection the
/// complete violation list of the failing stage. Partial merges never escape.
pub fn admit(
    profile: &QueueProfile,
    request: AdmissionRequest,
    usage: &QueueUsage,
) -> Result<JobParams, Vec<ValidationError>> {
    if !profile.enabled {
        return Err(vec![ValidationError::new(
            ErrorCode::AclViolation,
            format!("queue profile {} is disabled", profile.name),
        )]);
    }

    let violations = check_acls(profile, &request);
    if !violations.is_empty() {
        return Err(violations);
    }

    let merged = request.params.merge_into(&profile.default_job_params);

    let violations = check_merged_params(&merged);
    if !violations.is_empty() {
        return Err(violations);
    }

    let violations = check_quotas(profile, &merged, usage);
    if !violations.is_empty() {
        return Err(violations);
    }

    log::debug!(
        "Admitted job request into queue profile {} ({} nodes, {} cpus)",
        profile.name,
        merged.nodes,
        merged.cpus
    );
    Ok(merged)
}

fn check_acls(profile: &QueueProfile, request: &AdmissionRequest) -> Vec<ValidationError> {
    let acl = &profile.queue_management_params;
    let mut violations = Vec::new();
    let violation = |message: String| ValidationError::new(ErrorCode::AclViolation, message);

    if let Some(requested_types) = &request.params.instance_types {
        for instance_type in requested_types {
            if acl.excluded_instance_types.contains(instance_type) {
                violations.push(violation(format!(
                    "instance type {instance_type} is excluded by queue profile {}",
                    profile.name
                )));
            } else if !acl.allowed_instance_types.is_empty()
                && !acl.allowed_instance_types.contains(instance_type)
            {
                violations.push(violation(format!(
                    "instance type {instance_type} is not allowed by queue profile {}",
                    profile.name
                )));
            }
        }
    }

    for name in request.params.overridden_names(&profile.default_job_params) {
        if acl.restricted_parameters.contains(name) {
            violations.push(violation(format!(
                "parameter {name} is restricted and cannot be overridden"
            )));
        }
    }

    if let Some(security_group) = request.security_group {
        if !acl.allowed_security_groups.is_empty()
            && !acl.allowed_security_groups.contains(security_group)
        {
            violations.push(violation(format!(
                "security group {security_group} is not allowed by queue profile {}",
                profile.name
            )));
        }
    }
    if let Some(instance_profile) = request.instance_profile {
        if !acl.allowed_instance_profiles.is_empty()
            && !acl.allowed_instance_profiles.contains(instance_profile)
        {
            violations.push(violation(format!(
                "instance profile {instance_profile} is not allowed by queue profile {}",
                profile.name
            )));
        }
    }
    violations
}

/// Invariants that only hold on the fully merged request; checking the
/// override form alone would miss a violation assembled from both sides.
fn check_merged_params(merged: &JobParams) -> Vec<ValidationError> {
    let mut violations = Vec::new();
    if merged.spot && merged.spot_allocation_count > merged.nodes {
        violations.push(ValidationError::new(
            ErrorCode::InvalidParams,
            format!(
                "spot allocation count {} exceeds node count {}",
                merged.spot_allocation_count, merged.nodes
            ),
        ));
    }
    violations
}

fn check_quotas(
    profile: &QueueProfile,
    merged: &JobParams,
    usage: &QueueUsage,
) -> Vec<ValidationError> {
    let acl = &profile.queue_management_params;
    let mut violations = Vec::new();

    if acl.max_running_jobs > 0 && usage.running_jobs + 1 > acl.max_running_jobs {
        violations.push(ValidationError::new(
            ErrorCode::QuotaExceeded,
            format!(
                "queue profile {} already runs {} of {} allowed jobs",
                profile.name, usage.running_jobs, acl.max_running_jobs
            ),
        ));
    }
    if acl.max_provisioned_instances > 0
        && usage.provisioned_instances + merged.nodes > acl.max_provisioned_instances
    {
        violations.push(ValidationError::new(
            ErrorCode::QuotaExceeded,
            format!(
                "job needs {} instances but queue profile {} has {} of {} provisioned",
                merged.nodes, profile.name, usage.provisioned_instances, acl.max_provisioned_instances
            ),
        ));
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use derive_builder::Builder;
    use smallvec::smallvec;

    // Profile fixtures
    #[derive(Builder)]
    #[builder(pattern = "owned", build_fn(name = "finish"))]
    struct Profile {
        #[builder(default = "true")]
        enabled: bool,
        #[builder(default)]
        allowed_instance_types: Vec<&'static str>,
        #[builder(default)]
        excluded_instance_types: Vec<&'static str>,
        #[builder(default)]
        restricted_parameters: Vec<&'static str>,
        #[builder(default)]
        allowed_security_groups: Vec<&'static str>,
        #[builder(default = "0")]
        max_running_jobs: u32,
        #[builder(default = "0")]
        max_provisioned_instances: u32,
    }

    impl ProfileBuilder {
        fn build(self) -> QueueProfile {
            let Profile {
                enabled,
                allowed_instance_types,
                excluded_instance_types,
                restricted_parameters,
                allowed_security_groups,
                max_running_jobs,
                max_provisioned_instances,
            } = self.finish().unwrap();
            let mut profile = QueueProfile::new("hpc");
            profile.enabled = enabled;
            profile.queues.insert("hpc-main".to_string());
            profile.default_job_params = JobParams {
                nodes: 2,
                cpus: 8,
                instance_types: smallvec!["c5.large".to_string()],
                ..Default::default()
            };
            let acl = &mut profile.queue_management_params;
            acl.allowed_instance_types =
                allowed_instance_types.into_iter().map(String::from).collect();
            acl.excluded_instance_types =
                excluded_instance_types.into_iter().map(String::from).collect();
            acl.restricted_parameters =
                restricted_parameters.into_iter().map(String::from).collect();
            acl.allowed_security_groups =
                allowed_security_groups.into_iter().map(String::from).collect();
            acl.max_running_jobs = max_running_jobs;
            acl.max_provisioned_instances = max_provisioned_instances;
            profile
        }
    }

    fn profile() -> QueueProfile {
        ProfileBuilder::default().build()
    }

    fn request(params: &SubmittedJobParams) -> AdmissionRequest {
        AdmissionRequest {
            params,
            security_group: None,
            instance_profile: None,
        }
    }

    #[test]
    fn disabled_profile_rejects() {
        let profile = ProfileBuilder::default().enabled(false).build();
        let params = SubmittedJobParams::default();
        let errors = admit(&profile, request(&params), &QueueUsage::default()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::AclViolation);
    }

    #[test]
    fn instance_type_outside_allow_list_rejects() {
        let profile = ProfileBuilder::default()
            .allowed_instance_types(vec!["c5.large", "c5.xlarge"])
            .build();

        let params = SubmittedJobParams {
            instance_types: Some(smallvec!["m5.large".to_string()]),
            ..Default::default()
        };
        let errors = admit(&profile, request(&params), &QueueUsage::default()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::AclViolation);
        assert!(errors[0].message.contains("m5.large"));
    }

    #[test]
    fn excluded_instance_type_rejects() {
        let profile = ProfileBuilder::default()
            .excluded_instance_types(vec!["c5.18xlarge"])
            .build();
        let params = SubmittedJobParams {
            instance_types: Some(smallvec!["c5.18xlarge".to_string()]),
            ..Default::default()
        };
        assert!(admit(&profile, request(&params), &QueueUsage::default()).is_err());
    }

    #[test]
    fn independent_acl_violations_are_all_reported() {
        let profile = ProfileBuilder::default()
            .allowed_instance_types(vec!["c5.large"])
            .restricted_parameters(vec!["spot"])
            .build();

        let params = SubmittedJobParams {
            instance_types: Some(smallvec!["m5.large".to_string()]),
            spot: Some(true),
            ..Default::default()
        };
        let errors = admit(&profile, request(&params), &QueueUsage::default()).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.message.contains("m5.large")));
        assert!(errors.iter().any(|e| e.message.contains("spot")));
    }

    #[test]
    fn restricted_parameter_matching_default_passes() {
        let profile = ProfileBuilder::default()
            .restricted_parameters(vec!["nodes"])
            .build();
        // Echoing the default back is not an override attempt
        let params = SubmittedJobParams {
            nodes: Some(2),
            ..Default::default()
        };
        let merged = admit(&profile, request(&params), &QueueUsage::default()).unwrap();
        assert_eq!(merged.nodes, 2);
    }

    #[test]
    fn merged_spot_count_exceeding_nodes_rejects() {
        // Neither side violates alone: the profile default allows spot and
        // the override only raises the count past the inherited node count.
        let profile = profile();
        let params = SubmittedJobParams {
            nodes: Some(10),
            spot: Some(true),
            spot_allocation_count: Some(50),
            ..Default::default()
        };
        let errors = admit(&profile, request(&params), &QueueUsage::default()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::InvalidParams);
        assert!(errors[0].message.contains("50"));
    }

    #[test]
    fn running_job_quota_rejects() {
        let profile = ProfileBuilder::default().max_running_jobs(3).build();
        let params = SubmittedJobParams::default();
        let usage = QueueUsage {
            running_jobs: 3,
            provisioned_instances: 0,
        };
        let errors = admit(&profile, request(&params), &usage).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::QuotaExceeded);
    }

    #[test]
    fn provisioned_instance_quota_counts_requested_nodes() {
        let profile = ProfileBuilder::default()
            .max_provisioned_instances(10)
            .build();
        let params = SubmittedJobParams {
            nodes: Some(4),
            ..Default::default()
        };
        let usage = QueueUsage {
            running_jobs: 0,
            provisioned_instances: 7,
        };
        let errors = admit(&profile, request(&params), &usage).unwrap_err();
        assert_eq!(errors[0].code, ErrorCode::QuotaExceeded);

        let usage = QueueUsage {
            running_jobs: 0,
            provisioned_instances: 6,
        };
        assert!(admit(&profile, request(&params), &usage).is_ok());
    }

    #[test]
    fn zero_quota_means_unlimited() {
        let profile = profile();
        let params = SubmittedJobParams::default();
        let usage = QueueUsage {
            running_jobs: 10_000,
            provisioned_instances: 50_000,
        };
        assert!(admit(&profile, request(&params), &usage).is_ok());
    }

    #[test]
    fn security_group_acl_is_enforced() {
        let profile = ProfileBuilder::default()
            .allowed_security_groups(vec!["sg-compute"])
            .build();
        let params = SubmittedJobParams::default();
        let request = AdmissionRequest {
            params: &params,
            security_group: Some("sg-other"),
            instance_profile: None,
        };
        let errors = admit(&profile, request, &QueueUsage::default()).unwrap_err();
        assert_eq!(errors[0].code, ErrorCode::AclViolation);
    }

    #[test]
    fn successful_admission_returns_full_merge() {
        let profile = profile();
        let params = SubmittedJobParams {
            cpus: Some(32),
            spot: Some(true),
            ..Default::default()
        };
        let merged = admit(&profile, request(&params), &QueueUsage::default()).unwrap();
        assert_eq!(merged.cpus, 32);
        assert!(merged.spot);
        // inherited from the profile default
        assert_eq!(merged.nodes, 2);
        assert_eq!(merged.instance_types, profile.default_job_params.instance_types);
    }
}
