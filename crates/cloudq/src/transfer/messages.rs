//! Request/response contracts at the engine boundary. Callers (UI layer,
//! API handlers) build these; the engine never reaches into their state.

use serde::{Deserialize, Serialize};

use crate::cost::{Amount, CostEstimate, CostLineItem};
use crate::job::Job;

pub use crate::common::error::ValidationError;

/// A job submission handed to the provisioning backend. `job_script` carries
/// the already materialized script text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobRequest {
    pub queue: String,
    pub project: String,
    pub owner: String,
    pub job_script_interpreter: String,
    pub job_script: String,
    /// Runs the same admission/materialization path without committing
    /// provisioning.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceQuota {
    pub name: String,
    pub limit: u32,
    pub in_use: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetUsage {
    pub budget_name: String,
    pub limit: Amount,
    pub actual_spend: Amount,
    pub forecasted_spend: Amount,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitJobResult {
    /// Present when the job was admitted (also on dry runs, carrying the
    /// would-be job).
    pub job: Option<Job>,
    /// Violations found during admission; non-empty means no job was
    /// created. Always a complete list, never a single opaque message.
    pub validations: Vec<ValidationError>,
    /// One-off charges (scratch volumes, filesystem setup) that accompany
    /// the hourly estimate.
    pub incidentals: Vec<CostLineItem>,
    pub service_quotas: Vec<ServiceQuota>,
    pub estimated_bom_cost: Option<CostEstimate>,
    pub budget_usage: Option<BudgetUsage>,
}

impl SubmitJobResult {
    pub fn rejected(validations: Vec<ValidationError>) -> Self {
        Self {
            validations,
            ..Default::default()
        }
    }
}

/// Connection details of an interactive session attached to a running job,
/// retrieved from the downstream session broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConnectionInfo {
    pub host: String,
    pub port: u16,
    pub protocol: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::ErrorCode;

    #[test]
    fn rejected_result_carries_only_validations() {
        let result = SubmitJobResult::rejected(vec![ValidationError::new(
            ErrorCode::AclViolation,
            "queue profile hpc is disabled",
        )]);
        assert!(result.job.is_none());
        assert!(result.incidentals.is_empty());
        assert!(result.estimated_bom_cost.is_none());
        assert_eq!(result.validations.len(), 1);
    }
}
