//! Submission orchestration: the path from a raw job request to a committed
//! (or dry-run) submission against the provisioning backend.

use std::future::Future;
use std::pin::Pin;

use crate::common::error::ValidationError;
use crate::common::idcounter::IdCounter;
use crate::job::{Job, JobId, SubmittedJobParams};
use crate::queue::admission::{AdmissionRequest, QueueUsage, admit};
use crate::queue::{QueueProfile, validate_profile};
use crate::script::{MaterializeContext, TemplateMode, materialize_script};
use crate::transfer::messages::{SessionConnectionInfo, SubmitJobRequest, SubmitJobResult};
use crate::{Error, Map, capacity, cost};
use crate::catalog::InstanceCatalog;
use crate::cost::PriceList;

/// Handler that can commit submissions and profile changes against the
/// external scheduler backend, which owns all durable state.
pub trait ProvisioningBackend {
    fn submit_job(
        &self,
        request: SubmitJobRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<SubmitJobResult>>>>;

    fn store_queue_profile(
        &self,
        profile: QueueProfile,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>>>>;

    fn get_session_connection(
        &self,
        job_id: JobId,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<SessionConnectionInfo>>>>;
}

/// A raw job submission as received from the caller, before admission.
#[derive(Debug, Clone, Default)]
pub struct JobSubmission {
    pub queue: Option<String>,
    pub project: Option<String>,
    pub owner: String,
    pub params: SubmittedJobParams,
    pub security_group: Option<String>,
    pub instance_profile: Option<String>,
    /// Job-script template of the submitting application, if any.
    pub template: Option<String>,
    pub template_mode: TemplateMode,
    pub template_values: Map<String, String>,
    pub job_script_interpreter: String,
    pub dry_run: bool,
}

pub struct JobSubmitService {
    catalog: Box<dyn InstanceCatalog>,
    backend: Box<dyn ProvisioningBackend>,
    prices: PriceList,
    job_id_counter: IdCounter,
}

impl JobSubmitService {
    /// Dependencies are passed in explicitly; the engine never resolves
    /// clients from ambient global context.
    pub fn new(
        catalog: Box<dyn InstanceCatalog>,
        backend: Box<dyn ProvisioningBackend>,
        prices: PriceList,
    ) -> Self {
        Self {
            catalog,
            backend,
            prices,
            job_id_counter: IdCounter::new(1),
        }
    }

    /// Runs the full submission path: admission, capacity planning, script
    /// materialization and the backend submit. A dry run follows the same
    /// path but stops short of committing provisioning.
    pub async fn submit_job(
        &mut self,
        profile: &QueueProfile,
        usage: &QueueUsage,
        submission: JobSubmission,
    ) -> crate::Result<SubmitJobResult> {
        let request = AdmissionRequest {
            params: &submission.params,
            security_group: submission.security_group.as_deref(),
            instance_profile: submission.instance_profile.as_deref(),
        };
        let params = match admit(profile, request, usage) {
            Ok(params) => params,
            Err(validations) => {
                log::debug!(
                    "Job submission into queue profile {} rejected with {} violations",
                    profile.name,
                    validations.len()
                );
                return Ok(SubmitJobResult::rejected(validations));
            }
        };

        let catalog = self
            .catalog
            .get_instance_type_catalog(params.instance_types.to_vec())
            .await?;
        let plan = capacity::plan_nodes(&params, &catalog)?;

        let ctx = MaterializeContext {
            queue: submission.queue.as_deref(),
            project: submission.project.as_deref(),
        };
        let script = materialize_script(
            submission.template.as_deref(),
            &plan,
            &ctx,
            &submission.template_values,
            submission.template_mode,
        )?;

        let estimate = cost::estimate_plan(&params, &plan, &self.prices);

        // Materialization validated both fields above
        let queue = submission.queue.clone().unwrap_or_default();
        let project = submission.project.clone().unwrap_or_default();

        let mut job = Job::new(
            self.job_id_counter.increment(),
            queue.clone(),
            project.clone(),
            submission.owner.clone(),
            params,
        );
        job.estimated_bom_cost = Some(estimate.clone());

        let request = SubmitJobRequest {
            queue,
            project,
            owner: submission.owner,
            job_script_interpreter: submission.job_script_interpreter,
            job_script: script,
            dry_run: submission.dry_run,
        };

        let mut result = if submission.dry_run {
            SubmitJobResult::default()
        } else {
            self.backend
                .submit_job(request)
                .await
                .map_err(|e| Error::SubmitJobFailed(e.to_string()))?
        };
        result.job = Some(job);
        result.estimated_bom_cost = Some(estimate);
        Ok(result)
    }

    /// Validates and stores a queue profile. Validation errors are returned
    /// as a list; a dry run stops after validation.
    pub async fn create_or_update_queue_profile(
        &self,
        mut profile: QueueProfile,
        dry_run: bool,
    ) -> crate::Result<Vec<ValidationError>> {
        profile.normalize();
        let errors = validate_profile(&profile);
        if !errors.is_empty() || dry_run {
            return Ok(errors);
        }
        if let Some(timeout) = profile.idle_timeout() {
            log::debug!(
                "Queue profile {} terminates idle capacity after {}",
                profile.name,
                crate::common::format::human_duration(timeout)
            );
        }
        self.backend
            .store_queue_profile(profile)
            .await
            .map_err(|e| Error::SubmitJobFailed(format!("storing queue profile failed: {e}")))?;
        Ok(Vec::new())
    }

    /// Fetches session connection details for a running job. Failures are
    /// propagated, not retried.
    pub async fn get_session_connection(
        &self,
        job_id: JobId,
    ) -> crate::Result<SessionConnectionInfo> {
        self.backend
            .get_session_connection(job_id)
            .await
            .map_err(|e| Error::SessionConnectionError(e.to_string()))
    }
}
