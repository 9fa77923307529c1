//! Job resource requests and submitted jobs.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::cost::{Amount, CostEstimate};

pub type JobId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpotAllocationStrategy {
    CapacityOptimized,
    LowestPrice,
    Diversified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScratchProvider {
    Ebs,
    FsxLustreExisting,
    FsxLustreNew,
}

/// Canonical representation of a job's resource request.
///
/// `instance_types` holds candidate types of the same family in increasing
/// capacity order; the first element is the base type and is used as the
/// reference for all capacity math when no explicit type is given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobParams {
    pub nodes: u32,
    /// Total cpu count requested; used to derive `nodes` when the request is
    /// capacity-driven.
    pub cpus: u32,
    pub instance_types: SmallVec<[String; 2]>,
    pub spot: bool,
    pub spot_allocation_count: u32,
    pub spot_allocation_strategy: SpotAllocationStrategy,
    pub spot_price: Option<Amount>,
    pub enable_scratch: bool,
    pub scratch_provider: ScratchProvider,
    pub scratch_size_gb: u32,
    pub scratch_iops: u32,
    pub fsx_lustre_import_path: Option<String>,
    pub fsx_lustre_export_path: Option<String>,
    pub fsx_lustre_dns: Option<String>,
    pub keep_ebs_volumes: bool,
    pub enable_efa_support: bool,
    pub enable_ht_support: bool,
    pub force_reserved_instances: bool,
}

impl Default for JobParams {
    fn default() -> Self {
        Self {
            nodes: 1,
            cpus: 1,
            instance_types: SmallVec::new(),
            spot: false,
            spot_allocation_count: 0,
            spot_allocation_strategy: SpotAllocationStrategy::CapacityOptimized,
            spot_price: None,
            enable_scratch: false,
            scratch_provider: ScratchProvider::Ebs,
            scratch_size_gb: 0,
            scratch_iops: 0,
            fsx_lustre_import_path: None,
            fsx_lustre_export_path: None,
            fsx_lustre_dns: None,
            keep_ebs_volumes: false,
            enable_efa_support: false,
            enable_ht_support: false,
            force_reserved_instances: false,
        }
    }
}

impl JobParams {
    /// The first candidate type, the reference for capacity math.
    pub fn base_instance_type(&self) -> Option<&str> {
        self.instance_types.first().map(|t| t.as_str())
    }
}

/// The override form of [`JobParams`] carried by a job submission.
///
/// Fields left unset inherit from the queue profile's default job parameters
/// during admission; set fields override, unless the queue profile restricts
/// them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmittedJobParams {
    pub nodes: Option<u32>,
    pub cpus: Option<u32>,
    pub instance_types: Option<SmallVec<[String; 2]>>,
    pub spot: Option<bool>,
    pub spot_allocation_count: Option<u32>,
    pub spot_allocation_strategy: Option<SpotAllocationStrategy>,
    pub spot_price: Option<Amount>,
    pub enable_scratch: Option<bool>,
    pub scratch_provider: Option<ScratchProvider>,
    pub scratch_size_gb: Option<u32>,
    pub scratch_iops: Option<u32>,
    pub fsx_lustre_import_path: Option<String>,
    pub fsx_lustre_export_path: Option<String>,
    pub fsx_lustre_dns: Option<String>,
    pub keep_ebs_volumes: Option<bool>,
    pub enable_efa_support: Option<bool>,
    pub enable_ht_support: Option<bool>,
    pub force_reserved_instances: Option<bool>,
}

macro_rules! merge_field {
    ($self:ident, $merged:ident, $($field:ident),+) => {
        $(
            if let Some(value) = $self.$field.clone() {
                $merged.$field = value;
            }
        )+
    };
}

macro_rules! overridden_field {
    ($self:ident, $defaults:ident, $names:ident, $($field:ident),+) => {
        $(
            if let Some(value) = &$self.$field {
                if &$defaults.$field != value {
                    $names.push(stringify!($field));
                }
            }
        )+
    };
}

impl SubmittedJobParams {
    /// Names of parameters the submitter attempted to override, i.e. fields
    /// that were provided with a value different from the profile default.
    pub fn overridden_names(&self, defaults: &JobParams) -> Vec<&'static str> {
        let mut names = Vec::new();
        overridden_field!(
            self, defaults, names, nodes, cpus, instance_types, spot, spot_allocation_count,
            spot_allocation_strategy, enable_scratch, scratch_provider, scratch_size_gb,
            scratch_iops, keep_ebs_volumes, enable_efa_support, enable_ht_support,
            force_reserved_instances
        );
        // Optional-valued fields override whenever they are provided
        if self.spot_price.is_some() && self.spot_price != defaults.spot_price {
            names.push("spot_price");
        }
        if self.fsx_lustre_import_path.is_some()
            && self.fsx_lustre_import_path != defaults.fsx_lustre_import_path
        {
            names.push("fsx_lustre_import_path");
        }
        if self.fsx_lustre_export_path.is_some()
            && self.fsx_lustre_export_path != defaults.fsx_lustre_export_path
        {
            names.push("fsx_lustre_export_path");
        }
        if self.fsx_lustre_dns.is_some() && self.fsx_lustre_dns != defaults.fsx_lustre_dns {
            names.push("fsx_lustre_dns");
        }
        names
    }

    /// Resolves the final job parameters: unset fields inherit from the
    /// profile defaults, set fields override.
    pub fn merge_into(&self, defaults: &JobParams) -> JobParams {
        let mut merged = defaults.clone();
        merge_field!(
            self, merged, nodes, cpus, instance_types, spot, spot_allocation_count,
            spot_allocation_strategy, enable_scratch, scratch_provider, scratch_size_gb,
            scratch_iops, keep_ebs_volumes, enable_efa_support, enable_ht_support,
            force_reserved_instances
        );
        if self.spot_price.is_some() {
            merged.spot_price = self.spot_price;
        }
        if self.fsx_lustre_import_path.is_some() {
            merged.fsx_lustre_import_path = self.fsx_lustre_import_path.clone();
        }
        if self.fsx_lustre_export_path.is_some() {
            merged.fsx_lustre_export_path = self.fsx_lustre_export_path.clone();
        }
        if self.fsx_lustre_dns.is_some() {
            merged.fsx_lustre_dns = self.fsx_lustre_dns.clone();
        }
        merged
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    Queued,
    Provisioning,
    Running,
    Finished,
    /// Explicit admin/user deletion, reachable from any state.
    Deleted,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished | JobState::Deleted)
    }

    fn order(&self) -> u8 {
        match self {
            JobState::Queued => 0,
            JobState::Provisioning => 1,
            JobState::Running => 2,
            JobState::Finished => 3,
            JobState::Deleted => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapacityType {
    OnDemand,
    Spot,
}

/// One provisioned node bound to a job. Created when capacity is provisioned,
/// destroyed when the job's capacity is torn down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionHost {
    pub host: String,
    pub instance_id: String,
    pub instance_type: String,
    pub capacity_type: CapacityType,
    pub tenancy: String,
}

/// A submitted unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub queue: String,
    pub project: String,
    pub owner: String,
    pub state: JobState,
    pub params: JobParams,
    pub execution_hosts: Vec<ExecutionHost>,
    pub estimated_bom_cost: Option<CostEstimate>,
}

impl Job {
    pub fn new(job_id: JobId, queue: String, project: String, owner: String, params: JobParams) -> Self {
        Self {
            job_id,
            queue,
            project,
            owner,
            state: JobState::Queued,
            params,
            execution_hosts: Vec::new(),
            estimated_bom_cost: None,
        }
    }

    /// Advances the job state. States only move forward; a stale transition
    /// backwards is ignored. Deletion is always allowed.
    pub fn advance_state(&mut self, state: JobState) {
        if state == JobState::Deleted || state.order() > self.state.order() {
            self.state = state;
        } else {
            log::debug!(
                "Ignoring backwards state transition {:?} -> {state:?} of job {}",
                self.state,
                self.job_id
            );
        }
    }
}
