//! Pure capacity math: converting a cpu/instance-type request into concrete
//! node and capacity counts.

use crate::Error;
use crate::catalog::{InstanceTypeMap, InstanceTypeOption};
use crate::job::JobParams;

/// How a job's capacity is split between on-demand and spot instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotMix {
    OnDemand,
    /// `spot == true` with a zero allocation count means all nodes are spot.
    PureSpot,
    /// `spot == true` with a non-zero count: that many nodes are spot, the
    /// rest on-demand.
    Mixed(u32),
}

/// Whether capacity is torn down automatically after idle/job completion or
/// kept around as a shared pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityClass {
    Ephemeral,
    Shared,
}

/// Concrete node plan derived from a job request and the instance catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePlan {
    pub nodes: u32,
    pub cpus_per_instance: u32,
}

/// Weighted (vCPU-equivalent) capacity of an instance type.
///
/// Returns 0 for a catalog miss; 0 means "unknown capacity" and must be
/// propagated as an error upstream, never divided by.
pub fn weighted_capacity(option: Option<&InstanceTypeOption>) -> u32 {
    option.map(|o| o.default_vcpu_count).unwrap_or(0)
}

/// Physical cpu count of one instance, distinct from the weighted (vCPU)
/// capacity.
pub fn cpu_count(option: &InstanceTypeOption) -> u32 {
    option.threads_per_core * option.default_core_count
}

/// Number of nodes needed to satisfy `total_cpus` with instances carrying
/// `cpus_per_instance` each.
///
/// A zero result blocks job-script generation instead of silently
/// proceeding with zero nodes.
pub fn nodes_required(total_cpus: u32, cpus_per_instance: u32) -> crate::Result<u32> {
    if cpus_per_instance == 0 {
        return Err(Error::InvalidParams(
            "cpus per instance is unknown, cannot compute node count".to_string(),
        ));
    }
    let nodes = total_cpus.div_ceil(cpus_per_instance);
    if nodes == 0 {
        return Err(Error::InvalidParams(
            "requested cpu count resolves to zero nodes".to_string(),
        ));
    }
    Ok(nodes)
}

pub fn spot_mix(params: &JobParams) -> SpotMix {
    if !params.spot {
        SpotMix::OnDemand
    } else if params.spot_allocation_count == 0 {
        SpotMix::PureSpot
    } else {
        SpotMix::Mixed(params.spot_allocation_count)
    }
}

/// Number of on-demand nodes of a request: everything not covered by the
/// spot allocation, or 0 for pure-spot capacity.
pub fn on_demand_nodes(params: &JobParams) -> u32 {
    match spot_mix(params) {
        SpotMix::OnDemand => params.nodes,
        SpotMix::PureSpot => 0,
        SpotMix::Mixed(spot_count) => params.nodes.saturating_sub(spot_count),
    }
}

/// Ephemeral capacity is everything that is neither kept forever nor exempt
/// from idle termination. `scaling_mode` deliberately does not participate.
pub fn capacity_class(keep_forever: bool, terminate_when_idle: u32) -> CapacityClass {
    if !keep_forever && terminate_when_idle > 0 {
        CapacityClass::Ephemeral
    } else {
        CapacityClass::Shared
    }
}

/// Desired capacity of a job in scaling units.
///
/// Ephemeral jobs are treated as a shared pool sized by raw cpu count;
/// persistent jobs are sized in weighted capacity of the reference instance
/// type (the explicit one when given, otherwise the first candidate).
pub fn desired_capacity(
    params: &JobParams,
    class: CapacityClass,
    option: Option<&InstanceTypeOption>,
) -> crate::Result<u64> {
    match class {
        CapacityClass::Ephemeral => Ok(params.nodes as u64 * params.cpus as u64),
        CapacityClass::Shared => {
            let weighted = weighted_capacity(option);
            if weighted == 0 {
                return Err(Error::InvalidParams(
                    "weighted capacity of the reference instance type is unknown".to_string(),
                ));
            }
            Ok(params.nodes as u64 * weighted as u64)
        }
    }
}

/// Builds the node plan for a request: the reference type is always the
/// FIRST entry of `instance_types` (families are ordered ascending), and the
/// per-instance cpu count comes from the catalog entry of that type.
pub fn plan_nodes(params: &JobParams, catalog: &InstanceTypeMap) -> crate::Result<NodePlan> {
    let base = params.base_instance_type().ok_or_else(|| {
        Error::InvalidParams("job request carries no instance type candidates".to_string())
    })?;
    let option = catalog.get(base).ok_or_else(|| {
        Error::InvalidParams(format!("instance type {base} not found in catalog"))
    })?;
    let cpus_per_instance = cpu_count(option);
    let nodes = nodes_required(params.cpus, cpus_per_instance)?;
    Ok(NodePlan {
        nodes,
        cpus_per_instance,
    })
}
