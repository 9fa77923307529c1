//! Instance-type reference data and the external catalog lookup boundary.
//!
//! The catalog itself is owned by an external service; this engine only looks
//! entries up by name and treats the result as immutable reference data that
//! is refreshed on every call. No caching is assumed.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::Map;

/// One entry of the instance-type catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceTypeOption {
    pub name: String,
    /// vCPU count, the weighted-capacity sizing unit.
    pub default_vcpu_count: u32,
    pub threads_per_core: u32,
    pub default_core_count: u32,
}

pub type InstanceTypeMap = Map<String, InstanceTypeOption>;

/// Handler that can resolve instance-type names against the external catalog
/// service.
pub trait InstanceCatalog {
    /// Look up catalog entries for the given instance types.
    ///
    /// Types unknown to the catalog are simply absent from the returned map;
    /// the capacity calculator treats such a lookup miss as an unknown
    /// capacity and fails the affected operation upstream.
    fn get_instance_type_catalog(
        &self,
        instance_types: Vec<String>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<InstanceTypeMap>>>>;
}
