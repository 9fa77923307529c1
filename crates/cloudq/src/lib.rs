//! Capacity planning and queue policy engine for cloud HPC clusters.
//!
//! The crate decides, given a job's resource request (cpus, instance types,
//! spot/on-demand mix, scratch storage), how many nodes of which instance type
//! to provision, enforces queue-level ACLs and limits before admission, keeps
//! a reconciled live view of provisioned capacity, and materializes the final
//! job script that is handed to the scheduler backend.
//!
//! Rendering, authentication and the actual cloud provisioning calls live in
//! external collaborators; they talk to this engine through the request and
//! response types in [`transfer::messages`].

pub mod capacity;
pub mod catalog;
pub mod common;
pub mod cost;
pub mod job;
pub mod queue;
pub mod script;
pub mod submit;
pub mod tracker;
pub mod transfer;

pub type Error = crate::common::error::CloudQError;
pub type Result<T> = std::result::Result<T, Error>;

pub type Map<K, V> = std::collections::HashMap<K, V>;
pub type Set<T> = std::collections::HashSet<T>;
