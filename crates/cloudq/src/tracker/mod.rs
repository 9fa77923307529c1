//! Provisioning state tracker: reconciles periodically-polled snapshots of
//! live queues and compute nodes against locally held state, without losing
//! freshly-created entries or flapping on stale poll data.

pub mod service;
pub mod state;

pub use service::{TrackerService, create_tracker_service};
pub use state::{
    NodeLifecycle, NodeRecord, PolledEntity, ProvisioningOutcome, QueueRecord, TrackerState,
};
