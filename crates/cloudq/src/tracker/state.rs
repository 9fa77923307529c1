use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::CapacityType;
use crate::queue::QueueStatus;
use crate::{Map, Set};
use crate::cost::{CostEstimate, PriceList, estimate_nodes};

/// An entity arriving through the polled snapshot feed: keyed by a stable id
/// and carrying a monotonically non-decreasing "last updated" marker.
pub trait PolledEntity {
    fn entity_id(&self) -> &str;
    fn updated_on(&self) -> DateTime<Utc>;
    /// True when the locally-recorded lifecycle state itself means the
    /// entity is going away; only then may an absence from a poll drop a
    /// record that the active filter would still display.
    fn is_removal_state(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeLifecycle {
    Provisioning,
    Running,
    Terminating,
    Terminated,
}

/// One live compute node as reported by the provisioning backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub instance_id: String,
    pub host: String,
    pub instance_type: String,
    pub capacity_type: CapacityType,
    pub lifecycle: NodeLifecycle,
    pub queue: String,
    pub updated_on: DateTime<Utc>,
}

impl PolledEntity for NodeRecord {
    fn entity_id(&self) -> &str {
        &self.instance_id
    }
    fn updated_on(&self) -> DateTime<Utc> {
        self.updated_on
    }
    fn is_removal_state(&self) -> bool {
        matches!(
            self.lifecycle,
            NodeLifecycle::Terminating | NodeLifecycle::Terminated
        )
    }
}

/// The live view of one queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueRecord {
    pub name: String,
    pub status: QueueStatus,
    pub active_jobs: u32,
    pub updated_on: DateTime<Utc>,
}

impl PolledEntity for QueueRecord {
    fn entity_id(&self) -> &str {
        &self.name
    }
    fn updated_on(&self) -> DateTime<Utc> {
        self.updated_on
    }
    fn is_removal_state(&self) -> bool {
        // Queues are long-lived; they leave the view only through filters.
        false
    }
}

/// A provisioning outcome reported from outside the core; drives the queue
/// status state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProvisioningOutcome {
    /// A job needed capacity and it was obtainable.
    CapacityRequested,
    /// No active jobs remain, capacity has drained.
    CapacityDrained,
    /// ACL violation, quota exhaustion or capacity unobtainable.
    ProvisioningFailed { reason: String },
    /// The blocking condition was resolved.
    ConditionResolved,
}

pub type NodeFilter = Box<dyn Fn(&NodeRecord) -> bool + Send>;

pub struct TrackerState {
    nodes: Map<String, NodeRecord>,
    queues: Map<String, QueueRecord>,
    node_filter: Option<NodeFilter>,
    prices: PriceList,
    estimate: CostEstimate,
    /// Signature of the node mix the current estimate was built from.
    mix_signature: Vec<(String, CapacityType)>,
}

impl TrackerState {
    pub fn new(prices: PriceList) -> Self {
        Self {
            nodes: Default::default(),
            queues: Default::default(),
            node_filter: None,
            prices,
            estimate: Default::default(),
            mix_signature: Default::default(),
        }
    }

    pub fn set_node_filter(&mut self, filter: Option<NodeFilter>) {
        self.node_filter = filter;
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values()
    }

    pub fn get_node(&self, instance_id: &str) -> Option<&NodeRecord> {
        self.nodes.get(instance_id)
    }

    pub fn queues(&self) -> impl Iterator<Item = &QueueRecord> {
        self.queues.values()
    }

    pub fn get_queue(&self, name: &str) -> Option<&QueueRecord> {
        self.queues.get(name)
    }

    pub fn cost_estimate(&self) -> &CostEstimate {
        &self.estimate
    }

    /// Merges a freshly polled node snapshot and rebuilds the cost estimate
    /// if the running node mix changed.
    pub fn reconcile_nodes(&mut self, snapshot: Vec<NodeRecord>) {
        let filter = self.node_filter.as_deref();
        reconcile(&mut self.nodes, snapshot, filter);
        self.refresh_estimate();
    }

    /// Merges a freshly polled queue snapshot.
    pub fn reconcile_queues(&mut self, snapshot: Vec<QueueRecord>) {
        reconcile(&mut self.queues, snapshot, None);
    }

    /// Applies a provisioning outcome to a queue's status. Unknown queues
    /// are created idle first, transitions outside the state machine are
    /// ignored.
    pub fn apply_queue_outcome(&mut self, queue: &str, outcome: ProvisioningOutcome) {
        let record = self
            .queues
            .entry(queue.to_string())
            .or_insert_with(|| QueueRecord {
                name: queue.to_string(),
                status: QueueStatus::Idle,
                active_jobs: 0,
                updated_on: Utc::now(),
            });

        let next = match (record.status, &outcome) {
            (QueueStatus::Idle, ProvisioningOutcome::CapacityRequested) => QueueStatus::Active,
            (QueueStatus::Active, ProvisioningOutcome::CapacityDrained) => QueueStatus::Idle,
            (
                QueueStatus::Idle | QueueStatus::Active,
                ProvisioningOutcome::ProvisioningFailed { reason },
            ) => {
                log::warn!("Queue {queue} blocked: {reason}");
                QueueStatus::Blocked
            }
            (QueueStatus::Blocked, ProvisioningOutcome::ConditionResolved) => QueueStatus::Idle,
            (status, outcome) => {
                log::debug!("Ignoring outcome {outcome:?} for queue {queue} in status {status:?}");
                status
            }
        };
        if next != record.status {
            record.status = next;
            record.updated_on = Utc::now();
        }
    }

    /// Line items are derived, not stored independently, so the estimate is
    /// rebuilt wholesale from the current provisioning facts.
    fn refresh_estimate(&mut self) {
        let mut signature: Vec<(String, CapacityType)> = self
            .nodes
            .values()
            .filter(|node| node.lifecycle == NodeLifecycle::Running)
            .map(|node| (node.instance_type.clone(), node.capacity_type))
            .collect();
        signature.sort();

        if signature != self.mix_signature {
            self.estimate = estimate_nodes(
                signature
                    .iter()
                    .map(|(instance_type, capacity_type)| (instance_type.as_str(), *capacity_type)),
                &self.prices,
            );
            self.mix_signature = signature;
        }
    }
}

/// The reconciliation rule: insert unknown entities, adopt known ones only
/// when the incoming marker is at or after the held one (ties prefer the
/// incoming copy), and treat absence from the snapshot as "possibly removed"
/// rather than gone.
fn reconcile<T: PolledEntity>(
    held: &mut Map<String, T>,
    snapshot: Vec<T>,
    filter: Option<&(dyn Fn(&T) -> bool + Send)>,
) {
    let mut seen: Set<String> = Set::with_capacity(snapshot.len());
    for incoming in snapshot {
        let id = incoming.entity_id().to_string();
        seen.insert(id.clone());
        let adopt = match held.get(&id) {
            None => true,
            Some(local) => incoming.updated_on() >= local.updated_on(),
        };
        if adopt {
            held.insert(id, incoming);
        } else {
            log::debug!("Ignoring stale snapshot of {id}");
        }
    }

    held.retain(|id, local| {
        if seen.contains(id) {
            return true;
        }
        let visible = filter.map(|f| f(local)).unwrap_or(true);
        if !visible {
            // The filter already hides it, the poll result agrees it is gone
            log::debug!("Dropping filtered-out entity {id} absent from snapshot");
            false
        } else if local.is_removal_state() {
            log::debug!("Dropping removed entity {id} absent from snapshot");
            false
        } else {
            // Presumed to be a filtering artifact of the poll, keep it
            true
        }
    });
}
