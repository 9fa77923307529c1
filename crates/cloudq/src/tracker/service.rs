use std::future::Future;

use crate::common::rpc::{ReplyToken, ServiceReceiver, ServiceSender, request, service_channel};
use crate::cost::{CostEstimate, PriceList};
use crate::tracker::state::{
    NodeFilter, NodeRecord, ProvisioningOutcome, QueueRecord, TrackerState,
};

/// Messages consumed by the tracker process.
///
/// All mutations of the tracked state flow through one consumer task, which
/// serializes updates to any single entity: two pollers racing on the same
/// instance id are applied in arrival order against a consistent prior
/// state, and the stale one loses by the marker rule.
pub enum TrackerMessage {
    // Snapshot feed
    NodeSnapshot(Vec<NodeRecord>),
    QueueSnapshot(Vec<QueueRecord>),
    QueueOutcome {
        queue: String,
        outcome: ProvisioningOutcome,
    },
    SetNodeFilter(Option<NodeFilter>),
    // Requests
    GetNodes(ReplyToken<Vec<NodeRecord>>),
    GetQueues(ReplyToken<Vec<QueueRecord>>),
    GetCostEstimate(ReplyToken<CostEstimate>),
    QuitService,
}

impl std::fmt::Debug for TrackerMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TrackerMessage::NodeSnapshot(_) => "NodeSnapshot",
            TrackerMessage::QueueSnapshot(_) => "QueueSnapshot",
            TrackerMessage::QueueOutcome { .. } => "QueueOutcome",
            TrackerMessage::SetNodeFilter(_) => "SetNodeFilter",
            TrackerMessage::GetNodes(_) => "GetNodes",
            TrackerMessage::GetQueues(_) => "GetQueues",
            TrackerMessage::GetCostEstimate(_) => "GetCostEstimate",
            TrackerMessage::QuitService => "QuitService",
        };
        f.write_str(name)
    }
}

pub struct TrackerService {
    sender: ServiceSender<TrackerMessage>,
}

impl TrackerService {
    pub fn on_node_snapshot(&self, snapshot: Vec<NodeRecord>) {
        self.send(TrackerMessage::NodeSnapshot(snapshot));
    }

    pub fn on_queue_snapshot(&self, snapshot: Vec<QueueRecord>) {
        self.send(TrackerMessage::QueueSnapshot(snapshot));
    }

    pub fn on_queue_outcome(&self, queue: impl Into<String>, outcome: ProvisioningOutcome) {
        self.send(TrackerMessage::QueueOutcome {
            queue: queue.into(),
            outcome,
        });
    }

    pub fn set_node_filter(&self, filter: Option<NodeFilter>) {
        self.send(TrackerMessage::SetNodeFilter(filter));
    }

    pub fn get_nodes(&self) -> impl Future<Output = Vec<NodeRecord>> {
        let fut = request(|token| self.sender.send(TrackerMessage::GetNodes(token)));
        async move { fut.await.unwrap() }
    }

    pub fn get_queues(&self) -> impl Future<Output = Vec<QueueRecord>> {
        let fut = request(|token| self.sender.send(TrackerMessage::GetQueues(token)));
        async move { fut.await.unwrap() }
    }

    pub fn get_cost_estimate(&self) -> impl Future<Output = CostEstimate> {
        let fut = request(|token| self.sender.send(TrackerMessage::GetCostEstimate(token)));
        async move { fut.await.unwrap() }
    }

    pub fn quit_service(&self) {
        self.send(TrackerMessage::QuitService);
    }

    fn send(&self, msg: TrackerMessage) {
        let _ = self.sender.send(msg);
    }
}

/// Creates the tracker service together with its consumer process. The
/// returned future must be spawned by the caller.
pub fn create_tracker_service(prices: PriceList) -> (TrackerService, impl Future<Output = ()>) {
    let (tx, rx) = service_channel();
    let state = TrackerState::new(prices);
    let process = tracker_process(state, rx);
    let service = TrackerService { sender: tx };
    (service, process)
}

async fn tracker_process(mut state: TrackerState, mut receiver: ServiceReceiver<TrackerMessage>) {
    while let Some(message) = receiver.recv().await {
        match message {
            TrackerMessage::NodeSnapshot(snapshot) => {
                log::debug!("Reconciling node snapshot with {} entries", snapshot.len());
                state.reconcile_nodes(snapshot);
            }
            TrackerMessage::QueueSnapshot(snapshot) => {
                log::debug!("Reconciling queue snapshot with {} entries", snapshot.len());
                state.reconcile_queues(snapshot);
            }
            TrackerMessage::QueueOutcome { queue, outcome } => {
                state.apply_queue_outcome(&queue, outcome);
            }
            TrackerMessage::SetNodeFilter(filter) => {
                state.set_node_filter(filter);
            }
            TrackerMessage::GetNodes(response) => {
                response.reply(state.nodes().cloned().collect());
            }
            TrackerMessage::GetQueues(response) => {
                response.reply(state.queues().cloned().collect());
            }
            TrackerMessage::GetCostEstimate(response) => {
                response.reply(state.cost_estimate().clone());
            }
            TrackerMessage::QuitService => break,
        }
    }
    log::debug!("Ending tracker process");
}
