//! Bill-of-materials cost estimates.
//!
//! Estimates are always rebuilt wholesale from current provisioning facts;
//! line items are derived data and are never patched in place.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::Map;
use crate::capacity::{NodePlan, on_demand_nodes};
use crate::common::format::human_money;
use crate::job::{CapacityType, JobParams};

pub type Amount = f64;

const NODE_HOUR_UNIT: &str = "node/hour";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLineItem {
    pub title: String,
    pub quantity: f64,
    pub unit: String,
    pub unit_price: Amount,
    pub total_price: Amount,
}

impl CostLineItem {
    fn node_hours(title: String, quantity: u32, unit_price: Amount) -> Self {
        Self {
            title,
            quantity: quantity as f64,
            unit: NODE_HOUR_UNIT.to_string(),
            unit_price,
            total_price: quantity as f64 * unit_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CostEstimate {
    pub line_items: Vec<CostLineItem>,
    pub savings: Vec<CostLineItem>,
    pub total: Amount,
}

impl std::fmt::Display for CostEstimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/hour", human_money(self.total))
    }
}

/// Hourly unit prices per instance type, split by capacity type.
#[derive(Debug, Clone, Default)]
pub struct PriceList {
    on_demand: Map<String, Amount>,
    spot: Map<String, Amount>,
}

impl PriceList {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_price(
        mut self,
        instance_type: &str,
        on_demand: Amount,
        spot: Option<Amount>,
    ) -> Self {
        self.on_demand.insert(instance_type.to_string(), on_demand);
        if let Some(spot) = spot {
            self.spot.insert(instance_type.to_string(), spot);
        }
        self
    }

    /// Spot prices fall back to the on-demand price when no spot quote is
    /// known, which makes the savings item come out as zero rather than
    /// fabricating a discount.
    pub fn price(&self, instance_type: &str, capacity_type: CapacityType) -> Option<Amount> {
        match capacity_type {
            CapacityType::OnDemand => self.on_demand.get(instance_type).copied(),
            CapacityType::Spot => self
                .spot
                .get(instance_type)
                .or_else(|| self.on_demand.get(instance_type))
                .copied(),
        }
    }
}

/// Rebuilds a cost estimate from a set of provisioned nodes, grouped by
/// instance type and capacity type.
pub fn estimate_nodes<'a>(
    nodes: impl IntoIterator<Item = (&'a str, CapacityType)>,
    prices: &PriceList,
) -> CostEstimate {
    let mut groups: Vec<(String, CapacityType, u32)> = Vec::new();
    for ((instance_type, capacity_type), chunk) in &nodes
        .into_iter()
        .sorted()
        .chunk_by(|(instance_type, capacity_type)| (instance_type.to_string(), *capacity_type))
    {
        groups.push((instance_type, capacity_type, chunk.count() as u32));
    }
    build_estimate(groups, prices)
}

/// Estimates the cost of a job before provisioning, from its resolved node
/// plan and spot/on-demand split.
pub fn estimate_plan(params: &JobParams, plan: &NodePlan, prices: &PriceList) -> CostEstimate {
    let Some(instance_type) = params.base_instance_type() else {
        return CostEstimate::default();
    };
    let on_demand = on_demand_nodes(&JobParams {
        nodes: plan.nodes,
        ..params.clone()
    });
    let spot = plan.nodes - on_demand;

    let mut groups = Vec::new();
    if on_demand > 0 {
        groups.push((instance_type.to_string(), CapacityType::OnDemand, on_demand));
    }
    if spot > 0 {
        groups.push((instance_type.to_string(), CapacityType::Spot, spot));
    }
    build_estimate(groups, prices)
}

fn build_estimate(groups: Vec<(String, CapacityType, u32)>, prices: &PriceList) -> CostEstimate {
    let mut estimate = CostEstimate::default();
    for (instance_type, capacity_type, count) in groups {
        let Some(unit_price) = prices.price(&instance_type, capacity_type) else {
            log::warn!("No price known for instance type {instance_type}, skipping line item");
            continue;
        };
        let title = match capacity_type {
            CapacityType::OnDemand => format!("{instance_type} (on-demand)"),
            CapacityType::Spot => format!("{instance_type} (spot)"),
        };
        estimate
            .line_items
            .push(CostLineItem::node_hours(title, count, unit_price));
        estimate.total += count as f64 * unit_price;

        if capacity_type == CapacityType::Spot {
            let on_demand_price = prices
                .price(&instance_type, CapacityType::OnDemand)
                .unwrap_or(unit_price);
            let discount = on_demand_price - unit_price;
            if discount > 0.0 {
                estimate.savings.push(CostLineItem::node_hours(
                    format!("{instance_type} spot savings"),
                    count,
                    discount,
                ));
            }
        }
    }
    estimate
}
