//! Groups pending hails by route and flags the groups large enough to dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::DispatchResult;
use crate::hails::HailStore;
use crate::model::{HailRequest, RouteKey};

/// PENDING hails sharing one origin/destination pair, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemandGroup {
    pub route: RouteKey,
    pub count: usize,
    pub earliest_requested_at: DateTime<Utc>,
    pub members: Vec<HailRequest>,
}

impl DemandGroup {
    /// `None` for an empty member list.
    pub fn from_members(route: RouteKey, mut members: Vec<HailRequest>) -> Option<Self> {
        members.sort_by_key(|h| h.created_at);
        let earliest_requested_at = members.first()?.created_at;
        Some(Self {
            route,
            count: members.len(),
            earliest_requested_at,
            members,
        })
    }
}

/// Keep groups with at least `threshold` members, largest first.
///
/// Ties go to the group whose oldest hail has waited longest, then to route
/// key order so the output is fully deterministic.
pub fn rank_groups(
    grouped: BTreeMap<RouteKey, Vec<HailRequest>>,
    threshold: usize,
) -> Vec<DemandGroup> {
    let mut groups: Vec<DemandGroup> = grouped
        .into_iter()
        .filter(|(_, members)| members.len() >= threshold)
        .filter_map(|(route, members)| DemandGroup::from_members(route, members))
        .collect();
    groups.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then(a.earliest_requested_at.cmp(&b.earliest_requested_at))
            .then(a.route.cmp(&b.route))
    });
    groups
}

/// Read-side view over the hail store. Holds no state of its own, so every
/// call reflects the store as it is now.
#[derive(Clone)]
pub struct DemandAggregator {
    hails: Arc<dyn HailStore>,
}

impl DemandAggregator {
    pub fn new(hails: Arc<dyn HailStore>) -> Self {
        Self { hails }
    }

    pub async fn pending_groups(&self, threshold: usize) -> DispatchResult<Vec<DemandGroup>> {
        let grouped = self.hails.list_pending_grouped_by_route().await?;
        Ok(rank_groups(grouped, threshold))
    }

    /// Current group for one route regardless of size.
    pub async fn group_for(&self, route: RouteKey) -> DispatchResult<Option<DemandGroup>> {
        let members = self.hails.list_pending_for_route(route).await?;
        Ok(DemandGroup::from_members(route, members))
    }
}
