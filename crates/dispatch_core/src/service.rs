//! Entry point composing the engine components over injected collaborators.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::assignment::{AssignmentEngine, AssignmentResult};
use crate::clock::Clock;
use crate::config::DispatchConfig;
use crate::demand::{DemandAggregator, DemandGroup};
use crate::error::{DispatchError, DispatchResult};
use crate::eta::{EtaEnricher, RoutingProvider};
use crate::hails::{HailStore, NewHail};
use crate::model::{
    HailId, HailRequest, HailState, RequesterId, RouteKey, Terminal, TerminalId, VehicleId,
    VehiclePosition,
};
use crate::proximity::{ActiveBus, NearbyBuses, NearbyQuery, ProximitySearchService};
use crate::registry::{FleetRegistry, PositionFeed, RouteRegistry, TerminalRegistry};
use crate::requests::{check_recorded_at, AssignCommand};

/// Handles to the stores and registries the engine talks to. The process
/// entry point owns their lifecycle.
#[derive(Clone)]
pub struct Collaborators {
    pub hails: Arc<dyn HailStore>,
    pub terminals: Arc<dyn TerminalRegistry>,
    pub routes: Arc<dyn RouteRegistry>,
    pub fleet: Arc<dyn FleetRegistry>,
    pub positions: Arc<dyn PositionFeed>,
    pub clock: Arc<dyn Clock>,
}

/// Hail record joined with terminal names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HailView {
    pub id: HailId,
    pub requester_id: RequesterId,
    pub origin_id: TerminalId,
    pub origin_name: Option<String>,
    pub destination_id: TerminalId,
    pub destination_name: Option<String>,
    pub state: HailState,
    pub created_at: DateTime<Utc>,
    pub assigned_vehicle_id: Option<VehicleId>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemandGroupView {
    pub origin_id: TerminalId,
    pub origin_name: Option<String>,
    pub destination_id: TerminalId,
    pub destination_name: Option<String>,
    pub count: usize,
    pub earliest_requested_at: DateTime<Utc>,
    pub hail_ids: Vec<HailId>,
}

type TerminalNames = HashMap<TerminalId, String>;

#[derive(Clone)]
pub struct DispatchService {
    config: DispatchConfig,
    hails: Arc<dyn HailStore>,
    terminals: Arc<dyn TerminalRegistry>,
    positions: Arc<dyn PositionFeed>,
    clock: Arc<dyn Clock>,
    demand: DemandAggregator,
    assignment: AssignmentEngine,
    proximity: ProximitySearchService,
}

impl DispatchService {
    pub fn new(
        config: DispatchConfig,
        collaborators: Collaborators,
        routing: Arc<dyn RoutingProvider>,
    ) -> Self {
        let Collaborators {
            hails,
            terminals,
            routes,
            fleet,
            positions,
            clock,
        } = collaborators;

        let enricher = EtaEnricher::from_config(routing, &config.eta);
        let proximity = ProximitySearchService::new(
            terminals.clone(),
            routes,
            fleet.clone(),
            positions.clone(),
            enricher,
            clock.clone(),
            config.position_freshness(),
        );
        Self {
            demand: DemandAggregator::new(hails.clone()),
            assignment: AssignmentEngine::new(hails.clone(), fleet, clock.clone()),
            proximity,
            config,
            hails,
            terminals,
            positions,
            clock,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Record a new PENDING hail for `requester` between two known terminals.
    pub async fn request_hail(
        &self,
        requester: RequesterId,
        route: RouteKey,
    ) -> DispatchResult<HailView> {
        if route.origin == route.destination {
            return Err(DispatchError::InvalidRoute);
        }
        let mut names = TerminalNames::new();
        for id in [route.origin, route.destination] {
            let terminal = self
                .terminals
                .get_terminal(id)
                .await?
                .ok_or_else(|| DispatchError::not_found("terminal", id))?;
            names.insert(terminal.id, terminal.name);
        }

        let hail = self
            .hails
            .create(
                NewHail {
                    requester_id: requester,
                    origin_id: route.origin,
                    destination_id: route.destination,
                },
                self.clock.now(),
            )
            .await?;
        info!(hail_id = %hail.id, requester_id = %requester, %route, "hail created");
        Ok(hail_view(hail, &names))
    }

    /// The requester's hails in every state, newest first.
    pub async fn my_hails(&self, requester: RequesterId) -> DispatchResult<Vec<HailView>> {
        let hails = self.hails.list_by_requester(requester).await?;
        let names = self
            .terminal_names(hails.iter().flat_map(|h| [h.origin_id, h.destination_id]))
            .await?;
        Ok(hails.into_iter().map(|h| hail_view(h, &names)).collect())
    }

    pub async fn cancel_hail(
        &self,
        requester: RequesterId,
        hail_id: HailId,
    ) -> DispatchResult<HailView> {
        let hail = self.hails.cancel(hail_id, requester, self.clock.now()).await?;
        info!(%hail_id, requester_id = %requester, "hail cancelled");
        let names = self.terminal_names([hail.origin_id, hail.destination_id]).await?;
        Ok(hail_view(hail, &names))
    }

    /// Demand groups at or above `threshold` (config default when `None`).
    pub async fn pending_groups(
        &self,
        threshold: Option<usize>,
    ) -> DispatchResult<Vec<DemandGroupView>> {
        let threshold = threshold.unwrap_or(self.config.dispatch_threshold);
        let groups = self.demand.pending_groups(threshold).await?;
        let names = self
            .terminal_names(groups.iter().flat_map(|g| [g.route.origin, g.route.destination]))
            .await?;
        Ok(groups.into_iter().map(|g| group_view(g, &names)).collect())
    }

    pub async fn assign_group(&self, command: AssignCommand) -> DispatchResult<AssignmentResult> {
        self.assignment
            .assign_group(command.route, command.vehicle_id)
            .await
    }

    pub async fn assign_hail(
        &self,
        hail_id: HailId,
        vehicle_id: VehicleId,
    ) -> DispatchResult<AssignmentResult> {
        self.assignment.assign_hail(hail_id, vehicle_id).await
    }

    pub async fn find_buses(&self, query: &NearbyQuery) -> DispatchResult<NearbyBuses> {
        self.proximity.find_buses(query).await
    }

    pub async fn active_buses(&self) -> DispatchResult<Vec<ActiveBus>> {
        self.proximity.active_buses().await
    }

    pub async fn record_position(&self, position: VehiclePosition) -> DispatchResult<()> {
        check_recorded_at(position.recorded_at, self.clock.now())?;
        self.positions.record_position(position).await
    }

    pub async fn terminals(&self) -> DispatchResult<Vec<Terminal>> {
        self.terminals.list_terminals().await
    }

    async fn terminal_names(
        &self,
        ids: impl IntoIterator<Item = TerminalId>,
    ) -> DispatchResult<TerminalNames> {
        let mut wanted: Vec<TerminalId> = ids.into_iter().collect();
        wanted.sort();
        wanted.dedup();

        let mut names = TerminalNames::with_capacity(wanted.len());
        for id in wanted {
            if let Some(terminal) = self.terminals.get_terminal(id).await? {
                names.insert(id, terminal.name);
            }
        }
        Ok(names)
    }
}

fn hail_view(hail: HailRequest, names: &TerminalNames) -> HailView {
    HailView {
        id: hail.id,
        requester_id: hail.requester_id,
        origin_id: hail.origin_id,
        origin_name: names.get(&hail.origin_id).cloned(),
        destination_id: hail.destination_id,
        destination_name: names.get(&hail.destination_id).cloned(),
        state: hail.state,
        created_at: hail.created_at,
        assigned_vehicle_id: hail.assigned_vehicle_id,
        assigned_at: hail.assigned_at,
        cancelled_at: hail.cancelled_at,
    }
}

fn group_view(group: DemandGroup, names: &TerminalNames) -> DemandGroupView {
    DemandGroupView {
        origin_id: group.route.origin,
        origin_name: names.get(&group.route.origin).cloned(),
        destination_id: group.route.destination,
        destination_name: names.get(&group.route.destination).cloned(),
        count: group.count,
        earliest_requested_at: group.earliest_requested_at,
        hail_ids: group.members.iter().map(|h| h.id).collect(),
    }
}
