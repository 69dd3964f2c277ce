use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{HailStore, NewHail};
use crate::config::DuplicateWindow;
use crate::error::{lock_table, DispatchError, DispatchResult};
use crate::model::{HailId, HailRequest, HailState, RequesterId, RouteKey, VehicleId};

#[derive(Debug, Default)]
struct HailTable {
    /// Insertion order.
    rows: Vec<HailRequest>,
    index: HashMap<HailId, usize>,
}

impl HailTable {
    fn pending(&self) -> impl Iterator<Item = &HailRequest> {
        self.rows.iter().filter(|h| h.is_pending())
    }

    fn row_mut(&mut self, id: &HailId) -> Option<&mut HailRequest> {
        let slot = *self.index.get(id)?;
        self.rows.get_mut(slot)
    }
}

fn oldest_first(mut hails: Vec<HailRequest>) -> Vec<HailRequest> {
    hails.sort_by_key(|h| h.created_at);
    hails
}

/// Single-process hail store. Every operation runs under one table lock.
#[derive(Debug)]
pub struct InMemoryHailStore {
    window: DuplicateWindow,
    table: Mutex<HailTable>,
}

impl InMemoryHailStore {
    pub fn new(window: DuplicateWindow) -> Self {
        Self {
            window,
            table: Mutex::new(HailTable::default()),
        }
    }

    pub fn len(&self) -> DispatchResult<usize> {
        Ok(lock_table(&self.table, "hail")?.rows.len())
    }

    pub fn is_empty(&self) -> DispatchResult<bool> {
        self.len().map(|n| n == 0)
    }
}

impl Default for InMemoryHailStore {
    fn default() -> Self {
        Self::new(DuplicateWindow::default())
    }
}

#[async_trait]
impl HailStore for InMemoryHailStore {
    async fn create(&self, hail: NewHail, at: DateTime<Utc>) -> DispatchResult<HailRequest> {
        if hail.origin_id == hail.destination_id {
            return Err(DispatchError::InvalidRoute);
        }

        let mut table = lock_table(&self.table, "hail")?;
        let route = hail.route_key();
        let duplicate = table.pending().find(|existing| {
            existing.requester_id == hail.requester_id
                && existing.route_key() == route
                && self.window.covers(existing.created_at, at)
        });
        if let Some(existing) = duplicate {
            return Err(DispatchError::DuplicateRequest {
                existing: existing.id,
            });
        }

        let request = HailRequest {
            id: HailId::new_v4(),
            requester_id: hail.requester_id,
            origin_id: hail.origin_id,
            destination_id: hail.destination_id,
            created_at: at,
            state: HailState::Pending,
            assigned_vehicle_id: None,
            assigned_at: None,
            cancelled_at: None,
        };
        let slot = table.rows.len();
        table.index.insert(request.id, slot);
        table.rows.push(request.clone());
        Ok(request)
    }

    async fn get(&self, id: HailId) -> DispatchResult<Option<HailRequest>> {
        let table = lock_table(&self.table, "hail")?;
        Ok(table
            .index
            .get(&id)
            .and_then(|slot| table.rows.get(*slot))
            .cloned())
    }

    async fn list_by_requester(&self, requester: RequesterId) -> DispatchResult<Vec<HailRequest>> {
        let table = lock_table(&self.table, "hail")?;
        let mut hails: Vec<HailRequest> = table
            .rows
            .iter()
            .rev()
            .filter(|h| h.requester_id == requester)
            .cloned()
            .collect();
        hails.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(hails)
    }

    async fn list_pending_by_requester(
        &self,
        requester: RequesterId,
    ) -> DispatchResult<Vec<HailRequest>> {
        let table = lock_table(&self.table, "hail")?;
        Ok(oldest_first(
            table
                .pending()
                .filter(|h| h.requester_id == requester)
                .cloned()
                .collect(),
        ))
    }

    async fn list_pending_grouped_by_route(
        &self,
    ) -> DispatchResult<BTreeMap<RouteKey, Vec<HailRequest>>> {
        let table = lock_table(&self.table, "hail")?;
        let mut groups: BTreeMap<RouteKey, Vec<HailRequest>> = BTreeMap::new();
        for hail in table.pending() {
            groups.entry(hail.route_key()).or_default().push(hail.clone());
        }
        Ok(groups
            .into_iter()
            .map(|(route, members)| (route, oldest_first(members)))
            .collect())
    }

    async fn list_pending_for_route(&self, route: RouteKey) -> DispatchResult<Vec<HailRequest>> {
        let table = lock_table(&self.table, "hail")?;
        Ok(oldest_first(
            table
                .pending()
                .filter(|h| h.route_key() == route)
                .cloned()
                .collect(),
        ))
    }

    async fn transition_to_assigned(
        &self,
        ids: &[HailId],
        vehicle: VehicleId,
        at: DateTime<Utc>,
    ) -> DispatchResult<Vec<HailId>> {
        let mut table = lock_table(&self.table, "hail")?;
        let mut seen = HashSet::with_capacity(ids.len());
        let mut transitioned = Vec::with_capacity(ids.len());

        for id in ids {
            if !seen.insert(*id) {
                continue;
            }
            let Some(row) = table.row_mut(id) else {
                continue;
            };
            if !row.is_pending() {
                continue;
            }
            row.state = HailState::Assigned;
            row.assigned_vehicle_id = Some(vehicle);
            row.assigned_at = Some(at);
            transitioned.push(*id);
        }
        Ok(transitioned)
    }

    async fn cancel(
        &self,
        id: HailId,
        requester: RequesterId,
        at: DateTime<Utc>,
    ) -> DispatchResult<HailRequest> {
        let mut table = lock_table(&self.table, "hail")?;
        let row = table
            .row_mut(&id)
            .filter(|row| row.requester_id == requester)
            .ok_or_else(|| DispatchError::not_found("hail", id))?;
        if !row.is_pending() {
            return Err(DispatchError::HailNotPending(id));
        }
        row.state = HailState::Cancelled;
        row.cancelled_at = Some(at);
        Ok(row.clone())
    }
}
