//! Postgres-backed hail store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

use super::{HailStore, NewHail};
use crate::config::DuplicateWindow;
use crate::error::{DispatchError, DispatchResult};
use crate::model::{
    HailId, HailRequest, HailState, RequesterId, RouteKey, TerminalId, VehicleId,
};

const SCHEMA: [&str; 2] = [
    "CREATE TABLE IF NOT EXISTS hail_requests (
        id UUID PRIMARY KEY,
        requester_id UUID NOT NULL,
        origin_id UUID NOT NULL,
        destination_id UUID NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        status TEXT NOT NULL DEFAULT 'PENDING',
        assigned_vehicle_id UUID,
        assigned_at TIMESTAMPTZ,
        cancelled_at TIMESTAMPTZ,
        CHECK (origin_id <> destination_id)
    )",
    "CREATE INDEX IF NOT EXISTS hail_requests_pending_route
        ON hail_requests (origin_id, destination_id, created_at)
        WHERE status = 'PENDING'",
];

const COLUMNS: &str = "id, requester_id, origin_id, destination_id, created_at, status, \
                       assigned_vehicle_id, assigned_at, cancelled_at";

fn storage(err: sqlx::Error) -> DispatchError {
    DispatchError::Storage(err.to_string())
}

fn state_name(state: HailState) -> &'static str {
    match state {
        HailState::Pending => "PENDING",
        HailState::Assigned => "ASSIGNED",
        HailState::Cancelled => "CANCELLED",
    }
}

fn parse_state(raw: &str) -> DispatchResult<HailState> {
    match raw {
        "PENDING" => Ok(HailState::Pending),
        "ASSIGNED" => Ok(HailState::Assigned),
        "CANCELLED" => Ok(HailState::Cancelled),
        other => Err(DispatchError::Storage(format!("unknown hail status '{other}'"))),
    }
}

fn hail_from_row(row: &PgRow) -> DispatchResult<HailRequest> {
    let status: String = row.try_get("status").map_err(storage)?;
    Ok(HailRequest {
        id: HailId(row.try_get("id").map_err(storage)?),
        requester_id: RequesterId(row.try_get("requester_id").map_err(storage)?),
        origin_id: TerminalId(row.try_get("origin_id").map_err(storage)?),
        destination_id: TerminalId(row.try_get("destination_id").map_err(storage)?),
        created_at: row.try_get("created_at").map_err(storage)?,
        state: parse_state(&status)?,
        assigned_vehicle_id: row
            .try_get::<Option<Uuid>, _>("assigned_vehicle_id")
            .map_err(storage)?
            .map(VehicleId),
        assigned_at: row.try_get("assigned_at").map_err(storage)?,
        cancelled_at: row.try_get("cancelled_at").map_err(storage)?,
    })
}

fn hails_from_rows(rows: &[PgRow]) -> DispatchResult<Vec<HailRequest>> {
    rows.iter().map(hail_from_row).collect()
}

/// Hail store on a shared Postgres pool. The state-changing statements are
/// conditional on `status = 'PENDING'`, so the database arbitrates races.
#[derive(Debug, Clone)]
pub struct PgHailStore {
    pool: PgPool,
    window: DuplicateWindow,
}

impl PgHailStore {
    pub fn new(pool: PgPool, window: DuplicateWindow) -> Self {
        Self { pool, window }
    }

    /// Connect and make sure the table exists.
    pub async fn connect(url: &str, window: DuplicateWindow) -> DispatchResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(storage)?;
        let store = Self::new(pool, window);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> DispatchResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(storage)?;
        }
        Ok(())
    }

    async fn fetch(&self, sql: &str, bind: Option<Uuid>) -> DispatchResult<Vec<HailRequest>> {
        let mut query = sqlx::query(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(storage)?;
        hails_from_rows(&rows)
    }
}

#[async_trait]
impl HailStore for PgHailStore {
    async fn create(&self, hail: NewHail, at: DateTime<Utc>) -> DispatchResult<HailRequest> {
        if hail.origin_id == hail.destination_id {
            return Err(DispatchError::InvalidRoute);
        }

        let mut tx = self.pool.begin().await.map_err(storage)?;
        // Serialises concurrent creates by the same requester until commit.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text))")
            .bind(hail.requester_id.0)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM hail_requests
             WHERE requester_id = $1 AND origin_id = $2 AND destination_id = $3
               AND status = 'PENDING'
             ORDER BY created_at DESC"
        ))
        .bind(hail.requester_id.0)
        .bind(hail.origin_id.0)
        .bind(hail.destination_id.0)
        .fetch_all(&mut *tx)
        .await
        .map_err(storage)?;

        for existing in hails_from_rows(&rows)? {
            if self.window.covers(existing.created_at, at) {
                return Err(DispatchError::DuplicateRequest {
                    existing: existing.id,
                });
            }
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
        sqlx::query(
            "INSERT INTO hail_requests (id, requester_id, origin_id, destination_id, created_at, status)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(request.id.0)
        .bind(request.requester_id.0)
        .bind(request.origin_id.0)
        .bind(request.destination_id.0)
        .bind(request.created_at)
        .bind(state_name(request.state))
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        tx.commit().await.map_err(storage)?;
        Ok(request)
    }

    async fn get(&self, id: HailId) -> DispatchResult<Option<HailRequest>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM hail_requests WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.as_ref().map(hail_from_row).transpose()
    }

    async fn list_by_requester(&self, requester: RequesterId) -> DispatchResult<Vec<HailRequest>> {
        self.fetch(
            &format!(
                "SELECT {COLUMNS} FROM hail_requests WHERE requester_id = $1
                 ORDER BY created_at DESC"
            ),
            Some(requester.0),
        )
        .await
    }

    async fn list_pending_by_requester(
        &self,
        requester: RequesterId,
    ) -> DispatchResult<Vec<HailRequest>> {
        self.fetch(
            &format!(
                "SELECT {COLUMNS} FROM hail_requests
                 WHERE requester_id = $1 AND status = 'PENDING'
                 ORDER BY created_at ASC"
            ),
            Some(requester.0),
        )
        .await
    }

    async fn list_pending_grouped_by_route(
        &self,
    ) -> DispatchResult<BTreeMap<RouteKey, Vec<HailRequest>>> {
        let pending = self
            .fetch(
                &format!(
                    "SELECT {COLUMNS} FROM hail_requests WHERE status = 'PENDING'
                     ORDER BY created_at ASC"
                ),
                None,
            )
            .await?;
        let mut groups: BTreeMap<RouteKey, Vec<HailRequest>> = BTreeMap::new();
        for hail in pending {
            groups.entry(hail.route_key()).or_default().push(hail);
        }
        Ok(groups)
    }

    async fn list_pending_for_route(&self, route: RouteKey) -> DispatchResult<Vec<HailRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM hail_requests
             WHERE origin_id = $1 AND destination_id = $2 AND status = 'PENDING'
             ORDER BY created_at ASC"
        ))
        .bind(route.origin.0)
        .bind(route.destination.0)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        hails_from_rows(&rows)
    }

    async fn transition_to_assigned(
        &self,
        ids: &[HailId],
        vehicle: VehicleId,
        at: DateTime<Utc>,
    ) -> DispatchResult<Vec<HailId>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let raw: Vec<Uuid> = ids.iter().map(|id| id.0).collect();
        let rows = sqlx::query(
            "UPDATE hail_requests
             SET status = 'ASSIGNED', assigned_vehicle_id = $2, assigned_at = $3
             WHERE id = ANY($1) AND status = 'PENDING'
             RETURNING id",
        )
        .bind(&raw)
        .bind(vehicle.0)
        .bind(at)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let changed: std::collections::HashSet<Uuid> = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<Result<_, _>>()
            .map_err(storage)?;

        // Report in caller order, each id once.
        let mut seen = std::collections::HashSet::new();
        Ok(ids
            .iter()
            .copied()
            .filter(|id| changed.contains(&id.0) && seen.insert(*id))
            .collect())
    }

    async fn cancel(
        &self,
        id: HailId,
        requester: RequesterId,
        at: DateTime<Utc>,
    ) -> DispatchResult<HailRequest> {
        let updated = sqlx::query(&format!(
            "UPDATE hail_requests SET status = 'CANCELLED', cancelled_at = $3
             WHERE id = $1 AND requester_id = $2 AND status = 'PENDING'
             RETURNING {COLUMNS}"
        ))
        .bind(id.0)
        .bind(requester.0)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        if let Some(row) = updated {
            return hail_from_row(&row);
        }
        match self.get(id).await? {
            Some(hail) if hail.requester_id == requester => Err(DispatchError::HailNotPending(id)),
            _ => Err(DispatchError::not_found("hail", id)),
        }
    }
}

/// Run with `DATABASE_URL` pointing at a scratch database and `--ignored`.
/// Each test uses fresh terminal ids so runs never see each other's rows.
#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::Duration;

    use super::*;
    use crate::test_helpers::{fixed_start, BUS_MID, BUS_NEAR};

    async fn store(window: DuplicateWindow) -> Option<PgHailStore> {
        let url = std::env::var("DATABASE_URL").ok()?;
        Some(PgHailStore::connect(&url, window).await.expect("connect"))
    }

    fn fresh_route() -> RouteKey {
        RouteKey::new(TerminalId::new_v4(), TerminalId::new_v4())
    }

    fn hail(requester: RequesterId, route: RouteKey) -> NewHail {
        NewHail {
            requester_id: requester,
            origin_id: route.origin,
            destination_id: route.destination,
        }
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn duplicate_inside_rolling_window_is_rejected() {
        let Some(store) = store(DuplicateWindow::Rolling { secs: 15 * 60 }).await else {
            return;
        };
        let route = fresh_route();
        let rider = RequesterId::new_v4();

        let first = store.create(hail(rider, route), fixed_start()).await.expect("first");
        let err = store
            .create(hail(rider, route), fixed_start() + Duration::minutes(10))
            .await
            .expect_err("duplicate");
        assert_eq!(err, DispatchError::DuplicateRequest { existing: first.id });

        store
            .create(hail(rider, route), fixed_start() + Duration::minutes(16))
            .await
            .expect("window elapsed");
        store
            .create(hail(RequesterId::new_v4(), route), fixed_start())
            .await
            .expect("other requester");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "needs DATABASE_URL"]
    async fn concurrent_duplicate_creates_admit_one() {
        let Some(store) = store(DuplicateWindow::default()).await else {
            return;
        };
        let route = fresh_route();
        let rider = RequesterId::new_v4();

        let attempts: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.create(hail(rider, route), fixed_start()).await })
            })
            .collect();
        let mut created = 0;
        for attempt in attempts {
            match attempt.await.expect("join") {
                Ok(_) => created += 1,
                Err(err) => assert!(matches!(err, DispatchError::DuplicateRequest { .. })),
            }
        }
        assert_eq!(created, 1);
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn transition_skips_non_pending_and_dedupes_ids() {
        let Some(store) = store(DuplicateWindow::default()).await else {
            return;
        };
        let route = fresh_route();
        let riders: Vec<RequesterId> = (0..3).map(|_| RequesterId::new_v4()).collect();
        let mut ids = Vec::new();
        for rider in &riders {
            ids.push(store.create(hail(*rider, route), fixed_start()).await.expect("create").id);
        }
        store.cancel(ids[1], riders[1], fixed_start()).await.expect("cancel");

        let request = [ids[0], ids[1], ids[2], ids[0], HailId::new_v4()];
        let moved = store
            .transition_to_assigned(&request, BUS_NEAR, fixed_start())
            .await
            .expect("transition");
        assert_eq!(moved, vec![ids[0], ids[2]]);

        let again = store
            .transition_to_assigned(&request, BUS_MID, fixed_start())
            .await
            .expect("transition");
        assert!(again.is_empty());

        let row = store.get(ids[0]).await.expect("get").expect("row");
        assert_eq!(row.state, HailState::Assigned);
        assert_eq!(row.assigned_vehicle_id, Some(BUS_NEAR));
        assert!(store.list_pending_for_route(route).await.expect("pending").is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "needs DATABASE_URL"]
    async fn overlapping_transitions_never_claim_a_hail_twice() {
        let Some(store) = store(DuplicateWindow::default()).await else {
            return;
        };
        let route = fresh_route();
        let mut ids = Vec::new();
        for _ in 0..10 {
            let created = store
                .create(hail(RequesterId::new_v4(), route), fixed_start())
                .await
                .expect("create");
            ids.push(created.id);
        }

        let claims: Vec<_> = (0..4)
            .map(|worker| {
                let store = store.clone();
                let mut batch = ids.clone();
                batch.rotate_left(worker * 3);
                tokio::spawn(async move {
                    store
                        .transition_to_assigned(&batch, BUS_NEAR, fixed_start())
                        .await
                        .expect("transition")
                })
            })
            .collect();

        let mut claimed = HashSet::new();
        for claim in claims {
            for id in claim.await.expect("join") {
                assert!(claimed.insert(id), "hail {id} claimed twice");
            }
        }
        assert_eq!(claimed, ids.into_iter().collect::<HashSet<_>>());
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn cancel_checks_owner_and_state() {
        let Some(store) = store(DuplicateWindow::default()).await else {
            return;
        };
        let route = fresh_route();
        let owner = RequesterId::new_v4();
        let mine = store.create(hail(owner, route), fixed_start()).await.expect("create");

        let err = store
            .cancel(mine.id, RequesterId::new_v4(), fixed_start())
            .await
            .expect_err("not owner");
        assert!(matches!(err, DispatchError::NotFound { kind: "hail", .. }));

        let cancelled = store.cancel(mine.id, owner, fixed_start()).await.expect("cancel");
        assert_eq!(cancelled.state, HailState::Cancelled);
        assert_eq!(cancelled.cancelled_at, Some(fixed_start()));

        let err = store
            .cancel(mine.id, owner, fixed_start())
            .await
            .expect_err("already cancelled");
        assert_eq!(err, DispatchError::HailNotPending(mine.id));
    }
}
