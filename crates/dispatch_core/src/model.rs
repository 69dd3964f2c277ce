//! Records shared across the dispatch engine: identifiers, terminals, routes,
//! vehicles, position readings and hail requests.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::Coordinate;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }

            pub const fn from_u128(value: u128) -> Self {
                Self(Uuid::from_u128(value))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(TerminalId);
uuid_id!(RouteId);
uuid_id!(CompanyId);
uuid_id!(VehicleId);
uuid_id!(DriverId);
uuid_id!(HailId);
uuid_id!(
    /// Passenger identity as supplied by the session collaborator.
    RequesterId
);

/// Origin/destination pair that demand is grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RouteKey {
    pub origin: TerminalId,
    pub destination: TerminalId,
}

impl RouteKey {
    pub fn new(origin: TerminalId, destination: TerminalId) -> Self {
        Self {
            origin,
            destination,
        }
    }
}

impl std::fmt::Display for RouteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}", self.origin, self.destination)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Terminal {
    pub id: TerminalId,
    pub name: String,
    pub coordinate: Coordinate,
}

/// Operator-owned service between two terminals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub name: String,
    pub company_id: CompanyId,
    pub start_terminal_id: TerminalId,
    pub end_terminal_id: TerminalId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleStatus {
    Active,
    Inactive,
    Maintenance,
}

/// Soft, revocable marker that a vehicle is currently serving a demand group.
/// Overwritten by the next assignment and cleared on any status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServingClaim {
    pub route: RouteKey,
    pub since: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub plate_number: String,
    pub capacity: u32,
    pub status: VehicleStatus,
    #[serde(default)]
    pub driver_id: Option<DriverId>,
    pub company_id: CompanyId,
    #[serde(default)]
    pub serving: Option<ServingClaim>,
}

impl Vehicle {
    pub fn is_active(&self) -> bool {
        self.status == VehicleStatus::Active
    }
}

/// Latest location reading for a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehiclePosition {
    pub vehicle_id: VehicleId,
    pub coordinate: Coordinate,
    pub recorded_at: DateTime<Utc>,
}

impl VehiclePosition {
    /// Readings stamped slightly in the future (clock skew) count as fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now.signed_duration_since(self.recorded_at) <= window
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HailState {
    Pending,
    Assigned,
    Cancelled,
}

/// A passenger's request to travel between two terminals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HailRequest {
    pub id: HailId,
    pub requester_id: RequesterId,
    pub origin_id: TerminalId,
    pub destination_id: TerminalId,
    pub created_at: DateTime<Utc>,
    pub state: HailState,
    pub assigned_vehicle_id: Option<VehicleId>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl HailRequest {
    pub fn route_key(&self) -> RouteKey {
        RouteKey::new(self.origin_id, self.destination_id)
    }

    pub fn is_pending(&self) -> bool {
        self.state == HailState::Pending
    }
}
