pub mod assignment;
pub mod clock;
pub mod config;
pub mod demand;
pub mod error;
pub mod eta;
pub mod geo;
pub mod hails;
pub mod model;
pub mod proximity;
pub mod registry;
pub mod requests;
pub mod service;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use error::{DispatchError, DispatchResult, ErrorClass};
pub use service::{Collaborators, DispatchService};
