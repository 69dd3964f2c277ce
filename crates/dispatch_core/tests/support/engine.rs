#![allow(dead_code)]

use std::sync::Arc;

use dispatch_core::config::DispatchConfig;
use dispatch_core::eta::{RoutingProvider, StraightLineProvider};
use dispatch_core::hails::{HailStore, NewHail};
use dispatch_core::model::{HailId, RequesterId, RouteKey, TerminalId};
use dispatch_core::test_helpers::{fixed_start, requester, test_engine, TestEngine};

/// Builder for a wired engine over the sample network.
#[derive(Default)]
pub struct EngineBuilder {
    config: DispatchConfig,
    routing: Option<Arc<dyn RoutingProvider>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.config = self.config.with_dispatch_threshold(threshold);
        self
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_routing(mut self, routing: Arc<dyn RoutingProvider>) -> Self {
        self.routing = Some(routing);
        self
    }

    pub fn build(self) -> TestEngine {
        let routing = self.routing.unwrap_or_else(|| {
            Arc::new(StraightLineProvider::new(40.0).expect("valid speed"))
        });
        test_engine(self.config, routing)
    }
}

/// Create one pending hail per requester `first..first + count` on `route`.
pub async fn seed_hails(
    engine: &TestEngine,
    route: RouteKey,
    first: u128,
    count: u128,
) -> Vec<HailId> {
    let mut ids = Vec::with_capacity(count as usize);
    for n in first..first + count {
        let hail = engine
            .hails
            .create(
                NewHail {
                    requester_id: requester(n),
                    origin_id: route.origin,
                    destination_id: route.destination,
                },
                fixed_start(),
            )
            .await
            .expect("seed hail");
        ids.push(hail.id);
    }
    ids
}

pub fn route(origin: TerminalId, destination: TerminalId) -> RouteKey {
    RouteKey::new(origin, destination)
}

pub fn passenger(n: u128) -> RequesterId {
    requester(n)
}
