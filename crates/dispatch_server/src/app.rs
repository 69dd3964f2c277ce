//! Process wiring: collaborators, routing provider and the dispatch service.

use std::sync::Arc;

use dispatch_core::clock::SystemClock;
use dispatch_core::config::DispatchConfig;
use dispatch_core::eta::build_routing_provider;
use dispatch_core::hails::{HailStore, InMemoryHailStore};
use dispatch_core::registry::{InMemoryRegistry, RegistrySeed};
use dispatch_core::{Collaborators, DispatchService};
use tracing::{info, warn};

use crate::cli::Cli;

pub async fn build_service(cli: &Cli) -> anyhow::Result<DispatchService> {
    let config = cli.dispatch_config()?;
    let seed = cli.registry_seed()?;
    if seed.terminals.is_empty() {
        warn!("registry seed has no terminals; every hail will be rejected");
    }
    let hails = hail_store(cli.database_url.as_deref(), &config).await?;
    assemble(config, seed, hails)
}

/// Service over an in-memory registry built from `seed`.
pub fn assemble(
    config: DispatchConfig,
    seed: RegistrySeed,
    hails: Arc<dyn HailStore>,
) -> anyhow::Result<DispatchService> {
    let registry = Arc::new(InMemoryRegistry::from_seed(seed)?);
    let routing = build_routing_provider(&config.eta)?;
    info!(
        threshold = config.dispatch_threshold,
        provider = ?config.eta.provider,
        "dispatch service configured"
    );

    let collaborators = Collaborators {
        hails,
        terminals: registry.clone(),
        routes: registry.clone(),
        fleet: registry.clone(),
        positions: registry,
        clock: Arc::new(SystemClock),
    };
    Ok(DispatchService::new(config, collaborators, routing))
}

#[cfg(feature = "postgres")]
async fn hail_store(
    database_url: Option<&str>,
    config: &DispatchConfig,
) -> anyhow::Result<Arc<dyn HailStore>> {
    use dispatch_core::hails::PgHailStore;

    match database_url {
        Some(url) => {
            let store = PgHailStore::connect(url, config.duplicate_window).await?;
            info!("hail store: postgres");
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryHailStore::new(config.duplicate_window))),
    }
}

#[cfg(not(feature = "postgres"))]
async fn hail_store(
    database_url: Option<&str>,
    config: &DispatchConfig,
) -> anyhow::Result<Arc<dyn HailStore>> {
    if database_url.is_some() {
        anyhow::bail!("DATABASE_URL is set but this build has no postgres support");
    }
    info!("hail store: in-memory");
    Ok(Arc::new(InMemoryHailStore::new(config.duplicate_window)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_core::test_helpers::{fixed_start, sample_seed};

    #[tokio::test]
    async fn assembles_over_the_sample_network() {
        let service = assemble(
            DispatchConfig::default(),
            sample_seed(fixed_start()),
            Arc::new(InMemoryHailStore::default()),
        )
        .expect("service");
        assert_eq!(service.terminals().await.expect("terminals").len(), 4);
    }

    #[test]
    fn dangling_route_in_seed_is_rejected() {
        let mut seed = sample_seed(fixed_start());
        seed.terminals.retain(|t| t.name != "Airport");
        let result = assemble(
            DispatchConfig::default(),
            seed,
            Arc::new(InMemoryHailStore::default()),
        );
        assert!(result.is_err());
    }
}
