use async_trait::async_trait;
use reqwest::{Client, Url};

use super::error::RoutingError;
use super::response::{
    parse_direction_response, parse_osrm_response, DirectionResponse, OsrmRouteResponse,
};
use super::{RoadRoute, RoutingProvider};
use crate::config::ApiKey;
use crate::geo::Coordinate;

fn build_url(raw: &str) -> Result<Url, RoutingError> {
    Url::parse(raw).map_err(|err| RoutingError::Config(format!("bad routing URL '{raw}': {err}")))
}

async fn fetch_json<T: serde::de::DeserializeOwned>(
    client: &Client,
    url: Url,
) -> Result<T, RoutingError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(RoutingError::Status(status.as_u16()));
    }
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|err| RoutingError::Payload(err.to_string()))
}

/// Direction API client: `GET {endpoint}/api/route/direction/?origin=lat,lng&destination=lat,lng&apiKey=…`.
#[derive(Clone)]
pub struct DirectionApiProvider {
    client: Client,
    endpoint: String,
    api_key: ApiKey,
}

impl DirectionApiProvider {
    pub fn new(client: Client, endpoint: &str, api_key: ApiKey) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn url(&self, origin: Coordinate, destination: Coordinate) -> Result<Url, RoutingError> {
        let mut url = build_url(&format!("{}/api/route/direction/", self.endpoint))?;
        url.query_pairs_mut()
            .append_pair("origin", &format!("{},{}", origin.lat, origin.lng))
            .append_pair(
                "destination",
                &format!("{},{}", destination.lat, destination.lng),
            )
            .append_pair("apiKey", self.api_key.expose());
        Ok(url)
    }
}

impl std::fmt::Debug for DirectionApiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectionApiProvider")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key)
            .finish()
    }
}

#[async_trait]
impl RoutingProvider for DirectionApiProvider {
    async fn route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<RoadRoute, RoutingError> {
        let url = self.url(origin, destination)?;
        let parsed: DirectionResponse = fetch_json(&self.client, url).await?;
        parse_direction_response(parsed)
    }
}

/// OSRM client using `/route/v1/driving` without geometry.
#[derive(Debug, Clone)]
pub struct OsrmRoutingProvider {
    client: Client,
    endpoint: String,
}

impl OsrmRoutingProvider {
    pub fn new(client: Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl RoutingProvider for OsrmRoutingProvider {
    async fn route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<RoadRoute, RoutingError> {
        // OSRM wants lng,lat.
        let mut url = build_url(&format!(
            "{}/route/v1/driving/{:.6},{:.6};{:.6},{:.6}",
            self.endpoint, origin.lng, origin.lat, destination.lng, destination.lat,
        ))?;
        url.query_pairs_mut().append_pair("overview", "false");

        let parsed: OsrmRouteResponse = fetch_json(&self.client, url).await?;
        parse_osrm_response(parsed)
    }
}
