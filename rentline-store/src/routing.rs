use async_trait::async_trait;
use rentline_core::routing::{RouteEstimate, RoutingError, RoutingProvider};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::app_config::RoutingConfig;

/// Wire format of the distance service
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DistanceResponse {
    distance_km: f64,
    duration_minutes: f64,
}

impl From<DistanceResponse> for RouteEstimate {
    fn from(response: DistanceResponse) -> Self {
        RouteEstimate {
            distance_km: response.distance_km,
            duration_minutes: response.duration_minutes,
        }
    }
}

/// Routing provider over HTTP: `GET {base_url}/distance?destination=...`
pub struct HttpRouting {
    client: Client,
    base_url: String,
}

impl HttpRouting {
    pub fn new(config: &RoutingConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RoutingProvider for HttpRouting {
    #[instrument(skip(self))]
    async fn estimate(&self, destination: &str) -> Result<RouteEstimate, RoutingError> {
        let url = format!("{}/distance", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("destination", destination)])
            .send()
            .await
            .map_err(|e| RoutingError::Provider(format!("distance request failed: {}", e)))?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
                return Err(RoutingError::UnknownDestination(destination.to_string()))
            }
            status if !status.is_success() => {
                return Err(RoutingError::Provider(format!("distance service returned {}", status)))
            }
            _ => {}
        }

        let body: DistanceResponse = response
            .json()
            .await
            .map_err(|e| RoutingError::Provider(format!("malformed distance response: {}", e)))?;
        debug!("Route to {}: {} km", destination, body.distance_km);
        Ok(body.into())
    }
}
