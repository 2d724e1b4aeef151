use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::CoreError;

/// Unrounded driving estimate exactly as the routing provider returns it.
/// Must go through `RoundedDistance` before any fee arithmetic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RouteEstimate {
    pub distance_km: f64,
    pub duration_minutes: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("No route to destination: {0}")]
    UnknownDestination(String),

    #[error("Routing provider failure: {0}")]
    Provider(String),
}

impl From<RoutingError> for CoreError {
    fn from(err: RoutingError) -> Self {
        match err {
            RoutingError::UnknownDestination(dest) => {
                CoreError::ValidationError(format!("cannot route to destination {}", dest))
            }
            RoutingError::Provider(msg) => CoreError::InternalError(msg),
        }
    }
}

#[async_trait]
pub trait RoutingProvider: Send + Sync {
    async fn estimate(&self, destination: &str) -> Result<RouteEstimate, RoutingError>;
}

/// Table-backed provider for local runs and tests
#[derive(Default)]
pub struct FixedRouting {
    routes: HashMap<String, RouteEstimate>,
    fallback: Option<RouteEstimate>,
}

impl FixedRouting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, destination: &str, distance_km: f64) -> Self {
        self.routes.insert(
            destination.to_string(),
            RouteEstimate {
                distance_km,
                // ~60 km/h average for display only
                duration_minutes: distance_km,
            },
        );
        self
    }

    pub fn with_fallback(mut self, distance_km: f64) -> Self {
        self.fallback = Some(RouteEstimate { distance_km, duration_minutes: distance_km });
        self
    }
}

#[async_trait]
impl RoutingProvider for FixedRouting {
    async fn estimate(&self, destination: &str) -> Result<RouteEstimate, RoutingError> {
        self.routes
            .get(destination)
            .copied()
            .or(self.fallback)
            .ok_or_else(|| RoutingError::UnknownDestination(destination.to_string()))
    }
}
