use futures::future::join_all;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::GraphQLRequest;
use crate::error::{Error, Result};
use crate::server::VIEWER_HEADER;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A service to check, with the query used to check it.
#[derive(Clone, Debug)]
pub struct ProbeTarget {
    pub name: String,
    pub url: String,
    pub query: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServiceState {
    Online,
    Offline(String),
}

#[derive(Clone, Debug)]
pub struct ServiceStatus {
    pub name: String,
    pub url: String,
    pub state: ServiceState,
}

impl ServiceStatus {
    pub fn is_online(&self) -> bool {
        self.state == ServiceState::Online
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            ServiceState::Online => write!(f, "{:<8} online   {}", self.name, self.url),
            ServiceState::Offline(reason) => {
                write!(f, "{:<8} offline  {} ({reason})", self.name, self.url)
            }
        }
    }
}

pub struct HttpGraphQLClient {
    client: reqwest::Client,
}

impl HttpGraphQLClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::Client)?;
        Ok(HttpGraphQLClient { client })
    }

    /// Posts one GraphQL request and returns the decoded response body.
    /// GraphQL-level errors stay inside the returned JSON.
    pub async fn execute(
        &self,
        url: &str,
        request: &GraphQLRequest,
        user_id: Option<&str>,
    ) -> Result<Value> {
        let mut builder = self.client.post(url).json(request);
        if let Some(user_id) = user_id {
            builder = builder.header(VIEWER_HEADER, user_id);
        }

        let http_error = |source| Error::Http {
            url: url.to_string(),
            source,
        };
        let response = builder.send().await.map_err(http_error)?;
        response.json::<Value>().await.map_err(http_error)
    }

    async fn probe(&self, target: ProbeTarget) -> ServiceStatus {
        let request = GraphQLRequest::new(target.query.clone());
        let state = match self.client.post(&target.url).json(&request).send().await {
            Ok(response) if response.status().is_success() => ServiceState::Online,
            Ok(response) => ServiceState::Offline(format!("HTTP {}", response.status())),
            Err(e) => ServiceState::Offline(e.to_string()),
        };

        if let ServiceState::Offline(reason) = &state {
            tracing::debug!(service = %target.name, url = %target.url, %reason, "probe failed");
        }

        ServiceStatus {
            name: target.name,
            url: target.url,
            state,
        }
    }

    /// Checks every target concurrently. Never fails: an unreachable service
    /// is reported as offline.
    pub async fn probe_all(&self, targets: Vec<ProbeTarget>) -> Vec<ServiceStatus> {
        join_all(targets.into_iter().map(|target| self.probe(target))).await
    }
}
