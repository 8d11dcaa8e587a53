pub mod client;
pub mod config;
pub mod entity;
pub mod error;
pub mod explain;
pub mod schema_registry;
pub mod server;
pub mod store;
pub mod subgraph;
pub mod telemetry;

pub use client::HttpGraphQLClient;
pub use entity::{Entity, EntityKey, EntityRef};
pub use error::{Error, Result};
pub use schema_registry::InMemorySchemaRegistry;
pub use store::{AppendStore, EntityStore, InMemoryStore};
pub use subgraph::{Subgraph, SubgraphKind, SubgraphSettings, Viewer};

use async_graphql::Variables;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

type ServiceMap = BTreeMap<String, ServiceConfig>;

/// A subgraph known by name, routing url and schema text.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub url: String,
    pub schema: String,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl GraphQLRequest {
    pub fn new(query: impl Into<String>) -> Self {
        GraphQLRequest {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn into_request(self, viewer: Viewer) -> async_graphql::Request {
        let mut request = async_graphql::Request::new(self.query).data(viewer);
        if let Some(variables) = self.variables.filter(|v| !v.is_null()) {
            request = request.variables(Variables::from_json(variables));
        }
        if let Some(operation_name) = self.operation_name {
            request = request.operation_name(operation_name);
        }
        request
    }
}

/// Which subgraphs define each type and `Type.field`, and what each field returns.
#[derive(Clone, Debug, Default)]
pub struct FederatedSchema {
    pub services: ServiceMap,
    pub type_to_service_map: HashMap<String, Vec<String>>,
    pub field_types: HashMap<String, String>,
}
