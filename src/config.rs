//! `supergraph.yaml`, the composition config handed to `rover supergraph compose`.

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use crate::ServiceConfig;
use crate::error::{Error, Result};
use crate::subgraph::SubgraphKind;

pub const FEDERATION_VERSION: &str = "=2.3.2";
pub const DEFAULT_CONFIG_PATH: &str = "supergraph.yaml";
pub const DEFAULT_ROUTER_URL: &str = "http://localhost:4000/graphql";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupergraphConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation_version: Option<String>,
    pub subgraphs: BTreeMap<String, SubgraphConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgraphConfig {
    pub routing_url: String,
    pub schema: SchemaConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub file: String,
}

impl SupergraphConfig {
    /// Every subgraph on its default port of `host`, schemas under `./schemas`.
    pub fn local(host: &str) -> Self {
        let subgraphs = SubgraphKind::ALL
            .into_iter()
            .map(|kind| {
                let config = SubgraphConfig {
                    routing_url: format!("http://{host}:{}/graphql", kind.default_port()),
                    schema: SchemaConfig {
                        file: format!("./schemas/{}.graphql", kind.name()),
                    },
                };
                (kind.name().to_string(), config)
            })
            .collect();

        SupergraphConfig {
            federation_version: Some(FEDERATION_VERSION.to_string()),
            subgraphs,
        }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "reading supergraph config");
        let contents = fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_yaml::to_string(self)?;
        fs::write(path, contents).map_err(|source| Error::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolves each subgraph's schema file relative to the config's directory.
    pub fn load_services(&self, config_path: &Path) -> Result<Vec<ServiceConfig>> {
        let config_dir = config_path.parent().unwrap_or_else(|| Path::new(""));

        self.subgraphs
            .iter()
            .map(|(name, subgraph)| {
                let schema_path = config_dir.join(&subgraph.schema.file);
                tracing::debug!(subgraph = %name, path = %schema_path.display(), "reading schema file");
                let schema = fs::read_to_string(&schema_path).map_err(|source| Error::Read {
                    path: schema_path.clone(),
                    source,
                })?;
                Ok(ServiceConfig {
                    name: name.clone(),
                    url: subgraph.routing_url.clone(),
                    schema,
                })
            })
            .collect()
    }

    pub fn schema_path(&self, config_dir: &Path, subgraph: &str) -> Option<PathBuf> {
        self.subgraphs
            .get(subgraph)
            .map(|config| config_dir.join(&config.schema.file))
    }
}
