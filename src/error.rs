use std::{io, net::SocketAddr, path::PathBuf};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid supergraph config: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("failed to parse schema for subgraph {subgraph}: {message}")]
    SchemaParse { subgraph: String, message: String },

    #[error("failed to parse query: {0}")]
    QueryParse(String),

    #[error("no subgraph serves field `{field}` on type `{parent}`")]
    UnknownField { parent: String, field: String },

    #[error("unknown fragment `{0}`")]
    UnknownFragment(String),

    #[error("subscriptions are not served by any subgraph")]
    UnsupportedOperation,

    #[error("duplicate {typename} id `{id}` in seed data")]
    DuplicateId { typename: &'static str, id: String },

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to install log subscriber: {0}")]
    Telemetry(String),
}
