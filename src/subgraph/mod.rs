pub mod movies;
pub mod reviews;
pub mod users;

use std::fmt;
use std::sync::Arc;

use async_graphql::SDLExportOptions;
use async_trait::async_trait;

use crate::error::Result;

pub use movies::MoviesSubgraph;
pub use reviews::ReviewsSubgraph;
pub use users::UsersSubgraph;

/// A GraphQL service owning one slice of the supergraph.
#[async_trait]
pub trait Subgraph: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, request: async_graphql::Request) -> async_graphql::Response;

    /// Schema fragment with federation directives, as published through `_service`.
    fn federation_sdl(&self) -> String;

    /// Schema without federation directives.
    fn sdl(&self) -> String;
}

pub(crate) fn federation_options() -> SDLExportOptions {
    SDLExportOptions::new().federation()
}

/// Identity of the caller, taken from the `x-user-id` request header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: Option<String>,
}

impl Viewer {
    pub fn anonymous() -> Self {
        Viewer::default()
    }

    pub fn user(id: impl Into<String>) -> Self {
        Viewer {
            user_id: Some(id.into()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SubgraphSettings {
    /// Author of reviews created without a caller identity.
    pub fallback_author: String,
}

impl Default for SubgraphSettings {
    fn default() -> Self {
        SubgraphSettings {
            fallback_author: "1".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum)]
pub enum SubgraphKind {
    Users,
    Movies,
    Reviews,
}

impl SubgraphKind {
    pub const ALL: [SubgraphKind; 3] = [
        SubgraphKind::Users,
        SubgraphKind::Movies,
        SubgraphKind::Reviews,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SubgraphKind::Users => "users",
            SubgraphKind::Movies => "movies",
            SubgraphKind::Reviews => "reviews",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            SubgraphKind::Users => 4001,
            SubgraphKind::Movies => 4002,
            SubgraphKind::Reviews => 4003,
        }
    }

    /// Cheap query answering whether the service is up.
    pub fn probe_query(self) -> &'static str {
        match self {
            SubgraphKind::Users => "query { users { id } }",
            SubgraphKind::Movies => "query { movies { id } }",
            SubgraphKind::Reviews => "query { recentReviews(limit: 1) { id } }",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        SubgraphKind::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Builds the service with a freshly seeded store.
    pub fn build(self, settings: &SubgraphSettings) -> Result<Arc<dyn Subgraph>> {
        let subgraph: Arc<dyn Subgraph> = match self {
            SubgraphKind::Users => Arc::new(UsersSubgraph::seeded()?),
            SubgraphKind::Movies => Arc::new(MoviesSubgraph::seeded()?),
            SubgraphKind::Reviews => Arc::new(ReviewsSubgraph::seeded(settings.clone())?),
        };
        Ok(subgraph)
    }
}

impl fmt::Display for SubgraphKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn names_round_trip() {
        for kind in SubgraphKind::ALL {
            assert_eq!(SubgraphKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(SubgraphKind::from_name("router"), None);
    }

    #[test]
    fn default_ports_are_distinct() {
        let ports: Vec<_> = SubgraphKind::ALL.iter().map(|k| k.default_port()).collect();
        assert_eq!(ports, vec![4001, 4002, 4003]);
    }

    #[test]
    fn every_subgraph_publishes_keys() {
        let settings = SubgraphSettings::default();
        for kind in SubgraphKind::ALL {
            let subgraph = kind.build(&settings).unwrap();
            assert_eq!(subgraph.name(), kind.name());
            assert!(
                subgraph.federation_sdl().contains("@key(fields: \"id\")"),
                "{kind} publishes no entity key"
            );
        }
    }
}
