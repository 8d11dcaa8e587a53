use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use movie_federation::config::{DEFAULT_CONFIG_PATH, DEFAULT_ROUTER_URL};
use movie_federation::{SubgraphKind, SubgraphSettings};

#[derive(Debug, Parser)]
#[command(name = "movie-federation", version, about = "Users, movies and reviews subgraphs")]
pub struct Args {
    /// Log filter used when RUST_LOG is not set.
    #[arg(long, env = "MOVIE_FEDERATION_LOG", default_value = "info", global = true)]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve one subgraph.
    Serve {
        subgraph: SubgraphKind,
        #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
        host: IpAddr,
        /// Defaults to 4001, 4002 or 4003 depending on the subgraph.
        #[arg(long)]
        port: Option<u16>,
        #[command(flatten)]
        settings: SettingsArgs,
    },
    /// Serve all three subgraphs on their default ports until Ctrl-C.
    ServeAll {
        #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
        host: IpAddr,
        #[command(flatten)]
        settings: SettingsArgs,
    },
    /// Print the schema a subgraph publishes to the router.
    Sdl {
        subgraph: SubgraphKind,
        /// Leave out federation directives.
        #[arg(long)]
        plain: bool,
    },
    /// Write schemas/<subgraph>.graphql and a supergraph.yaml for rover.
    Export {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        /// Host used in the routing urls.
        #[arg(long, default_value = "localhost")]
        routing_host: String,
    },
    /// Show which subgraphs serve each field of a query.
    Explain {
        document: String,
        /// Read subgraph schemas from this supergraph.yaml instead of the built-in ones.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Report whether each subgraph and the router answer.
    Status {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        #[arg(long, env = "ROUTER_URL", default_value = DEFAULT_ROUTER_URL)]
        router: String,
    },
    /// Send a query and print the JSON response.
    Query {
        document: String,
        #[arg(long, env = "ROUTER_URL", default_value = DEFAULT_ROUTER_URL)]
        endpoint: String,
        /// Variables as a JSON object.
        #[arg(long)]
        variables: Option<String>,
        /// Sent as the x-user-id header.
        #[arg(long)]
        user: Option<String>,
    },
}

#[derive(Debug, Clone, ClapArgs)]
pub struct SettingsArgs {
    /// Author of reviews created by requests without an x-user-id header.
    #[arg(long, env = "REVIEWS_FALLBACK_AUTHOR", default_value = "1")]
    pub fallback_author: String,
}

impl From<SettingsArgs> for SubgraphSettings {
    fn from(args: SettingsArgs) -> Self {
        SubgraphSettings {
            fallback_author: args.fallback_author,
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}
