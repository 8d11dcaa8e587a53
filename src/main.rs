mod args;

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::Value;

use args::{Args, Command};
use movie_federation::client::{DEFAULT_TIMEOUT, ProbeTarget};
use movie_federation::config::SupergraphConfig;
use movie_federation::schema_registry::{InMemorySchemaRegistry, SchemaRegistry};
use movie_federation::{
    Error, GraphQLRequest, HttpGraphQLClient, SubgraphKind, SubgraphSettings, explain, server,
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Args {
        log_filter,
        command,
    } = args::parse();
    telemetry::init(&log_filter)?;

    match command {
        Command::Serve {
            subgraph,
            host,
            port,
            settings,
        } => {
            let addr = SocketAddr::new(host, port.unwrap_or_else(|| subgraph.default_port()));
            serve(subgraph, addr, settings.into()).await
        }
        Command::ServeAll { host, settings } => serve_all(host, settings.into()).await,
        Command::Sdl { subgraph, plain } => {
            let subgraph = subgraph.build(&SubgraphSettings::default())?;
            let sdl = if plain {
                subgraph.sdl()
            } else {
                subgraph.federation_sdl()
            };
            println!("{sdl}");
            Ok(())
        }
        Command::Export { dir, routing_host } => export(&dir, &routing_host),
        Command::Explain { document, config } => {
            let document = read_document(&document)?;
            let registry = match config {
                Some(path) => registry_from_config(&path).await?,
                None => builtin_registry().await?,
            };
            let schema = registry.get_schema().await?;
            print!("{}", explain::explain(&document, &schema)?);
            Ok(())
        }
        Command::Status { config, router } => status(&config, router).await,
        Command::Query {
            document,
            endpoint,
            variables,
            user,
        } => query(&document, &endpoint, variables.as_deref(), user.as_deref()).await,
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
}

async fn serve(kind: SubgraphKind, addr: SocketAddr, settings: SubgraphSettings) -> anyhow::Result<()> {
    let subgraph = kind.build(&settings)?;
    let listener = server::bind(addr).await.inspect_err(|e| {
        tracing::error!(subgraph = %kind, error = %e, "failed to start");
    })?;
    server::serve(listener, subgraph, shutdown_signal()).await;
    Ok(())
}

async fn serve_all(host: std::net::IpAddr, settings: SubgraphSettings) -> anyhow::Result<()> {
    tracing::info!("starting users, movies and reviews subgraphs");

    let mut running = Vec::with_capacity(SubgraphKind::ALL.len());
    for kind in SubgraphKind::ALL {
        let addr = SocketAddr::new(host, kind.default_port());
        let subgraph = kind.build(&settings)?;
        let handle = server::spawn(addr, subgraph).await.inspect_err(|e| {
            tracing::error!(subgraph = %kind, error = %e, "failed to start");
        })?;
        running.push(handle);
    }

    tracing::info!("compose with `rover supergraph compose --config supergraph.yaml` and start the router");
    shutdown_signal().await;

    tracing::info!("shutting down subgraphs");
    for handle in running {
        handle.stop().await;
    }
    Ok(())
}

fn export(dir: &Path, routing_host: &str) -> anyhow::Result<()> {
    let config = SupergraphConfig::local(routing_host);
    let settings = SubgraphSettings::default();

    for kind in SubgraphKind::ALL {
        let path = config
            .schema_path(dir, kind.name())
            .with_context(|| format!("no schema entry for {kind}"))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let sdl = kind.build(&settings)?.federation_sdl();
        fs::write(&path, sdl).map_err(|source| Error::Write {
            path: path.clone(),
            source,
        })?;
        tracing::info!(subgraph = %kind, path = %path.display(), "wrote schema");
    }

    let config_path = dir.join(movie_federation::config::DEFAULT_CONFIG_PATH);
    config.save(&config_path)?;
    tracing::info!(path = %config_path.display(), "wrote supergraph config");
    Ok(())
}

async fn builtin_registry() -> anyhow::Result<InMemorySchemaRegistry> {
    let settings = SubgraphSettings::default();
    let mut subgraphs = Vec::new();
    for kind in SubgraphKind::ALL {
        let url = format!("http://localhost:{}/graphql", kind.default_port());
        subgraphs.push((url, kind.build(&settings)?));
    }
    Ok(InMemorySchemaRegistry::from_subgraphs(subgraphs).await?)
}

async fn registry_from_config(path: &Path) -> anyhow::Result<InMemorySchemaRegistry> {
    let config = SupergraphConfig::load(path)?;
    let mut registry = InMemorySchemaRegistry::new();
    for service in config.load_services(path)? {
        registry.register_service(service).await?;
    }
    Ok(registry)
}

async fn status(config_path: &Path, router: String) -> anyhow::Result<()> {
    let config = if config_path.exists() {
        SupergraphConfig::load(config_path)?
    } else {
        tracing::debug!(path = %config_path.display(), "no supergraph config, probing default ports");
        SupergraphConfig::local("localhost")
    };

    let mut targets: Vec<ProbeTarget> = config
        .subgraphs
        .into_iter()
        .map(|(name, subgraph)| ProbeTarget {
            query: SubgraphKind::from_name(&name)
                .map_or("query { __typename }", SubgraphKind::probe_query)
                .to_string(),
            name,
            url: subgraph.routing_url,
        })
        .collect();
    targets.push(ProbeTarget {
        name: "router".to_string(),
        url: router,
        query: "query { __typename }".to_string(),
    });

    let client = HttpGraphQLClient::new(DEFAULT_TIMEOUT)?;
    for status in client.probe_all(targets).await {
        println!("{status}");
    }
    Ok(())
}

async fn query(
    document: &str,
    endpoint: &str,
    variables: Option<&str>,
    user: Option<&str>,
) -> anyhow::Result<()> {
    let mut request = GraphQLRequest::new(read_document(document)?);
    if let Some(variables) = variables {
        let variables: Value =
            serde_json::from_str(variables).context("--variables must be a JSON object")?;
        request = request.with_variables(variables);
    }

    let client = HttpGraphQLClient::new(DEFAULT_TIMEOUT)?;
    match client.execute(endpoint, &request, user).await {
        Ok(response) => println!("{}", serde_json::to_string_pretty(&response)?),
        Err(e) => {
            tracing::warn!(error = %e, "query failed");
            println!("{endpoint} is offline: {e}");
        }
    }
    Ok(())
}

/// `@path` reads the document from a file.
fn read_document(document: &str) -> anyhow::Result<String> {
    match document.strip_prefix('@') {
        Some(path) => {
            let path = PathBuf::from(path);
            fs::read_to_string(&path).map_err(|source| Error::Read { path, source }.into())
        }
        None => Ok(document.to_string()),
    }
}
