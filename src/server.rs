use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONTENT_TYPE, HeaderMap,
};
use http_body_util::{BodyExt, Full, combinators::BoxBody};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::GraphQLRequest;
use crate::error::{Error, Result};
use crate::subgraph::{Subgraph, Viewer};

pub const VIEWER_HEADER: &str = "x-user-id";

/// Pause after an accept error that is not tied to a single connection.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

type ResponseBody = BoxBody<Bytes, hyper::Error>;

fn full<T: Into<Bytes>>(value: T) -> ResponseBody {
    Full::new(value.into())
        .map_err(|never| match never {})
        .boxed()
}

const GRAPHIQL_HTML: &str = r#"
<!DOCTYPE html>
<html>
<head>
  <title>GraphiQL - __SUBGRAPH__ subgraph</title>
  <link href="https://unpkg.com/graphiql@1.5.0/graphiql.min.css" rel="stylesheet" />
  <style>
    body { margin: 0; padding: 0; height: 100vh; }
    #graphiql { height: 100vh; }
  </style>
</head>
<body>
  <div id="graphiql"></div>

  <script src="https://unpkg.com/react@17.0.2/umd/react.production.min.js"></script>
  <script src="https://unpkg.com/react-dom@17.0.2/umd/react-dom.production.min.js"></script>
  <script src="https://unpkg.com/graphiql@1.5.0/graphiql.min.js"></script>
  <script>
    const userId = localStorage.getItem('user_id') || '';

    function graphQLFetcher(graphQLParams) {
      const headers = { 'Content-Type': 'application/json' };
      if (userId) headers['x-user-id'] = userId;
      return fetch('/graphql', {
        method: 'post',
        headers,
        body: JSON.stringify(graphQLParams),
      }).then(response => response.json());
    }

    ReactDOM.render(
      React.createElement(GraphiQL, { fetcher: graphQLFetcher }),
      document.getElementById('graphiql')
    );
  </script>
</body>
</html>
"#;

fn json_response(status: StatusCode, body: Vec<u8>) -> Response<ResponseBody> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(full(body))
        .unwrap_or_else(|_| internal_server_error())
}

fn request_error(message: String) -> Response<ResponseBody> {
    let body = serde_json::to_vec(&json!({ "errors": [{ "message": message }] }))
        .unwrap_or_default();
    json_response(StatusCode::BAD_REQUEST, body)
}

async fn execute_graphql(req: Request<Incoming>, subgraph: &dyn Subgraph) -> Response<ResponseBody> {
    let viewer = extract_viewer(req.headers());

    let body_bytes = match req.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => return request_error(format!("Failed to read request body: {e}")),
    };

    let graphql_req = match serde_json::from_slice::<GraphQLRequest>(&body_bytes) {
        Ok(graphql_req) => graphql_req,
        Err(e) => return request_error(format!("Invalid JSON request: {e}")),
    };

    tracing::debug!(
        subgraph = subgraph.name(),
        operation = graphql_req.operation_name.as_deref().unwrap_or("<anonymous>"),
        user = viewer.user_id.as_deref().unwrap_or("<none>"),
        "executing request"
    );

    let response = subgraph.execute(graphql_req.into_request(viewer)).await;
    if response.is_err() {
        tracing::debug!(subgraph = subgraph.name(), errors = ?response.errors, "request failed");
    }

    match serde_json::to_vec(&response) {
        Ok(json) => json_response(StatusCode::OK, json),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize response");
            internal_server_error()
        }
    }
}

async fn handle_request(
    req: Request<Incoming>,
    subgraph: Arc<dyn Subgraph>,
) -> Result<Response<ResponseBody>, Infallible> {
    let result = match (req.method(), req.uri().path()) {
        (&Method::POST, "/graphql") | (&Method::POST, "/") => {
            execute_graphql(req, subgraph.as_ref()).await
        }

        (&Method::GET, "/graphql") | (&Method::GET, "/") => Response::builder()
            .header(CONTENT_TYPE, "text/html")
            .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
            .body(full(GRAPHIQL_HTML.replace("__SUBGRAPH__", subgraph.name())))
            .unwrap_or_else(|_| internal_server_error()),

        (&Method::GET, "/health") => Response::builder()
            .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
            .body(full("ok"))
            .unwrap_or_else(|_| internal_server_error()),

        (&Method::OPTIONS, _) => Response::builder()
            .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
            .header(ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS")
            .header(
                ACCESS_CONTROL_ALLOW_HEADERS,
                format!("Content-Type, Authorization, {VIEWER_HEADER}"),
            )
            .body(full(""))
            .unwrap_or_else(|_| internal_server_error()),

        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
            .body(full("Not Found"))
            .unwrap_or_else(|_| internal_server_error()),
    };

    Ok(result)
}

fn internal_server_error() -> Response<ResponseBody> {
    let mut response = Response::new(full("Internal Server Error"));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

fn extract_viewer(headers: &HeaderMap) -> Viewer {
    let user_id = headers
        .get(VIEWER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    Viewer { user_id }
}

#[derive(Clone)]
// An Executor that uses the tokio runtime.
pub struct TokioExecutor;

impl<F> hyper::rt::Executor<F> for TokioExecutor
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn execute(&self, fut: F) {
        tokio::task::spawn(fut);
    }
}

// The pending connection failed; the listener itself is fine.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::NotConnected
            | io::ErrorKind::PermissionDenied
            | io::ErrorKind::TimedOut
    )
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| Error::Bind { addr, source })
}

/// Accepts connections until `shutdown` resolves. In-flight connections are
/// left to finish on their own tasks.
pub async fn serve<S>(listener: TcpListener, subgraph: Arc<dyn Subgraph>, shutdown: S)
where
    S: Future<Output = ()> + Send,
{
    let name = subgraph.name();
    match listener.local_addr() {
        Ok(addr) => tracing::info!("{name} subgraph ready at http://{addr}/graphql"),
        Err(e) => tracing::warn!(error = %e, "{name} subgraph listening on unknown address"),
    }

    tokio::pin!(shutdown);
    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) if is_connection_error(&e) => {
                    tracing::debug!(error = %e, "dropped connection before accept");
                    continue;
                }
                Err(e) => {
                    // EMFILE and friends persist until a descriptor is freed
                    tracing::warn!(error = %e, "failed to accept connection, backing off");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            },
            _ = &mut shutdown => {
                tracing::info!("{name} subgraph shutting down");
                return;
            }
        };

        let io = TokioIo::new(stream);
        let subgraph = Arc::clone(&subgraph);

        tokio::task::spawn(async move {
            let service = service_fn(move |req| handle_request(req, Arc::clone(&subgraph)));

            match hyper_util::server::conn::auto::Builder::new(TokioExecutor)
                .serve_connection(io, service)
                .await
            {
                Ok(_) => tracing::trace!(%peer, "connection closed"),
                Err(e) => tracing::debug!(%peer, error = %e, "error processing connection"),
            }
        });
    }
}

/// A subgraph served on a background task.
pub struct RunningSubgraph {
    pub name: &'static str,
    pub addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl RunningSubgraph {
    pub fn url(&self) -> String {
        format!("http://{}/graphql", self.addr)
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.handle.await {
            tracing::warn!(subgraph = self.name, error = %e, "server task ended abnormally");
        }
    }
}

/// Binds `addr` and serves `subgraph` on a new task. Port 0 picks a free port;
/// the bound address is reported on the returned handle.
pub async fn spawn(addr: SocketAddr, subgraph: Arc<dyn Subgraph>) -> Result<RunningSubgraph> {
    let listener = bind(addr).await?;
    let addr = listener
        .local_addr()
        .map_err(|source| Error::Bind { addr, source })?;
    let name = subgraph.name();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(serve(listener, subgraph, async move {
        shutdown_rx.await.ok();
    }));

    Ok(RunningSubgraph {
        name,
        addr,
        shutdown: shutdown_tx,
        handle,
    })
}
