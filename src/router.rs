//! The edge HTTP server: token gating, path dispatch, and the root-path
//! redirect/proxy/debug fallback.

use crate::config::Config;
use crate::editor;
use crate::error::{full_body, json_error_response, EdgeErrorCode, ResponseBody};
use crate::notify::Notifier;
use crate::store::KvStore;
use crate::subscribe::SubscriptionService;
use crate::token::TokenVerifier;
use crate::util::proxy_fetch;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Default timeout for outbound HTTP calls (upstream APIs, notifications,
/// root-path proxying). Single attempt, no retries.
const HTTP_CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared per-server state handed to every connection task
struct ServerContext {
    config: Arc<Config>,
    verifier: TokenVerifier,
    store: Option<Arc<KvStore>>,
    notifier: Notifier,
    subscriptions: SubscriptionService,
    http_client: reqwest::Client,
}

/// The edge HTTP server
pub struct EdgeServer {
    bind_addr: SocketAddr,
    context: Arc<ServerContext>,
    shutdown_rx: watch::Receiver<bool>,
}

impl EdgeServer {
    pub fn new(
        bind_addr: SocketAddr,
        config: Arc<Config>,
        store: Option<Arc<KvStore>>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_CLIENT_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        let context = Arc::new(ServerContext {
            verifier: TokenVerifier::from_config(&config),
            notifier: Notifier::new(http_client.clone(), &config),
            subscriptions: SubscriptionService::new(Arc::clone(&config), http_client.clone()),
            store,
            http_client,
            config,
        });

        Self {
            bind_addr,
            context,
            shutdown_rx,
        }
    }

    /// Bind and serve until shutdown is signaled.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener (used by tests for ephemeral ports).
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        info!(addr = %listener.local_addr()?, "Edge server listening (HTTP/1.1 and HTTP/2)");

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let context = Arc::clone(&self.context);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, addr, context).await {
                                    debug!(addr = %addr, error = %e, "Connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                changed = shutdown_rx.changed() => {
                    // A closed channel counts as shutdown
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Edge server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    context: Arc<ServerContext>,
) -> anyhow::Result<()> {
    let io = TokioIo::new(stream);

    let service = service_fn(move |req: Request<Incoming>| {
        let ctx = Arc::clone(&context);
        async move { handle_request(req, ctx, addr).await }
    });

    AutoBuilder::new(TokioExecutor::new())
        .serve_connection(io, service)
        .await
        .map_err(|e| anyhow::anyhow!("Connection error: {}", e))?;

    Ok(())
}

/// Outermost boundary: any handler fault becomes a 500 with the error
/// message in the body.
async fn handle_request(
    req: Request<Incoming>,
    context: Arc<ServerContext>,
    client_addr: SocketAddr,
) -> Result<Response<ResponseBody>, hyper::Error> {
    let request_id = Uuid::new_v4().to_string();
    debug!(method = %req.method(), uri = %req.uri(), request_id, "Incoming request");

    match route(req, &context, client_addr).await {
        Ok(response) => Ok(response),
        Err(e) => {
            error!(request_id, error = %e, "Handler fault");
            Ok(json_error_response(EdgeErrorCode::InternalError, e.to_string()))
        }
    }
}

async fn route(
    req: Request<Incoming>,
    context: &ServerContext,
    client_addr: SocketAddr,
) -> anyhow::Result<Response<ResponseBody>> {
    let path = req.uri().path().to_string();
    let query = parse_query(req.uri().query());
    let host = extract_host(&req);
    let user_agent = header_string(&req, hyper::header::USER_AGENT);

    let segments: Vec<&str> = path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    // Root path: redirect, proxy, or request-metadata echo
    if segments.is_empty() {
        return handle_root(req, context, client_addr, &query).await;
    }

    // Everything below is gated; an unconfigured service answers nothing
    if !context.verifier.has_credentials() {
        return Ok(not_found());
    }

    let candidate = segments[0];
    if !context.verifier.verify(candidate) {
        return Ok(not_found());
    }
    let token = candidate.to_string();

    match &segments[1..] {
        [] | ["sub"] => {
            // Best-effort access notification, failure ignored by contract
            if context.notifier.enabled() {
                context
                    .notifier
                    .access_alert(&host, &client_addr.ip().to_string(), &user_agent)
                    .await;
            }

            Ok(context
                .subscriptions
                .respond(&token, &host, &user_agent, &query)
                .await)
        }
        ["edit"] => match req.method().clone() {
            Method::GET => Ok(editor::handle_get(
                context.store.as_ref(),
                &context.config.edit_key,
            )),
            Method::POST => {
                let body = req.into_body().collect().await?.to_bytes();
                let body = String::from_utf8_lossy(&body).into_owned();
                editor::handle_post(context.store.as_ref(), &context.config.edit_key, &body)
            }
            _ => Ok(not_found()),
        },
        _ => Ok(not_found()),
    }
}

async fn handle_root(
    req: Request<Incoming>,
    context: &ServerContext,
    client_addr: SocketAddr,
    query: &HashMap<String, String>,
) -> anyhow::Result<Response<ResponseBody>> {
    if let Some(redirect_url) = context.config.redirect_url.as_deref() {
        return Ok(Response::builder()
            .status(StatusCode::FOUND)
            .header(hyper::header::LOCATION, redirect_url)
            .body(full_body("Redirecting"))
            .expect("valid response builder"));
    }

    if let Some(proxy_url) = context.config.proxy_url.as_deref() {
        return proxy_fetch(&context.http_client, proxy_url).await;
    }

    // Neither configured: echo request metadata for debugging
    let headers: HashMap<String, String> = req
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let metadata = serde_json::json!({
        "method": req.method().as_str(),
        "path": req.uri().path(),
        "query": query,
        "headers": headers,
        "client_ip": client_addr.ip().to_string(),
        "version": format!("{:?}", req.version()),
    });

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(full_body(serde_json::to_string_pretty(&metadata)?))
        .expect("valid response builder"))
}

fn not_found() -> Response<ResponseBody> {
    json_error_response(EdgeErrorCode::NotFound, "Not found")
}

fn extract_host(req: &Request<Incoming>) -> String {
    req.headers()
        .get(hyper::header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(|h| h.split(':').next().unwrap_or(h).to_string())
        .unwrap_or_else(|| "localhost".to_string())
}

fn header_string(req: &Request<Incoming>, name: hyper::header::HeaderName) -> String {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Parse a raw query string into a map. Later duplicates win; percent
/// escapes are decoded, invalid escapes are kept as-is.
pub fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let Some(query) = query else {
        return map;
    };
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = urlencoding::decode(key)
            .map(|c| c.into_owned())
            .unwrap_or_else(|_| key.to_string());
        let value = urlencoding::decode(value)
            .map(|c| c.into_owned())
            .unwrap_or_else(|_| value.to_string());
        map.insert(key, value);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_basic() {
        let map = parse_query(Some("b64&ua=clash-verge&x=1"));
        assert_eq!(map.get("b64").map(String::as_str), Some(""));
        assert_eq!(map.get("ua").map(String::as_str), Some("clash-verge"));
        assert_eq!(map.get("x").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_parse_query_empty_and_none() {
        assert!(parse_query(None).is_empty());
        assert!(parse_query(Some("")).is_empty());
        assert!(parse_query(Some("&&")).is_empty());
    }

    #[test]
    fn test_parse_query_percent_decoding() {
        let map = parse_query(Some("ua=clash%20verge&bad=%zz"));
        assert_eq!(map.get("ua").map(String::as_str), Some("clash verge"));
        assert_eq!(map.get("bad").map(String::as_str), Some("%zz"));
    }
}
