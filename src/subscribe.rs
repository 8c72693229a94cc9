//! Subscription generation: content negotiation, fake-hostname derivation,
//! concurrent upstream fetches, and URI formatting.

use crate::config::Config;
use crate::error::{html_response, text_response, ResponseBody};
use crate::util::{is_valid_ipv4, organize_addresses, split_host_port};
use futures::future::join_all;
use hyper::{Response, StatusCode};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// What a subscription request resolves to after inspecting the client
/// User-Agent and query flags.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputKind {
    /// HTML landing page with example links (browsers)
    Page,
    /// Base64-encoded URI list (generic subscription clients)
    Base64,
    /// Plain newline-delimited URI list (clash / sing-box / loon)
    Plain,
}

/// Decide the response shape from the User-Agent and query flags.
///
/// Explicit flags win over User-Agent sniffing, and a `ua` query override
/// replaces the real header for sniffing purposes. A browser that asked for
/// nothing specific gets the landing page.
pub fn negotiate(user_agent: &str, query: &HashMap<String, String>) -> OutputKind {
    if query.contains_key("b64") || query.contains_key("sub") {
        return OutputKind::Base64;
    }
    if query.contains_key("clash") || query.contains_key("sb") || query.contains_key("loon") {
        return OutputKind::Plain;
    }

    let ua_override = query.get("ua");
    let ua = ua_override
        .map(|s| s.to_lowercase())
        .unwrap_or_else(|| user_agent.to_lowercase());

    if ua.contains("clash") || ua.contains("sing-box") || ua.contains("singbox") || ua.contains("loon")
    {
        return OutputKind::Plain;
    }
    if ua_override.is_none() && ua.contains("mozilla") {
        return OutputKind::Page;
    }
    OutputKind::Base64
}

/// Compute the advertised hostname embedded in generated URIs.
///
/// A configured override wins. Hosts under a platform dev domain get a
/// digest-derived label in place of their real one to obscure the edge
/// hostname; anything else is advertised as-is.
pub fn fake_hostname(host: &str, token: &str, fake_host_override: Option<&str>) -> String {
    if let Some(fake) = fake_host_override {
        if !fake.is_empty() {
            return fake.to_string();
        }
    }

    const DEV_DOMAINS: [&str; 2] = ["workers.dev", "pages.dev"];
    if let Some(domain) = DEV_DOMAINS.iter().find(|d| host.ends_with(*d)) {
        let digest = hex::encode(Sha256::digest(format!("{token}{host}").as_bytes()));
        let label = &digest[0..12];
        if host == *domain {
            return format!("{label}.{domain}");
        }
        // Only the first label is replaced; intermediate labels survive
        let rest = host.split_once('.').map(|(_, rest)| rest).unwrap_or(domain);
        return format!("{label}.{rest}");
    }
    host.to_string()
}

/// Format normalized address lines into subscription URIs. Lines whose host
/// part is not a syntactically valid IPv4 address are dropped.
pub fn build_links(raw: &str, token: &str, protocol: &str, fake_host: &str) -> Vec<String> {
    organize_addresses(raw)
        .iter()
        .filter_map(|line| split_host_port(line))
        .filter(|(host, _)| is_valid_ipv4(host))
        .map(|(host, port)| format!("{protocol}://{token}@{host}:{port}?host={fake_host}"))
        .collect()
}

/// Generates subscription responses by querying configured upstream APIs.
pub struct SubscriptionService {
    config: Arc<Config>,
    http_client: reqwest::Client,
}

impl SubscriptionService {
    pub fn new(config: Arc<Config>, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
        }
    }

    /// Fetch candidate addresses from every configured upstream API
    /// concurrently. Each failing or non-2xx upstream contributes nothing;
    /// results are concatenated in configuration order.
    pub async fn fetch_upstreams(&self, host: &str, token: &str) -> String {
        let fetches = self.config.api_urls.iter().map(|api_url| {
            let client = self.http_client.clone();
            async move {
                let separator = if api_url.contains('?') { '&' } else { '?' };
                let url = format!(
                    "{}{}host={}&uuid={}",
                    api_url,
                    separator,
                    urlencoding::encode(host),
                    urlencoding::encode(token)
                );

                let response = match client.get(&url).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(api_url, error = %e, "Upstream fetch failed");
                        return String::new();
                    }
                };
                if !response.status().is_success() {
                    warn!(
                        api_url,
                        status = response.status().as_u16(),
                        "Upstream returned non-success status"
                    );
                    return String::new();
                }
                match response.text().await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(api_url, error = %e, "Failed to read upstream body");
                        String::new()
                    }
                }
            }
        });

        join_all(fetches).await.join("\n")
    }

    /// Produce the subscription response for an authorized request.
    pub async fn respond(
        &self,
        token: &str,
        host: &str,
        user_agent: &str,
        query: &HashMap<String, String>,
    ) -> Response<ResponseBody> {
        let kind = negotiate(user_agent, query);
        debug!(host, ?kind, "Subscription request");

        if kind == OutputKind::Page {
            return html_response(landing_page(host, token));
        }

        let fake_host = fake_hostname(host, token, self.config.fake_host.as_deref());
        let raw = self.fetch_upstreams(host, token).await;
        let links = build_links(&raw, token, &self.config.protocol, &fake_host);
        let content = links.join("\n");

        debug!(host, links = links.len(), "Subscription content assembled");

        let body = match kind {
            OutputKind::Base64 => crate::util::encode_base64(&content),
            _ => content,
        };
        text_response(StatusCode::OK, body)
    }
}

/// HTML landing page with example subscription links for browsers.
fn landing_page(host: &str, token: &str) -> String {
    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Subscription</title>
    <style>
        body {{ font-family: sans-serif; max-width: 42rem; margin: 3rem auto; padding: 0 1rem; }}
        code {{ background: #f0f0f0; padding: 0.15rem 0.35rem; border-radius: 3px; }}
        li {{ margin: 0.5rem 0; }}
    </style>
</head>
<body>
    <h1>Subscription links</h1>
    <p>Add one of these URLs to your proxy client:</p>
    <ul>
        <li>Base64: <code>https://{host}/{token}?b64</code></li>
        <li>Clash: <code>https://{host}/{token}?clash</code></li>
        <li>Sing-box: <code>https://{host}/{token}?sb</code></li>
        <li>Loon: <code>https://{host}/{token}?loon</code></li>
    </ul>
    <p>Edit the stored address list at <a href="/{token}/edit"><code>/{token}/edit</code></a>.</p>
</body>
</html>"##
    )
}
