use serde::Deserialize;
use std::path::Path;

/// Global configuration for the edge service.
///
/// Loaded from a TOML file when one exists, with every field also
/// overridable from `SUBGATE_*` environment variables so the service can
/// run fully env-configured.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Bind address (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Listen port (default: 8080)
    #[serde(default = "default_listen_port")]
    pub port: u16,

    /// Static access token. Requests must carry this (or a derived token)
    /// as the first path segment.
    pub token: Option<String>,

    /// Secret for rotating token derivation. When set, tokens derived from
    /// the current and previous one-second bucket are also accepted.
    pub secret: Option<String>,

    /// Redirect target for the root path (302)
    pub redirect_url: Option<String>,

    /// Reverse-proxy target for the root path (used when redirect_url is unset)
    pub proxy_url: Option<String>,

    /// Upstream API URLs returning newline-delimited host:port text
    #[serde(default)]
    pub api_urls: Vec<String>,

    /// Override for the advertised hostname embedded in generated URIs
    pub fake_host: Option<String>,

    /// URI scheme for generated subscription links (default: socks5)
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Telegram bot token for access notifications
    pub bot_token: Option<String>,

    /// Telegram chat id for access notifications
    pub chat_id: Option<String>,

    /// Path to the key-value store. Unset means no store is bound and the
    /// editor refuses writes.
    pub db_path: Option<String>,

    /// Key holding the editable address blob (default: ADD.txt)
    #[serde(default = "default_edit_key")]
    pub edit_key: String,

    /// Deprecated key migrated into edit_key once at startup (default: LINK.txt)
    #[serde(default = "default_legacy_key")]
    pub legacy_key: String,
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Build configuration from environment variables alone.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SUBGATE_BIND") {
            self.bind = v;
        }
        if let Ok(v) = std::env::var("SUBGATE_PORT") {
            if let Ok(port) = v.parse() {
                self.port = port;
            }
        }
        if let Ok(v) = std::env::var("SUBGATE_TOKEN") {
            self.token = Some(v);
        }
        if let Ok(v) = std::env::var("SUBGATE_SECRET") {
            self.secret = Some(v);
        }
        if let Ok(v) = std::env::var("SUBGATE_REDIRECT_URL") {
            self.redirect_url = Some(v);
        }
        if let Ok(v) = std::env::var("SUBGATE_PROXY_URL") {
            self.proxy_url = Some(v);
        }
        if let Ok(v) = std::env::var("SUBGATE_API_URLS") {
            self.api_urls = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(v) = std::env::var("SUBGATE_FAKE_HOST") {
            self.fake_host = Some(v);
        }
        if let Ok(v) = std::env::var("SUBGATE_PROTOCOL") {
            self.protocol = v;
        }
        if let Ok(v) = std::env::var("SUBGATE_BOT_TOKEN") {
            self.bot_token = Some(v);
        }
        if let Ok(v) = std::env::var("SUBGATE_CHAT_ID") {
            self.chat_id = Some(v);
        }
        if let Ok(v) = std::env::var("SUBGATE_DB_PATH") {
            self.db_path = Some(v);
        }
        if let Ok(v) = std::env::var("SUBGATE_EDIT_KEY") {
            self.edit_key = v;
        }
    }

    /// True when at least one credential is configured. Without any, every
    /// gated path returns 404.
    pub fn has_credentials(&self) -> bool {
        self.token.is_some() || self.secret.is_some()
    }

    /// True when the notification channel is fully configured.
    pub fn notifications_enabled(&self) -> bool {
        self.bot_token.is_some() && self.chat_id.is_some()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_listen_port(),
            token: None,
            secret: None,
            redirect_url: None,
            proxy_url: None,
            api_urls: Vec::new(),
            fake_host: None,
            protocol: default_protocol(),
            bot_token: None,
            chat_id: None,
            db_path: None,
            edit_key: default_edit_key(),
            legacy_key: default_legacy_key(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    8080
}

fn default_protocol() -> String {
    "socks5".to_string()
}

fn default_edit_key() -> String {
    "ADD.txt".to_string()
}

fn default_legacy_key() -> String {
    "LINK.txt".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.protocol, "socks5");
        assert_eq!(config.edit_key, "ADD.txt");
        assert_eq!(config.legacy_key, "LINK.txt");
        assert!(!config.has_credentials());
        assert!(!config.notifications_enabled());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
bind = "127.0.0.1"
port = 9000
token = "my-token"
secret = "my-secret"
redirect_url = "https://example.com"
api_urls = ["https://api1.example.com/sub", "https://api2.example.com/sub"]
fake_host = "cdn.example.net"
protocol = "vless"
bot_token = "123:abc"
chat_id = "42"
db_path = "/var/lib/subgate/kv.db"
edit_key = "NODES.txt"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.bind, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.token.as_deref(), Some("my-token"));
        assert_eq!(config.secret.as_deref(), Some("my-secret"));
        assert_eq!(config.api_urls.len(), 2);
        assert_eq!(config.protocol, "vless");
        assert_eq!(config.edit_key, "NODES.txt");
        assert!(config.has_credentials());
        assert!(config.notifications_enabled());
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str("token = \"t\"").unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.api_urls.is_empty());
        assert!(config.has_credentials());
    }
}
