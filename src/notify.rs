//! Outbound access notifications via a Telegram bot.
//!
//! The notifier is an injected capability: the router calls it synchronously
//! on successful subscription access, and failures are ignored by contract.
//! A single best-effort attempt, no retries.

use crate::config::Config;
use tracing::{debug, warn};

pub struct Notifier {
    http_client: reqwest::Client,
    bot_token: Option<String>,
    chat_id: Option<String>,
}

impl Notifier {
    pub fn new(http_client: reqwest::Client, config: &Config) -> Self {
        Self {
            http_client,
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.bot_token.is_some() && self.chat_id.is_some()
    }

    /// Report a successful subscription access. Never fails: delivery
    /// problems are logged and dropped.
    pub async fn access_alert(&self, host: &str, client_ip: &str, user_agent: &str) {
        let (Some(bot_token), Some(chat_id)) = (self.bot_token.as_deref(), self.chat_id.as_deref())
        else {
            return;
        };

        let text = format!(
            "Subscription accessed\nhost: {}\nip: {}\nua: {}",
            host, client_ip, user_agent
        );
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage?chat_id={}&text={}",
            bot_token,
            urlencoding::encode(chat_id),
            urlencoding::encode(&text)
        );

        match self.http_client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(host, client_ip, "Access notification sent");
            }
            Ok(response) => {
                warn!(
                    host,
                    status = response.status().as_u16(),
                    "Access notification rejected"
                );
            }
            Err(e) => {
                warn!(host, error = %e, "Failed to send access notification");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_requires_both_credentials() {
        let client = reqwest::Client::new();

        let mut config = Config::default();
        assert!(!Notifier::new(client.clone(), &config).enabled());

        config.bot_token = Some("123:abc".to_string());
        assert!(!Notifier::new(client.clone(), &config).enabled());

        config.chat_id = Some("42".to_string());
        assert!(Notifier::new(client, &config).enabled());
    }

    #[tokio::test]
    async fn test_unconfigured_alert_is_noop() {
        let notifier = Notifier::new(reqwest::Client::new(), &Config::default());
        // Must return without attempting any network call
        notifier.access_alert("example.com", "1.2.3.4", "curl/8").await;
    }
}
