//! The blocking UI ("shield") shown over restricted apps.
//!
//! The shield runs out of process. It reads its copy from the shared
//! namespace, and when the user taps unlock it leaves a deep link there for
//! the app to pick up.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CoreError, DeepLinkError, StorageError};
use crate::storage::KvStore;

pub const SHIELD_CONFIG_KEY: &str = "shield.config";
pub const PENDING_DEEP_LINK_KEY: &str = "shield.pendingDeepLink";

const BALANCE_PLACEHOLDER: &str = "{balance}";

/// Shield copy, with `{balance}` substituted at publish time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldTemplates {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_subtitle")]
    pub subtitle: String,
    #[serde(default = "default_primary_button")]
    pub primary_button: String,
    #[serde(default = "default_secondary_button")]
    pub secondary_button: String,
    #[serde(default = "default_scheme")]
    pub deep_link_scheme: String,
}

fn default_title() -> String {
    "This app is resting".into()
}
fn default_subtitle() -> String {
    "You have {balance} fruits. Spend some to unlock it for a while.".into()
}
fn default_primary_button() -> String {
    "Unlock with fruits".into()
}
fn default_secondary_button() -> String {
    "Stay focused".into()
}
fn default_scheme() -> String {
    "orchard".into()
}

impl Default for ShieldTemplates {
    fn default() -> Self {
        Self {
            title: default_title(),
            subtitle: default_subtitle(),
            primary_button: default_primary_button(),
            secondary_button: default_secondary_button(),
            deep_link_scheme: default_scheme(),
        }
    }
}

impl ShieldTemplates {
    /// Fill in the templates for the given balance.
    ///
    /// # Errors
    /// Returns an error if the configured scheme cannot form a URL.
    pub fn render(&self, balance: u64) -> Result<ShieldConfig, DeepLinkError> {
        let fill = |template: &str| template.replace(BALANCE_PLACEHOLDER, &balance.to_string());
        Ok(ShieldConfig {
            title: fill(&self.title),
            subtitle: fill(&self.subtitle),
            primary_button: fill(&self.primary_button),
            secondary_button: fill(&self.secondary_button),
            current_balance: balance,
            deep_link: DeepLink::Unlock {
                balance_hint: Some(balance),
            }
            .to_url(&self.deep_link_scheme)?,
        })
    }
}

/// What the shield reads from the shared namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShieldConfig {
    pub title: String,
    pub subtitle: String,
    pub primary_button: String,
    pub secondary_button: String,
    pub current_balance: u64,
    pub deep_link: String,
}

/// A deep link into the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum DeepLink {
    /// Open the unlock flow. The balance is a display hint only; the
    /// ledger stays the authority.
    Unlock { balance_hint: Option<u64> },
}

impl DeepLink {
    /// Parse `<scheme>://unlock?currentBalance=<n>`.
    ///
    /// # Errors
    /// Returns an error for malformed URLs, a foreign scheme, or a target
    /// other than `unlock`.
    pub fn parse(raw: &str, scheme: &str) -> Result<Self, DeepLinkError> {
        let url = Url::parse(raw.trim())?;
        if url.scheme() != scheme {
            return Err(DeepLinkError::UnsupportedTarget(format!(
                "scheme '{}'",
                url.scheme()
            )));
        }
        match url.host_str() {
            Some("unlock") => {
                let balance_hint = url
                    .query_pairs()
                    .find(|(k, _)| k == "currentBalance")
                    .and_then(|(_, v)| v.parse::<u64>().ok());
                Ok(DeepLink::Unlock { balance_hint })
            }
            other => Err(DeepLinkError::UnsupportedTarget(
                other.unwrap_or_default().to_string(),
            )),
        }
    }

    /// # Errors
    /// Returns an error if `scheme` is not a valid URL scheme.
    pub fn to_url(&self, scheme: &str) -> Result<String, DeepLinkError> {
        match self {
            DeepLink::Unlock { balance_hint } => {
                let mut url = Url::parse(&format!("{scheme}://unlock"))?;
                if let Some(balance) = balance_hint {
                    url.query_pairs_mut()
                        .append_pair("currentBalance", &balance.to_string());
                }
                Ok(url.into())
            }
        }
    }
}

/// Shield side of the shared namespace.
pub struct ShieldChannel<S> {
    kv: S,
}

impl<S: KvStore> ShieldChannel<S> {
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    pub fn into_inner(self) -> S {
        self.kv
    }

    pub fn publish(&mut self, config: &ShieldConfig) -> Result<(), CoreError> {
        let raw = serde_json::to_string(config)?;
        self.kv.set(SHIELD_CONFIG_KEY, &raw)?;
        tracing::debug!(balance = config.current_balance, "shield config published");
        Ok(())
    }

    /// The last published config.
    pub fn current(&self) -> Result<Option<ShieldConfig>, CoreError> {
        match self.kv.get(SHIELD_CONFIG_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Leave a deep link for the app, as the shield does on tap.
    pub fn post_deep_link(&mut self, url: &str) -> Result<(), StorageError> {
        self.kv.set(PENDING_DEEP_LINK_KEY, url)
    }

    /// Read and clear the pending deep link.
    ///
    /// The link is cleared even when it fails to parse, so a bad link is
    /// reported once rather than on every launch.
    pub fn take_pending_deep_link(&mut self, scheme: &str) -> Result<Option<DeepLink>, CoreError> {
        let Some(raw) = self.kv.get(PENDING_DEEP_LINK_KEY)? else {
            return Ok(None);
        };
        self.kv.remove(PENDING_DEEP_LINK_KEY)?;
        Ok(Some(DeepLink::parse(&raw, scheme)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn render_fills_balance() {
        let config = ShieldTemplates::default().render(42).unwrap();
        assert_eq!(config.current_balance, 42);
        assert!(config.subtitle.contains("42 fruits"));
        assert_eq!(config.deep_link, "orchard://unlock?currentBalance=42");
    }

    #[test]
    fn parse_unlock_link() {
        assert_eq!(
            DeepLink::parse("orchard://unlock?currentBalance=17", "orchard").unwrap(),
            DeepLink::Unlock {
                balance_hint: Some(17)
            }
        );
        assert_eq!(
            DeepLink::parse("orchard://unlock?currentBalance=lots", "orchard").unwrap(),
            DeepLink::Unlock { balance_hint: None }
        );
        assert_eq!(
            DeepLink::parse("orchard://unlock", "orchard").unwrap(),
            DeepLink::Unlock { balance_hint: None }
        );
    }

    #[test]
    fn parse_rejects_other_targets() {
        assert!(matches!(
            DeepLink::parse("orchard://settings", "orchard"),
            Err(DeepLinkError::UnsupportedTarget(_))
        ));
        assert!(matches!(
            DeepLink::parse("https://unlock", "orchard"),
            Err(DeepLinkError::UnsupportedTarget(_))
        ));
        assert!(matches!(
            DeepLink::parse("not a url", "orchard"),
            Err(DeepLinkError::InvalidUrl(_))
        ));
    }

    #[test]
    fn channel_publishes_and_takes_links_once() {
        let mut channel = ShieldChannel::new(MemoryStore::new());
        assert!(channel.current().unwrap().is_none());

        let config = ShieldTemplates::default().render(3).unwrap();
        channel.publish(&config).unwrap();
        assert_eq!(channel.current().unwrap(), Some(config));

        channel
            .post_deep_link("orchard://unlock?currentBalance=3")
            .unwrap();
        assert_eq!(
            channel.take_pending_deep_link("orchard").unwrap(),
            Some(DeepLink::Unlock {
                balance_hint: Some(3)
            })
        );
        assert_eq!(channel.take_pending_deep_link("orchard").unwrap(), None);
    }

    #[test]
    fn bad_pending_link_is_cleared() {
        let mut channel = ShieldChannel::new(MemoryStore::new());
        channel.post_deep_link("orchard://nowhere").unwrap();
        assert!(channel.take_pending_deep_link("orchard").is_err());
        assert_eq!(channel.take_pending_deep_link("orchard").unwrap(), None);
    }
}
