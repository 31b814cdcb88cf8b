//! Boundary to the OS-level blocking capability.
//!
//! The engine never blocks anything itself. It emits `ApplyBlock` /
//! `RemoveBlock` effects and the host forwards them to a [`BlockingBridge`].

use serde::{Deserialize, Serialize};

use super::shield::{DeepLink, ShieldChannel, ShieldConfig};
use super::tokens::AppTokenSet;
use crate::error::BridgeError;
use crate::storage::KvStore;

/// Shared-namespace key holding the currently exempt (unlocked) tokens.
pub const EXEMPT_KEY: &str = "blocking.exempt";

pub trait BlockingBridge {
    /// Block the given apps again.
    fn apply_block(&mut self, tokens: &AppTokenSet) -> Result<(), BridgeError>;
    /// Let the given apps through.
    fn remove_block(&mut self, tokens: &AppTokenSet) -> Result<(), BridgeError>;

    /// Hand the shield its current copy. Bridges without a shield ignore it.
    fn publish_shield(&mut self, _config: &ShieldConfig) -> Result<(), BridgeError> {
        Ok(())
    }

    /// Consume the deep link the shield left for the app, if any.
    fn take_pending_deep_link(&mut self, _scheme: &str) -> Result<Option<DeepLink>, BridgeError> {
        Ok(None)
    }
}

impl<B: BlockingBridge + ?Sized> BlockingBridge for &mut B {
    fn apply_block(&mut self, tokens: &AppTokenSet) -> Result<(), BridgeError> {
        (**self).apply_block(tokens)
    }

    fn remove_block(&mut self, tokens: &AppTokenSet) -> Result<(), BridgeError> {
        (**self).remove_block(tokens)
    }

    fn publish_shield(&mut self, config: &ShieldConfig) -> Result<(), BridgeError> {
        (**self).publish_shield(config)
    }

    fn take_pending_deep_link(&mut self, scheme: &str) -> Result<Option<DeepLink>, BridgeError> {
        (**self).take_pending_deep_link(scheme)
    }
}

/// Bridge that publishes the exempt token set to the shared namespace,
/// where the blocking extension picks it up.
pub struct ChannelBridge<S> {
    kv: S,
}

impl<S: KvStore> ChannelBridge<S> {
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    pub fn into_inner(self) -> S {
        self.kv
    }

    /// The shield side of the same namespace.
    pub fn shield(&mut self) -> ShieldChannel<&mut S> {
        ShieldChannel::new(&mut self.kv)
    }

    /// Tokens currently let through.
    pub fn exempt(&self) -> Result<AppTokenSet, BridgeError> {
        match self.kv.get(EXEMPT_KEY)? {
            None => Ok(AppTokenSet::default()),
            Some(raw) => serde_json::from_str(&raw).map_err(|e| BridgeError::Rejected {
                command: "read_exempt",
                message: e.to_string(),
            }),
        }
    }

    /// The exempt set to update. An unreadable one is dropped so blocking
    /// can always be reinstated.
    fn exempt_or_reset(&self, command: &'static str) -> AppTokenSet {
        self.exempt().unwrap_or_else(|e| {
            tracing::warn!(command, error = %e, "exempt set unreadable; resetting it");
            AppTokenSet::default()
        })
    }

    fn write(&mut self, command: &'static str, exempt: &AppTokenSet) -> Result<(), BridgeError> {
        let raw = serde_json::to_string(exempt).map_err(|e| BridgeError::Rejected {
            command,
            message: e.to_string(),
        })?;
        self.kv.set(EXEMPT_KEY, &raw)?;
        tracing::debug!(command, exempt = exempt.len(), "blocking channel updated");
        Ok(())
    }
}

impl<S: KvStore> BlockingBridge for ChannelBridge<S> {
    fn apply_block(&mut self, tokens: &AppTokenSet) -> Result<(), BridgeError> {
        let exempt = self.exempt_or_reset("apply_block").difference(tokens);
        self.write("apply_block", &exempt)
    }

    fn remove_block(&mut self, tokens: &AppTokenSet) -> Result<(), BridgeError> {
        let exempt = self.exempt_or_reset("remove_block").union(tokens);
        self.write("remove_block", &exempt)
    }

    fn publish_shield(&mut self, config: &ShieldConfig) -> Result<(), BridgeError> {
        self.shield()
            .publish(config)
            .map_err(|e| BridgeError::Rejected {
                command: "publish_shield",
                message: e.to_string(),
            })
    }

    fn take_pending_deep_link(&mut self, scheme: &str) -> Result<Option<DeepLink>, BridgeError> {
        self.shield()
            .take_pending_deep_link(scheme)
            .map_err(|e| BridgeError::Rejected {
                command: "take_pending_deep_link",
                message: e.to_string(),
            })
    }
}

/// A call made against a [`RecordingBridge`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", content = "tokens", rename_all = "snake_case")]
pub enum BridgeCall {
    ApplyBlock(AppTokenSet),
    RemoveBlock(AppTokenSet),
    /// The balance the shield was told about.
    PublishShield(u64),
}

/// Bridge that only records what it was asked to do.
#[derive(Debug, Clone, Default)]
pub struct RecordingBridge {
    calls: Vec<BridgeCall>,
    reject: bool,
    pending_link: Option<String>,
}

impl RecordingBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bridge that records every call and then rejects it.
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    /// Leave a deep link for the next open, as the shield button does.
    pub fn post_deep_link(&mut self, url: impl Into<String>) {
        self.pending_link = Some(url.into());
    }

    pub fn calls(&self) -> &[BridgeCall] {
        &self.calls
    }

    pub fn apply_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, BridgeCall::ApplyBlock(_)))
            .count()
    }

    pub fn remove_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, BridgeCall::RemoveBlock(_)))
            .count()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    fn record(&mut self, command: &'static str, call: BridgeCall) -> Result<(), BridgeError> {
        self.calls.push(call);
        if self.reject {
            return Err(BridgeError::Rejected {
                command,
                message: "not authorized".to_string(),
            });
        }
        Ok(())
    }
}

impl BlockingBridge for RecordingBridge {
    fn apply_block(&mut self, tokens: &AppTokenSet) -> Result<(), BridgeError> {
        self.record("apply_block", BridgeCall::ApplyBlock(tokens.clone()))
    }

    fn remove_block(&mut self, tokens: &AppTokenSet) -> Result<(), BridgeError> {
        self.record("remove_block", BridgeCall::RemoveBlock(tokens.clone()))
    }

    fn publish_shield(&mut self, config: &ShieldConfig) -> Result<(), BridgeError> {
        self.record(
            "publish_shield",
            BridgeCall::PublishShield(config.current_balance),
        )
    }

    fn take_pending_deep_link(&mut self, scheme: &str) -> Result<Option<DeepLink>, BridgeError> {
        self.pending_link
            .take()
            .map(|raw| DeepLink::parse(&raw, scheme))
            .transpose()
            .map_err(|e| BridgeError::Rejected {
                command: "take_pending_deep_link",
                message: e.to_string(),
            })
    }
}
