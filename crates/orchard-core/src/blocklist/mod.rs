mod bridge;
pub mod settings;
mod shield;
mod tokens;
mod unlock;

pub use bridge::{BlockingBridge, BridgeCall, ChannelBridge, RecordingBridge, EXEMPT_KEY};
pub use settings::{BlocklistSettings, SettingsAdjustment};
pub use shield::{
    DeepLink, ShieldChannel, ShieldConfig, ShieldTemplates, PENDING_DEEP_LINK_KEY,
    SHIELD_CONFIG_KEY,
};
pub use tokens::AppTokenSet;
pub use unlock::{BlocklistState, UnlockEndReason, UnlockGrant, UnlockSession, UnlockStatus};
