//! # Orchard Core Library
//!
//! This library provides the session-timing and reward-gated unlock engine
//! behind the Orchard screen-time app. It follows a CLI-first philosophy:
//! every operation is available through the standalone `orchard-cli` binary,
//! and any GUI is a thin layer over the same core library.
//!
//! ## Architecture
//!
//! - **Focus**: a wall-clock state machine. Elapsed and remaining time are
//!   always rebuilt from the start timestamp and pause history, so suspension
//!   and restarts never lose or invent time
//! - **Rewards**: an append-only ledger of fruits earned by focusing and
//!   spent on unlocks, checked for integrity before every commit
//! - **Blocklist**: quota- and cost-gated temporary unlocks with lazy expiry
//! - **Storage**: a versioned JSON document in SQLite, with ordered
//!   migrations, validation and a safe fallback, plus TOML configuration
//!
//! ## Key Components
//!
//! - [`Engine`]: explicit state plus transitions returning events and effects
//! - [`Host`]: loads the engine, executes its effects, persists
//! - [`BlockingBridge`]: boundary to the OS blocking capability
//! - [`Database`]: SQLite key-value persistence
//! - [`Config`]: application configuration management

pub mod blocklist;
pub mod clock;
pub mod engine;
pub mod error;
pub mod events;
pub mod focus;
pub mod host;
pub mod rewards;
pub mod storage;

pub use blocklist::{
    AppTokenSet, BlockingBridge, BlocklistSettings, BlocklistState, ChannelBridge, DeepLink,
    RecordingBridge, SettingsAdjustment, ShieldChannel, ShieldConfig, ShieldTemplates,
    UnlockSession, UnlockStatus,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Effect, Engine, EngineConfig, EngineState, Reconciled, TickStatus, Transition};
pub use error::{
    BridgeError, ConfigError, CoreError, DeepLinkError, EngineError, MigrationError, StorageError,
};
pub use events::Event;
pub use focus::{FocusSession, FocusState, SessionStatus, SessionTiming};
pub use host::{Host, Outcome, Startup, Warning};
pub use rewards::{RewardLedger, RewardSource, RewardTransaction, TransactionType};
pub use storage::{Config, Database, KvStore, LoadReport, LoadSource, MemoryStore, StateStore};
