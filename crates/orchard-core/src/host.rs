//! The host: owns the engine and carries out its effects.
//!
//! Storage and bridge failures never abort an operation. The engine state
//! is already committed when effects run, so a failed write only downgrades
//! the host to non-durable mode and a failed bridge call is reported as a
//! warning. Both are logged.

use serde::Serialize;

use crate::blocklist::{BlockingBridge, DeepLink, ShieldTemplates};
use crate::clock::Clock;
use crate::engine::{Effect, Engine, EngineConfig, EngineState, Reconciled, Transition};
use crate::error::EngineError;
use crate::events::Event;
use crate::storage::{KvStore, LoadReport, LoadSource, StateStore};

/// Something that went wrong after the engine committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// The state could not be written; it lives in memory only.
    PersistenceFailure { message: String },
    /// The blocking capability refused a call.
    BridgeFailure {
        command: &'static str,
        message: String,
    },
}

/// Result of an operation run through the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome<T> {
    pub value: T,
    pub events: Vec<Event>,
    pub warnings: Vec<Warning>,
}

/// What opening the host settled.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Startup {
    #[serde(flatten)]
    pub reconciled: Reconciled,
    /// Link the shield left for the app, consumed on open. Its balance hint
    /// is for display only; the ledger stays the authority.
    pub deep_link: Option<DeepLink>,
}

pub struct Host<S, B, C> {
    engine: Engine<C>,
    store: StateStore<S>,
    bridge: B,
    templates: ShieldTemplates,
    durable: bool,
    load_report: LoadReport,
    startup: Outcome<Startup>,
}

impl<S: KvStore, B: BlockingBridge, C: Clock> Host<S, B, C> {
    /// Load the stored state, reconcile it against the current time and
    /// consume any deep link the shield left behind.
    ///
    /// Never fails: unusable state falls back to defaults (see
    /// [`LoadSource::FellBack`]) and storage problems surface as warnings.
    /// When the stored state could not even be read, the host starts
    /// non-durable and leaves it in place.
    pub fn open(
        kv: S,
        bridge: B,
        clock: C,
        config: EngineConfig,
        templates: ShieldTemplates,
    ) -> Self {
        let mut store = StateStore::new(kv);
        let (state, load_report) = store.load(clock.now());
        let state = match load_report.source {
            LoadSource::Fresh | LoadSource::FellBack { .. } => {
                EngineState::with_settings(config.default_settings)
            }
            LoadSource::Current | LoadSource::Migrated { .. } => state,
        };

        let durable = !store.has_unread_state();
        if !durable {
            tracing::warn!("stored engine state unreadable; running in memory until it can be preserved");
        }
        let mut host = Self {
            engine: Engine::new(state, config, clock),
            store,
            bridge,
            templates,
            durable,
            load_report,
            startup: Outcome {
                value: Startup::default(),
                events: Vec::new(),
                warnings: Vec::new(),
            },
        };

        let mut warnings = Vec::new();
        if host.load_report.needs_rewrite() {
            host.persist(&mut warnings);
        }
        match host.run(Engine::reconcile) {
            Ok(outcome) => {
                warnings.extend(outcome.warnings);
                host.startup.value.reconciled = outcome.value;
                host.startup.events = outcome.events;
            }
            Err(e) => tracing::error!(error = %e, "cold-start reconciliation failed"),
        }
        match host
            .bridge
            .take_pending_deep_link(&host.templates.deep_link_scheme)
        {
            Ok(link) => host.startup.value.deep_link = link,
            Err(e) => bridge_warning(&mut warnings, "take_pending_deep_link", e),
        }
        host.startup.warnings = warnings;
        host
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn engine(&self) -> &Engine<C> {
        &self.engine
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut B {
        &mut self.bridge
    }

    pub fn store(&self) -> &StateStore<S> {
        &self.store
    }

    pub fn templates(&self) -> &ShieldTemplates {
        &self.templates
    }

    /// How the state was loaded.
    pub fn load_report(&self) -> &LoadReport {
        &self.load_report
    }

    /// What the cold-start reconciliation settled, and the deep link the
    /// app was opened with.
    pub fn startup(&self) -> &Outcome<Startup> {
        &self.startup
    }

    /// Whether the last write reached storage.
    pub fn is_durable(&self) -> bool {
        self.durable
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Run one engine operation and carry out its effects.
    ///
    /// # Errors
    /// Returns the engine's rejection unchanged. The operation itself
    /// committed nothing, but expiry or auto-completion it observed is
    /// settled and its effects run before the error is returned.
    pub fn run<T>(
        &mut self,
        op: impl FnOnce(&mut Engine<C>) -> Result<Transition<T>, EngineError>,
    ) -> Result<Outcome<T>, EngineError> {
        let transition = match op(&mut self.engine) {
            Ok(transition) => transition,
            Err(e) => {
                let settled = self.engine.take_settled();
                self.execute(&settled.effects);
                return Err(e);
            }
        };
        let warnings = self.execute(&transition.effects);
        Ok(Outcome {
            value: transition.value,
            events: transition.events,
            warnings,
        })
    }

    /// Render and publish the shield copy for the current balance.
    pub fn publish_shield(&mut self) -> Vec<Warning> {
        let mut warnings = Vec::new();
        self.publish(&mut warnings);
        warnings
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Bridge effects run in order; a single write follows them all.
    fn execute(&mut self, effects: &[Effect]) -> Vec<Warning> {
        let mut warnings = Vec::new();
        let mut persist = false;

        for effect in effects {
            match effect {
                Effect::Persist => persist = true,
                Effect::ApplyBlock(tokens) => {
                    if let Err(e) = self.bridge.apply_block(tokens) {
                        bridge_warning(&mut warnings, "apply_block", e);
                    }
                }
                Effect::RemoveBlock(tokens) => {
                    if let Err(e) = self.bridge.remove_block(tokens) {
                        bridge_warning(&mut warnings, "remove_block", e);
                    }
                }
                Effect::PublishShield => self.publish(&mut warnings),
            }
        }

        if persist {
            self.persist(&mut warnings);
        }
        warnings
    }

    fn publish(&mut self, warnings: &mut Vec<Warning>) {
        let balance = self.engine.balance();
        let config = match self.templates.render(balance) {
            Ok(config) => config,
            Err(e) => {
                bridge_warning(warnings, "publish_shield", e);
                return;
            }
        };
        if let Err(e) = self.bridge.publish_shield(&config) {
            bridge_warning(warnings, "publish_shield", e);
        }
    }

    fn persist(&mut self, warnings: &mut Vec<Warning>) {
        match self.store.persist(self.engine.state()) {
            Ok(()) => {
                if !self.durable {
                    tracing::info!("engine state durable again");
                }
                self.durable = true;
            }
            Err(e) => {
                tracing::warn!(error = %e, "engine state not persisted; continuing in memory");
                self.durable = false;
                warnings.push(Warning::PersistenceFailure {
                    message: e.to_string(),
                });
            }
        }
    }
}

fn bridge_warning(warnings: &mut Vec<Warning>, command: &'static str, err: impl std::fmt::Display) {
    tracing::warn!(command, error = %err, "blocking bridge call failed");
    warnings.push(Warning::BridgeFailure {
        command,
        message: err.to_string(),
    });
}
