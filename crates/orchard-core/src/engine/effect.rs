use serde::Serialize;

use crate::blocklist::AppTokenSet;
use crate::events::Event;

/// A side effect the host must carry out after a transition commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "effect", content = "tokens", rename_all = "snake_case")]
pub enum Effect {
    /// Write the state document.
    Persist,
    /// Block these apps again.
    ApplyBlock(AppTokenSet),
    /// Let these apps through.
    RemoveBlock(AppTokenSet),
    /// Re-render and publish the shield config (the balance changed).
    PublishShield,
}

/// The committed result of an engine operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition<T> {
    pub value: T,
    pub events: Vec<Event>,
    pub effects: Vec<Effect>,
}

impl<T> Transition<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Transition<U> {
        Transition {
            value: f(self.value),
            events: self.events,
            effects: self.effects,
        }
    }

    pub fn needs_persist(&self) -> bool {
        self.effects.contains(&Effect::Persist)
    }

    /// Number of `ApplyBlock` effects.
    pub fn block_count(&self) -> usize {
        self.effects
            .iter()
            .filter(|e| matches!(e, Effect::ApplyBlock(_)))
            .count()
    }
}
