//! Kind-based visibility filter.
//!
//! Runs first in every pass. Entities whose kind is hidden lose visibility
//! and are exempted from clustering, except the current search/follow target
//! which always stays visible.

use crate::entity::{Exemptions, MarkerKind};
use crate::overwatch_store::EntityStore;
use crate::pipeline::{order, PassContext, Updatable};
use std::collections::HashMap;
use tracing::debug;

/// Visibility rules per marker kind. Kinds without a rule are visible.
#[derive(Debug, Clone, Default)]
pub struct FilterModule {
    rules: HashMap<MarkerKind, bool>,
}

impl FilterModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rule for one kind.
    pub fn set_rule(&mut self, kind: MarkerKind, visible: bool) {
        self.rules.insert(kind, visible);
    }

    /// Replaces every rule.
    pub fn set_rules(&mut self, rules: impl IntoIterator<Item = (MarkerKind, bool)>) {
        self.rules = rules.into_iter().collect();
    }

    /// Drops every rule, making all kinds visible.
    pub fn clear_rules(&mut self) {
        self.rules.clear();
    }

    pub fn is_visible(&self, kind: MarkerKind) -> bool {
        self.rules.get(&kind).copied().unwrap_or(true)
    }

    /// Kinds currently hidden, in a stable order.
    pub fn hidden_kinds(&self) -> Vec<MarkerKind> {
        MarkerKind::all()
            .into_iter()
            .filter(|kind| !self.is_visible(*kind))
            .collect()
    }

    /// Applies the rules to every entity in the store.
    ///
    /// Returns the number of entities hidden.
    pub fn apply(&self, store: &mut EntityStore) -> usize {
        let mut hidden = 0;
        for (_, entity) in store.iter_mut() {
            if entity.exemptions.is_focused() {
                entity.visible = true;
                entity.exemptions.remove(Exemptions::FILTERED_OUT);
                continue;
            }

            let visible = self.is_visible(entity.kind);
            entity.visible = visible;
            entity.exemptions.set(Exemptions::FILTERED_OUT, !visible);
            if !visible {
                entity.make_single();
                hidden += 1;
            }
        }
        hidden
    }
}

impl Updatable for FilterModule {
    fn order(&self) -> i32 {
        order::FILTER
    }

    fn name(&self) -> &'static str {
        "filter"
    }

    fn update(&mut self, ctx: &mut PassContext<'_>) {
        let hidden = self.apply(ctx.store);
        if hidden > 0 {
            debug!("Filter hid {} entities ({:?})", hidden, self.hidden_kinds());
        }
    }
}
