//! Dependency-checked pruning of superlogs.
//!
//! Trace minimization repeatedly drops input events and replays what is
//! left. An event that lists a dropped label in its `dependent_labels`
//! cannot be replayed faithfully without it, so such a drop is refused.

use std::collections::{BTreeSet, HashMap, HashSet};

use sdnfuzz_events::Event;
use sdnfuzz_types::Label;

use crate::error::PruneError;

// ============================================================================
// Dependency Graph
// ============================================================================

/// The `dependent_labels` annotations of a superlog, indexed both ways.
#[derive(Debug, Default)]
pub struct DependencyIndex {
    /// label -> labels it depends on
    dependencies: HashMap<Label, Vec<Label>>,
    /// label -> labels depending on it, in superlog order
    dependents: HashMap<Label, Vec<Label>>,
}

impl DependencyIndex {
    pub fn build(events: &[Event]) -> Self {
        let mut index = Self::default();
        for event in events {
            let label = event.label();
            for dependency in event.dependent_labels() {
                index
                    .dependents
                    .entry(dependency.clone())
                    .or_default()
                    .push(label.clone());
            }
            index
                .dependencies
                .insert(label.clone(), event.dependent_labels().to_vec());
        }
        index
    }

    /// Labels `label` depends on directly.
    pub fn direct_dependencies(&self, label: &Label) -> &[Label] {
        self.dependencies.get(label).map_or(&[], Vec::as_slice)
    }

    /// Everything `label` depends on, directly or not, excluding itself.
    pub fn transitive_dependencies(&self, label: &Label) -> BTreeSet<Label> {
        let mut closure = BTreeSet::new();
        let mut queue = vec![label.clone()];

        while let Some(next) = queue.pop() {
            if closure.insert(next.clone()) {
                queue.extend(self.direct_dependencies(&next).iter().cloned());
            }
        }

        closure.remove(label);
        closure
    }

    /// Labels of events that depend on `label` directly.
    pub fn dependents(&self, label: &Label) -> &[Label] {
        self.dependents.get(label).map_or(&[], Vec::as_slice)
    }

    /// True if dropping every label in `dropping` leaves no surviving event
    /// depending on `label`.
    pub fn is_removable(&self, label: &Label, dropping: &HashSet<Label>) -> bool {
        self.dependents(label)
            .iter()
            .all(|dependent| dropping.contains(dependent))
    }
}

// ============================================================================
// Pruning
// ============================================================================

/// Returns `events` without the input events labelled in `drop`.
///
/// Refuses labels that are absent, that name non-input events, or that a
/// surviving event depends on. The survivors keep their order.
pub fn prune(events: &[Event], drop: &[Label]) -> Result<Vec<Event>, PruneError> {
    let dropping: HashSet<Label> = drop.iter().cloned().collect();
    let index = DependencyIndex::build(events);

    for label in drop {
        let event = events
            .iter()
            .find(|event| event.label() == label)
            .ok_or_else(|| PruneError::UnknownLabel(label.clone()))?;

        if !event.is_input() {
            return Err(PruneError::NotAnInput {
                label: label.clone(),
                class: event.class(),
            });
        }

        if let Some(dependent) = index
            .dependents(label)
            .iter()
            .find(|dependent| !dropping.contains(*dependent))
        {
            return Err(PruneError::StillDependedOn {
                label: label.clone(),
                dependent: dependent.clone(),
            });
        }
    }

    let pruned: Vec<Event> = events
        .iter()
        .filter(|event| !dropping.contains(event.label()))
        .cloned()
        .collect();

    tracing::info!(
        dropped = events.len() - pruned.len(),
        remaining = pruned.len(),
        "pruned superlog"
    );
    Ok(pruned)
}
