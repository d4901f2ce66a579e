//! Globally unique event labels.
//!
//! A [`LabelRegistry`] issues labels of the form `<prefix><n>` from a single
//! monotonically increasing counter shared by every prefix, and remembers
//! every numeric suffix it has issued or been told about. Labels read back
//! from a superlog are [`claim`](LabelRegistry::claim)ed so that events
//! generated afterwards in the same process never collide with them.
//!
//! ## Lifecycle
//!
//! Create one registry per process (or per test) and share it as an
//! `Arc<LabelRegistry>` with everything that creates events: the fuzzer, the
//! codec and any live recorder. There is no hidden global; two registries
//! are fully independent.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use sdnfuzz_types::Label;

use crate::error::LabelError;

/// Prefix of labels issued to input events.
pub const INPUT_PREFIX: &str = "e";

/// Prefix of labels issued to internal events.
pub const INTERNAL_PREFIX: &str = "i";

#[derive(Debug)]
struct LabelState {
    next_id: u64,
    claimed: HashSet<u64>,
}

/// Thread-safe issuer of unique event labels.
#[derive(Debug)]
pub struct LabelRegistry {
    state: Mutex<LabelState>,
}

impl LabelRegistry {
    /// Creates an empty registry. The first issued label ends in `1`.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LabelState {
                next_id: 1,
                claimed: HashSet::new(),
            }),
        }
    }

    /// Issues a label never before issued or claimed in this registry.
    pub fn next_label(&self, prefix: &str) -> Label {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let id = state.next_id;
            state.next_id += 1;
            if state.claimed.insert(id) {
                return Label::generated(prefix, id);
            }
        }
    }

    /// Records an externally supplied label so it is never issued.
    ///
    /// Claiming the same label twice is a no-op.
    pub fn claim(&self, label: &Label) -> Result<(), LabelError> {
        let id = label
            .numeric_suffix()
            .ok_or_else(|| LabelError::MalformedLabel(label.clone()))?;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.claimed.insert(id);
        Ok(())
    }

    /// Returns true if the label's suffix has been issued or claimed.
    pub fn is_claimed(&self, label: &Label) -> bool {
        let Some(id) = label.numeric_suffix() else {
            return false;
        };
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.claimed.contains(&id)
    }
}

impl Default for LabelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn issues_sequential_labels() {
        let registry = LabelRegistry::new();
        assert_eq!(registry.next_label(INPUT_PREFIX).as_str(), "e1");
        assert_eq!(registry.next_label(INTERNAL_PREFIX).as_str(), "i2");
        assert_eq!(registry.next_label(INPUT_PREFIX).as_str(), "e3");
    }

    #[test]
    fn skips_claimed_suffixes() {
        let registry = LabelRegistry::new();
        registry.claim(&Label::new("e2")).unwrap();
        registry.claim(&Label::new("i3")).unwrap();

        assert_eq!(registry.next_label(INPUT_PREFIX).as_str(), "e1");
        assert_eq!(registry.next_label(INPUT_PREFIX).as_str(), "e4");
    }

    #[test]
    fn rejects_labels_without_suffix() {
        let registry = LabelRegistry::new();
        let err = registry.claim(&Label::new("bogus")).unwrap_err();
        assert_eq!(err, LabelError::MalformedLabel(Label::new("bogus")));
    }

    #[test]
    fn registries_are_isolated() {
        let a = LabelRegistry::new();
        let b = LabelRegistry::new();
        a.claim(&Label::new("e1")).unwrap();
        assert_eq!(b.next_label(INPUT_PREFIX).as_str(), "e1");
        assert!(!b.is_claimed(&Label::new("e2")));
    }

    #[test]
    fn concurrent_issuance_is_unique() {
        let registry = Arc::new(LabelRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    (0..500)
                        .map(|_| registry.next_label(INPUT_PREFIX))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for label in handle.join().expect("issuer thread panicked") {
                assert!(seen.insert(label.clone()), "duplicate label {label}");
            }
        }
        assert_eq!(seen.len(), 8 * 500);
    }

    proptest! {
        /// Generated labels never collide with each other or with any
        /// label reconstructed from a log.
        #[test]
        fn generated_labels_avoid_claimed(
            claimed in prop::collection::vec(1u64..200, 0..50),
            generated in 1usize..200,
        ) {
            let registry = LabelRegistry::new();
            let claimed: HashSet<u64> = claimed.into_iter().collect();
            for id in &claimed {
                registry.claim(&Label::generated(INPUT_PREFIX, *id)).unwrap();
            }

            let mut seen = HashSet::new();
            for i in 0..generated {
                let prefix = if i % 2 == 0 { INPUT_PREFIX } else { INTERNAL_PREFIX };
                let label = registry.next_label(prefix);
                let id = label.numeric_suffix().unwrap();
                prop_assert!(!claimed.contains(&id));
                prop_assert!(seen.insert(id));
            }
        }
    }
}
