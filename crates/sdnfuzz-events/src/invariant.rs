//! Named correctness predicates.
//!
//! A `CheckInvariants` event names the predicate it evaluates. Only the name
//! is written to the superlog; on reload it is resolved against this fixed,
//! versioned registry, and the simulation's [`InvariantChecker`] evaluates
//! it. Code is never serialized.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::sim::Simulation;

/// Known invariant predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Invariant {
    /// Controller view of the network matches the physical network.
    #[default]
    Correspondence,
    /// Every pair of hosts can reach each other.
    Connectivity,
    /// No forwarding loops.
    Loops,
    /// No packets silently dropped by the forwarding state.
    Blackholes,
    /// Migrated hosts are reachable at their new attachment point.
    Migrations,
}

impl Invariant {
    /// Version of the name registry. Bump when a name is removed or renamed.
    pub const REGISTRY_VERSION: u32 = 1;

    pub const ALL: [Invariant; 5] = [
        Invariant::Correspondence,
        Invariant::Connectivity,
        Invariant::Loops,
        Invariant::Blackholes,
        Invariant::Migrations,
    ];

    /// The superlog name of this predicate.
    pub fn name(self) -> &'static str {
        match self {
            Invariant::Correspondence => "check_correspondence",
            Invariant::Connectivity => "check_connectivity",
            Invariant::Loops => "check_loops",
            Invariant::Blackholes => "check_blackholes",
            Invariant::Migrations => "check_migrations",
        }
    }

    /// Resolves a superlog name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|invariant| invariant.name() == name)
    }
}

impl fmt::Display for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Invariant {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Invariant {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Invariant::from_name(&name).ok_or_else(|| {
            de::Error::custom(format!(
                "unknown invariant `{name}` (invariant registry v{})",
                Invariant::REGISTRY_VERSION
            ))
        })
    }
}

/// Evaluates invariant predicates against a live simulation.
///
/// Returns one human-readable description per violation; empty means the
/// invariant holds.
pub trait InvariantChecker {
    fn check(&self, invariant: Invariant, sim: &Simulation) -> Vec<String>;
}

/// Adapter for closures, see [`Simulation::with_invariant_check`].
pub(crate) struct FnChecker<F>(pub(crate) F);

impl<F> InvariantChecker for FnChecker<F>
where
    F: Fn(Invariant, &Simulation) -> Vec<String>,
{
    fn check(&self, invariant: Invariant, sim: &Simulation) -> Vec<String> {
        (self.0)(invariant, sim)
    }
}
