//! Invariant checking for deterministic simulation testing.
//!
//! Invariants are properties that must hold after every event the relay
//! processes. Unlike example-based tests that check specific scenarios, they
//! are run against every step of randomly generated operation sequences.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! let actions = driver.process_event(event)?;
//! let snapshot = RelaySnapshot::capture(&driver, trigger, &actions);
//! registry.assert_all(&snapshot, "after announce");
//! ```

mod checks;
mod snapshot;

pub use checks::{
    BroadcastCompleteness, DeliveriesToLiveConnections, OnlineWithinConnected,
    PayloadTransparency, PresenceKeyConsistency, RoutingIsolation,
};
pub use snapshot::{ObservedDelivery, RelaySnapshot, Trigger};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// An invariant that can be checked against relay state.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against one step's snapshot.
    fn check(&self, state: &RelaySnapshot) -> InvariantResult;

    /// Build a violation for this invariant.
    fn violation(&self, message: String) -> Violation {
        Violation { invariant: self.name(), message }
    }
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Registry with every relay invariant.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(PresenceKeyConsistency);
        registry.add(OnlineWithinConnected);
        registry.add(BroadcastCompleteness);
        registry.add(RoutingIsolation);
        registry.add(PayloadTransparency);
        registry.add(DeliveriesToLiveConnections);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants against the given state.
    ///
    /// Returns `Ok(())` if all invariants hold, or all violations found.
    pub fn check_all(&self, state: &RelaySnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking with every violation found.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &RelaySnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("Invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
