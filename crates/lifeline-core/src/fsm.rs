//! Generic table-driven state machine.
//!
//! A [`Topology`] is an immutable set of rules keyed by `(state, event kind)`.
//! Each rule names the target state and an action invoked with the owning
//! entity and the triggering event. A [`StateMachine`] pairs a shared
//! `'static` topology with one current state.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Side effect run when a rule fires. It may mutate the owner; an error
/// aborts the transition and leaves the current state untouched.
pub type Action<O, E, Err> = fn(&mut O, &E) -> Result<(), Err>;

/// No rule exists for `(state, event)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition<S, K> {
    pub state: S,
    pub event: K,
}

impl<S: fmt::Display, K: fmt::Display> fmt::Display for InvalidTransition<S, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid event {} at state {}", self.event, self.state)
    }
}

struct Rule<S, O, E, Err> {
    to: S,
    action: Action<O, E, Err>,
}

pub struct Topology<S, K, O, E, Err> {
    name: &'static str,
    initial: S,
    rules: HashMap<(S, K), Rule<S, O, E, Err>>,
}

impl<S, K, O, E, Err> Topology<S, K, O, E, Err>
where
    S: Copy + Eq + Hash,
    K: Copy + Eq + Hash,
{
    pub fn builder(name: &'static str, initial: S) -> TopologyBuilder<S, K, O, E, Err> {
        TopologyBuilder {
            topology: Topology {
                name,
                initial,
                rules: HashMap::new(),
            },
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn initial(&self) -> S {
        self.initial
    }

    /// Target state of the rule for `(from, kind)`, if one is registered.
    pub fn target(&self, from: S, kind: K) -> Option<S> {
        self.rules.get(&(from, kind)).map(|rule| rule.to)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every state that appears as a rule source or target.
    pub fn states(&self) -> Vec<S> {
        let mut states = vec![self.initial];
        for ((from, _), rule) in &self.rules {
            for s in [*from, rule.to] {
                if !states.contains(&s) {
                    states.push(s);
                }
            }
        }
        states
    }
}

pub struct TopologyBuilder<S, K, O, E, Err> {
    topology: Topology<S, K, O, E, Err>,
}

impl<S, K, O, E, Err> TopologyBuilder<S, K, O, E, Err>
where
    S: Copy + Eq + Hash,
    K: Copy + Eq + Hash,
{
    /// Register `from --kind--> to`. A later registration of the same
    /// `(from, kind)` pair replaces the earlier one.
    #[must_use]
    pub fn add_transition(mut self, from: S, to: S, kind: K, action: Action<O, E, Err>) -> Self {
        self.topology.rules.insert((from, kind), Rule { to, action });
        self
    }

    pub fn build(self) -> Topology<S, K, O, E, Err> {
        self.topology
    }
}

pub struct StateMachine<S: 'static, K: 'static, O: 'static, E: 'static, Err: 'static> {
    topology: &'static Topology<S, K, O, E, Err>,
    current: S,
}

impl<S, K, O, E, Err> StateMachine<S, K, O, E, Err>
where
    S: Copy + Eq + Hash + 'static,
    K: Copy + Eq + Hash + 'static,
    O: 'static,
    E: 'static,
    Err: From<InvalidTransition<S, K>> + 'static,
{
    /// Machine positioned at the topology's initial state.
    pub fn new(topology: &'static Topology<S, K, O, E, Err>) -> Self {
        Self {
            current: topology.initial,
            topology,
        }
    }

    /// Machine seeded at `current` without validation (rehydration).
    pub fn with_state(topology: &'static Topology<S, K, O, E, Err>, current: S) -> Self {
        Self { topology, current }
    }

    pub fn topology(&self) -> &'static Topology<S, K, O, E, Err> {
        self.topology
    }

    pub fn current_state(&self) -> S {
        self.current
    }

    pub fn set_current_state(&mut self, state: S) {
        self.current = state;
    }

    /// Fire the rule for `(current, kind)` and return the new state.
    pub fn do_transition(&mut self, owner: &mut O, kind: K, event: &E) -> Result<S, Err> {
        let rule = self
            .topology
            .rules
            .get(&(self.current, kind))
            .ok_or(InvalidTransition {
                state: self.current,
                event: kind,
            })?;
        (rule.action)(owner, event)?;
        self.current = rule.to;
        Ok(self.current)
    }
}

impl<S, K, O, E, Err> fmt::Debug for StateMachine<S, K, O, E, Err>
where
    S: fmt::Debug + 'static,
    K: 'static,
    O: 'static,
    E: 'static,
    Err: 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("topology", &self.topology.name)
            .field("current", &self.current)
            .finish()
    }
}
