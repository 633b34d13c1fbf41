//! Subscriber-count driven activation of upstream inputs.
//!
//! Each output reports subscriber count changes as a
//! [SubscriberEvent]. The [LifecycleManager] folds them into per-output
//! counts and a two-state machine: the upstream inputs are activated
//! when the driving count leaves zero and deactivated when it returns
//! to zero.

use crate::demand::{OutputDemand, OutputTopic};
use indexmap::IndexMap;
use tracing::debug;

/// Subscriber count change of one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberEvent {
    pub output: OutputTopic,
    pub previous: usize,
    pub current: usize,
}

impl SubscriberEvent {
    pub fn new(output: OutputTopic, previous: usize, current: usize) -> Self {
        Self {
            output,
            previous,
            current,
        }
    }
}

/// Which subscriber counts keep the upstream inputs alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationPolicy {
    /// Only the named output drives activation.
    Single(OutputTopic),
    /// Any subscriber on any registered output keeps every input
    /// active.
    AnyOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Inactive,
    Active,
}

/// A request for the upstream inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Activate,
    Deactivate,
}

/// The upstream subscriptions feeding a synchronizer.
pub trait Upstream {
    fn activate(&mut self);
    fn deactivate(&mut self);
}

/// Reference counts downstream consumers and gates the upstream inputs.
#[derive(Debug, Clone)]
pub struct LifecycleManager {
    policy: ActivationPolicy,
    counts: IndexMap<OutputTopic, usize>,
    state: LifecycleState,
}

impl LifecycleManager {
    /// Creates a manager tracking the given outputs, all starting with
    /// zero subscribers.
    ///
    /// # Panics
    ///
    /// Panics if a `Single` policy names an output that is not tracked.
    pub fn new<I>(policy: ActivationPolicy, outputs: I) -> Self
    where
        I: IntoIterator<Item = OutputTopic>,
    {
        let counts: IndexMap<_, _> = outputs.into_iter().map(|output| (output, 0)).collect();
        if let ActivationPolicy::Single(output) = policy {
            assert!(
                counts.contains_key(&output),
                "activation output {output:?} is not tracked"
            );
        }

        Self {
            policy,
            counts,
            state: LifecycleState::Inactive,
        }
    }

    pub fn policy(&self) -> ActivationPolicy {
        self.policy
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == LifecycleState::Active
    }

    pub fn subscriber_count(&self, output: OutputTopic) -> usize {
        self.counts.get(&output).copied().unwrap_or(0)
    }

    /// The count that decides activation under the current policy.
    pub fn driving_count(&self) -> usize {
        match self.policy {
            ActivationPolicy::Single(output) => self.subscriber_count(output),
            ActivationPolicy::AnyOutput => self.counts.values().sum(),
        }
    }

    /// Outputs that currently have at least one subscriber.
    pub fn demand(&self) -> OutputDemand {
        self.counts
            .iter()
            .filter(|&(_, &count)| count > 0)
            .fold(OutputDemand::empty(), |demand, (output, _)| {
                demand | output.demand()
            })
    }

    /// Applies a subscriber count change and returns the transition the
    /// upstream inputs must make, if any.
    ///
    /// # Panics
    ///
    /// Panics if the output is not tracked or if `previous` disagrees
    /// with the tracked count. Both indicate a broken caller, not a
    /// sensor fault.
    pub fn handle(&mut self, event: SubscriberEvent) -> Option<Transition> {
        let SubscriberEvent {
            output,
            previous,
            current,
        } = event;

        let Some(count) = self.counts.get_mut(&output) else {
            panic!("subscriber event for untracked output {output:?}");
        };
        assert_eq!(
            *count, previous,
            "subscriber count of {output:?} out of step: tracked {count}, event says {previous}"
        );
        *count = current;

        let driving = self.driving_count();
        let transition = match (self.state, driving > 0) {
            (LifecycleState::Inactive, true) => {
                self.state = LifecycleState::Active;
                Some(Transition::Activate)
            }
            (LifecycleState::Active, false) => {
                self.state = LifecycleState::Inactive;
                Some(Transition::Deactivate)
            }
            _ => None,
        };

        debug!(
            output = output.name(),
            previous,
            current,
            driving,
            ?transition,
            "Subscriber count changed"
        );

        transition
    }

    /// Records one new subscriber on `output`.
    pub fn connect(&mut self, output: OutputTopic) -> Option<Transition> {
        let previous = self.subscriber_count(output);
        self.handle(SubscriberEvent::new(output, previous, previous + 1))
    }

    /// Records one departed subscriber on `output`.
    ///
    /// # Panics
    ///
    /// Panics if `output` has no subscribers.
    pub fn disconnect(&mut self, output: OutputTopic) -> Option<Transition> {
        let previous = self.subscriber_count(output);
        assert!(
            previous > 0,
            "disconnect from {output:?} which has no subscribers"
        );
        self.handle(SubscriberEvent::new(output, previous, previous - 1))
    }

    /// Handles the event and forwards the resulting transition to the
    /// upstream inputs.
    pub fn apply<U>(&mut self, event: SubscriberEvent, upstream: &mut U) -> Option<Transition>
    where
        U: Upstream + ?Sized,
    {
        let transition = self.handle(event)?;
        match transition {
            Transition::Activate => upstream.activate(),
            Transition::Deactivate => upstream.deactivate(),
        }
        Some(transition)
    }
}
