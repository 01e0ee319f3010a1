use std::collections::{HashMap, VecDeque};

use tokio::sync::oneshot;

use crate::action::{ActionResult, ArgsOf, Model, Outcome, OutputOf, Pending};
use crate::error::ActionError;
use crate::executor::AbortSignal;

use super::ConflictPolicy;

/// Resolves the pending handle of one call.
pub(crate) type Sender<M> = oneshot::Sender<ActionResult<OutputOf<M>>>;

/// A call that owns its slot and must be launched by the caller.
pub(crate) struct Started<M: Model> {
    pub call_id: u64,
    pub args: ArgsOf<M>,
    pub signal: AbortSignal,
    pub tx: Sender<M>,
    pub pending: Pending<OutputOf<M>>,
}

/// Decision for a newly dispatched call.
pub(crate) enum Admission<M: Model> {
    Start(Started<M>),
    Queued(Pending<OutputOf<M>>),
    /// Equal arguments to a call already in flight or queued.
    Joined(Pending<OutputOf<M>>),
    Rejected(Pending<OutputOf<M>>),
    Ignored(Pending<OutputOf<M>>),
}

struct InFlight<M: Model> {
    call_id: u64,
    args: ArgsOf<M>,
    pending: Pending<OutputOf<M>>,
    signal: AbortSignal,
}

struct Queued<M: Model> {
    args: ArgsOf<M>,
    tx: Sender<M>,
    pending: Pending<OutputOf<M>>,
}

struct Slot<M: Model> {
    in_flight: Option<InFlight<M>>,
    queue: VecDeque<Queued<M>>,
}

impl<M: Model> Default for Slot<M> {
    fn default() -> Self {
        Self {
            in_flight: None,
            queue: VecDeque::new(),
        }
    }
}

/// Occupancy of every `(action, instance)` slot.
pub(crate) struct ConflictResolver<M: Model> {
    next_call_id: u64,
    slots: HashMap<(String, String), Slot<M>>,
}

impl<M: Model> Default for ConflictResolver<M> {
    fn default() -> Self {
        Self {
            next_call_id: 1,
            slots: HashMap::new(),
        }
    }
}

impl<M: Model> ConflictResolver<M> {
    pub fn admit(
        &mut self,
        action: &str,
        instance: &str,
        policy: ConflictPolicy,
        fallback: ConflictPolicy,
        args: ArgsOf<M>,
    ) -> Admission<M> {
        let key = (action.to_string(), instance.to_string());
        let busy = self
            .slots
            .get(&key)
            .is_some_and(|slot| slot.in_flight.is_some());

        // Parallel never checks: a same-id call takes over the slot.
        if !busy || policy == ConflictPolicy::Parallel {
            return Admission::Start(self.reserve(key, args));
        }

        let policy = match policy {
            ConflictPolicy::Reuse => {
                if let Some(pending) = self.find_equal(&key, &args) {
                    return Admission::Joined(pending);
                }
                fallback.as_fallback()
            }
            other => other,
        };

        match policy {
            ConflictPolicy::Reject => Admission::Rejected(Pending::ready(Err(
                ActionError::Conflict {
                    action: action.to_string(),
                },
            ))),
            ConflictPolicy::Ignore => Admission::Ignored(Pending::ready(Ok(Outcome::Ignored))),
            ConflictPolicy::KeepLast => {
                let slot = self.slots.entry(key).or_default();
                for superseded in slot.queue.drain(..) {
                    let _ = superseded.tx.send(Ok(Outcome::Superseded));
                }
                Admission::Queued(Self::enqueue(slot, action, args))
            }
            _ => {
                let slot = self.slots.entry(key).or_default();
                Admission::Queued(Self::enqueue(slot, action, args))
            }
        }
    }

    /// Frees the slot held by `call_id` and reserves it for the next queued
    /// call, if any. Returns `None` when `call_id` no longer owns the slot.
    pub fn release(&mut self, action: &str, instance: &str, call_id: u64) -> Option<Started<M>> {
        let key = (action.to_string(), instance.to_string());
        let slot = self.slots.get_mut(&key)?;
        if slot.in_flight.as_ref().map(|call| call.call_id) != Some(call_id) {
            return None;
        }
        slot.in_flight = None;
        self.start_queued(key)
    }

    /// Detaches the in-flight call from its slot. Returns its signal and the
    /// queued call that now owns the slot.
    pub fn abort(
        &mut self,
        action: &str,
        instance: &str,
    ) -> Option<(AbortSignal, Option<Started<M>>)> {
        let key = (action.to_string(), instance.to_string());
        let call = self.slots.get_mut(&key)?.in_flight.take()?;
        Some((call.signal, self.start_queued(key)))
    }

    pub fn is_busy(&self, action: &str, instance: &str) -> bool {
        self.slots
            .get(&(action.to_string(), instance.to_string()))
            .is_some_and(|slot| slot.in_flight.is_some())
    }

    pub fn queued(&self, action: &str, instance: &str) -> usize {
        self.slots
            .get(&(action.to_string(), instance.to_string()))
            .map_or(0, |slot| slot.queue.len())
    }

    fn start_queued(&mut self, key: (String, String)) -> Option<Started<M>> {
        let next = self.slots.get_mut(&key).and_then(|slot| slot.queue.pop_front());
        match next {
            Some(queued) => {
                let call_id = self.next_id();
                let signal = AbortSignal::new();
                let slot = self.slots.entry(key).or_default();
                slot.in_flight = Some(InFlight {
                    call_id,
                    args: queued.args.clone(),
                    pending: queued.pending.clone(),
                    signal: signal.clone(),
                });
                Some(Started {
                    call_id,
                    args: queued.args,
                    signal,
                    tx: queued.tx,
                    pending: queued.pending,
                })
            }
            None => {
                self.slots.remove(&key);
                None
            }
        }
    }

    fn reserve(&mut self, key: (String, String), args: ArgsOf<M>) -> Started<M> {
        let call_id = self.next_id();
        let (tx, pending) = Pending::channel(&key.0);
        let signal = AbortSignal::new();
        self.slots.entry(key).or_default().in_flight = Some(InFlight {
            call_id,
            args: args.clone(),
            pending: pending.clone(),
            signal: signal.clone(),
        });
        Started {
            call_id,
            args,
            signal,
            tx,
            pending,
        }
    }

    fn enqueue(slot: &mut Slot<M>, action: &str, args: ArgsOf<M>) -> Pending<OutputOf<M>> {
        let (tx, pending) = Pending::channel(action);
        slot.queue.push_back(Queued {
            args,
            tx,
            pending: pending.clone(),
        });
        pending
    }

    fn find_equal(&self, key: &(String, String), args: &ArgsOf<M>) -> Option<Pending<OutputOf<M>>> {
        let slot = self.slots.get(key)?;
        slot.in_flight
            .as_ref()
            .filter(|call| call.args == *args)
            .map(|call| call.pending.clone())
            .or_else(|| {
                slot.queue
                    .iter()
                    .find(|queued| queued.args == *args)
                    .map(|queued| queued.pending.clone())
            })
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_call_id;
        self.next_call_id += 1;
        id
    }
}
