//! Event Bus: the bounded, single-active-consumer push channel for one Process, per §4.2.
//!
//! Modeled as a shared ring buffer rather than a raw `tokio::mpsc` pair, because the bus
//! needs two behaviors `mpsc` doesn't give us directly: coalescing `STEP-PROGRESS` events
//! in place when the buffer is full, and letting a reconnecting subscriber resume from
//! whatever is still buffered instead of starting a brand new channel from empty.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use crate::models::{ExecutionEvent, ProgressType};

/// How long the producer blocks on a full buffer before it starts coalescing progress
/// events in place, per §4.2.
const COALESCE_AFTER: Duration = Duration::from_millis(100);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

struct BusState {
    next_seq: u64,
    buffer: VecDeque<(u64, ExecutionEvent)>,
    consumer_generation: u64,
}

/// Per-Process event bus. Cheap to clone (all state is behind `Arc`-shared interior
/// mutability via the owning `Process`/registry holding one instance).
pub struct EventBus {
    state: Mutex<BusState>,
    notify: Notify,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(BusState {
                next_seq: 0,
                buffer: VecDeque::with_capacity(capacity),
                consumer_generation: 0,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Publish an event, assigning it the next sequence number.
    ///
    /// Blocks while the buffer is full. Non-critical `STEP-PROGRESS` events give up after
    /// [`COALESCE_AFTER`] and instead overwrite the most recent unconsumed progress event
    /// for the same step (or are dropped if none is buffered yet); every other variant
    /// keeps blocking indefinitely, since §4.2 requires it is never dropped.
    pub async fn publish(&self, event: ExecutionEvent) {
        let started_waiting = Instant::now();

        loop {
            {
                let mut state = self.state.lock().expect("event bus lock poisoned");

                if state.buffer.len() < self.capacity {
                    let seq = state.next_seq;
                    state.next_seq += 1;
                    state.buffer.push_back((seq, event));
                    drop(state);
                    self.notify.notify_waiters();
                    return;
                }

                if !event.is_never_drop() && started_waiting.elapsed() >= COALESCE_AFTER {
                    self.coalesce_progress(&mut state, event);
                    return;
                }
            }

            let _ = tokio::time::timeout(POLL_INTERVAL, self.notify.notified()).await;
        }
    }

    /// Overwrite the most recent buffered `STEP-PROGRESS` for the same step, or drop the
    /// incoming one if no such slot exists (buffer is full of non-progress events).
    fn coalesce_progress(&self, state: &mut BusState, event: ExecutionEvent) {
        let ExecutionEvent::StepProgress { step_number, .. } = &event else {
            // Not reachable: callers only route STEP-PROGRESS here, guarded by is_never_drop.
            return;
        };
        let target_step = *step_number;

        let slot = state.buffer.iter_mut().rev().find(|(_, e)| {
            matches!(e, ExecutionEvent::StepProgress { step_number, .. } if *step_number == target_step)
        });

        if let Some(slot) = slot {
            // Keep the slot's original seq: bumping it here would let a never-drop event
            // already buffered behind this slot (with a lower seq) be delivered *after* it,
            // which a subscriber would observe as a decreasing sequence number (§8 property 1).
            let seq = slot.0;
            *slot = (seq, event);
        }
        // Else: no buffered progress for this step to coalesce onto; drop it. This is the
        // only event loss the engine permits, and only for this one variant (§8 property 8).
    }

    /// Attach a new consumer, detaching any previous one. The previous subscription's
    /// `recv` calls will observe the generation change and return `None`.
    pub fn subscribe(self: &std::sync::Arc<Self>) -> Subscription {
        let generation = {
            let mut state = self.state.lock().expect("event bus lock poisoned");
            state.consumer_generation += 1;
            state.consumer_generation
        };
        self.notify.notify_waiters();
        Subscription {
            bus: self.clone(),
            generation,
        }
    }

    #[cfg(test)]
    fn buffered_len(&self) -> usize {
        self.state.lock().unwrap().buffer.len()
    }
}

/// A single subscriber's view onto an [`EventBus`]. Detached (and its `recv` stream ended)
/// as soon as a later `subscribe()` call supersedes it — per §4.1/§8, exclusivity.
pub struct Subscription {
    bus: std::sync::Arc<EventBus>,
    generation: u64,
}

impl Subscription {
    /// Pull the next event in FIFO order, or `None` once this subscription has been
    /// detached by a newer `subscribe()` call.
    pub async fn recv(&mut self) -> Option<ExecutionEvent> {
        self.recv_with_seq().await.map(|(_, event)| event)
    }

    /// Like [`Self::recv`], but also returns the event's bus-assigned sequence number —
    /// the monotonic `seq` carried on the wire envelope (§3, §6).
    pub async fn recv_with_seq(&mut self) -> Option<(u64, ExecutionEvent)> {
        loop {
            // Register interest in the next notification *before* checking the buffer, per
            // the documented `Notify` pattern: a `notify_waiters()` call has no permit to
            // store, so a publish landing between "buffer found empty" and "start waiting"
            // would otherwise be lost forever (e.g. a terminal `DONE` the producer publishes
            // right as this consumer catches up to an empty buffer).
            let notified = self.bus.notify.notified();

            {
                let mut state = self.bus.state.lock().expect("event bus lock poisoned");
                if state.consumer_generation != self.generation {
                    return None;
                }
                if let Some(entry) = state.buffer.pop_front() {
                    drop(state);
                    self.bus.notify.notify_waiters();
                    return Some(entry);
                }
            }

            // Bounded wait mirrors the producer's own `POLL_INTERVAL` guard (§4.2): belt
            // and suspenders against any remaining edge case in `Notify`'s wakeup delivery.
            let _ = tokio::time::timeout(POLL_INTERVAL, notified).await;
        }
    }
}

/// Sets `current`/`total`/`percentage` on a generic progress event, used by the API
/// and subprocess handlers alike when a page/entity count is known.
pub fn progress_event(
    step_number: usize,
    progress_type: ProgressType,
    current: Option<u64>,
    total: Option<u64>,
    message: impl Into<String>,
    wait_seconds: Option<u64>,
) -> ExecutionEvent {
    let percentage = match (current, total) {
        (Some(c), Some(t)) if t > 0 => Some((c as f64 / t as f64) * 100.0),
        _ => None,
    };
    ExecutionEvent::StepProgress {
        step_number,
        progress_type,
        current,
        total,
        percentage,
        message: message.into(),
        wait_seconds,
    }
}
