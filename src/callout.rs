//! Public callout API and the per-entry state machine.
//!
//! A [`Callwheel`] schedules callbacks for execution a number of clock ticks
//! in the future. The environment drives it with two calls: [`Callwheel::tick_advance`]
//! once per clock tick (interrupt-safe: O(1) bounded work), and
//! [`Callwheel::drain`] from deferred context whenever `tick_advance`
//! reports pending work. Callbacks run with the wheel lock released, so they
//! may freely re-enter `schedule`/`cancel`/`release`, including on their own
//! entry.
//!
//! # Entry lifecycle
//!
//! [`Callwheel::register`] binds a callback and returns a reusable
//! [`CalloutId`]. The entry then moves between three states: unscheduled,
//! pending (queued in a bucket or the to-do list), and fired. `schedule` may
//! be called any number of times; the most recent call's expiry wins, with
//! one documented laxity: a reschedule that does not strictly shorten the
//! remaining time leaves the entry where it sits, trusting future cascades
//! to reconsider it. [`Callwheel::release`] frees the slot; any later use of
//! the handle is a caught contract violation (panic), as is scheduling with
//! a negative delay.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::arena::ArenaIndex;
use crate::config::WheelConfig;
use crate::config::ConfigError;
use crate::wheel::{DrainStep, WheelState, BUCKET_COUNT, NODE_BASE, TODO, WHEEL_SIZE};

/// Callback invoked when a callout fires. Cloned out of the wheel under the
/// lock and invoked with the lock released.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Handle to a registered callout.
///
/// Copyable and cheap; internally a slot index plus a generation counter, so
/// a handle left over from a released entry is detected rather than aliasing
/// the slot's next occupant.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CalloutId(ArenaIndex);

impl fmt::Debug for CalloutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CalloutId({:?})", self.0)
    }
}

/// Outcome of a [`Callwheel::schedule`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduled {
    /// The entry was not pending and has been freshly queued.
    Fresh,
    /// The entry was pending and the new expiry is strictly sooner; it was
    /// moved to the to-do list for prompt re-evaluation.
    RescheduledEarlier,
    /// The entry was pending with an equal-or-later new expiry and was left
    /// in place; cascades will reconsider it as time advances.
    LeftInPlace,
}

/// Where a pending callout currently resides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Staged on the to-do list for the next drain pass.
    Todo,
    /// Parked in a wheel bucket.
    Bucket {
        /// Wheel level, 0 (finest) through 3 (coarsest).
        level: u8,
        /// Bucket index within the level.
        index: u8,
    },
}

/// Diagnostic view of one pending callout, as reported by
/// [`Callwheel::snapshot`].
#[derive(Debug, Clone, Copy)]
pub struct PendingCallout {
    /// Handle of the pending entry.
    pub id: CalloutId,
    /// Absolute expiry tick.
    pub expiry: u32,
    /// Wrap-safe ticks until expiry (may be negative if overdue).
    pub remaining: i32,
    /// List the entry is linked into.
    pub location: Location,
}

/// Tick-granular hierarchical timing wheel.
///
/// One mutex guards the entire wheel state; every operation here is a short
/// critical section except [`Callwheel::drain`], which releases the lock
/// around each callback invocation.
#[derive(Debug)]
pub struct Callwheel {
    name: String,
    hz: u32,
    state: Mutex<WheelState>,
}

impl Default for Callwheel {
    fn default() -> Self {
        Self::new()
    }
}

impl Callwheel {
    /// Creates a wheel with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(WheelConfig::default())
    }

    /// Creates a wheel from `config`, normalizing invalid values to
    /// defaults.
    #[must_use]
    pub fn with_config(mut config: WheelConfig) -> Self {
        config.normalize();
        Self::from_config(config)
    }

    /// Creates a wheel from `config`, rejecting invalid values.
    pub fn try_with_config(config: WheelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: WheelConfig) -> Self {
        Self {
            name: config.name,
            hz: config.hz,
            state: Mutex::new(WheelState::new()),
        }
    }

    /// The wheel's label, used in trace output.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ticks per second assumed by the duration-conversion wrappers.
    #[must_use]
    pub fn hz(&self) -> u32 {
        self.hz
    }

    /// Current absolute tick.
    #[must_use]
    pub fn ticks(&self) -> u32 {
        self.state.lock().ticks
    }

    /// Number of pending (queued, not yet fired) callouts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().pending
    }

    /// True if no callouts are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // =========================================================================
    // Entry lifecycle
    // =========================================================================

    /// Registers a callback, returning a reusable handle in the unscheduled
    /// state.
    pub fn register<F>(&self, callback: F) -> CalloutId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.register_arc(Arc::new(callback))
    }

    /// [`Callwheel::register`] for an already-shared callback.
    pub fn register_arc(&self, callback: Callback) -> CalloutId {
        let mut guard = self.state.lock();
        let id = CalloutId(guard.register(callback));
        let registered = guard.entries.len();
        drop(guard);
        tracing::trace!(wheel = %self.name, callout = ?id, registered, "registered callout");
        id
    }

    /// Releases a callout's slot, cancelling it first if pending.
    ///
    /// # Panics
    ///
    /// Panics if `id` is stale (already released).
    pub fn release(&self, id: CalloutId) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let record = state
            .entries
            .get(id.0)
            .unwrap_or_else(|| panic!("{}: callout {id:?} is not registered", self.name));
        if record.on_queue {
            state.links.remove(WheelState::node_for(id.0));
            state.pending -= 1;
        }
        state.entries.remove(id.0);
        drop(guard);
        tracing::trace!(wheel = %self.name, callout = ?id, "released callout");
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Schedules the callout to fire `delay` ticks from now.
    ///
    /// A fresh schedule always stages the entry on the to-do list; the next
    /// drain pass buckets it by remaining time. Rescheduling a pending entry
    /// strictly sooner also moves it to the to-do list immediately;
    /// rescheduling equal-or-later leaves it in place (see the module docs
    /// for the resulting laxity). A delay of zero is legal and means
    /// "already due".
    ///
    /// # Panics
    ///
    /// Panics if `delay` is negative or `id` is stale.
    pub fn schedule(&self, id: CalloutId, delay: i32) -> Scheduled {
        assert!(
            delay >= 0,
            "{}: negative delay {delay} for callout {id:?}",
            self.name
        );
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let new_expiry = state.ticks.wrapping_add(delay as u32);
        let node = WheelState::node_for(id.0);
        let record = state
            .entries
            .get_mut(id.0)
            .unwrap_or_else(|| panic!("{}: callout {id:?} is not registered", self.name));

        record.triggered = false;
        let outcome = if record.on_queue {
            if (new_expiry.wrapping_sub(record.expiry) as i32) < 0 {
                state.links.remove(node);
                state.links.insert_tail(node, TODO);
                Scheduled::RescheduledEarlier
            } else {
                Scheduled::LeftInPlace
            }
        } else {
            record.on_queue = true;
            state.links.insert_tail(node, TODO);
            state.pending += 1;
            Scheduled::Fresh
        };
        record.expiry = new_expiry;
        drop(guard);

        tracing::trace!(
            wheel = %self.name,
            callout = ?id,
            delay,
            expiry = new_expiry,
            outcome = ?outcome,
            "schedule"
        );
        outcome
    }

    /// Cancels the callout if pending. Returns whether it had been pending.
    ///
    /// Idempotent, and never waits for an in-flight callback: if the drain
    /// loop has already unqueued the entry for firing, `cancel` returns
    /// `false` and the callback completes regardless.
    ///
    /// # Panics
    ///
    /// Panics if `id` is stale.
    pub fn cancel(&self, id: CalloutId) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let record = state
            .entries
            .get_mut(id.0)
            .unwrap_or_else(|| panic!("{}: callout {id:?} is not registered", self.name));

        let was_pending = record.on_queue;
        if record.on_queue {
            record.on_queue = false;
            state.links.remove(WheelState::node_for(id.0));
            state.pending -= 1;
        }
        record.triggered = false;
        drop(guard);

        tracing::trace!(wheel = %self.name, callout = ?id, was_pending, "cancel");
        was_pending
    }

    /// True if the callout is queued awaiting its expiry.
    ///
    /// # Panics
    ///
    /// Panics if `id` is stale.
    #[must_use]
    pub fn is_pending(&self, id: CalloutId) -> bool {
        self.state
            .lock()
            .entries
            .get(id.0)
            .unwrap_or_else(|| panic!("{}: callout {id:?} is not registered", self.name))
            .on_queue
    }

    /// True if the callout's most recent scheduling epoch ended with the
    /// callback firing.
    ///
    /// # Panics
    ///
    /// Panics if `id` is stale.
    #[must_use]
    pub fn has_fired(&self, id: CalloutId) -> bool {
        self.state
            .lock()
            .entries
            .get(id.0)
            .unwrap_or_else(|| panic!("{}: callout {id:?} is not registered", self.name))
            .triggered
    }

    // =========================================================================
    // Duration conversions
    // =========================================================================

    /// Schedules the callout `duration` from now, rounding any nonzero
    /// duration up to at least one tick and saturating at the maximum
    /// representable delay.
    pub fn schedule_in(&self, id: CalloutId, duration: Duration) -> Scheduled {
        self.schedule(id, self.ticks_for(duration.as_nanos(), 1_000_000_000))
    }

    /// Schedules the callout `secs` seconds from now.
    pub fn schedule_secs(&self, id: CalloutId, secs: u64) -> Scheduled {
        self.schedule(id, self.ticks_for(u128::from(secs), 1))
    }

    /// Schedules the callout `millis` milliseconds from now.
    pub fn schedule_millis(&self, id: CalloutId, millis: u64) -> Scheduled {
        self.schedule(id, self.ticks_for(u128::from(millis), 1_000))
    }

    /// Schedules the callout `micros` microseconds from now.
    pub fn schedule_micros(&self, id: CalloutId, micros: u64) -> Scheduled {
        self.schedule(id, self.ticks_for(u128::from(micros), 1_000_000))
    }

    /// Schedules the callout `nanos` nanoseconds from now.
    pub fn schedule_nanos(&self, id: CalloutId, nanos: u64) -> Scheduled {
        self.schedule(id, self.ticks_for(u128::from(nanos), 1_000_000_000))
    }

    /// Converts an amount of `1/per_second` units to whole ticks, saturating
    /// at `i32::MAX` and rounding nonzero amounts up to one tick.
    fn ticks_for(&self, amount: u128, per_second: u128) -> i32 {
        let ticks = u128::from(self.hz) * amount / per_second;
        let ticks = ticks.min(i32::MAX as u128) as i32;
        if ticks == 0 && amount > 0 {
            1
        } else {
            ticks
        }
    }

    // =========================================================================
    // Clock driving
    // =========================================================================

    /// Advances the wheel by one clock tick.
    ///
    /// Bounded O(1) work (at most four list splices), suitable for
    /// interrupt-handler context. Returns whether the to-do list now holds
    /// work: when `true`, the environment should arrange for
    /// [`Callwheel::drain`] to run promptly in deferred context.
    pub fn tick_advance(&self) -> bool {
        self.state.lock().advance()
    }

    /// Drains the to-do list: re-buckets entries not yet due and fires the
    /// rest, invoking each callback with the lock released.
    ///
    /// Entries scheduled while the drain runs (from callbacks or other
    /// threads) are picked up by the same pass. Overdue entries fire exactly
    /// like on-time ones; being late is logged at debug level and is not an
    /// error.
    pub fn drain(&self) {
        let mut guard = self.state.lock();
        loop {
            match guard.drain_step() {
                DrainStep::Idle => break,
                DrainStep::Requeued => {}
                DrainStep::Fire {
                    id,
                    callback,
                    late_by,
                } => {
                    if late_by > 0 {
                        tracing::debug!(
                            wheel = %self.name,
                            callout = ?CalloutId(id),
                            late_by,
                            "callout fired late"
                        );
                    } else {
                        tracing::trace!(
                            wheel = %self.name,
                            callout = ?CalloutId(id),
                            "callout fired"
                        );
                    }
                    MutexGuard::unlocked(&mut guard, || callback());
                }
            }
        }
    }

    /// Applies a forward clock step of `delta` ticks (for example after
    /// resuming from suspend): every parked entry is staged on the to-do
    /// list, entries the step overtook become due immediately, and the tick
    /// counter jumps by `delta` in one shot. Run [`Callwheel::drain`]
    /// afterwards to fire and re-bucket.
    ///
    /// # Panics
    ///
    /// Panics if `delta` is negative; only forward adjustments are valid.
    pub fn adjust_for_time_step(&self, delta: i32) {
        assert!(
            delta >= 0,
            "{}: negative clock step {delta}",
            self.name
        );
        if delta == 0 {
            return;
        }
        self.state.lock().adjust(delta);
        tracing::debug!(wheel = %self.name, delta, "applied forward clock step");
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Reports every pending callout with its expiry, wrap-safe remaining
    /// time, and current location. Diagnostic surface; O(pending).
    #[must_use]
    pub fn snapshot(&self) -> Vec<PendingCallout> {
        let guard = self.state.lock();
        let mut out = Vec::with_capacity(guard.pending);
        for node in guard.links.iter(TODO) {
            out.push(Self::pending_at(&guard, node, Location::Todo));
        }
        for bucket in 0..BUCKET_COUNT as u32 {
            let location = Location::Bucket {
                level: (bucket / WHEEL_SIZE as u32) as u8,
                index: (bucket % WHEEL_SIZE as u32) as u8,
            };
            for node in guard.links.iter(bucket) {
                out.push(Self::pending_at(&guard, node, location));
            }
        }
        out
    }

    fn pending_at(state: &WheelState, node: u32, location: Location) -> PendingCallout {
        let (id, record) = state
            .entries
            .get_by_slot(node - NODE_BASE)
            .expect("linked node has no record");
        PendingCallout {
            id: CalloutId(id),
            expiry: record.expiry,
            remaining: record.expiry.wrapping_sub(state.ticks) as i32,
            location,
        }
    }
}
