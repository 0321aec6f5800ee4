//! Wheel storage layout, bucket arithmetic, and the scheduling engine state.
//!
//! Pending callouts are distributed over four hierarchical levels of 256
//! buckets each. An entry lands in the coarsest level whose span covers its
//! remaining time; its bucket index within the level is the corresponding
//! byte of its *absolute* expiry tick. As the tick counter's low bytes wrap,
//! whole buckets are cascaded into the to-do list, where the drain loop
//! either fires entries that are due or re-buckets them one level finer.
//!
//! All tick comparisons use wrapping subtraction cast to `i32`: two ticks
//! compare correctly as long as they are within 2^31 of each other, which the
//! `i32` delay limit guarantees for live entries.

use std::sync::Arc;

use crate::arena::{Arena, ArenaIndex};
use crate::callout::Callback;
use crate::list::LinkTable;

/// Number of hierarchical wheel levels.
pub(crate) const WHEEL_LEVELS: usize = 4;
/// Buckets per level.
pub(crate) const WHEEL_SIZE: usize = 256;
/// Bits of the expiry tick consumed per level.
pub(crate) const WHEEL_BITS: u32 = 8;
/// Mask selecting one level's index byte.
pub(crate) const WHEEL_MASK: u32 = WHEEL_SIZE as u32 - 1;
/// Total bucket count across all levels.
pub(crate) const BUCKET_COUNT: usize = WHEEL_LEVELS * WHEEL_SIZE;

/// Link-table node id of the to-do list sentinel.
pub(crate) const TODO: u32 = BUCKET_COUNT as u32;
/// First link-table node id used for entries; entry slot `i` is node
/// `NODE_BASE + i`.
pub(crate) const NODE_BASE: u32 = TODO + 1;

/// Selects the bucket for an entry `rel` ticks from now expiring at absolute
/// tick `abs`. `rel` must be positive.
///
/// The inclusive thresholds mirror the level spans exactly: an entry placed
/// in a coarse bucket needs at most one-level-finer reclassification each
/// time it cascades, never a direct jump past a level.
pub(crate) fn bucket_for(rel: i32, abs: u32) -> u32 {
    debug_assert!(rel > 0, "bucketing a due entry (rel = {rel})");
    let level = if rel <= 1 << WHEEL_BITS {
        0
    } else if rel <= 1 << (2 * WHEEL_BITS) {
        1
    } else if rel <= 1 << (3 * WHEEL_BITS) {
        2
    } else {
        3
    };
    let index = (abs >> (level * WHEEL_BITS)) & WHEEL_MASK;
    level * WHEEL_SIZE as u32 + index
}

/// Bucket id the tick counter `ticks` addresses at `level`.
fn bucket_at(level: u32, ticks: u32) -> u32 {
    level * WHEEL_SIZE as u32 + ((ticks >> (level * WHEEL_BITS)) & WHEEL_MASK)
}

/// One schedulable entry: its callback, expiry, and queue-state flags.
///
/// The initialized state has no flag here; it is carried by arena occupancy
/// and the handle's generation.
pub(crate) struct CalloutRecord {
    /// Invoked with the wheel lock released when the entry comes due.
    pub(crate) callback: Callback,
    /// Absolute expiry tick of the most recent schedule.
    pub(crate) expiry: u32,
    /// Entry is linked into a bucket or the to-do list.
    pub(crate) on_queue: bool,
    /// The most recent scheduling epoch ended with the callback firing.
    pub(crate) triggered: bool,
}

impl std::fmt::Debug for CalloutRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalloutRecord")
            .field("expiry", &self.expiry)
            .field("on_queue", &self.on_queue)
            .field("triggered", &self.triggered)
            .finish_non_exhaustive()
    }
}

/// Outcome of one drain-loop iteration.
pub(crate) enum DrainStep {
    /// The to-do list is empty.
    Idle,
    /// The head entry was not yet due and went back into a bucket.
    Requeued,
    /// The head entry is due; invoke `callback` with the lock released.
    Fire {
        /// Identity of the firing entry.
        id: ArenaIndex,
        /// Clone of the entry's callback.
        callback: Callback,
        /// Ticks past the expiry at fire time (0 = exactly on time).
        late_by: i32,
    },
}

/// Everything the wheel mutex guards: the link table (buckets + to-do list +
/// entry linkage), the entry records, and the tick counter.
#[derive(Debug)]
pub(crate) struct WheelState {
    pub(crate) links: LinkTable,
    pub(crate) entries: Arena<CalloutRecord>,
    pub(crate) ticks: u32,
    /// Count of entries currently on a queue (bucket or to-do list).
    pub(crate) pending: usize,
}

impl WheelState {
    pub(crate) fn new() -> Self {
        Self {
            links: LinkTable::with_sentinels(NODE_BASE as usize),
            entries: Arena::new(),
            ticks: 0,
            pending: 0,
        }
    }

    /// Link-table node backing the entry at `index`.
    pub(crate) fn node_for(index: ArenaIndex) -> u32 {
        NODE_BASE + index.index()
    }

    /// Allocates a record and, if it occupies a fresh slot, the matching
    /// link-table node.
    pub(crate) fn register(&mut self, callback: Callback) -> ArenaIndex {
        let index = self.entries.insert(CalloutRecord {
            callback,
            expiry: 0,
            on_queue: false,
            triggered: false,
        });
        while self.links.node_count() < NODE_BASE as usize + self.entries.slot_count() {
            self.links.add_node();
        }
        index
    }

    /// Advances the tick counter by one and cascades every bucket whose
    /// index byte just wrapped into the to-do list. Bounded work: at most
    /// four list splices, no per-entry inspection.
    ///
    /// Returns whether the to-do list now holds work.
    pub(crate) fn advance(&mut self) -> bool {
        self.ticks = self.ticks.wrapping_add(1);
        let ticks = self.ticks;

        self.links.append(TODO, bucket_at(0, ticks));
        if ticks & WHEEL_MASK == 0 {
            tracing::trace!(ticks, "cascading level 1");
            self.links.append(TODO, bucket_at(1, ticks));
            if (ticks >> WHEEL_BITS) & WHEEL_MASK == 0 {
                tracing::trace!(ticks, "cascading level 2");
                self.links.append(TODO, bucket_at(2, ticks));
                if (ticks >> (2 * WHEEL_BITS)) & WHEEL_MASK == 0 {
                    tracing::trace!(ticks, "cascading level 3");
                    self.links.append(TODO, bucket_at(3, ticks));
                }
            }
        }

        !self.links.is_empty(TODO)
    }

    /// Pops the to-do list head and classifies it: not-yet-due entries are
    /// re-bucketed by remaining time, due entries are marked fired and their
    /// callback handed back for invocation outside the lock.
    pub(crate) fn drain_step(&mut self) -> DrainStep {
        let Some(node) = self.links.first(TODO) else {
            return DrainStep::Idle;
        };
        self.links.remove(node);

        let slot = node - NODE_BASE;
        let (id, record) = self
            .entries
            .get_by_slot_mut(slot)
            .expect("queued node has no record");
        let diff = record.expiry.wrapping_sub(self.ticks) as i32;

        if diff > 0 {
            let bucket = bucket_for(diff, record.expiry);
            self.links.insert_tail(node, bucket);
            return DrainStep::Requeued;
        }

        record.on_queue = false;
        record.triggered = true;
        self.pending -= 1;
        DrainStep::Fire {
            id,
            callback: Arc::clone(&record.callback),
            late_by: -diff,
        }
    }

    /// Applies a forward clock step of `delta` ticks. Every parked entry is
    /// staged on the to-do list so the next drain re-buckets it against the
    /// stepped clock; bucket positions were chosen relative to the old clock
    /// and leaving them would skip cascade boundaries. Entries the step
    /// overtook have their expiry clamped to the new tick.
    pub(crate) fn adjust(&mut self, delta: i32) {
        debug_assert!(delta > 0);
        let new_ticks = self.ticks.wrapping_add(delta as u32);
        for bucket in 0..BUCKET_COUNT as u32 {
            while let Some(node) = self.links.first(bucket) {
                let slot = node - NODE_BASE;
                let (_, record) = self
                    .entries
                    .get_by_slot_mut(slot)
                    .expect("bucketed node has no record");
                let remaining = record.expiry.wrapping_sub(self.ticks) as i32;
                if remaining < delta {
                    record.expiry = new_ticks;
                }
                self.links.remove(node);
                self.links.insert_tail(node, TODO);
            }
        }
        self.ticks = new_ticks;
    }
}
