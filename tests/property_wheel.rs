//! Model-based property tests for the callout wheel.
//!
//! A small reference model tracks, per entry, the most recently requested
//! absolute expiry. Driving the real wheel one tick at a time with a drain
//! after every tick makes its observable behavior deterministic, so the
//! model predicts exact fire counts and cancel results.

mod common;

use callwheel::{Callwheel, CalloutId};
use common::{init_test_logging, test_proptest_config};
use proptest::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const ENTRIES: usize = 4;

#[derive(Debug, Clone)]
enum Op {
    Schedule { entry: usize, delay: i32 },
    Cancel { entry: usize },
    Advance { ticks: u32 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..ENTRIES, 0..2000i32).prop_map(|(entry, delay)| Op::Schedule { entry, delay }),
        (0..ENTRIES).prop_map(|entry| Op::Cancel { entry }),
        (0u32..400).prop_map(|ticks| Op::Advance { ticks }),
    ]
}

struct Harness {
    wheel: Callwheel,
    ids: Vec<CalloutId>,
    counters: Vec<Arc<AtomicU64>>,
    /// Model clock, monotone (no wrap needed at these magnitudes).
    now: u64,
    /// Most recently requested expiry for each still-pending entry.
    expiry: Vec<Option<u64>>,
    fires: Vec<u64>,
}

impl Harness {
    fn new() -> Self {
        let wheel = Callwheel::new();
        let mut ids = Vec::with_capacity(ENTRIES);
        let mut counters = Vec::with_capacity(ENTRIES);
        for _ in 0..ENTRIES {
            let counter = Arc::new(AtomicU64::new(0));
            let fired = counter.clone();
            ids.push(wheel.register(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            }));
            counters.push(counter);
        }
        Self {
            wheel,
            ids,
            counters,
            now: 0,
            expiry: vec![None; ENTRIES],
            fires: vec![0; ENTRIES],
        }
    }

    /// Fire every model entry that is due, mirroring one drain pass.
    fn model_drain(&mut self) {
        for entry in 0..ENTRIES {
            if matches!(self.expiry[entry], Some(due) if due <= self.now) {
                self.expiry[entry] = None;
                self.fires[entry] += 1;
            }
        }
    }

    fn apply(&mut self, op: &Op) -> Result<(), TestCaseError> {
        match *op {
            Op::Schedule { entry, delay } => {
                self.wheel.schedule(self.ids[entry], delay);
                // A re-schedule replaces the old expiry outright.
                self.expiry[entry] = Some(self.now + u64::from(delay as u32));
            }
            Op::Cancel { entry } => {
                let was_pending = self.wheel.cancel(self.ids[entry]);
                prop_assert_eq!(
                    was_pending,
                    self.expiry[entry].is_some(),
                    "cancel result for entry {}",
                    entry
                );
                self.expiry[entry] = None;
            }
            Op::Advance { ticks } => {
                for _ in 0..ticks {
                    self.wheel.tick_advance();
                    self.wheel.drain();
                    self.now += 1;
                    self.model_drain();
                }
            }
        }
        Ok(())
    }

    fn check(&self) -> Result<(), TestCaseError> {
        let pending = self.expiry.iter().filter(|slot| slot.is_some()).count();
        prop_assert_eq!(self.wheel.len(), pending, "pending count");
        for entry in 0..ENTRIES {
            prop_assert_eq!(
                self.counters[entry].load(Ordering::SeqCst),
                self.fires[entry],
                "fire count for entry {}",
                entry
            );
            prop_assert_eq!(
                self.wheel.is_pending(self.ids[entry]),
                self.expiry[entry].is_some(),
                "pending flag for entry {}",
                entry
            );
        }
        Ok(())
    }
}

proptest! {
    #![proptest_config(test_proptest_config(128))]

    /// Every entry fires exactly when the model says it should: once per
    /// scheduling epoch, at the most recently requested expiry, never after
    /// a cancel and never before it is due.
    #[test]
    fn wheel_matches_reference_model(ops in prop::collection::vec(op_strategy(), 0..48)) {
        init_test_logging();
        let mut harness = Harness::new();
        for op in &ops {
            harness.apply(op)?;
            harness.check()?;
        }
        // Let anything still outstanding come due.
        harness.apply(&Op::Advance { ticks: 2048 })?;
        harness.check()?;
        for entry in 0..ENTRIES {
            prop_assert!(harness.expiry[entry].is_none(), "entry {} still pending", entry);
        }
    }

    /// Delay zero means "next drain pass", not "immediately".
    #[test]
    fn zero_delay_waits_for_a_drain(extra in 0u32..16) {
        init_test_logging();
        let mut harness = Harness::new();
        harness.apply(&Op::Advance { ticks: extra })?;
        harness.apply(&Op::Schedule { entry: 0, delay: 0 })?;
        prop_assert_eq!(harness.counters[0].load(Ordering::SeqCst), 0);
        harness.wheel.drain();
        harness.model_drain();
        harness.check()?;
        prop_assert_eq!(harness.counters[0].load(Ordering::SeqCst), 1);
    }

    /// A forward clock step is equivalent, for fire counts, to ticking the
    /// same distance one tick at a time.
    #[test]
    fn clock_step_equals_stepwise_ticks(
        delays in prop::collection::vec(1..120_000i32, ENTRIES),
        step in 1..150_000i32,
    ) {
        init_test_logging();
        let stepped = Harness::new();
        let ticked = Harness::new();
        for entry in 0..ENTRIES {
            stepped.wheel.schedule(stepped.ids[entry], delays[entry]);
            ticked.wheel.schedule(ticked.ids[entry], delays[entry]);
        }
        stepped.wheel.drain();
        ticked.wheel.drain();

        stepped.wheel.adjust_for_time_step(step);
        stepped.wheel.drain();
        for _ in 0..step {
            ticked.wheel.tick_advance();
            ticked.wheel.drain();
        }

        for entry in 0..ENTRIES {
            prop_assert_eq!(
                stepped.counters[entry].load(Ordering::SeqCst),
                ticked.counters[entry].load(Ordering::SeqCst),
                "entry {} with delay {} after step {}",
                entry,
                delays[entry],
                step
            );
        }
        prop_assert_eq!(stepped.wheel.ticks(), ticked.wheel.ticks());
    }
}
