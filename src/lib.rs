//! Callwheel: a tick-granular, hierarchical timing-wheel callout facility.
//!
//! # Overview
//!
//! A [`Callwheel`] schedules callbacks for execution a number of clock ticks
//! in the future, with O(1) insert and cancel and O(1) amortized per-tick
//! maintenance regardless of how far ahead an entry is scheduled. Pending
//! entries are hashed into four hierarchical levels of 256 buckets each by
//! bytes of their absolute expiry tick; as the tick counter's low bytes
//! wrap, coarse buckets cascade toward the to-do list, where a drain pass
//! fires due entries and refines the rest.
//!
//! The crate is a passive data structure: it consumes a tick notification
//! ([`Callwheel::tick_advance`], bounded work, interrupt-safe) and expects
//! the environment to run [`Callwheel::drain`] from deferred context when
//! `tick_advance` reports pending work. Callbacks run with the wheel lock
//! released and may re-enter the wheel freely, including rescheduling their
//! own entry.
//!
//! # Contract
//!
//! - Ticks are `u32` with wrapping arithmetic; any two live ticks compare
//!   correctly when within 2^31 of each other, which the `i32` delay bound
//!   guarantees.
//! - Misuse (stale handle, negative delay, backwards clock step) panics;
//!   the scheduling operations themselves never return errors.
//! - Simultaneously due entries fire in to-do list order (roughly FIFO),
//!   not strict expiry order; ordering is already coarsened to tick
//!   granularity.
//!
//! # Module Structure
//!
//! - [`callout`]: public API ([`Callwheel`], [`CalloutId`], [`Scheduled`])
//! - [`config`]: tick rate and naming ([`WheelConfig`])
//! - [`test_utils`]: logging and assertion helpers for tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

pub mod callout;
pub mod config;
pub mod test_utils;

mod arena;
mod list;
mod wheel;

pub use callout::{Callback, Callwheel, CalloutId, Location, PendingCallout, Scheduled};
pub use config::{ConfigError, WheelConfig, DEFAULT_HZ};
