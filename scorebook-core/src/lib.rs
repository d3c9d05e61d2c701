//! Core types for the scorebook match log.
//!
//! A handball match is recorded as an append-only log of events. Everything
//! else (scores, serve rotation, suspensions, per-player statistics, the
//! outcome) is derived by folding that log, so any prefix of it can be
//! replayed to reproduce the match as it stood.
//!
//! - [`roster`] - Identifiers, rosters and the non-derived match record
//! - [`ruleset`] - Per-match scoring rules
//! - [`court`] - Court positions and serve linkage
//! - [`event`] - Event payloads and the stored envelope
//! - [`state`] - Derived match and player state
//! - [`projection`] - The replay engine (`Match`, `project`)
//! - [`aggregate`] - Replay primitives (`Aggregate`, `Apply`)
//! - [`command`] - Commands and the draft they record on
//! - [`repository`] - Command execution, undo and resync (`Scorekeeper`)
//! - [`store`] - Event persistence abstraction (`EventStore`)
//! - [`concurrency`] - Concurrency strategy markers (`Optimistic`, `Unchecked`)
//! - [`elo`] - Rating changes for ranked matches
//!
//! # Example
//!
//! ```
//! use scorebook_core::{repository::Scorekeeper, store::inmemory};
//!
//! let keeper = Scorekeeper::new(inmemory::Store::new());
//! ```
//!
//! Most users should depend on the `scorebook` crate, which re-exports these
//! types with a flatter API surface.

pub mod aggregate;
pub mod command;
pub mod concurrency;
pub mod court;
pub mod elo;
pub mod event;
pub mod projection;
pub mod repository;
pub mod roster;
pub mod ruleset;
pub mod state;
pub mod store;
