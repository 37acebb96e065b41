//! # wattscope - Hardware-Assisted Runtime/Energy Profiler
//!
//! wattscope drives a USB-attached power/performance probe that samples each
//! CPU core's program counter and per-rail current draw at high frequency
//! while a target embedded program executes, then reconstructs per-basic-block
//! runtime, per-sensor energy, call-arc weights and frame-windowed statistics.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  Measurement Probe (USB)                 │
//! │     per-core PC + 7-channel current @ sample clock       │
//! └───────────────────────┬──────────────────────────────────┘
//!                         │ bulk sample records
//!                         ▼
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │    Probe     │──▶│    Power     │──▶│    Store     │
//! │  (protocol)  │   │ (calibrate)  │   │ (raw rows)   │
//! └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                              │ ordered scan
//!                                              ▼
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Symbols    │◀──│   Profile    │──▶│    Store     │
//! │ (addr2line)  │   │ (aggregate)  │   │ (loc/arc/meta)│
//! └──────────────┘   └──────┬───────┘   └──────────────┘
//!                           │
//!                           ▼
//!                    ┌──────────────┐
//!                    │     Cfg      │
//!                    │ (collaborator)│
//!                    └──────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`probe`]: USB protocol client: discovery, init handshake, breakpoint
//!   arming, the timeout-retried sampling loop
//! - [`power`]: raw ADC codes → watts, keyed by hardware revision
//! - [`symbols`]: memoized PC resolution via the external `addr2line` tool,
//!   load-offset windowing, kernel symbol-table fallback
//! - [`profile`]: the Location/call-graph aggregation model, frame-windowed
//!   statistics, offline call-graph trace import
//! - [`cfg`]: arena-based CFG collaborator with placeholder synthesis for
//!   foreign code
//! - [`store`]: the SQLite profile database (durable interchange format)
//! - [`config`], [`cli`], [`progress`], [`domain`]: project configuration,
//!   argument parsing, progress events, shared error/id types
//!
//! A parallel ingestion path ([`profile::callgraph`]) merges call-graph
//! traces produced by software-instrumented builds into the same tables.

pub mod cfg;
pub mod cli;
pub mod config;
pub mod domain;
pub mod power;
pub mod probe;
pub mod profile;
pub mod progress;
pub mod store;
pub mod symbols;
