//! # Engine Module
//!
//! Slice-execution machinery for ECS systems.
//!
//! This module contains the building blocks of a system's runtime:
//! - Bitsets, component registry and settings
//! - Entity subscriptions
//! - Per-slice execution state and deferred callbacks
//! - Balanced partitioning and the parallel executor
//! - The stage scheduler driving instances tick by tick
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod logging;
pub mod component;
pub mod settings;
pub mod storage;
pub mod subscription;
pub mod blocker;
pub mod state;
pub mod partition;
pub mod pool;
pub mod context;
pub mod parallel;
pub mod proxy;
pub mod instance;
pub mod scheduler;
