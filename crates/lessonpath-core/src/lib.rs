//! lessonpath-core: domain logic for the lessonpath micro-lesson tracker.
//!
//! This crate owns the progress record and its on-device storage, the
//! remote sync adapter and merge policy, streak and unlock rules, the
//! content catalog reader, and the in-lesson flow state machine. The
//! [`core::ProgressTracker`] service object ties them together.

pub mod catalog;
pub mod config;
pub mod core;
pub mod entitlement;
pub mod flow;
pub mod merge;
pub mod model;
pub mod remote;
pub mod store;
pub mod streak;
pub mod unlock;
pub mod version;
