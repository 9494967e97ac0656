//! GazeFlow - Enrichment pipeline for multi-clock experimental recordings
//!
//! Raw eye-tracking traces, analog acquisition channels and stimulus logs go
//! in; named, versioned result arrays come out, stored incrementally inside a
//! single SQLite session container.
//!
//! # Architecture
//!
//! ```text
//! Raw recording namespaces (eyetracking, labjack, stimulus)
//!     ↓
//! Session::apply(stage)   [validate → compute → transactional write → audit]
//!     ↓
//! SaccadeDetector → ClockAligner → DirectionLabeler
//!     ↓
//! Chain (checkpoint after each stage, skip-on-rerun)
//! ```

pub mod config;
pub mod session_core;
pub mod signal_core;
