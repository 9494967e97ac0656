//! Session Core - Enrichment execution framework
//!
//! This module provides the infrastructure for applying enrichment stages to
//! a persistent session container with validated dependencies.
//!
//! # Architecture
//!
//! ```text
//! Container (SQLite: namespaces + arrays)
//!     ↓
//! Session (applied-stage set, dependency resolution)
//!     ↓
//! Stage::compute() (pure function of resolved inputs)
//!     ↓
//! post-write audit (declared == written == described)
//!     ↓
//! Chain (checkpoint per stage, skip-on-rerun)
//! ```

pub mod chain;
pub mod container;
pub mod error;
pub mod registry;
pub mod session;
pub mod stage;
pub mod types;

pub use chain::Chain;
pub use container::Container;
pub use error::{ChainError, ContainerError, StageError};
pub use registry::StageRegistry;
pub use session::Session;
pub use stage::{RequiredValue, ResolvedInputs, Stage, StageOutput, ValueSource};
pub use types::Array;
