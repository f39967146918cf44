//! Benchmark engine of a secondary.
//!
//! A secondary is driven by the primary over a control connection. It connects
//! to the configured chain nodes, replays the workload it is handed at the
//! requested rate, tracks which of its transactions got confirmed and reports
//! latency and throughput back. [`Secondary`] runs the command loop and
//! [`BenchEngine`] does the work behind each command.

pub mod dispatch;
pub mod endpoint;
pub mod engine;
pub mod fees;
pub mod metrics;
pub mod monitoring;
pub mod results;
pub mod secondary;
pub mod state;
pub mod tracker;

pub use engine::{BenchEngine, EngineError};
pub use secondary::{Secondary, SecondaryError};
pub use state::{CommandKind, SecondaryState, SecondaryStateMachine, StateError};
