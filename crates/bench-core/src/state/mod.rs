//! Protocol state of a secondary.
//!
//! This module provides the state machine that decides which control commands
//! a secondary accepts at each point of a benchmark, and where each accepted
//! command leaves it.

pub mod secondary;

pub use secondary::{CommandKind, SecondaryState, SecondaryStateMachine, StateError};
