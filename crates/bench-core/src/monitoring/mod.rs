//! Background tasks that keep the secondary's view of the chain current.
//!
//! Fee pollers refresh each endpoint's fee caps, the head watcher reacts to new
//! blocks, the block scanner turns block contents into confirmations and the
//! throughput sampler records progress once per window.

pub mod fees;
pub mod head;
pub mod scanner;
pub mod throughput;

pub use fees::FeePoller;
pub use head::{HeadWatcher, HeadWatcherHandle};
pub use scanner::BlockScanner;
pub use throughput::{per_window, ThroughputSampler};
