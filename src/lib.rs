// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod classify;
pub mod config;
pub mod feed;
pub mod fetch;
pub mod monitor;
pub mod notify;
pub mod publish;
pub mod scheduler;
pub mod sentiment;
pub mod sources;
pub mod state;

// ---- Re-exports for stable public API ----
pub use crate::classify::{classify, AddressRegistry, TradeType};
pub use crate::feed::{build_live_feed, FeedItem, FEED_CAP};
pub use crate::monitor::Monitor;
pub use crate::scheduler::{Clock, Scheduler, SystemClock, TaskId};
pub use crate::state::{AggregateState, FileStateRepository, StateRepository, ACTIVITY_CAP};
