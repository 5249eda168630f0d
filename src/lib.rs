#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

mod array;
mod error;
mod list;
mod node;
mod queue;
mod runtime;
mod timeline;
mod timestamp;
pub mod tracer;

pub use array::{ArrayHistory, ArrayMutator, Change};
pub use error::AdaptiveError;
pub use list::AList;
pub use node::{Node, NodeId, WriteState};
pub use runtime::{Adaptive, AdaptiveBuilder, Stats, WeakAdaptive};
pub use timeline::{Timeline, TimelineConfig, DEFAULT_TAIL_STRIDE};
pub use timestamp::Timestamp;
pub use tracer::{DiscardReason, LogTracer, NoopTracer, Tracer};
