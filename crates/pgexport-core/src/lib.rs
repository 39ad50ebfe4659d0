//! Wires the queue, source, and destination crates into one activity run
//! (spec §4.7–§4.9): the `Consumer`, the heartbeat throttle, and the
//! `ActivityDriver` that sequences schema resolution, table acquisition,
//! consumption, and the post-flush merge.

mod consumer;
mod driver;
mod heartbeat;
mod model_resolution;
mod spill;

pub use consumer::Consumer;
pub use driver::{ActivityDriver, ActivityDriverConfig, ORDERING_COLUMN};
pub use heartbeat::{Heartbeater, HeartbeatSink};
pub use model_resolution::{resolve_model, ResolvedModel};
