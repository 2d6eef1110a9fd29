pub mod aggregates;
pub mod boundary;
pub mod codec;
pub mod frame;
pub mod frame_buffer;
pub mod functions;
pub mod input_buffer;
pub mod plan;
pub mod readiness;
pub mod sequencer;
pub mod window_engine;

#[cfg(test)]
mod window_engine_tests;

pub use aggregates::{get_aggregate_registry, AggregateFunction, AggregateRegistry};
pub use frame::{FrameBound, FrameMode, FrameSpec};
pub use functions::FrameStrategy;
pub use plan::{OrderByColumn, WindowFunctionKind, WindowFunctionSpec, WindowPlan, WindowSpec};
pub use window_engine::WindowEngine;
