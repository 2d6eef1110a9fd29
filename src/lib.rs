pub mod batch;
pub mod common;
pub mod config;
pub mod error;
pub mod storage;
pub mod window;

pub use batch::{collect_partitions, RecordBatchSource};
pub use common::{ArgExpr, Literal, ResultRow, Row, RowSource, VecRowSource, WindowOutput};
pub use config::{EngineConfig, StoreConfig};
pub use error::{ErrorKind, Result, WindowError};
pub use window::{
    FrameBound, FrameMode, FrameSpec, OrderByColumn, WindowEngine, WindowFunctionKind,
    WindowFunctionSpec, WindowSpec,
};
