pub mod expr;
pub mod key;
pub mod row;
pub mod scalar_utils;

pub use expr::{ArgExpr, Literal};
pub use row::{ResultRow, Row, RowSource, VecRowSource, WindowOutput};
