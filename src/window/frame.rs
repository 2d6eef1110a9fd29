use serde::{Deserialize, Serialize};

use crate::common::expr::ArgExpr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameMode {
    Rows,
    Range,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(ArgExpr),
    CurrentRow,
    Following(ArgExpr),
    UnboundedFollowing,
}

impl FrameBound {
    pub fn offset(&self) -> Option<&ArgExpr> {
        match self {
            FrameBound::Preceding(e) | FrameBound::Following(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_delayed(&self) -> bool {
        self.offset().map(|e| !e.is_constant()).unwrap_or(false)
    }

    fn describe(&self) -> &'static str {
        match self {
            FrameBound::UnboundedPreceding => "UNBOUNDED PRECEDING",
            FrameBound::Preceding(_) => "PRECEDING",
            FrameBound::CurrentRow => "CURRENT ROW",
            FrameBound::Following(_) => "FOLLOWING",
            FrameBound::UnboundedFollowing => "UNBOUNDED FOLLOWING",
        }
    }
}

/// `{ROWS|RANGE} BETWEEN start AND end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSpec {
    pub mode: FrameMode,
    pub start: FrameBound,
    pub end: FrameBound,
}

impl Default for FrameSpec {
    fn default() -> Self {
        Self {
            mode: FrameMode::Range,
            start: FrameBound::UnboundedPreceding,
            end: FrameBound::CurrentRow,
        }
    }
}

impl FrameSpec {
    pub fn rows(start: FrameBound, end: FrameBound) -> Self {
        Self {
            mode: FrameMode::Rows,
            start,
            end,
        }
    }

    pub fn range(start: FrameBound, end: FrameBound) -> Self {
        Self {
            mode: FrameMode::Range,
            start,
            end,
        }
    }

    /// `UNBOUNDED PRECEDING .. CURRENT ROW`: evaluable with a running state.
    pub fn is_running(&self) -> bool {
        self.start == FrameBound::UnboundedPreceding && self.end == FrameBound::CurrentRow
    }

    pub fn has_delayed_bound(&self) -> bool {
        self.start.is_delayed() || self.end.is_delayed()
    }

    pub fn has_offset(&self) -> bool {
        self.start.offset().is_some() || self.end.offset().is_some()
    }

    /// Rejects bound combinations that can never describe a frame.
    pub fn check_shape(&self) -> Result<(), String> {
        use FrameBound::*;
        let bad = match (&self.start, &self.end) {
            (UnboundedFollowing, _) => Some("frame start cannot be UNBOUNDED FOLLOWING"),
            (_, UnboundedPreceding) => Some("frame end cannot be UNBOUNDED PRECEDING"),
            (CurrentRow, Preceding(_)) => {
                Some("frame starting from current row cannot have preceding rows")
            }
            (Following(_), Preceding(_)) | (Following(_), CurrentRow) => {
                Some("frame starting from following row cannot have preceding rows")
            }
            _ => None,
        };
        match bad {
            Some(msg) => Err(format!(
                "{msg} ({} .. {})",
                self.start.describe(),
                self.end.describe()
            )),
            None => Ok(()),
        }
    }
}
