use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use arrow::compute::SortOptions;
use arrow::datatypes::{DataType, Field, SchemaBuilder, SchemaRef};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::expr::ArgExpr;
use crate::config::StoreConfig;
use crate::error::{Result, WindowError};
use crate::window::aggregates::AggregateRegistry;
use crate::window::boundary::BoundaryEvaluator;
use crate::window::codec::EntryLayout;
use crate::window::frame::{FrameMode, FrameSpec};
use crate::window::functions::FunctionEvaluator;
use crate::window::readiness::ReadinessRequirements;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderByColumn {
    pub column: usize,
    #[serde(default)]
    pub descending: bool,
    /// Defaults to NULLS LAST ascending and NULLS FIRST descending.
    #[serde(default)]
    pub nulls_first: Option<bool>,
}

impl OrderByColumn {
    pub fn asc(column: usize) -> Self {
        Self {
            column,
            descending: false,
            nulls_first: None,
        }
    }

    pub fn desc(column: usize) -> Self {
        Self {
            column,
            descending: true,
            nulls_first: None,
        }
    }

    pub fn with_nulls_first(mut self, nulls_first: bool) -> Self {
        self.nulls_first = Some(nulls_first);
        self
    }

    pub fn sort_options(&self) -> SortOptions {
        SortOptions {
            descending: self.descending,
            nulls_first: self.nulls_first.unwrap_or(self.descending),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowFunctionKind {
    RowNumber,
    Rank,
    DenseRank,
    PercentRank,
    CumeDist,
    Ntile,
    Lead,
    Lag,
    FirstValue,
    LastValue,
    /// Aggregate looked up by name in the registry.
    Aggregate(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowFunctionSpec {
    pub kind: WindowFunctionKind,
    #[serde(default)]
    pub args: Vec<ArgExpr>,
    #[serde(default)]
    pub alias: Option<String>,
}

impl WindowFunctionSpec {
    pub fn new(kind: WindowFunctionKind, args: Vec<ArgExpr>) -> Self {
        Self {
            kind,
            args,
            alias: None,
        }
    }

    pub fn aggregate(name: &str, args: Vec<ArgExpr>) -> Self {
        Self::new(WindowFunctionKind::Aggregate(name.to_string()), args)
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }
}

/// One window level: partitioning, ordering, frame and the functions sharing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSpec {
    #[serde(default)]
    pub partition_by: Vec<usize>,
    #[serde(default)]
    pub order_by: Vec<OrderByColumn>,
    #[serde(default)]
    pub frame: FrameSpec,
    pub functions: Vec<WindowFunctionSpec>,
}

impl WindowSpec {
    pub fn new(functions: Vec<WindowFunctionSpec>) -> Self {
        Self {
            partition_by: vec![],
            order_by: vec![],
            frame: FrameSpec::default(),
            functions,
        }
    }

    pub fn with_partition_by(mut self, columns: Vec<usize>) -> Self {
        self.partition_by = columns;
        self
    }

    pub fn with_order_by(mut self, columns: Vec<OrderByColumn>) -> Self {
        self.order_by = columns;
        self
    }

    pub fn with_frame(mut self, frame: FrameSpec) -> Self {
        self.frame = frame;
        self
    }

    pub fn from_yaml_str(s: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(s).context("parsing window spec")
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading window spec {}", path.display()))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&text).context("parsing window spec"),
            _ => Self::from_yaml_str(&text),
        }
    }
}

/// A [`WindowSpec`] bound to an input schema and ready to execute.
#[derive(Debug)]
pub struct WindowPlan {
    pub input_schema: SchemaRef,
    pub output_schema: SchemaRef,
    pub partition_by: Vec<usize>,
    pub order_by: Vec<usize>,
    pub sort_options: Vec<SortOptions>,
    pub boundary: BoundaryEvaluator,
    pub functions: Vec<FunctionEvaluator>,
    /// Frame buffer entry layout; no slots means nothing is buffered.
    pub layout: EntryLayout,
    pub requirements: ReadinessRequirements,
    /// Largest constant `lag` distance; `None` if some distance varies per row.
    pub max_lag: Option<u64>,
}

impl WindowPlan {
    /// `store` sizes the buffers functions keep for themselves.
    pub fn try_new(
        input_schema: SchemaRef,
        spec: &WindowSpec,
        registry: &AggregateRegistry,
        store: &StoreConfig,
    ) -> Result<Self> {
        let width = input_schema.fields().len();
        let check_column = |idx: usize, what: &str| {
            if idx < width {
                Ok(idx)
            } else {
                Err(WindowError::InvalidArgument(format!(
                    "{what} column {idx} out of range for {width} columns"
                )))
            }
        };
        let partition_by = spec
            .partition_by
            .iter()
            .map(|c| check_column(*c, "PARTITION BY"))
            .collect::<Result<Vec<_>>>()?;
        let order_by = spec
            .order_by
            .iter()
            .map(|o| check_column(o.column, "ORDER BY"))
            .collect::<Result<Vec<_>>>()?;
        let sort_options: Vec<SortOptions> = spec.order_by.iter().map(OrderByColumn::sort_options).collect();
        let order_types: Vec<DataType> = order_by
            .iter()
            .map(|c| input_schema.field(*c).data_type().clone())
            .collect();

        let boundary = BoundaryEvaluator::try_new(&spec.frame, &input_schema, &order_types, sort_options.clone())?;

        let mut functions = Vec::with_capacity(spec.functions.len());
        let mut slots = vec![];
        for function_spec in &spec.functions {
            let function =
                FunctionEvaluator::try_new(function_spec, &input_schema, &spec.frame, registry, slots.len(), store)?;
            debug!(
                function = function.name(),
                strategy = ?function.strategy(),
                "bound window function"
            );
            slots.extend(function.payload_layout());
            functions.push(function);
        }

        let needs_edges = functions.iter().any(FunctionEvaluator::needs_frame);
        let key_types = if needs_edges && spec.frame.mode == FrameMode::Range {
            order_types
        } else {
            vec![]
        };
        let layout = EntryLayout::try_new(key_types, slots)?;

        let requirements = ReadinessRequirements {
            lead_edge: needs_edges,
            partition_end: functions.iter().any(FunctionEvaluator::needs_partition_end),
            peer_group_end: functions.iter().any(FunctionEvaluator::needs_peer_group_end),
            lead_rows: functions
                .iter()
                .map(FunctionEvaluator::constant_lookahead)
                .max()
                .unwrap_or(0),
        };
        let max_lag = functions
            .iter()
            .map(FunctionEvaluator::lookbehind)
            .try_fold(0u64, |acc, lag| lag.map(|l| acc.max(l)));

        let output_schema = output_schema(&input_schema, spec, &functions);
        Ok(Self {
            input_schema,
            output_schema,
            partition_by,
            order_by,
            sort_options,
            boundary,
            functions,
            layout,
            requirements,
            max_lag,
        })
    }

    /// Some function reads frame edges.
    pub fn needs_edges(&self) -> bool {
        self.requirements.lead_edge
    }

    pub fn uses_frame_buffer(&self) -> bool {
        !self.layout.slots.is_empty()
    }

    /// Frame buffer entries behind the current row may be dropped.
    pub fn trims_frame_buffer(&self) -> bool {
        self.max_lag.is_some() && !(self.needs_edges() && self.boundary.is_delayed())
    }
}

fn output_schema(input: &SchemaRef, spec: &WindowSpec, functions: &[FunctionEvaluator]) -> SchemaRef {
    let mut builder = SchemaBuilder::with_capacity(input.fields().len() + functions.len());
    builder.extend(input.fields().iter().cloned());
    for (function_spec, function) in spec.functions.iter().zip(functions) {
        let name = function_spec
            .alias
            .clone()
            .unwrap_or_else(|| function.name().to_string());
        builder.push(Field::new(name, function.return_type(), true));
    }
    Arc::new(builder.finish().with_metadata(input.metadata().clone()))
}
