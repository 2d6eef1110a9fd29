//! Scenario tests for `WindowEngine`.
//!
//! Each test builds a spec, feeds rows through a `VecRowSource` and checks the
//! window values column by column.
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use datafusion::scalar::ScalarValue;

use crate::common::expr::ArgExpr;
use crate::common::row::{Row, VecRowSource, WindowOutput};
use crate::config::{EngineConfig, StoreConfig};
use crate::error::{ErrorKind, WindowError};
use crate::window::aggregates::test_utils::SumSquares;
use crate::window::aggregates::AggregateRegistry;
use crate::window::frame::{FrameBound, FrameSpec};
use crate::window::functions::FunctionEvaluator;
use crate::window::plan::{OrderByColumn, WindowFunctionKind, WindowFunctionSpec, WindowSpec};
use crate::window::window_engine::WindowEngine;

const P: usize = 0;
const TS: usize = 1;
const V: usize = 2;
const OFF: usize = 3;

fn test_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("partition_key", DataType::Utf8, true),
        Field::new("ts", DataType::Int64, true),
        Field::new("value", DataType::Int64, true),
        Field::new("offset", DataType::Int64, true),
    ]))
}

fn row(partition: &str, ts: i64, value: Option<i64>, offset: Option<i64>) -> Row {
    vec![
        ScalarValue::Utf8(Some(partition.to_string())),
        ScalarValue::Int64(Some(ts)),
        ScalarValue::Int64(value),
        ScalarValue::Int64(offset),
    ]
}

/// One partition, ts = position, no offsets.
fn rows(values: &[Option<i64>]) -> Vec<Row> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| row("a", i as i64, *v, None))
        .collect()
}

fn ints(values: &[Option<i64>]) -> Vec<ScalarValue> {
    values.iter().map(|v| ScalarValue::Int64(*v)).collect()
}

fn floats(values: &[f64]) -> Vec<ScalarValue> {
    values.iter().map(|v| ScalarValue::Float64(Some(*v))).collect()
}

fn ordered(functions: Vec<WindowFunctionSpec>) -> WindowSpec {
    WindowSpec::new(functions)
        .with_partition_by(vec![P])
        .with_order_by(vec![OrderByColumn::asc(TS)])
}

fn engine(spec: &WindowSpec, input: Vec<Row>) -> WindowEngine<VecRowSource> {
    WindowEngine::try_new(test_schema(), spec, EngineConfig::default(), VecRowSource::new(input))
        .expect("engine")
}

/// Window values of every row, one column per function.
fn run(spec: &WindowSpec, input: Vec<Row>) -> Vec<Vec<ScalarValue>> {
    let width = spec.functions.len();
    let mut columns = vec![vec![]; width];
    for result in engine(spec, input) {
        let result = result.expect("row");
        for (idx, value) in result.window_values.into_iter().enumerate() {
            columns[idx].push(value);
        }
    }
    columns
}

fn run_err(spec: &WindowSpec, input: Vec<Row>) -> WindowError {
    match WindowEngine::try_new(test_schema(), spec, EngineConfig::default(), VecRowSource::new(input)) {
        Err(e) => e,
        Ok(engine) => engine
            .filter_map(|r| r.err())
            .next()
            .expect("expected an error"),
    }
}

fn value_arg() -> Vec<ArgExpr> {
    vec![ArgExpr::column(V)]
}

#[test]
fn test_lead_and_lag() {
    let spec = ordered(vec![
        WindowFunctionSpec::new(WindowFunctionKind::Lead, vec![ArgExpr::column(V), ArgExpr::int(1)]),
        WindowFunctionSpec::new(
            WindowFunctionKind::Lag,
            vec![ArgExpr::column(V), ArgExpr::int(1), ArgExpr::int(0)],
        ),
    ]);
    let out = run(&spec, rows(&[Some(10), Some(20), Some(30), Some(40)]));
    assert_eq!(out[0], ints(&[Some(20), Some(30), Some(40), None]));
    assert_eq!(out[1], ints(&[Some(0), Some(10), Some(20), Some(30)]));
}

#[test]
fn test_lead_lag_per_row_offsets() {
    let spec = ordered(vec![
        WindowFunctionSpec::new(WindowFunctionKind::Lead, vec![ArgExpr::column(V), ArgExpr::column(OFF)]),
        WindowFunctionSpec::new(WindowFunctionKind::Lag, vec![ArgExpr::column(V), ArgExpr::column(OFF)]),
    ]);
    let input = vec![
        row("a", 0, Some(1), Some(2)),
        row("a", 1, Some(2), Some(0)),
        row("a", 2, Some(3), Some(1)),
        row("a", 3, Some(4), Some(3)),
    ];
    let out = run(&spec, input);
    assert_eq!(out[0], ints(&[Some(3), Some(2), Some(4), None]));
    assert_eq!(out[1], ints(&[None, Some(2), Some(2), Some(1)]));
}

#[test]
fn test_ntile() {
    let spec = ordered(vec![WindowFunctionSpec::new(WindowFunctionKind::Ntile, vec![ArgExpr::int(3)])]);
    let out = run(&spec, rows(&[Some(1); 7]));
    assert_eq!(out[0], ints(&[Some(1), Some(1), Some(1), Some(2), Some(2), Some(3), Some(3)]));
}

#[test]
fn test_rank_family_with_ties() {
    let spec = ordered(vec![
        WindowFunctionSpec::new(WindowFunctionKind::RowNumber, vec![]),
        WindowFunctionSpec::new(WindowFunctionKind::Rank, vec![]),
        WindowFunctionSpec::new(WindowFunctionKind::DenseRank, vec![]),
        WindowFunctionSpec::new(WindowFunctionKind::PercentRank, vec![]),
        WindowFunctionSpec::new(WindowFunctionKind::CumeDist, vec![]),
    ]);
    let input = [1, 1, 2, 3, 3].iter().map(|ts| row("a", *ts, None, None)).collect();
    let out = run(&spec, input);
    assert_eq!(out[0], ints(&[Some(1), Some(2), Some(3), Some(4), Some(5)]));
    assert_eq!(out[1], ints(&[Some(1), Some(1), Some(3), Some(4), Some(4)]));
    assert_eq!(out[2], ints(&[Some(1), Some(1), Some(2), Some(3), Some(3)]));
    assert_eq!(out[3], floats(&[0.0, 0.0, 0.5, 0.75, 0.75]));
    assert_eq!(out[4], floats(&[0.4, 0.4, 0.6, 1.0, 1.0]));
}

#[test]
fn test_single_row_percent_rank() {
    let spec = ordered(vec![WindowFunctionSpec::new(WindowFunctionKind::PercentRank, vec![])]);
    let out = run(&spec, rows(&[Some(1)]));
    assert_eq!(out[0], floats(&[0.0]));
}

#[test]
fn test_empty_frame_yields_no_rows_result() {
    let spec = ordered(vec![
        WindowFunctionSpec::aggregate("sum", value_arg()),
        WindowFunctionSpec::aggregate("count", value_arg()),
        WindowFunctionSpec::new(WindowFunctionKind::FirstValue, value_arg()),
    ])
    .with_frame(FrameSpec::rows(
        FrameBound::Following(ArgExpr::int(5)),
        FrameBound::Following(ArgExpr::int(2)),
    ));
    let out = run(&spec, rows(&[Some(1), Some(2), Some(3), Some(4), Some(5), Some(6)]));
    assert_eq!(out[0], ints(&[None; 6]));
    assert_eq!(out[1], ints(&[Some(0); 6]));
    assert_eq!(out[2], ints(&[None; 6]));
}

#[test]
fn test_partitions_reset_state() {
    let spec = ordered(vec![
        WindowFunctionSpec::new(WindowFunctionKind::RowNumber, vec![]),
        WindowFunctionSpec::aggregate("sum", value_arg()),
    ]);
    let input = vec![
        row("a", 1, Some(1), None),
        row("a", 2, Some(2), None),
        row("b", 1, Some(10), None),
        row("c", 5, Some(100), None),
        row("c", 6, None, None),
    ];
    let mut engine = engine(&spec, input);
    let mut outputs = vec![];
    loop {
        match engine.next_output().unwrap() {
            WindowOutput::Row(r) => outputs.push(format!("{}:{}", r.window_values[0], r.window_values[1])),
            WindowOutput::EndOfPartition => outputs.push("|".to_string()),
            WindowOutput::EndOfInput => break,
        }
    }
    assert_eq!(outputs, vec!["1:1", "2:3", "|", "1:10", "|", "1:100", "2:100", "|"]);
    assert_eq!(engine.next_output().unwrap(), WindowOutput::EndOfInput);
}

#[test]
fn test_empty_input() {
    let spec = ordered(vec![WindowFunctionSpec::new(WindowFunctionKind::RowNumber, vec![])]);
    let mut engine = engine(&spec, vec![]);
    assert_eq!(engine.next_output().unwrap(), WindowOutput::EndOfInput);
    assert_eq!(engine.next_output().unwrap(), WindowOutput::EndOfInput);
}

#[test]
fn test_running_frames() {
    // RANGE running frame: peers share the value of their group's last row
    let spec = ordered(vec![
        WindowFunctionSpec::aggregate("sum", value_arg()),
        WindowFunctionSpec::aggregate("sum_squares", value_arg()),
    ]);
    let mut registry = AggregateRegistry::default();
    registry.register(Arc::new(SumSquares));
    let input = vec![
        row("a", 1, Some(1), None),
        row("a", 1, Some(2), None),
        row("a", 2, Some(3), None),
    ];
    let engine = WindowEngine::try_new_with_registry(
        test_schema(),
        &spec,
        EngineConfig::default(),
        VecRowSource::new(input.clone()),
        &registry,
    )
    .unwrap();
    let out: Vec<Vec<ScalarValue>> = engine.map(|r| r.unwrap().window_values).collect();
    assert_eq!(out[0], ints(&[Some(3), Some(5)]));
    assert_eq!(out[1], ints(&[Some(3), Some(5)]));
    assert_eq!(out[2], ints(&[Some(6), Some(14)]));

    let spec = spec.with_frame(FrameSpec::rows(FrameBound::UnboundedPreceding, FrameBound::CurrentRow));
    let engine = WindowEngine::try_new_with_registry(
        test_schema(),
        &spec,
        EngineConfig::default(),
        VecRowSource::new(input),
        &registry,
    )
    .unwrap();
    let out: Vec<Vec<ScalarValue>> = engine.map(|r| r.unwrap().window_values).collect();
    assert_eq!(out[0], ints(&[Some(1), Some(1)]));
    assert_eq!(out[1], ints(&[Some(3), Some(5)]));
    assert_eq!(out[2], ints(&[Some(6), Some(14)]));
}

#[test]
fn test_transition_only_aggregate_rejected_for_bounded_frame() {
    let spec = ordered(vec![WindowFunctionSpec::aggregate("sum_squares", value_arg())]).with_frame(
        FrameSpec::rows(FrameBound::Preceding(ArgExpr::int(1)), FrameBound::CurrentRow),
    );
    let mut registry = AggregateRegistry::default();
    registry.register(Arc::new(SumSquares));
    let err = WindowEngine::try_new_with_registry(
        test_schema(),
        &spec,
        EngineConfig::default(),
        VecRowSource::default(),
        &registry,
    )
    .unwrap_err();
    assert!(matches!(err, WindowError::UnsupportedFunction { .. }));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_rows_sliding_with_nulls() {
    let spec = ordered(vec![
        WindowFunctionSpec::aggregate("sum", value_arg()),
        WindowFunctionSpec::aggregate("count", value_arg()),
        WindowFunctionSpec::aggregate("max", value_arg()),
        WindowFunctionSpec::aggregate("avg", value_arg()),
    ])
    .with_frame(FrameSpec::rows(
        FrameBound::Preceding(ArgExpr::int(1)),
        FrameBound::Following(ArgExpr::int(1)),
    ));
    let out = run(&spec, rows(&[Some(4), None, None, None, Some(2), Some(6)]));
    assert_eq!(out[0], ints(&[Some(4), Some(4), None, Some(2), Some(8), Some(8)]));
    assert_eq!(out[1], ints(&[Some(1), Some(1), Some(0), Some(1), Some(2), Some(2)]));
    assert_eq!(out[2], ints(&[Some(4), Some(4), None, Some(2), Some(6), Some(6)]));
    assert_eq!(
        out[3],
        vec![
            ScalarValue::Float64(Some(4.0)),
            ScalarValue::Float64(Some(4.0)),
            ScalarValue::Float64(None),
            ScalarValue::Float64(Some(2.0)),
            ScalarValue::Float64(Some(4.0)),
            ScalarValue::Float64(Some(4.0)),
        ]
    );
}

#[test]
fn test_first_and_last_value() {
    let spec = ordered(vec![
        WindowFunctionSpec::new(WindowFunctionKind::FirstValue, value_arg()),
        WindowFunctionSpec::new(WindowFunctionKind::LastValue, value_arg()),
    ])
    .with_frame(FrameSpec::rows(
        FrameBound::Preceding(ArgExpr::int(1)),
        FrameBound::Following(ArgExpr::int(1)),
    ));
    let out = run(&spec, rows(&[Some(10), Some(20), Some(30)]));
    assert_eq!(out[0], ints(&[Some(10), Some(10), Some(20)]));
    assert_eq!(out[1], ints(&[Some(20), Some(30), Some(30)]));
}

#[test]
fn test_range_offsets() {
    let spec = ordered(vec![
        WindowFunctionSpec::aggregate("sum", value_arg()),
        WindowFunctionSpec::new(WindowFunctionKind::LastValue, value_arg()),
    ])
    .with_frame(FrameSpec::range(
        FrameBound::Preceding(ArgExpr::int(1)),
        FrameBound::Following(ArgExpr::int(1)),
    ));
    let input = [(1, 1), (2, 2), (2, 3), (4, 4), (7, 5)]
        .iter()
        .map(|(ts, v)| row("a", *ts, Some(*v), None))
        .collect();
    let out = run(&spec, input);
    assert_eq!(out[0], ints(&[Some(6), Some(6), Some(6), Some(4), Some(5)]));
    assert_eq!(out[1], ints(&[Some(3), Some(3), Some(3), Some(4), Some(5)]));
}

#[test]
fn test_range_descending_with_nulls() {
    // ts DESC NULLS FIRST: NULL keys frame only their NULL peers
    let spec = WindowSpec::new(vec![WindowFunctionSpec::aggregate("sum", value_arg())])
        .with_order_by(vec![OrderByColumn::desc(TS)])
        .with_frame(FrameSpec::range(FrameBound::Preceding(ArgExpr::int(1)), FrameBound::CurrentRow));
    let mut null_row = row("a", 0, Some(100), None);
    null_row[TS] = ScalarValue::Int64(None);
    let input = vec![
        null_row,
        row("a", 7, Some(1), None),
        row("a", 4, Some(2), None),
        row("a", 3, Some(3), None),
        row("a", 3, Some(4), None),
        row("a", 1, Some(5), None),
    ];
    let out = run(&spec, input);
    assert_eq!(out[0], ints(&[Some(100), Some(1), Some(2), Some(9), Some(9), Some(5)]));
}

#[test]
fn test_range_current_row_peers() {
    let spec = ordered(vec![WindowFunctionSpec::aggregate("count", vec![])]).with_frame(FrameSpec::range(
        FrameBound::CurrentRow,
        FrameBound::CurrentRow,
    ));
    let input = [1, 1, 1, 2, 3, 3].iter().map(|ts| row("a", *ts, None, None)).collect();
    let out = run(&spec, input);
    assert_eq!(out[0], ints(&[Some(3), Some(3), Some(3), Some(1), Some(2), Some(2)]));
}

#[test]
fn test_unbounded_following() {
    let spec = ordered(vec![WindowFunctionSpec::aggregate("sum", value_arg())]).with_frame(FrameSpec::rows(
        FrameBound::CurrentRow,
        FrameBound::UnboundedFollowing,
    ));
    let out = run(&spec, rows(&[Some(1), Some(2), Some(3)]));
    assert_eq!(out[0], ints(&[Some(6), Some(5), Some(3)]));
}

#[test]
fn test_delayed_bounds() {
    let spec = ordered(vec![WindowFunctionSpec::aggregate("sum", value_arg())]).with_frame(FrameSpec::rows(
        FrameBound::Preceding(ArgExpr::column(OFF)),
        FrameBound::CurrentRow,
    ));
    let input = vec![
        row("a", 0, Some(1), Some(0)),
        row("a", 1, Some(2), Some(1)),
        row("a", 2, Some(3), Some(2)),
        row("a", 3, Some(4), Some(1)),
        row("a", 4, Some(5), Some(4)),
    ];
    let out = run(&spec, input);
    assert_eq!(out[0], ints(&[Some(1), Some(3), Some(6), Some(7), Some(15)]));
}

#[test]
fn test_delayed_empty_frames() {
    // the leading offset varies; rows whose end falls before the start get no rows
    let spec = ordered(vec![WindowFunctionSpec::aggregate("count", value_arg())]).with_frame(FrameSpec::rows(
        FrameBound::Preceding(ArgExpr::int(1)),
        FrameBound::Preceding(ArgExpr::column(OFF)),
    ));
    let input = vec![
        row("a", 0, Some(1), Some(0)),
        row("a", 1, Some(2), Some(2)),
        row("a", 2, Some(3), Some(1)),
        row("a", 3, Some(4), Some(0)),
    ];
    let out = run(&spec, input);
    assert_eq!(out[0], ints(&[Some(1), Some(0), Some(1), Some(2)]));
}

#[test]
fn test_user_input_errors() {
    let spec = ordered(vec![WindowFunctionSpec::aggregate("sum", value_arg())]).with_frame(FrameSpec::rows(
        FrameBound::Preceding(ArgExpr::column(OFF)),
        FrameBound::CurrentRow,
    ));
    let err = run_err(&spec, vec![row("a", 0, Some(1), Some(1)), row("a", 1, Some(1), None)]);
    assert_eq!(err.to_string(), "ROWS frame starting offset cannot be NULL");
    assert_eq!(err.kind(), ErrorKind::UserInput);

    let spec = ordered(vec![WindowFunctionSpec::new(
        WindowFunctionKind::Lag,
        vec![ArgExpr::column(V), ArgExpr::column(OFF)],
    )]);
    let err = run_err(&spec, vec![row("a", 0, Some(1), Some(-2))]);
    assert_eq!(err.to_string(), "LAG offset cannot be negative");

    let spec = ordered(vec![WindowFunctionSpec::new(
        WindowFunctionKind::Lead,
        vec![ArgExpr::column(V), ArgExpr::int(-1)],
    )]);
    let err = run_err(&spec, vec![]);
    assert_eq!(err.to_string(), "LEAD offset cannot be negative");

    let spec = ordered(vec![WindowFunctionSpec::new(WindowFunctionKind::Ntile, vec![ArgExpr::column(OFF)])]);
    let err = run_err(&spec, vec![row("a", 0, Some(1), Some(0))]);
    assert_eq!(err.to_string(), "NTILE argument must be greater than zero");
}

#[test]
fn test_ntile_null_buckets() {
    let spec = ordered(vec![WindowFunctionSpec::new(WindowFunctionKind::Ntile, vec![ArgExpr::column(OFF)])]);
    let out = run(&spec, vec![row("a", 0, None, None), row("a", 1, None, Some(1))]);
    assert_eq!(out[0], ints(&[None, Some(1)]));
}

#[test]
fn test_configuration_errors() {
    let spec = ordered(vec![WindowFunctionSpec::aggregate("sum", value_arg())]).with_frame(FrameSpec::range(
        FrameBound::Preceding(ArgExpr::Literal(crate::common::Literal::Utf8("x".into()))),
        FrameBound::CurrentRow,
    ));
    assert!(matches!(run_err(&spec, vec![]), WindowError::IncompatibleBoundTypes(_)));

    let spec = ordered(vec![WindowFunctionSpec::aggregate("median", value_arg())]);
    assert!(matches!(run_err(&spec, vec![]), WindowError::UnknownFunction(_)));

    let config = EngineConfig {
        input_buffer: StoreConfig::new(0, 10),
        ..Default::default()
    };
    let spec = ordered(vec![WindowFunctionSpec::new(WindowFunctionKind::RowNumber, vec![])]);
    let err = WindowEngine::try_new(test_schema(), &spec, config, VecRowSource::default()).unwrap_err();
    assert!(matches!(err, WindowError::Config(_)));
}

#[test]
fn test_out_of_order_input() {
    let spec = ordered(vec![WindowFunctionSpec::new(WindowFunctionKind::RowNumber, vec![])]);
    let err = run_err(&spec, vec![row("a", 2, None, None), row("a", 1, None, None)]);
    assert!(matches!(err, WindowError::InvalidArgument(_)));
}

#[test]
fn test_spilling_buffers() {
    let config = EngineConfig {
        input_buffer: StoreConfig::new(128, 256),
        frame_buffer: StoreConfig::new(128, 256),
    };
    let spec = ordered(vec![
        WindowFunctionSpec::aggregate("sum", value_arg()),
        WindowFunctionSpec::aggregate("min", value_arg()),
        WindowFunctionSpec::new(WindowFunctionKind::Lag, vec![ArgExpr::column(V), ArgExpr::int(5)]),
        WindowFunctionSpec::new(WindowFunctionKind::CumeDist, vec![]),
    ])
    .with_frame(FrameSpec::rows(
        FrameBound::Preceding(ArgExpr::int(3)),
        FrameBound::Following(ArgExpr::int(3)),
    ));
    let values: Vec<Option<i64>> = (0..300).map(|i| if i % 5 == 0 { None } else { Some(i % 11) }).collect();
    let engine = WindowEngine::try_new(test_schema(), &spec, config, VecRowSource::new(rows(&values))).unwrap();
    let out: Vec<Vec<ScalarValue>> = engine.map(|r| r.unwrap().window_values).collect();
    assert_eq!(out.len(), values.len());

    for (i, got) in out.iter().enumerate() {
        let lo = i.saturating_sub(3);
        let hi = (i + 3).min(values.len() - 1);
        let frame: Vec<i64> = values[lo..=hi].iter().flatten().copied().collect();
        let sum = if frame.is_empty() { None } else { Some(frame.iter().sum::<i64>()) };
        assert_eq!(got[0], ScalarValue::Int64(sum), "sum at {i}");
        assert_eq!(got[1], ScalarValue::Int64(frame.iter().min().copied()), "min at {i}");
        let lag = if i >= 5 { values[i - 5] } else { None };
        assert_eq!(got[2], ScalarValue::Int64(lag), "lag at {i}");
        assert_eq!(got[3], ScalarValue::Float64(Some((i + 1) as f64 / 300.0)), "cume_dist at {i}");
    }
}

fn float_rows(values: &[f64]) -> (SchemaRef, Vec<Row>) {
    let schema = Arc::new(Schema::new(vec![
        Field::new("ts", DataType::Int64, false),
        Field::new("reading", DataType::Float64, true),
    ]));
    let rows = values
        .iter()
        .enumerate()
        .map(|(i, v)| vec![ScalarValue::Int64(Some(i as i64)), ScalarValue::Float64(Some(*v))])
        .collect();
    (schema, rows)
}

#[test]
fn test_float_sums_over_sliding_frames() {
    // magnitudes and infinities do not leak into later frames
    let spec = WindowSpec::new(vec![
        WindowFunctionSpec::aggregate("sum", vec![ArgExpr::column(1)]),
        WindowFunctionSpec::aggregate("avg", vec![ArgExpr::column(1)]),
    ])
    .with_order_by(vec![OrderByColumn::asc(0)])
    .with_frame(FrameSpec::rows(FrameBound::Preceding(ArgExpr::int(1)), FrameBound::CurrentRow));

    let cases = [
        ([1e20, 1.0, 1.0, 1.0], [1e20, 1e20, 2.0, 2.0], [1e20, 5e19, 1.0, 1.0]),
        (
            [f64::INFINITY, 1.0, 1.0, 1.0],
            [f64::INFINITY, f64::INFINITY, 2.0, 2.0],
            [f64::INFINITY, f64::INFINITY, 1.0, 1.0],
        ),
    ];
    for (input, sums, avgs) in cases {
        let (schema, rows) = float_rows(&input);
        let engine = WindowEngine::try_new(schema, &spec, EngineConfig::default(), VecRowSource::new(rows)).unwrap();
        let out: Vec<Vec<ScalarValue>> = engine.map(|r| r.unwrap().window_values).collect();
        let got_sums: Vec<ScalarValue> = out.iter().map(|v| v[0].clone()).collect();
        let got_avgs: Vec<ScalarValue> = out.iter().map(|v| v[1].clone()).collect();
        assert_eq!(got_sums, floats(&sums), "sum over {input:?}");
        assert_eq!(got_avgs, floats(&avgs), "avg over {input:?}");
    }
}

#[test]
fn test_running_range_values_spill_behind_lead() {
    // cume_dist holds output back to partition end, so every peer group's
    // running value is closed before the first row is emitted
    let config = EngineConfig {
        input_buffer: StoreConfig::new(128, 256),
        frame_buffer: StoreConfig::new(48, 96),
    };
    let spec = ordered(vec![
        WindowFunctionSpec::aggregate("sum", value_arg()),
        WindowFunctionSpec::new(WindowFunctionKind::CumeDist, vec![]),
    ]);
    let values: Vec<i64> = (0..400).map(|i| i % 7).collect();
    let input: Vec<Row> = values
        .iter()
        .enumerate()
        .map(|(i, v)| row("a", (i / 2) as i64, Some(*v), None))
        .collect();
    let mut engine = WindowEngine::try_new(test_schema(), &spec, config, VecRowSource::new(input)).unwrap();

    let mut out = vec![];
    while let WindowOutput::Row(result) = engine.next_output().unwrap() {
        if out.is_empty() {
            let FunctionEvaluator::Cumulative(running) = &engine.plan().functions[0] else {
                panic!("sum over the default frame should be cumulative");
            };
            assert_eq!(running.pending_groups(), 200);
            assert!(running.snapshot_stats().spills > 0);
            assert!(running.snapshot_stats().resident_bytes <= 96);
        }
        out.push(result.window_values);
    }
    assert_eq!(out.len(), values.len());
    for (i, got) in out.iter().enumerate() {
        let group_end = (i / 2) * 2 + 2;
        let sum: i64 = values[..group_end].iter().sum();
        assert_eq!(got[0], ScalarValue::Int64(Some(sum)), "sum at {i}");
        assert_eq!(got[1], ScalarValue::Float64(Some(group_end as f64 / 400.0)), "cume_dist at {i}");
    }
}
