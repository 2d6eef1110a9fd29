use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use arrow::datatypes::DataType;
use datafusion::scalar::ScalarValue;

use crate::error::{Result, WindowError};

pub mod builtin;

#[cfg(test)]
pub(crate) mod test_utils;

pub type AccumulatorState = Vec<ScalarValue>;

/// State and result types of an aggregate bound to concrete argument types.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSignature {
    pub state_types: Vec<DataType>,
    pub return_type: DataType,
}

/// Catalog entry for an aggregate usable as a window function.
///
/// `transition` folds one row into a state. `combine` merges a partial state
/// into another, `inverse_combine` removes a partial state that was previously
/// combined. Partial states handed to both are the result of folding a single
/// row into `initial_state`.
pub trait AggregateFunction: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn bind(&self, arg_types: &[DataType]) -> Result<AggregateSignature>;

    fn initial_state(&self, signature: &AggregateSignature) -> Result<AccumulatorState>;

    fn transition(&self, state: &mut AccumulatorState, args: &[ScalarValue]) -> Result<()>;

    fn supports_combine(&self) -> bool {
        false
    }

    fn combine(&self, state: &mut AccumulatorState, other: &AccumulatorState) -> Result<()> {
        let _ = (state, other);
        Err(WindowError::UnsupportedFunction {
            name: self.name().to_string(),
            reason: "no combine operator".to_string(),
        })
    }

    fn supports_inverse(&self) -> bool {
        false
    }

    fn inverse_combine(&self, state: &mut AccumulatorState, other: &AccumulatorState) -> Result<()> {
        let _ = (state, other);
        Err(WindowError::UnsupportedFunction {
            name: self.name().to_string(),
            reason: "no inverse operator".to_string(),
        })
    }

    /// `inverse_combine` exactly undoes `combine` for states of `signature`.
    /// Float sums are not: large values absorb small ones and `inf - inf` is NaN.
    fn supports_inverse_for(&self, signature: &AggregateSignature) -> bool {
        let _ = signature;
        self.supports_inverse()
    }

    fn finalize(&self, state: &AccumulatorState) -> Result<ScalarValue>;

    /// Rows with a NULL argument are skipped and not counted as input.
    fn is_strict(&self) -> bool {
        true
    }
}

pub struct AggregateRegistry {
    functions: HashMap<String, Arc<dyn AggregateFunction>>,
}

impl Default for AggregateRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register_supported_aggregates();
        registry
    }
}

impl AggregateRegistry {
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    fn register_supported_aggregates(&mut self) {
        self.register(Arc::new(builtin::Count));
        self.register(Arc::new(builtin::Sum));
        self.register(Arc::new(builtin::Avg));
        self.register(Arc::new(builtin::MinMax::min()));
        self.register(Arc::new(builtin::MinMax::max()));
    }

    pub fn register(&mut self, function: Arc<dyn AggregateFunction>) {
        self.functions.insert(function.name().to_lowercase(), function);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AggregateFunction>> {
        self.functions.get(&name.to_lowercase()).cloned()
    }

    pub fn is_supported(&self, name: &str) -> bool {
        self.functions.contains_key(&name.to_lowercase())
    }

    pub fn supported_functions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }
}

pub fn get_aggregate_registry() -> &'static AggregateRegistry {
    static REGISTRY: std::sync::OnceLock<AggregateRegistry> = std::sync::OnceLock::new();
    REGISTRY.get_or_init(AggregateRegistry::default)
}

/// An aggregate resolved against its argument expressions' types.
#[derive(Debug, Clone)]
pub struct BoundAggregate {
    pub function: Arc<dyn AggregateFunction>,
    pub arg_types: Vec<DataType>,
    pub signature: AggregateSignature,
    initial: AccumulatorState,
}

impl BoundAggregate {
    pub fn try_new(function: Arc<dyn AggregateFunction>, arg_types: Vec<DataType>) -> Result<Self> {
        let signature = function.bind(&arg_types)?;
        let initial = function.initial_state(&signature)?;
        Ok(Self {
            function,
            arg_types,
            signature,
            initial,
        })
    }

    pub fn name(&self) -> &str {
        self.function.name()
    }

    pub fn initial_state(&self) -> AccumulatorState {
        self.initial.clone()
    }

    /// Whether a row with these arguments contributes to the aggregate.
    pub fn counts(&self, args: &[ScalarValue]) -> bool {
        !(self.function.is_strict() && args.iter().any(|a| a.is_null()))
    }

    /// Folds one row into `state`; returns whether the row was counted.
    pub fn accumulate(&self, state: &mut AccumulatorState, args: &[ScalarValue]) -> Result<bool> {
        if !self.counts(args) {
            return Ok(false);
        }
        self.function.transition(state, args)?;
        Ok(true)
    }

    /// One row's partial state and its not-null count.
    pub fn row_state(&self, args: &[ScalarValue]) -> Result<(u64, AccumulatorState)> {
        let mut state = self.initial_state();
        let counted = self.accumulate(&mut state, args)?;
        Ok((u64::from(counted), state))
    }

    pub fn finalize(&self, state: &AccumulatorState) -> Result<ScalarValue> {
        self.function.finalize(state)
    }

    /// Result over a frame with no counted input.
    pub fn empty_result(&self) -> Result<ScalarValue> {
        self.function.finalize(&self.initial)
    }
}
