//! `AgentFrame`, the tabular exchange format between the engine and its collaborators.
//!
//! A frame is an ordered map of named, equally long columns. Float columns use `NaN` as null,
//! the other kinds use `None`.
use indexmap::IndexMap;

use crate::error::EpiError;

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Float(Vec<f64>),
    Int(Vec<Option<i64>>),
    Bool(Vec<Option<bool>>),
    Text(Vec<Option<String>>),
    /// Lists of agent ids, used for the neighbor sets.
    IdList(Vec<Vec<u64>>),
}

impl Column {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Column::Float(values) => values.len(),
            Column::Int(values) => values.len(),
            Column::Bool(values) => values.len(),
            Column::Text(values) => values.len(),
            Column::IdList(values) => values.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any entry is null.
    #[must_use]
    pub fn has_nulls(&self) -> bool {
        match self {
            Column::Float(values) => values.iter().any(|v| v.is_nan()),
            Column::Int(values) => values.iter().any(Option::is_none),
            Column::Bool(values) => values.iter().any(Option::is_none),
            Column::Text(values) => values.iter().any(Option::is_none),
            Column::IdList(_) => false,
        }
    }

    /// The column as floats. Integers are widened, other kinds return `None`.
    #[must_use]
    pub fn to_floats(&self) -> Option<Vec<f64>> {
        match self {
            Column::Float(values) => Some(values.clone()),
            #[allow(clippy::cast_precision_loss)]
            Column::Int(values) => Some(
                values
                    .iter()
                    .map(|v| v.map_or(f64::NAN, |v| v as f64))
                    .collect(),
            ),
            _ => None,
        }
    }
}

impl From<Vec<f64>> for Column {
    fn from(values: Vec<f64>) -> Self {
        Column::Float(values)
    }
}

impl From<Vec<i64>> for Column {
    fn from(values: Vec<i64>) -> Self {
        Column::Int(values.into_iter().map(Some).collect())
    }
}

impl From<Vec<bool>> for Column {
    fn from(values: Vec<bool>) -> Self {
        Column::Bool(values.into_iter().map(Some).collect())
    }
}

impl From<Vec<&str>> for Column {
    fn from(values: Vec<&str>) -> Self {
        Column::Text(values.into_iter().map(|v| Some(v.to_string())).collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentFrame {
    columns: IndexMap<String, Column>,
}

impl AgentFrame {
    #[must_use]
    pub fn new() -> Self {
        AgentFrame::default()
    }

    /// Builder form of [`AgentFrame::insert`].
    #[must_use]
    pub fn with_column(mut self, name: &str, column: impl Into<Column>) -> Self {
        self.insert(name, column);
        self
    }

    /// Adds or replaces a column, returning the replaced one.
    pub fn insert(&mut self, name: &str, column: impl Into<Column>) -> Option<Column> {
        self.columns.insert(name.to_string(), column.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<Column> {
        self.columns.shift_remove(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Number of rows, taken from the first column.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.columns.values().next().map_or(0, Column::len)
    }

    /// Checks that every column has the same length and that the `required` columns are present
    /// and free of nulls. All problems are reported together.
    pub fn validate_required(&self, required: &[&str]) -> Result<(), EpiError> {
        let n_rows = self.n_rows();
        if self.columns.values().any(|column| column.len() != n_rows) {
            return Err(EpiError::InvalidFieldError(None));
        }

        let mut missing = Vec::new();
        let mut invalid = Vec::new();
        for name in required {
            match self.columns.get(*name) {
                None => missing.push(*name),
                Some(column) if column.has_nulls() => invalid.push(*name),
                Some(_) => {}
            }
        }

        let mut errors = Vec::new();
        if !missing.is_empty() {
            errors.push(EpiError::missing_fields(&missing));
        }
        if !invalid.is_empty() {
            errors.push(EpiError::invalid_fields(&invalid));
        }
        match EpiError::aggregate(errors) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builds_and_reads_columns() {
        let frame = AgentFrame::new()
            .with_column("x", vec![1.0, 2.0])
            .with_column("agent", vec![3_i64, 4])
            .with_column("disease_state", vec!["susceptible", "infected"]);
        assert_eq!(frame.n_rows(), 2);
        assert_eq!(
            frame.column_names().collect::<Vec<_>>(),
            vec!["x", "agent", "disease_state"]
        );
        assert_eq!(frame.get("agent").unwrap().to_floats(), Some(vec![3.0, 4.0]));
        assert_eq!(frame.get("disease_state").unwrap().to_floats(), None);
    }

    #[test]
    fn missing_and_null_fields_are_aggregated() {
        let frame = AgentFrame::new()
            .with_column("x", vec![1.0, f64::NAN])
            .with_column("y", vec![1.0, 2.0]);
        match frame.validate_required(&["x", "y", "vx", "vy"]).unwrap_err() {
            EpiError::Multiple(errors) => {
                assert!(matches!(
                    &errors[0],
                    EpiError::MissingFieldError(fields) if fields == &vec!["vx", "vy"]
                ));
                assert!(matches!(
                    &errors[1],
                    EpiError::InvalidFieldError(Some(fields)) if fields == &vec!["x"]
                ));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn only_missing_fields() {
        let frame = AgentFrame::new().with_column("x", vec![0.5]);
        assert!(matches!(
            frame.validate_required(&["x", "y"]),
            Err(EpiError::MissingFieldError(fields)) if fields == vec!["y"]
        ));
    }

    #[test]
    fn ragged_columns_are_invalid() {
        let frame = AgentFrame::new()
            .with_column("x", vec![1.0, 2.0])
            .with_column("y", vec![1.0]);
        assert!(matches!(
            frame.validate_required(&["x"]),
            Err(EpiError::InvalidFieldError(None))
        ));
    }
}
