use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Markers read as a missing value, in addition to an empty field
const NA_MARKERS: &[&str] = &[
    "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "NULL", "null", "None", "<NA>", "#N/A",
];

/// Label used for the missing-value bucket of a value count
pub const MISSING_LABEL: &str = "NaN";

static MISSING: Cell = Cell::Missing;

/// A single dataset value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    /// Empty field or NA marker
    Missing,
    /// Field that parses as a floating point number
    Number(f64),
    /// Any other field
    Text(String),
}

impl Cell {
    /// Classify a raw CSV field
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || NA_MARKERS.contains(&trimmed) {
            return Cell::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(value) if !value.is_nan() => Cell::Number(value),
            _ => Cell::Text(trimmed.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    /// Numeric value, if any. Text and missing cells coerce to `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Canonical string used for grouping and value counts.
    /// Integral numbers print without a fractional part.
    pub fn key(&self) -> Option<String> {
        match self {
            Cell::Missing => None,
            Cell::Number(value) => Some(format_number(*value)),
            Cell::Text(text) => Some(text.clone()),
        }
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Missing => write!(f, "{}", MISSING_LABEL),
            Cell::Number(value) => write!(f, "{}", format_number(*value)),
            Cell::Text(text) => write!(f, "{}", text),
        }
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// A named column of cells
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Cell>,
}

impl Column {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cells: Vec::new(),
        }
    }

    /// Numeric coercion: anything that is not a number becomes `None`
    pub fn numeric(&self) -> Vec<Option<f64>> {
        self.cells.iter().map(Cell::as_f64).collect()
    }
}

/// Column-oriented table holding one node's local data
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
    rows: usize,
}

impl Dataset {
    /// Build a dataset from columns of equal length
    pub fn from_columns(columns: Vec<Column>) -> Self {
        let rows = columns.first().map(|c| c.cells.len()).unwrap_or(0);
        debug_assert!(columns.iter().all(|c| c.cells.len() == rows));
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        Self { columns, index, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    /// Cell at `row` of column `name`; `Missing` for an absent column
    pub fn cell(&self, name: &str, row: usize) -> &Cell {
        self.column(name)
            .and_then(|c| c.cells.get(row))
            .unwrap_or(&MISSING)
    }

    /// Numeric coercion of a column; an absent column yields no values
    pub fn numeric(&self, name: &str) -> Vec<Option<f64>> {
        self.column(name)
            .map(Column::numeric)
            .unwrap_or_default()
    }

    /// Names from `required` that are absent, in the order given
    pub fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|name| !self.has_column(name))
            .map(|name| name.to_string())
            .collect()
    }

    /// Row indices per key. Rows with a missing key are skipped; keys are ordered.
    pub fn group_rows(&self, key: &str) -> BTreeMap<String, Vec<usize>> {
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        if let Some(column) = self.column(key) {
            for (row, cell) in column.cells.iter().enumerate() {
                if let Some(k) = cell.key() {
                    groups.entry(k).or_default().push(row);
                }
            }
        }
        groups
    }

    /// Number of distinct non-missing values in a column
    pub fn nunique(&self, name: &str) -> usize {
        self.column(name)
            .map(|c| {
                c.cells
                    .iter()
                    .filter_map(Cell::key)
                    .collect::<HashSet<_>>()
                    .len()
            })
            .unwrap_or(0)
    }

    /// Occurrences per value, with missing cells counted under [`MISSING_LABEL`]
    pub fn value_counts(&self, name: &str) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        if let Some(column) = self.column(name) {
            for cell in &column.cells {
                let key = cell.key().unwrap_or_else(|| MISSING_LABEL.to_string());
                *counts.entry(key).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Whether a column holds at least one number and no text
    pub fn is_numeric_column(&self, name: &str) -> bool {
        self.column(name)
            .map(|c| {
                c.cells.iter().any(|cell| matches!(cell, Cell::Number(_)))
                    && !c.cells.iter().any(|cell| matches!(cell, Cell::Text(_)))
            })
            .unwrap_or(false)
    }

    /// Rows sorted by a numeric column; missing values last, ties keep row order
    pub fn sort_rows_by(&self, rows: &[usize], name: &str) -> Vec<usize> {
        let mut sorted = rows.to_vec();
        sorted.sort_by(|&a, &b| {
            match (self.cell(name, a).as_f64(), self.cell(name, b).as_f64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
        });
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, raw: &[&str]) -> Column {
        Column {
            name: name.to_string(),
            cells: raw.iter().map(|r| Cell::parse(r)).collect(),
        }
    }

    #[test]
    fn test_cell_parse() {
        assert_eq!(Cell::parse(""), Cell::Missing);
        assert_eq!(Cell::parse("  NA "), Cell::Missing);
        assert_eq!(Cell::parse("nan"), Cell::Missing);
        assert_eq!(Cell::parse("4.5"), Cell::Number(4.5));
        assert_eq!(Cell::parse("-2"), Cell::Number(-2.0));
        assert_eq!(Cell::parse("F"), Cell::Text("F".to_string()));
    }

    #[test]
    fn test_cell_key_formats_integers() {
        assert_eq!(Cell::Number(1.0).key().as_deref(), Some("1"));
        assert_eq!(Cell::Number(1.5).key().as_deref(), Some("1.5"));
        assert_eq!(Cell::Missing.key(), None);
    }

    #[test]
    fn test_missing_cells_compare_equal() {
        assert_eq!(Cell::Missing, Cell::Missing);
        assert_ne!(Cell::Number(1.0), Cell::Text("1".to_string()));
    }

    #[test]
    fn test_grouping_and_counts() {
        let ds = Dataset::from_columns(vec![
            column("pat_ID", &["1", "2", "1", "", "3"]),
            column("Sex", &["F", "M", "F", "", "F"]),
        ]);
        assert_eq!(ds.row_count(), 5);
        assert_eq!(ds.nunique("pat_ID"), 3);

        let groups = ds.group_rows("pat_ID");
        assert_eq!(groups.len(), 3);
        assert_eq!(groups["1"], vec![0, 2]);

        let counts = ds.value_counts("Sex");
        assert_eq!(counts["F"], 3);
        assert_eq!(counts["M"], 1);
        assert_eq!(counts[MISSING_LABEL], 1);
    }

    #[test]
    fn test_sort_rows_puts_missing_last() {
        let ds = Dataset::from_columns(vec![column("t", &["3", "", "1", "2"])]);
        assert_eq!(ds.sort_rows_by(&[0, 1, 2, 3], "t"), vec![2, 3, 0, 1]);
    }

    #[test]
    fn test_missing_columns_reported_in_order() {
        let ds = Dataset::from_columns(vec![column("a", &["1"])]);
        assert_eq!(ds.missing_columns(&["b", "a", "c"]), vec!["b", "c"]);
        assert!(ds.numeric("b").is_empty());
        assert!(ds.cell("b", 0).is_missing());
    }
}
