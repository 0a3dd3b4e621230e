use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::data::frame::{Cell, Column, Dataset};
use crate::data::DataError;

/// Storage type of a node database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    Csv,
    Excel,
    Sql,
    Parquet,
}

/// Location of one database attached to a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSource {
    /// Path to the database file
    pub database: PathBuf,
    /// Storage type (only CSV can be read)
    #[serde(default = "default_db_type")]
    pub db_type: DbType,
}

fn default_db_type() -> DbType {
    DbType::Csv
}

impl DatasetSource {
    pub fn csv(path: impl Into<PathBuf>) -> Self {
        Self {
            database: path.into(),
            db_type: DbType::Csv,
        }
    }

    /// Read the database into memory
    pub fn load(&self) -> Result<Dataset, DataError> {
        match self.db_type {
            DbType::Csv => Dataset::from_path(&self.database),
            other => Err(DataError::UnsupportedSource(format!("{:?}", other).to_lowercase())),
        }
    }
}

impl Dataset {
    /// Load a CSV file with a header row
    pub fn from_path(path: &Path) -> Result<Self, DataError> {
        let file = File::open(path).map_err(|source| DataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dataset = Self::from_reader(file)?;
        info!(
            "Loaded dataset {} ({} rows, {} columns)",
            path.display(),
            dataset.row_count(),
            dataset.columns().len()
        );
        Ok(dataset)
    }

    /// Parse CSV content with a header row
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DataError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut columns: Vec<Column> = Vec::new();
        for name in rdr.headers()?.iter() {
            if columns.iter().any(|c| c.name == name) {
                return Err(DataError::DuplicateColumn(name.to_string()));
            }
            columns.push(Column::new(name));
        }

        for record in rdr.records() {
            let record = record?;
            for (column, field) in columns.iter_mut().zip(record.iter()) {
                column.cells.push(Cell::parse(field));
            }
        }

        debug!("Parsed {} columns from CSV input", columns.len());
        Ok(Dataset::from_columns(columns))
    }

    /// Parse CSV held in a string
    pub fn from_csv_str(content: &str) -> Result<Self, DataError> {
        Self::from_reader(content.as_bytes())
    }
}
