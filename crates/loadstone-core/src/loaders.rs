//! External collaborator interfaces (§1 "deliberately out of scope"): loading
//! and parsing the request collection and tabular data is assumed done by
//! the caller. These traits name the seam; the concrete adapters here are
//! minimal, JSON/CSV-based implementations sufficient for tests and the CLI,
//! not a general-purpose collection format.

use crate::collection::{ColumnMapping, DataRow, RequestCollection};
use crate::error::LoadstoneError;

pub trait CollectionLoader {
    fn load(&self) -> Result<RequestCollection, LoadstoneError>;
}

pub trait RowLoader {
    fn load(&self) -> Result<Vec<DataRow>, LoadstoneError>;
}

/// Loads a [`RequestCollection`] from a JSON file on disk.
pub struct JsonCollectionLoader {
    path: std::path::PathBuf,
}

impl JsonCollectionLoader {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CollectionLoader for JsonCollectionLoader {
    fn load(&self) -> Result<RequestCollection, LoadstoneError> {
        let content = std::fs::read_to_string(&self.path)?;
        let collection: RequestCollection = serde_json::from_str(&content)?;
        Ok(collection)
    }
}

/// Loads [`DataRow`]s from a CSV file on disk, header row names the columns.
pub struct CsvRowLoader {
    path: std::path::PathBuf,
}

impl CsvRowLoader {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RowLoader for CsvRowLoader {
    fn load(&self) -> Result<Vec<DataRow>, LoadstoneError> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(&self.path)?;
        let headers = reader.headers()?.clone();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let row: DataRow = headers.iter().zip(record.iter()).map(|(h, v)| (h.to_string(), v.to_string())).collect();
            rows.push(row);
        }
        Ok(rows)
    }
}

/// Loads a [`ColumnMapping`] from a JSON file on disk.
pub struct JsonColumnMappingLoader {
    path: std::path::PathBuf,
}

impl JsonColumnMappingLoader {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<ColumnMapping, LoadstoneError> {
        let content = std::fs::read_to_string(&self.path)?;
        let mapping: ColumnMapping = serde_json::from_str(&content)?;
        Ok(mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn json_collection_loader_reads_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"name":"demo","requests":[{{"name":"ping","method":"GET","url_raw":"http://x/ping"}}]}}"#
        )
        .unwrap();
        let loader = JsonCollectionLoader::new(file.path());
        let collection = loader.load().unwrap();
        assert_eq!(collection.name, "demo");
        assert_eq!(collection.requests.len(), 1);
    }

    #[test]
    fn json_collection_loader_missing_file_errors() {
        let loader = JsonCollectionLoader::new("/nonexistent/path.json");
        assert!(loader.load().is_err());
    }

    #[test]
    fn csv_row_loader_reads_rows_keyed_by_header() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id,email").unwrap();
        writeln!(file, "1,a@b.com").unwrap();
        writeln!(file, "2,c@d.com").unwrap();
        let loader = CsvRowLoader::new(file.path());
        let rows = loader.load().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("email").unwrap(), "a@b.com");
    }

    #[test]
    fn json_column_mapping_loader_reads_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"columns":[{{"csv_column":"id","placeholder_name":"user_id","data_type":"integer","encoding":"none"}}],"globals":[]}}"#
        )
        .unwrap();
        let loader = JsonColumnMappingLoader::new(file.path());
        let mapping = loader.load().unwrap();
        assert_eq!(mapping.columns.len(), 1);
    }
}
