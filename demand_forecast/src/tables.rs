//! Reading and writing the persisted stage tables

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Read every row of a headered CSV file
pub fn read_csv<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

/// A row of a persisted CSV table with a fixed column layout
pub trait TableRow: Serialize {
    /// Header names, in the order the row serializes its fields
    const COLUMNS: &'static [&'static str];
}

/// Write rows as a headered CSV file, creating parent directories.
///
/// The header comes from [`TableRow::COLUMNS`], so an empty table still
/// carries its columns.
pub fn write_csv<T: TableRow, P: AsRef<Path>>(path: P, rows: &[T]) -> Result<()> {
    ensure_parent(path.as_ref())?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(T::COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a JSON document
pub fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(file)?)
}

/// Write a JSON document, creating parent directories
pub fn write_json<T: Serialize + ?Sized, P: AsRef<Path>>(path: P, value: &T) -> Result<()> {
    ensure_parent(path.as_ref())?;
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        name: String,
        value: f64,
    }

    impl TableRow for Row {
        const COLUMNS: &'static [&'static str] = &["name", "value"];
    }

    #[test]
    fn test_empty_table_keeps_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("empty.csv");

        write_csv::<Row, _>(&path, &[]).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "name,value\n");
        let rows: Vec<Row> = read_csv(&path).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        let rows = vec![
            Row { name: "CA".to_string(), value: 1.5 },
            Row { name: "TX".to_string(), value: 2.0 },
        ];

        write_csv(&path, &rows).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "name,value\nCA,1.5\nTX,2.0\n"
        );
        assert_eq!(read_csv::<Row, _>(&path).unwrap(), rows);
    }
}
