use crate::error::{CliError, Result};
use std::path::Path;
use titrafit::core::data::table::DataTable;
use tracing::{debug, info};

/// A titration loaded from CSV, split into independent and dependent tables.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub independent: DataTable,
    pub dependent: DataTable,
}

impl Dataset {
    pub fn rows(&self) -> usize {
        self.dependent.rows()
    }
}

/// Reads a headed CSV file whose first `independent_columns` columns are the
/// independent variables.
pub fn load_csv(path: &Path, independent_columns: usize) -> Result<Dataset> {
    debug!("Loading dataset from {:?}", path);
    let parse_error = |e: csv::Error| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_path(path)
        .map_err(parse_error)?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(parse_error)?
        .iter()
        .map(str::to_string)
        .collect();
    if independent_columns == 0 || independent_columns >= headers.len() {
        return Err(CliError::Data(format!(
            "{} independent column(s) requested but the file has {} column(s); at least one dependent column is required",
            independent_columns,
            headers.len()
        )));
    }

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(parse_error)?;
        let line = record.position().map_or(index + 2, |p| p.line() as usize);
        for ((column, field), header) in columns.iter_mut().zip(record.iter()).zip(&headers) {
            let value = field.parse::<f64>().map_err(|_| {
                CliError::Data(format!(
                    "line {line}, column '{header}': '{field}' is not a number"
                ))
            })?;
            column.push(value);
        }
    }
    if columns[0].is_empty() {
        return Err(CliError::Data(format!("{} contains no data rows", path.display())));
    }

    let dependent_columns = columns.split_off(independent_columns);
    let dependent_headers = headers[independent_columns..].to_vec();
    let independent_headers = headers[..independent_columns].to_vec();
    let table = |columns: &[Vec<f64>], headers: Vec<String>| {
        DataTable::from_columns(columns)
            .and_then(|t| t.with_headers(headers))
            .map_err(|e| CliError::Data(e.to_string()))
    };
    let dataset = Dataset {
        independent: table(&columns, independent_headers)?,
        dependent: table(&dependent_columns, dependent_headers)?,
    };
    info!(
        rows = dataset.rows(),
        dependent = dataset.dependent.columns(),
        "Dataset loaded."
    );
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_csv(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("titration.csv");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn columns_are_split_at_the_independent_count() {
        let (_dir, path) = write_csv(
            "guest, shift_a, shift_b\n\
             # comment lines are skipped\n\
             0.0, 1.00, 2.00\n\
             0.001, 1.50, 2.40\n\
             0.002, 1.70, 2.55\n",
        );
        let dataset = load_csv(&path, 1).unwrap();
        assert_eq!(dataset.rows(), 3);
        assert_eq!(dataset.independent.columns(), 1);
        assert_eq!(dataset.dependent.columns(), 2);
        assert_eq!(dataset.independent.headers(), ["guest".to_string()]);
        assert_eq!(dataset.dependent.value(1, 1), 2.40);
        assert_eq!(dataset.independent.value(2, 0), 0.002);
    }

    #[test]
    fn non_numeric_cells_report_their_location() {
        let (_dir, path) = write_csv("x,y\n0.0,1.0\n0.1,abc\n");
        let message = match load_csv(&path, 1) {
            Err(CliError::Data(message)) => message,
            other => panic!("expected a data error, got {other:?}"),
        };
        assert!(message.contains("line 3"));
        assert!(message.contains("'abc'"));
    }

    #[test]
    fn ragged_rows_are_parse_errors() {
        let (_dir, path) = write_csv("x,y\n0.0,1.0\n0.1\n");
        assert!(matches!(
            load_csv(&path, 1),
            Err(CliError::FileParsing { .. })
        ));
    }

    #[test]
    fn a_dependent_column_is_required() {
        let (_dir, path) = write_csv("x,y\n0.0,1.0\n");
        assert!(matches!(load_csv(&path, 2), Err(CliError::Data(_))));
        assert!(matches!(load_csv(&path, 0), Err(CliError::Data(_))));
    }

    #[test]
    fn header_only_files_are_rejected() {
        let (_dir, path) = write_csv("x,y\n");
        assert!(matches!(load_csv(&path, 1), Err(CliError::Data(_))));
    }
}
