//! Loading numeric columns from data files.
//!
//! Files are headerless, comma separated, may contain `#` comment lines and surrounding
//! whitespace. A file with a single number per line is the common case for empirical samples; a
//! two-column `value,probability` file feeds weighted tables.
use std::path::Path;

use csv::{ReaderBuilder, Trim};

use crate::error::EpiError;

/// Reads the first `columns` columns of every record in `path` as floats.
pub(crate) fn read_columns(path: &Path, columns: usize) -> Result<Vec<Vec<f64>>, EpiError> {
    let source = path.display().to_string();
    let failure = |reason: String| EpiError::DistributionError {
        source: source.clone(),
        reason,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(|e| failure(e.to_string()))?;

    let mut output = vec![Vec::new(); columns];
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| failure(e.to_string()))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        if record.len() < columns {
            return Err(failure(format!(
                "record {} has {} column(s), expected {columns}",
                line + 1,
                record.len()
            )));
        }
        for (column, field) in output.iter_mut().zip(record.iter()) {
            let value = field.parse::<f64>().map_err(|e| {
                failure(format!("record {}: `{field}` is not a number ({e})", line + 1))
            })?;
            column.push(value);
        }
    }

    if output[0].is_empty() {
        return Err(failure("no data rows".to_string()));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn reads_single_column_with_comments() {
        let file = write_file("# incubation days\n1.5\n 2.0 \n3\n");
        let columns = read_columns(file.path(), 1).unwrap();
        assert_eq!(columns, vec![vec![1.5, 2.0, 3.0]]);
    }

    #[test]
    fn reads_two_columns() {
        let file = write_file("1,0.25\n2,0.75\n");
        let columns = read_columns(file.path(), 2).unwrap();
        assert_eq!(columns, vec![vec![1.0, 2.0], vec![0.25, 0.75]]);
    }

    #[test]
    fn non_numeric_names_the_file() {
        let file = write_file("1\nabc\n");
        let error = read_columns(file.path(), 1).unwrap_err();
        match error {
            EpiError::DistributionError { source, reason } => {
                assert_eq!(source, file.path().display().to_string());
                assert!(reason.contains("record 2"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_reported() {
        let error = read_columns(Path::new("/definitely/not/here.csv"), 1).unwrap_err();
        assert!(matches!(error, EpiError::DistributionError { source, .. } if source.contains("here.csv")));
    }

    #[test]
    fn short_record_is_rejected() {
        let file = write_file("1,0.5\n2\n");
        assert!(read_columns(file.path(), 2).is_err());
    }
}
