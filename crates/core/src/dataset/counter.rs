use std::path::Path;

use super::DatasetError;

/// Counts the data rows of a dataset file: `max(0, lines - 1)`.
///
/// Surrounding whitespace is trimmed first, so a trailing newline does not
/// add a row. An empty file yields 0.
pub async fn count_iterations(path: &Path) -> Result<u64, DatasetError> {
    let data = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DatasetError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    Ok(count_data_rows(&data))
}

/// Row count of already-loaded dataset contents. The first line is the header.
pub fn count_data_rows(data: &str) -> u64 {
    data.trim().split('\n').count().saturating_sub(1) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_count_empty() {
        assert_eq!(count_data_rows(""), 0);
        assert_eq!(count_data_rows("  \n\n"), 0);
    }

    #[test]
    fn test_count_header_only() {
        assert_eq!(count_data_rows("id,name"), 0);
        assert_eq!(count_data_rows("id,name\n"), 0);
    }

    #[test]
    fn test_count_rows() {
        assert_eq!(count_data_rows("id,name\n1,a\n2,b\n3,c"), 3);
        assert_eq!(count_data_rows("id,name\n1,a\n2,b\n3,c\n"), 3);
    }

    #[test]
    fn test_count_crlf() {
        assert_eq!(count_data_rows("id,name\r\n1,a\r\n2,b\r\n"), 2);
    }

    #[test]
    fn test_count_keeps_interior_blank_lines() {
        assert_eq!(count_data_rows("id\n1\n\n2"), 3);
    }

    #[tokio::test]
    async fn test_count_iterations_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("input1.csv");
        std::fs::write(&path, "id,email\n1,a@example.com\n2,b@example.com\n").unwrap();
        assert_eq!(count_iterations(&path).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_count_iterations_empty_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "").unwrap();
        assert_eq!(count_iterations(&path).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_count_iterations_missing_file() {
        let err = count_iterations(Path::new("/nonexistent/input.csv"))
            .await
            .unwrap_err();
        let DatasetError::Unreadable { path, .. } = &err;
        assert_eq!(path, Path::new("/nonexistent/input.csv"));
        assert!(err.to_string().starts_with("Failed to read input file"));
    }

    #[tokio::test]
    async fn test_count_iterations_invalid_utf8() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("binary.csv");
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0x0a, 0xc3]).unwrap();
        let err = count_iterations(&path).await.unwrap_err();
        assert!(matches!(err, DatasetError::Unreadable { .. }));
    }
}
