//! Advisory client-side checks for import files.
//!
//! The server does the authoritative validation; this only catches obvious
//! mistakes before an upload is attempted.

use std::path::Path;

use crate::error::TrackerError;

/// A file ready to be uploaded as an import.
#[derive(Clone, Debug)]
pub struct ImportFile {
    /// Name sent to the server and used for the extension check.
    pub file_name: String,
    /// Raw file contents.
    pub contents: Vec<u8>,
}

impl ImportFile {
    pub fn new(file_name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            contents: contents.into(),
        }
    }

    /// Read a file from disk, keeping only its final path component as the name.
    pub async fn read(path: &Path) -> Result<Self, TrackerError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let contents = tokio::fs::read(path)
            .await
            .map_err(|e| TrackerError::FileRead {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            file_name,
            contents,
        })
    }

    /// Lowercased extension without the dot.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    }

    /// MIME type sent with the upload.
    pub fn mime_type(&self) -> &'static str {
        match self.extension().as_deref() {
            Some("csv") => "text/csv",
            Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            _ => "application/octet-stream",
        }
    }
}

/// Reject files whose extension is not in `allowed` (case-insensitive).
pub fn validate_import_file(file: &ImportFile, allowed: &[String]) -> Result<(), TrackerError> {
    let ok = file
        .extension()
        .is_some_and(|ext| allowed.iter().any(|a| a.trim_start_matches('.').eq_ignore_ascii_case(&ext)));
    if ok {
        return Ok(());
    }
    let expected = allowed
        .iter()
        .map(|a| format!(".{}", a.trim_start_matches('.')))
        .collect::<Vec<_>>()
        .join(", ");
    Err(TrackerError::Validation {
        file_name: file.file_name.clone(),
        expected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv_only() -> Vec<String> {
        vec!["csv".to_string()]
    }

    #[test]
    fn test_csv_accepted_case_insensitive() {
        assert!(validate_import_file(&ImportFile::new("products.csv", ""), &csv_only()).is_ok());
        assert!(validate_import_file(&ImportFile::new("PRODUCTS.CSV", ""), &csv_only()).is_ok());
        let dotted = vec![".csv".to_string()];
        assert!(validate_import_file(&ImportFile::new("a.csv", ""), &dotted).is_ok());
    }

    #[test]
    fn test_txt_rejected_with_file_name() {
        let err = validate_import_file(&ImportFile::new("products.txt", ""), &csv_only())
            .unwrap_err();
        match err {
            TrackerError::Validation {
                file_name,
                expected,
            } => {
                assert_eq!(file_name, "products.txt");
                assert_eq!(expected, ".csv");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_extension_rejected() {
        assert!(validate_import_file(&ImportFile::new("products", ""), &csv_only()).is_err());
        assert!(validate_import_file(&ImportFile::new("csv", ""), &csv_only()).is_err());
    }

    #[test]
    fn test_mime_type_follows_extension() {
        assert_eq!(ImportFile::new("a.csv", "").mime_type(), "text/csv");
        assert_eq!(ImportFile::new("a.bin", "").mime_type(), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_read_uses_file_name_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stock.csv");
        std::fs::write(&path, "sku,qty\nA1,3\n").unwrap();

        let file = ImportFile::read(&path).await.unwrap();
        assert_eq!(file.file_name, "stock.csv");
        assert_eq!(file.contents, b"sku,qty\nA1,3\n");
    }

    #[tokio::test]
    async fn test_read_missing_file_is_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ImportFile::read(&dir.path().join("gone.csv")).await.unwrap_err();
        assert!(matches!(err, TrackerError::FileRead { .. }));
    }
}
