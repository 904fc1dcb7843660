//! Zip archiving of workflow artifact directories.
//!
//! Used by the download endpoint: the report directory is walked
//! recursively and deflated into an in-memory zip. Archives are small
//! (markdown artifacts), so buffering the whole zip is fine; callers run
//! this on the blocking pool.

use std::io::{Cursor, Read, Write};
use std::path::Path;

use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("report directory not found")]
    NotFound,

    #[error("archive error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ArchiveError {
    fn from(err: std::io::Error) -> Self {
        ArchiveError::Io(err.to_string())
    }
}

impl From<zip::result::ZipError> for ArchiveError {
    fn from(err: zip::result::ZipError) -> Self {
        ArchiveError::Io(err.to_string())
    }
}

/// Zip the contents of `dir` (recursively), entries named relative to it.
pub fn zip_directory(dir: &Path) -> Result<Vec<u8>, ArchiveError> {
    if !dir.is_dir() {
        return Err(ArchiveError::NotFound);
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let mut entries: Vec<_> =
            std::fs::read_dir(&current)?.collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| e.path());
        for entry in entries {
            let path = entry.path();
            let name = path
                .strip_prefix(dir)
                .map_err(|_| ArchiveError::Io("entry outside archive root".to_string()))?
                .to_string_lossy()
                .into_owned();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                writer.add_directory(name, options)?;
                pending.push(path);
            } else if file_type.is_file() {
                writer.start_file(name, options)?;
                let mut file = std::fs::File::open(&path)?;
                let mut buf = Vec::new();
                file.read_to_end(&mut buf)?;
                writer.write_all(&buf)?;
            }
            // Symlinks are skipped: artifacts are plain files.
        }
    }

    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zips_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("plan")).unwrap();
        std::fs::write(dir.path().join("plan/final.md"), "# plan").unwrap();
        std::fs::write(dir.path().join("summary.md"), "done").unwrap();

        let bytes = zip_directory(dir.path()).unwrap();
        // Zip local file header magic.
        assert_eq!(&bytes[..4], b"PK\x03\x04");

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.iter().any(|n| n == "summary.md"));
        assert!(names.iter().any(|n| n == "plan/final.md"));
    }

    #[test]
    fn missing_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = zip_directory(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, ArchiveError::NotFound));
    }
}
