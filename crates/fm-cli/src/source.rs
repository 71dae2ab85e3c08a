//! Value sources selectable from configuration.

use std::fs;
use std::path::PathBuf;

use fm_core::{ReadError, TimeSource, ValueSource, parse_reading};

use crate::config::SourceConfig;

/// Reads the first line of a file written by some other process.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ValueSource for FileSource {
    fn read(&mut self) -> Result<f64, ReadError> {
        let content = fs::read_to_string(&self.path)
            .map_err(|err| ReadError::Backend(format!("{}: {err}", self.path.display())))?;
        parse_reading(content.lines().next().unwrap_or_default())
    }
}

#[derive(Debug, Clone)]
pub enum Source {
    Time(TimeSource),
    File(FileSource),
}

impl From<&SourceConfig> for Source {
    fn from(config: &SourceConfig) -> Self {
        match config {
            SourceConfig::Time => Self::Time(TimeSource),
            SourceConfig::File { path } => Self::File(FileSource::new(path.clone())),
        }
    }
}

impl ValueSource for Source {
    fn read(&mut self) -> Result<f64, ReadError> {
        match self {
            Self::Time(source) => source.read(),
            Self::File(source) => source.read(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_source_reads_first_line() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("reading");
        fs::write(&path, "12.5\nignored\n").unwrap();

        let mut source = Source::from(&SourceConfig::File { path: path.clone() });
        assert_eq!(source.read(), Ok(12.5));

        fs::write(&path, "unavailable\n").unwrap();
        assert_eq!(source.read(), Err(ReadError::Unavailable));

        fs::write(&path, "").unwrap();
        assert_eq!(source.read(), Err(ReadError::Unavailable));
    }

    #[test]
    fn missing_file_is_a_backend_error() {
        let temp = tempfile::tempdir().unwrap();
        let mut source = FileSource::new(temp.path().join("missing"));
        assert!(matches!(source.read(), Err(ReadError::Backend(_))));
    }
}
