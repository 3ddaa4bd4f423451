/// Logger setup
///
/// Log records go to rotating files in the `logs` folder of the data
/// directory. Warnings and errors are also echoed to stderr and
/// everything to stdout.

use std::path::{Path, PathBuf};

use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming};

use crate::error::Result;
use crate::state::SqliteSettings;

const MAX_LOG_SIZE: u64 = 1024 * 1024;
const KEEP_LOG_FILES: usize = 5;

/// Where log files are written by default
pub fn default_log_dir() -> PathBuf {
    SqliteSettings::data_dir().join("logs")
}

/// Start logging with a level string such as `"info"` or `"astro_viewer=debug"`
///
/// The returned handle must be kept alive for as long as logging is needed.
pub fn setup_logging(level: &str, directory: &Path) -> Result<LoggerHandle> {
    let handle = Logger::try_with_str(level)?
        .log_to_file(
            FileSpec::default()
                .directory(directory)
                .basename("astro-viewer"),
        )
        .duplicate_to_stderr(Duplicate::Warn)
        .duplicate_to_stdout(Duplicate::All)
        .rotate(
            Criterion::Size(MAX_LOG_SIZE),
            Naming::Timestamps,
            Cleanup::KeepLogFiles(KEEP_LOG_FILES),
        )
        .start()?;

    log::info!("Logging to {}", directory.display());
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_malformed_level() {
        let dir = tempfile::tempdir().unwrap();
        assert!(setup_logging("astro_viewer=loud", dir.path()).is_err());
    }

    #[test]
    fn test_log_dir_is_under_data_dir() {
        assert!(default_log_dir().ends_with("logs"));
        assert!(default_log_dir().starts_with(SqliteSettings::data_dir()));
    }
}
