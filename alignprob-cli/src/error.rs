//! Error handling for the alignprob CLI

use thiserror::Error;
use std::path::PathBuf;

use alignprob_core::LoadError;

/// Main error type for alignprob CLI operations
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Input/Output error: {message}")]
    Io { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid input at line {line}: {message}")]
    InvalidInput { line: usize, message: String },

    #[error("Calibration error: {0}")]
    Calibration(#[from] LoadError),
}

impl CliError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io { message: message.into() }
    }

    pub fn file_not_found(path: PathBuf) -> Self {
        Self::FileNotFound { path }
    }

    pub fn invalid_input<S: Into<String>>(line: usize, message: S) -> Self {
        Self::InvalidInput { line, message: message.into() }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Provide helpful error messages and suggestions
pub fn format_error_with_suggestions(error: &CliError) -> String {
    let mut message = error.to_string();

    match error {
        CliError::FileNotFound { path } => {
            message.push_str(&format!(
                "\n\nSuggestions:\n\
                 • Check that the file path is correct: {}\n\
                 • Ensure you have read permissions for the file",
                path.display()
            ));
        }

        CliError::Calibration(LoadError::NotFound { path }) => {
            message.push_str(&format!(
                "\n\nSuggestions:\n\
                 • Check the calibration table path: {}\n\
                 • Set model.table in alignprob.toml or pass --table",
                path.display()
            ));
        }

        CliError::Calibration(LoadError::MalformedRow { .. })
        | CliError::Calibration(LoadError::UnsupportedVersion(_)) => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Rows need six tab-separated columns: aligned_length weight true_size true_prob invalid_size invalid_prob\n\
                 • Weights must lie in [0, 1], sizes must be positive, probabilities in (0, 1]\n\
                 • Run 'alignprob inspect --table <file>' to validate a table"
            );
        }

        CliError::InvalidInput { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Input rows need three tab-separated columns: read_id aligned_length score\n\
                 • Lines starting with '#' are ignored"
            );
        }

        CliError::Config { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Check your alignprob.toml configuration file\n\
                 • Use 'alignprob config' to print a sample configuration"
            );
        }

        _ => {}
    }

    message
}
