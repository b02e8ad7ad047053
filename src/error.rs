use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while evaluating tag-and-probe efficiencies or running a
/// client sequence.
///
/// Every variant is recoverable at some granularity: fit and lookup errors are
/// absorbed per efficiency (or per slice), module errors per sequence entry.
#[derive(Debug, Error)]
pub enum TnpError {
    #[error("invalid parameter bundle: {0}")]
    Config(String),

    #[error("histogram '{name}' not found in folder '{folder}'")]
    MissingHistogram { folder: String, name: String },

    #[error("unsupported fit function '{0}'")]
    UnsupportedFitModel(String),

    #[error("fit did not converge: {reason}")]
    FitConvergence { reason: String },

    #[error("histogram shape mismatch: {0}")]
    HistogramShape(String),

    #[error("denominator yield is not positive ({yield_})")]
    DegenerateYield { yield_: f64 },

    #[error("invalid sample configuration: {0}")]
    Sample(String),

    #[error("client module '{0}' is not available in this build")]
    ModuleUnavailable(String),

    #[error("all {failed} efficiencies of client '{label}' failed")]
    ClientFailed { label: String, failed: usize },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl TnpError {
    pub fn fit(reason: impl Into<String>) -> Self {
        Self::FitConvergence {
            reason: reason.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Errors raised while loading a TOML run configuration.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("efficiency '{output}' of client '{client}' references unknown bundle '{bundle}'")]
    UnknownBundle {
        client: String,
        output: String,
        bundle: String,
    },

    #[error("client label '{0}' is declared more than once")]
    DuplicateLabel(String),

    #[error("in {location}: {source}")]
    InvalidBundle {
        location: String,
        #[source]
        source: TnpError,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Top-level error of the `tnp` binary, carrying the process exit code.
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<ConfigFileError> for AppError {
    fn from(err: ConfigFileError) -> Self {
        AppError::new(2, err.to_string())
    }
}

impl From<TnpError> for AppError {
    fn from(err: TnpError) -> Self {
        let code = match err {
            TnpError::Io { .. } => 4,
            _ => 2,
        };
        AppError::new(code, err.to_string())
    }
}
