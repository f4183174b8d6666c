//! Error types
//!
//! Stale input is the one expected, recoverable failure of the filter and is reported as
//! [FilterError::StaleSample] / [FilterError::StaleObservation] with the filter state left
//! untouched. Configuration and replay I/O failures belong to the loaders that surround the
//! filter and have their own enums.
use std::io;

use thiserror::Error;

/// Failures reported by [crate::kalman::ErrorStateKalmanFilter].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FilterError {
    /// `update` or `correct` was called before `init`
    #[error("filter has not been initialized")]
    NotInitialized,
    /// The inertial sample is not strictly newer than the filter clock
    #[error(
        "inertial sample at {sample_time:.6} s is not newer than the filter clock at {filter_time:.6} s"
    )]
    StaleSample { sample_time: f64, filter_time: f64 },
    /// The observation is not strictly newer than the filter clock
    #[error(
        "observation at {observation_time:.6} s is not newer than the filter clock at {filter_time:.6} s"
    )]
    StaleObservation {
        observation_time: f64,
        filter_time: f64,
    },
    /// The innovation covariance could not be safely factorised; the correction was dropped
    #[error("correction rejected: {0}")]
    IllConditioned(#[from] LinalgError),
}

/// Reasons a matrix was refused by [crate::linalg::conditioned_spd_solve].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinalgError {
    #[error("matrix contains NaN or infinite entries")]
    NonFinite,
    #[error("matrix is not positive definite (smallest eigenvalue {min_eigenvalue:e})")]
    NotPositiveDefinite { min_eigenvalue: f64 },
    #[error("condition number {condition_number:e} exceeds the limit {limit:e}")]
    IllConditioned { condition_number: f64, limit: f64 },
    #[error("Cholesky factorization failed")]
    FactorizationFailed,
}

/// Failures while loading, saving or validating a [crate::config::FilterConfig].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("TOML: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error("TOML: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("unsupported configuration file extension: {0:?}")]
    UnsupportedExtension(Option<String>),
    #[error("invalid value for `{key}`: {value}")]
    InvalidValue { key: &'static str, value: f64 },
}

/// Failures while replaying recorded logs.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("no inertial samples to initialize the filter from")]
    NoInertialData,
}
