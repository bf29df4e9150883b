use thiserror::Error;

/// Fatal configuration errors. These unwind to `main` and set a non-zero
/// exit code; nothing in the core catches them.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no configuration file found in standard locations")]
    NotFound,

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
