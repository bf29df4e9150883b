mod annotations;
mod error;
mod loader;
mod types;
mod validator;

pub use annotations::{parse_cpu_quantity, PodAnnotations, WorkloadType};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use types::{LoggingConfig, MbcasConfig};
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
