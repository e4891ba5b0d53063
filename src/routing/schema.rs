//! JSON Schema gate for camera input and scene output
//!
//! Schemas are compiled once at startup. A schema that cannot be loaded
//! disables validation for its direction instead of stopping the service.

use jsonschema::Validator;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Schema applied to inbound camera messages
pub const CAMERA_SCHEMA_FILE: &str = "camera-data.schema.json";

/// Schema applied to outbound scene messages
pub const SCENE_SCHEMA_FILE: &str = "scene-data.schema.json";

/// Directory searched for schema files when none is configured
pub const DEFAULT_SCHEMA_DIR: &str = "/scenescape/schema";

/// Errors raised while loading a schema file
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Failed to read schema file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse schema file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid JSON schema: {0}")]
    Compile(String),
}

/// One failed schema constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// JSON pointer into the validated document
    pub instance_path: String,
    /// JSON pointer into the schema
    pub schema_path: String,
    /// Violated keyword, e.g. `required` or `type`
    pub keyword: String,
    pub message: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "At '{}': {} (schema '{}', keyword {})",
            self.instance_path, self.message, self.schema_path, self.keyword
        )
    }
}

/// Compiled JSON schema
pub struct SchemaValidator {
    validator: Validator,
}

impl fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaValidator").finish_non_exhaustive()
    }
}

impl SchemaValidator {
    /// Read and compile a schema file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SchemaError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let schema: Value = serde_json::from_str(&content).map_err(|source| SchemaError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let validator = Self::from_value(&schema)?;
        debug!(path = %path.display(), "Loaded JSON schema");
        Ok(validator)
    }

    /// Like [`SchemaValidator::load`], but logs the failure and returns `None`
    pub fn load_optional(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(validator) => Some(validator),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Schema unavailable, validation disabled");
                None
            }
        }
    }

    /// Compile an in-memory schema document
    pub fn from_value(schema: &Value) -> Result<Self, SchemaError> {
        let validator = jsonschema::validator_for(schema)
            .map_err(|e| SchemaError::Compile(format!("Schema compilation error: {e}")))?;
        Ok(Self { validator })
    }

    /// Check a document, logging every violation on failure
    pub fn validate(&self, instance: &Value) -> bool {
        if self.validator.is_valid(instance) {
            return true;
        }

        for violation in self.violations(instance) {
            warn!(
                instance_path = %violation.instance_path,
                schema_path = %violation.schema_path,
                keyword = %violation.keyword,
                "Schema validation failed: {}",
                violation.message
            );
        }
        false
    }

    /// All violations of this schema by `instance`; empty when valid
    pub fn violations(&self, instance: &Value) -> Vec<SchemaViolation> {
        let Err(errors) = self.validator.validate(instance) else {
            return Vec::new();
        };

        errors
            .map(|e| {
                let schema_path = e.schema_path.to_string();
                let keyword = schema_path
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                SchemaViolation {
                    instance_path: e.instance_path.to_string(),
                    schema_path,
                    keyword,
                    message: e.to_string(),
                }
            })
            .collect()
    }
}
