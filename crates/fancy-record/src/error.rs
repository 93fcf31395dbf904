use std::path::PathBuf;

use thiserror::Error;

/// A record type whose declared options or fields cannot be resolved.
///
/// Raised once, when the record's schema is first built. The failure is cached with the
/// schema and every later use of the type reports the same error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// Two unrelated ancestors set different values for the same option and the record
    /// itself does not settle it.
    #[error(
        "conflicting values for option `{option}` inherited by `{record}` from {}; hint: set `{option}` on `{record}` explicitly",
        .classes.join(" and ")
    )]
    SettingsConflict {
        record: String,
        option: String,
        classes: Vec<String>,
    },

    #[error("unknown {scope} option `{option}` on `{record}`")]
    UnknownOption {
        record: String,
        scope: &'static str,
        option: String,
    },

    #[error("invalid value for option `{option}` on `{record}`: {message}")]
    InvalidOption {
        record: String,
        option: String,
        message: String,
    },

    #[error("`{record}` must declare field `{field}` inherited from `{parent}`")]
    InheritedFieldMissing {
        record: String,
        parent: String,
        field: String,
    },

    #[error("`{record}` appears in its own ancestry")]
    CyclicAncestry { record: String },

    #[error("duplicate field name or alias `{key}` in `{record}`")]
    DuplicateKey { record: String, key: String },

    #[error("`{key}` is a reserved key for `{record}` and cannot be used as a field")]
    ReservedKey { record: String, key: String },

    #[error("cannot flatten field `{field}` of `{record}`: {message}")]
    Flatten {
        record: String,
        field: String,
        message: String,
    },

    #[error("unsupported type for field `{field}` of `{record}`: {message}")]
    UnsupportedType {
        record: String,
        field: String,
        message: String,
    },

    #[error("invalid union `{union}`: {message}")]
    InvalidUnion { union: String, message: String },

    #[error("`{name}` is a mixin and has no record schema")]
    NotARecord { name: String },

    #[error("cannot derive a command-line argument for field `{field}` of `{record}`: {message}")]
    Cli {
        record: String,
        field: String,
        message: String,
    },

    #[error("invalid table for `{record}`: {message}")]
    Sql { record: String, message: String },

    #[error("invalid subprocess settings for `{record}`: {message}")]
    Subprocess { record: String, message: String },
}

/// Failure while converting between a record instance and its mapping.
///
/// Every variant except [`ConversionError::Definition`] carries the key path at which the
/// problem was found, outermost key first.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("missing required field `{field}`{} at {}", alias_note(.alias), path_string(.path))]
    MissingField {
        path: Vec<String>,
        field: String,
        alias: Option<String>,
    },

    #[error("expected {expected}, found {found} at {}", path_string(.path))]
    TypeMismatch {
        path: Vec<String>,
        expected: String,
        found: String,
    },

    #[error(
        "ambiguous value at {}: matches {}; hint: add a `type` key naming the variant",
        path_string(.path),
        .candidates.join(", ")
    )]
    AmbiguousType {
        path: Vec<String>,
        candidates: Vec<String>,
    },

    #[error("unknown keys for `{record}` at {}: {}", path_string(.path), .keys.join(", "))]
    UnknownKey {
        path: Vec<String>,
        record: String,
        keys: Vec<String>,
    },

    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

impl ConversionError {
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            path: Vec::new(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Prepends a key to the error's path as the error bubbles out of a nested value.
    pub fn with_path_prefix(mut self, segment: impl Into<String>) -> Self {
        if let Some(path) = self.path_mut() {
            path.insert(0, segment.into());
        }
        self
    }

    pub fn path(&self) -> &[String] {
        match self {
            Self::MissingField { path, .. }
            | Self::TypeMismatch { path, .. }
            | Self::AmbiguousType { path, .. }
            | Self::UnknownKey { path, .. } => path,
            Self::Definition(_) => &[],
        }
    }

    fn path_mut(&mut self) -> Option<&mut Vec<String>> {
        match self {
            Self::MissingField { path, .. }
            | Self::TypeMismatch { path, .. }
            | Self::AmbiguousType { path, .. }
            | Self::UnknownKey { path, .. } => Some(path),
            Self::Definition(_) => None,
        }
    }
}

fn path_string(path: &[String]) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.join(".")
    }
}

fn alias_note(alias: &Option<String>) -> String {
    alias
        .as_ref()
        .map(|alias| format!(" (alias `{alias}`)"))
        .unwrap_or_default()
}

/// Errors surfaced by the text, file, command-line and process adapters.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml_edit::TomlError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Cli(#[from] clap::Error),

    #[error("cannot load configuration from `{}`: {message}", .path.display())]
    ConfigFormat { path: PathBuf, message: String },

    #[error("subprocess error: {0}")]
    Subprocess(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_prefix_builds_outermost_first() {
        let err = ConversionError::type_mismatch("int", "string")
            .with_path_prefix("age")
            .with_path_prefix("person");
        assert_eq!(err.path(), ["person".to_string(), "age".to_string()]);
        assert_eq!(err.to_string(), "expected int, found string at person.age");
    }

    #[test]
    fn missing_field_mentions_alias() {
        let err = ConversionError::MissingField {
            path: Vec::new(),
            field: "x".into(),
            alias: Some("y".into()),
        };
        assert_eq!(
            err.to_string(),
            "missing required field `x` (alias `y`) at <root>"
        );
    }
}
