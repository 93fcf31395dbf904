//! fancy-record - settings-driven conversions for plain record types
//!
//! Deriving [`Record`] on a struct gives it a mapping representation whose shape is
//! controlled by class and field options. Options are inherited through `extends(...)`
//! and merged across the whole ancestry when the type is first used. On top of the
//! mapping sit JSON and TOML text, a derived command-line parser, SQL table rows,
//! subprocess argument lists and process-wide configuration.
//!
//! # Usage
//!
//! ```ignore
//! use fancy_record::{JsonRecord, Record};
//!
//! /// A person.
//! #[derive(Debug, PartialEq, Record)]
//! struct Person {
//!     name: String,
//!     #[record(default = 0)]
//!     age: u32,
//!     #[record(default, alias = "interests")]
//!     hobbies: Vec<String>,
//! }
//!
//! let person = Person { name: "John".into(), age: 47, hobbies: vec!["reading".into()] };
//! let text = person.to_json_string()?;
//! assert_eq!(Person::from_json_str(&text)?, person);
//! ```

extern crate self as fancy_record;

pub mod cli;
pub mod config;
mod convert;
mod data;
mod declare;
mod error;
pub mod json;
mod mixins;
mod registry;
mod settings;
mod shape;
pub mod sql;
pub mod subprocess;
pub mod telemetry;
pub mod toml;
mod value;

pub use cli::{CliApp, CliRecord};
pub use config::{Config, ConfigGuard, FileConfig, MappingConfig};
pub use convert::{DecodeOptions, EncodeOptions, from_value, to_value};
pub use data::{Data, FieldType, MapKey, RecordData};
pub use declare::{Declaration, DeclarationKind, Declared, FieldDecl, OptionValue, RecordRef};
pub use error::{ConversionError, DefinitionError, Error, Result};
pub use json::JsonRecord;
pub use mixins::{ConfigBase, JsonBase, TomlBase};
pub use registry::{FieldSpec, RecordSchema, schema_of};
pub use settings::{ClassSettings, FieldSettings, StoreType};
pub use shape::{Primitive, TypeDecl, TypeShape, resolve as resolve_shape};
pub use sql::{Column, Row, SqlRecord, SqlType, TableSchema};
pub use subprocess::SubprocessRecord;
pub use toml::TomlRecord;
pub use value::{Mapping, Value};

// Re-export the derive macros
#[cfg(feature = "derive")]
pub use fancy_record_derive::{Record, Union};

/// A declared record type with a mapping representation.
///
/// Implemented by `#[derive(Record)]`; every method has a default built on the type's
/// [`RecordSchema`].
pub trait Record: Declared + FieldType {
    /// The merged schema, built on first use and cached for the life of the process.
    fn schema() -> std::result::Result<&'static RecordSchema, DefinitionError> {
        registry::schema_of::<Self>()
    }

    /// Converts the record into a mapping, leaving out suppressed, defaulted and (when
    /// configured) null fields.
    fn to_mapping(&self) -> std::result::Result<Mapping, ConversionError> {
        self.to_mapping_with(EncodeOptions::default())
    }

    fn to_mapping_with(
        &self,
        options: EncodeOptions,
    ) -> std::result::Result<Mapping, ConversionError> {
        let schema = Self::schema()?;
        let record = self.to_data().into_record(schema.record)?;
        convert::encode_record(schema, record, options)
    }

    /// Builds a record from a mapping, filling absent fields from their defaults.
    fn from_mapping(mapping: &Mapping) -> std::result::Result<Self, ConversionError> {
        Self::from_mapping_with(mapping, DecodeOptions::default())
    }

    fn from_mapping_with(
        mapping: &Mapping,
        options: DecodeOptions,
    ) -> std::result::Result<Self, ConversionError> {
        let schema = Self::schema()?;
        let data = convert::decode_record(schema, mapping, &options)?;
        Self::from_data(data)
    }
}
