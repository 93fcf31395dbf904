//! Static declarations emitted by `#[derive(Record)]` and by the built-in mixins.
//!
//! A [`Declaration`] is the raw, unmerged description of one type: its own options, its
//! direct parents and its fields. The registry turns it into a
//! [`RecordSchema`](crate::RecordSchema) by merging the whole ancestry.

use std::any::TypeId;
use std::fmt;

use crate::data::Data;
use crate::error::DefinitionError;
use crate::registry::{self, RecordSchema};
use crate::shape::TypeDecl;

/// Types that carry a static declaration: records and mixin markers.
pub trait Declared: 'static {
    fn declaration() -> &'static Declaration;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Record,
    /// Contributes options to its descendants but has no fields and no schema.
    Mixin,
}

/// Value of a class or field option as written in the declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<String>),
}

impl OptionValue {
    pub fn kind(&self) -> &'static str {
        match self {
            OptionValue::Bool(_) => "bool",
            OptionValue::Int(_) => "int",
            OptionValue::Str(_) => "string",
            OptionValue::List(_) => "list",
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(value) => write!(f, "{value}"),
            OptionValue::Int(value) => write!(f, "{value}"),
            OptionValue::Str(value) => write!(f, "{value:?}"),
            OptionValue::List(items) => write!(f, "{items:?}"),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Int(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Str(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Str(value)
    }
}

impl From<Vec<String>> for OptionValue {
    fn from(items: Vec<String>) -> Self {
        OptionValue::List(items)
    }
}

impl From<&[&str]> for OptionValue {
    fn from(items: &[&str]) -> Self {
        OptionValue::List(items.iter().map(|item| item.to_string()).collect())
    }
}

/// Lazy handle to a declared type.
///
/// Holds function pointers rather than the declaration itself, so a record can refer to
/// itself (or to a record that refers back to it) without recursing at construction time.
#[derive(Clone, Copy)]
pub struct RecordRef {
    type_id: fn() -> TypeId,
    declaration: fn() -> &'static Declaration,
}

impl RecordRef {
    pub fn of<T: Declared>() -> Self {
        Self {
            type_id: TypeId::of::<T>,
            declaration: T::declaration,
        }
    }

    pub fn type_id(&self) -> TypeId {
        (self.type_id)()
    }

    pub fn declaration(&self) -> &'static Declaration {
        (self.declaration)()
    }

    pub fn name(&self) -> &'static str {
        self.declaration().name
    }

    pub fn qualname(&self) -> &'static str {
        self.declaration().qualname.as_str()
    }

    /// Resolved schema of the referenced record, built on first use.
    pub fn schema(&self) -> Result<&'static RecordSchema, DefinitionError> {
        registry::schema_for(*self)
    }
}

impl PartialEq for RecordRef {
    fn eq(&self, other: &Self) -> bool {
        self.type_id() == other.type_id()
    }
}

impl Eq for RecordRef {}

impl fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordRef({})", self.name())
    }
}

/// One field as declared on a record.
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: &'static str,
    pub type_decl: fn() -> TypeDecl,
    pub default: Option<fn() -> Data>,
    pub doc: Option<&'static str>,
    pub options: Vec<(&'static str, OptionValue)>,
}

impl FieldDecl {
    pub fn new(name: &'static str, type_decl: fn() -> TypeDecl) -> Self {
        Self {
            name,
            type_decl,
            default: None,
            doc: None,
            options: Vec::new(),
        }
    }

    pub fn default_fn(mut self, default: fn() -> Data) -> Self {
        self.default = Some(default);
        self
    }

    pub fn doc(mut self, doc: &'static str) -> Self {
        self.doc = Some(doc);
        self
    }

    pub fn option(mut self, name: &'static str, value: impl Into<OptionValue>) -> Self {
        self.options.push((name, value.into()));
        self
    }
}

/// The unmerged declaration of a record or mixin.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub kind: DeclarationKind,
    pub name: &'static str,
    pub qualname: String,
    pub doc: Option<&'static str>,
    pub options: Vec<(&'static str, OptionValue)>,
    /// Direct parents, most significant first.
    pub parents: Vec<RecordRef>,
    pub fields: Vec<FieldDecl>,
}

impl Declaration {
    pub fn record(name: &'static str, qualname: impl Into<String>) -> Self {
        Self::new(DeclarationKind::Record, name, qualname.into())
    }

    pub fn mixin(name: &'static str, qualname: impl Into<String>) -> Self {
        Self::new(DeclarationKind::Mixin, name, qualname.into())
    }

    fn new(kind: DeclarationKind, name: &'static str, qualname: String) -> Self {
        Self {
            kind,
            name,
            qualname,
            doc: None,
            options: Vec::new(),
            parents: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn doc(mut self, doc: &'static str) -> Self {
        self.doc = Some(doc);
        self
    }

    pub fn option(mut self, name: &'static str, value: impl Into<OptionValue>) -> Self {
        self.options.push((name, value.into()));
        self
    }

    pub fn extends(mut self, parent: RecordRef) -> Self {
        self.parents.push(parent);
        self
    }

    pub fn field(mut self, field: FieldDecl) -> Self {
        self.fields.push(field);
        self
    }

    pub fn is_record(&self) -> bool {
        self.kind == DeclarationKind::Record
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|field| field.name == name)
    }
}
