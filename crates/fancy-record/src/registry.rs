//! Process-wide cache of resolved record schemas.
//!
//! Schemas are built on first use, leaked, and never mutated afterwards. The lock is only
//! held to look up or publish a finished entry, never while a schema is being built, so
//! building one schema may freely resolve others.

use std::any::TypeId;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::{LazyLock, PoisonError, RwLock};

use tracing::{debug, trace};

use crate::data::Data;
use crate::declare::RecordRef;
use crate::error::DefinitionError;
use crate::settings::{self, ClassSettings, FieldSettings, StoreType};
use crate::shape::{self, TypeShape};

pub(crate) const TYPE_KEY: &str = "type";
pub(crate) const VERSION_KEY: &str = "version";

type Entry = Result<&'static RecordSchema, DefinitionError>;

static SCHEMAS: LazyLock<RwLock<HashMap<TypeId, Entry>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

thread_local! {
    static RESOLVING: RefCell<Vec<TypeId>> = const { RefCell::new(Vec::new()) };
}

/// Fully resolved description of a record type.
#[derive(Debug)]
pub struct RecordSchema {
    pub record: RecordRef,
    pub name: &'static str,
    pub qualname: &'static str,
    pub doc: Option<&'static str>,
    pub settings: ClassSettings,
    pub fields: Vec<FieldSpec>,
    keys: Vec<String>,
}

/// One resolved field of a record.
#[derive(Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub shape: TypeShape,
    pub default: Option<fn() -> Data>,
    pub doc: Option<&'static str>,
    pub settings: FieldSettings,
    /// Whether the nested record's keys are merged into the parent mapping.
    pub flatten: bool,
}

impl FieldSpec {
    /// Mapping key for the field: its alias, or its name.
    pub fn key(&self) -> &str {
        self.settings.alias.as_deref().unwrap_or(self.name)
    }

    pub fn default_data(&self) -> Option<Data> {
        self.default.map(|default| default())
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Human-readable description: an explicit comment, else the doc option, else the doc comment.
    pub fn description(&self) -> Option<&str> {
        self.settings
            .comment
            .as_deref()
            .or(self.settings.doc.as_deref())
            .or(self.doc)
    }

    /// Nested record merged into the parent mapping, if the field is flattened.
    pub fn flattened(&self) -> Option<RecordRef> {
        if self.flatten {
            self.shape.as_record()
        } else {
            None
        }
    }
}

impl RecordSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Every key this record may occupy in a mapping, with flattened fields expanded.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Value stored under `"type"` when encoding, if any.
    pub fn type_marker(&self) -> Option<&'static str> {
        match self.settings.store_type {
            StoreType::Off => None,
            StoreType::Name => Some(self.name),
            StoreType::Qualname => Some(self.qualname),
        }
    }

    /// Whether `tag` names this record, by bare or qualified name.
    pub fn matches_tag(&self, tag: &str) -> bool {
        tag == self.name || tag == self.qualname
    }

    /// Whether one of the record's own fields is keyed `"type"`, shadowing the marker.
    pub(crate) fn has_type_field(&self) -> bool {
        self.fields
            .iter()
            .any(|field| field.flattened().is_none() && field.key() == TYPE_KEY)
    }

    pub(crate) fn emits_version(&self) -> Option<i64> {
        if self.settings.suppress_version {
            None
        } else {
            self.settings.version
        }
    }

    /// Class description: the comment option, else the doc option, else the doc comment.
    pub fn description(&self) -> Option<&str> {
        self.settings
            .comment
            .as_deref()
            .or(self.settings.doc.as_deref())
            .or(self.doc)
    }
}

/// Looks up or builds the schema of `T`.
pub fn schema_of<T: crate::Record>() -> Result<&'static RecordSchema, DefinitionError> {
    schema_for(RecordRef::of::<T>())
}

pub(crate) fn schema_for(record: RecordRef) -> Result<&'static RecordSchema, DefinitionError> {
    let id = record.type_id();
    if let Some(entry) = SCHEMAS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
    {
        return entry.clone();
    }

    let reentrant = RESOLVING.with(|stack| {
        let mut stack = stack.borrow_mut();
        if stack.contains(&id) {
            true
        } else {
            stack.push(id);
            false
        }
    });
    if reentrant {
        // Only flattening resolves nested schemas eagerly, so re-entry means a flatten cycle.
        return Err(DefinitionError::Flatten {
            record: record.name().to_string(),
            field: record.name().to_string(),
            message: "record is flattened into itself".to_string(),
        });
    }

    let built = build(record);
    RESOLVING.with(|stack| {
        stack.borrow_mut().retain(|entry| *entry != id);
    });

    let entry = built.map(|schema| &*Box::leak(Box::new(schema)));
    if let Err(err) = &entry {
        debug!(record = record.name(), error = %err, "record definition rejected");
    }

    let mut schemas = SCHEMAS.write().unwrap_or_else(PoisonError::into_inner);
    schemas.entry(id).or_insert(entry).clone()
}

#[tracing::instrument(
    level = "debug",
    name = "fancy_record.registry.build",
    skip(record),
    fields(record = record.name())
)]
fn build(record: RecordRef) -> Result<RecordSchema, DefinitionError> {
    let decl = record.declaration();
    if !decl.is_record() {
        return Err(DefinitionError::NotARecord {
            name: decl.name.to_string(),
        });
    }

    let ancestry = settings::merge_ancestry(record)?;
    let class = ClassSettings::from_options(decl.name, &ancestry.options)?;

    let mut fields = Vec::with_capacity(decl.fields.len());
    for field in &decl.fields {
        let options = ancestry
            .field_options
            .get(field.name)
            .cloned()
            .unwrap_or_default();
        let field_settings = FieldSettings::from_options(decl.name, field.name, &options)?;
        let shape = shape::resolve(&(field.type_decl)(), decl.name, field.name)?;
        let flatten = resolve_flatten(decl.name, field.name, &shape, &class, &field_settings)?;
        fields.push(FieldSpec {
            name: field.name,
            shape,
            default: field.default,
            doc: field.doc,
            settings: field_settings,
            flatten,
        });
    }

    let mut schema = RecordSchema {
        record,
        name: decl.name,
        qualname: decl.qualname.as_str(),
        doc: decl.doc,
        settings: class,
        fields,
        keys: Vec::new(),
    };
    schema.keys = collect_keys(&schema)?;
    check_exec(&schema)?;

    trace!(
        record = schema.name,
        fields = schema.fields.len(),
        keys = schema.keys.len(),
        "record schema resolved"
    );
    Ok(schema)
}

fn resolve_flatten(
    record: &str,
    field: &str,
    shape: &TypeShape,
    class: &ClassSettings,
    settings: &FieldSettings,
) -> Result<bool, DefinitionError> {
    let is_record = shape.as_record().is_some();
    match settings.flatten {
        Some(true) if !is_record => Err(DefinitionError::Flatten {
            record: record.to_string(),
            field: field.to_string(),
            message: format!("only record fields can be flattened, found {}", shape.describe()),
        }),
        Some(flatten) => Ok(flatten),
        None => Ok(class.flatten && is_record),
    }
}

fn collect_keys(schema: &RecordSchema) -> Result<Vec<String>, DefinitionError> {
    let mut keys = Vec::new();
    let mut seen = HashSet::new();
    let mut claim = |key: String, keys: &mut Vec<String>| {
        if !seen.insert(key.clone()) {
            return Err(DefinitionError::DuplicateKey {
                record: schema.name.to_string(),
                key,
            });
        }
        keys.push(key);
        Ok(())
    };

    if schema.type_marker().is_some() {
        claim(TYPE_KEY.to_string(), &mut keys)?;
    }
    if schema.emits_version().is_some() {
        claim(VERSION_KEY.to_string(), &mut keys)?;
    }

    for field in &schema.fields {
        let Some(nested) = field.flattened() else {
            let key = field.key().to_string();
            if (schema.type_marker().is_some() && key == TYPE_KEY)
                || (schema.settings.version.is_some() && key == VERSION_KEY)
            {
                return Err(DefinitionError::ReservedKey {
                    record: schema.name.to_string(),
                    key,
                });
            }
            claim(key, &mut keys)?;
            continue;
        };

        let nested_schema = nested.schema()?;
        if nested_schema.type_marker().is_some() {
            return Err(DefinitionError::Flatten {
                record: schema.name.to_string(),
                field: field.name.to_string(),
                message: format!(
                    "`{}` stores a `type` marker, which would collide in the parent mapping",
                    nested_schema.name
                ),
            });
        }
        for key in nested_schema.keys() {
            claim(key.clone(), &mut keys)?;
        }
    }

    Ok(keys)
}

fn check_exec(schema: &RecordSchema) -> Result<(), DefinitionError> {
    let mut exec_field: Option<&str> = None;
    for field in schema.fields.iter().filter(|field| field.settings.exec) {
        let message = if let Some(exec) = &schema.settings.exec {
            format!(
                "field `{}` cannot be the executable; the class already sets `exec = {exec:?}`",
                field.name
            )
        } else if let Some(previous) = exec_field {
            format!(
                "fields `{previous}` and `{}` are both marked as the executable",
                field.name
            )
        } else {
            exec_field = Some(field.name);
            continue;
        };
        return Err(DefinitionError::Subprocess {
            record: schema.name.to_string(),
            message,
        });
    }
    Ok(())
}
