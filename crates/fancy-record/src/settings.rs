//! Class and field settings, and the ancestry merge that produces them.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use tracing::trace;

use crate::declare::{OptionValue, RecordRef};
use crate::error::DefinitionError;

/// Where the type marker comes from when a record is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreType {
    #[default]
    Off,
    /// Bare type name, e.g. `Circle`.
    Name,
    /// Module-qualified name, e.g. `shapes::Circle`.
    Qualname,
}

/// Merged class-level options of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassSettings {
    pub suppress_defaults: bool,
    pub suppress_none: bool,
    pub store_type: StoreType,
    pub flatten: bool,
    pub allow_extra_fields: bool,
    pub validate: bool,
    pub doc: Option<String>,
    pub comment: Option<String>,
    pub help: Option<String>,
    pub exec: Option<String>,
    pub version: Option<i64>,
    pub suppress_version: bool,
    pub table: Option<String>,
}

impl Default for ClassSettings {
    fn default() -> Self {
        Self {
            suppress_defaults: true,
            suppress_none: false,
            store_type: StoreType::Off,
            flatten: false,
            allow_extra_fields: true,
            validate: true,
            doc: None,
            comment: None,
            help: None,
            exec: None,
            version: None,
            suppress_version: false,
            table: None,
        }
    }
}

/// Merged per-field options.
///
/// Tri-state flags (`Option<bool>`) fall back to the matching class setting when unset.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSettings {
    pub suppress: Option<bool>,
    pub suppress_default: Option<bool>,
    pub suppress_none: Option<bool>,
    pub alias: Option<String>,
    /// Former key, still accepted when decoding.
    pub rename: Option<String>,
    pub flatten: Option<bool>,
    pub doc: Option<String>,
    pub comment: Option<String>,
    pub help: Option<String>,
    pub args: Option<Vec<String>>,
    pub choices: Option<Vec<String>>,
    pub metavar: Option<String>,
    pub group: Option<String>,
    pub parse_exclude: bool,
    pub nargs: Option<String>,
    pub exec: bool,
    pub subprocess_exclude: bool,
    pub sql: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub nullable: Option<bool>,
}

impl Default for FieldSettings {
    fn default() -> Self {
        Self {
            suppress: None,
            suppress_default: None,
            suppress_none: None,
            alias: None,
            rename: None,
            flatten: None,
            doc: None,
            comment: None,
            help: None,
            args: None,
            choices: None,
            metavar: None,
            group: None,
            parse_exclude: false,
            nargs: None,
            exec: false,
            subprocess_exclude: false,
            sql: true,
            primary_key: false,
            unique: false,
            nullable: None,
        }
    }
}

/// Option value together with the type that set it.
#[derive(Debug, Clone)]
pub(crate) struct Inherited {
    pub value: OptionValue,
    pub origin: RecordRef,
}

pub(crate) type OptionTable = IndexMap<&'static str, Inherited>;

/// Merged options of one type and everything it inherits from.
#[derive(Debug, Clone)]
pub(crate) struct Ancestry {
    pub lineage: HashSet<TypeId>,
    pub options: OptionTable,
    pub field_options: IndexMap<&'static str, OptionTable>,
}

/// Merges the options declared across `target`'s ancestry.
///
/// An option set by a type always wins over inherited values. Among inherited values, one
/// whose origin descends from the other's origin wins; values from unrelated origins must
/// agree, otherwise the merge fails with [`DefinitionError::SettingsConflict`].
pub(crate) fn merge_ancestry(target: RecordRef) -> Result<Ancestry, DefinitionError> {
    let mut lineages = HashMap::new();
    let mut visiting = Vec::new();
    collect(target, &mut lineages, &mut visiting)
}

fn collect(
    node: RecordRef,
    lineages: &mut HashMap<TypeId, HashSet<TypeId>>,
    visiting: &mut Vec<TypeId>,
) -> Result<Ancestry, DefinitionError> {
    let decl = node.declaration();
    let id = node.type_id();
    if visiting.contains(&id) {
        return Err(DefinitionError::CyclicAncestry {
            record: decl.name.to_string(),
        });
    }

    visiting.push(id);
    let parents = decl
        .parents
        .iter()
        .map(|parent| collect(*parent, lineages, visiting))
        .collect::<Result<Vec<_>, _>>();
    visiting.pop();
    let parents = parents?;

    let mut lineage = HashSet::from([id]);
    for parent in &parents {
        lineage.extend(parent.lineage.iter().copied());
    }
    lineages.insert(id, lineage.clone());

    for parent in &decl.parents {
        let parent_decl = parent.declaration();
        if !parent_decl.is_record() {
            continue;
        }
        for field in &parent_decl.fields {
            if decl.find_field(field.name).is_none() {
                return Err(DefinitionError::InheritedFieldMissing {
                    record: decl.name.to_string(),
                    parent: parent_decl.name.to_string(),
                    field: field.name.to_string(),
                });
            }
        }
    }

    let own = own_table(node, &decl.options);
    let options = merge_tables(
        decl.name,
        None,
        &own,
        parents.iter().map(|parent| &parent.options),
        lineages,
    )?;

    let mut field_options = IndexMap::new();
    for field in &decl.fields {
        let own = own_table(node, &field.options);
        let merged = merge_tables(
            decl.name,
            Some(field.name),
            &own,
            parents
                .iter()
                .filter_map(|parent| parent.field_options.get(field.name)),
            lineages,
        )?;
        field_options.insert(field.name, merged);
    }

    trace!(
        record = decl.name,
        parents = decl.parents.len(),
        options = options.len(),
        "ancestry merged"
    );

    Ok(Ancestry {
        lineage,
        options,
        field_options,
    })
}

fn own_table(node: RecordRef, options: &[(&'static str, OptionValue)]) -> OptionTable {
    options
        .iter()
        // `store_type = "auto"` defers to the ancestry, same as leaving it unset.
        .filter(|(name, value)| !(*name == "store_type" && *value == OptionValue::Str("auto".into())))
        .map(|(name, value)| {
            (
                *name,
                Inherited {
                    value: value.clone(),
                    origin: node,
                },
            )
        })
        .collect()
}

fn merge_tables<'a>(
    record: &str,
    field: Option<&str>,
    own: &OptionTable,
    inherited: impl Iterator<Item = &'a OptionTable>,
    lineages: &HashMap<TypeId, HashSet<TypeId>>,
) -> Result<OptionTable, DefinitionError> {
    let descends = |child: RecordRef, ancestor: RecordRef| {
        lineages
            .get(&child.type_id())
            .is_some_and(|lineage| lineage.contains(&ancestor.type_id()))
    };

    let mut merged = OptionTable::new();
    for table in inherited {
        for (&name, candidate) in table {
            if own.contains_key(name) {
                continue;
            }
            let Some(current) = merged.get(name) else {
                merged.insert(name, candidate.clone());
                continue;
            };
            let current_origin = current.origin;
            let agrees = current.value == candidate.value;
            if descends(candidate.origin, current_origin) {
                merged.insert(name, candidate.clone());
            } else if !descends(current_origin, candidate.origin) && !agrees {
                let option = match field {
                    Some(field) => format!("{field}.{name}"),
                    None => name.to_string(),
                };
                return Err(DefinitionError::SettingsConflict {
                    record: record.to_string(),
                    option,
                    classes: vec![
                        current_origin.name().to_string(),
                        candidate.origin.name().to_string(),
                    ],
                });
            }
        }
    }

    for (&name, value) in own {
        merged.insert(name, value.clone());
    }
    Ok(merged)
}

struct Reader<'a> {
    record: &'a str,
    scope: &'static str,
}

impl Reader<'_> {
    fn unknown(&self, option: &str) -> DefinitionError {
        DefinitionError::UnknownOption {
            record: self.record.to_string(),
            scope: self.scope,
            option: option.to_string(),
        }
    }

    fn invalid(&self, option: &str, expected: &str, value: &OptionValue) -> DefinitionError {
        DefinitionError::InvalidOption {
            record: self.record.to_string(),
            option: option.to_string(),
            message: format!("expected {expected}, found {} {value}", value.kind()),
        }
    }

    fn bool(&self, option: &str, value: &OptionValue) -> Result<bool, DefinitionError> {
        match value {
            OptionValue::Bool(value) => Ok(*value),
            other => Err(self.invalid(option, "bool", other)),
        }
    }

    fn int(&self, option: &str, value: &OptionValue) -> Result<i64, DefinitionError> {
        match value {
            OptionValue::Int(value) => Ok(*value),
            other => Err(self.invalid(option, "int", other)),
        }
    }

    fn string(&self, option: &str, value: &OptionValue) -> Result<String, DefinitionError> {
        match value {
            OptionValue::Str(value) => Ok(value.clone()),
            other => Err(self.invalid(option, "string", other)),
        }
    }

    fn list(&self, option: &str, value: &OptionValue) -> Result<Vec<String>, DefinitionError> {
        match value {
            OptionValue::List(items) => Ok(items.clone()),
            // A single string is shorthand for a one-element list.
            OptionValue::Str(item) => Ok(vec![item.clone()]),
            other => Err(self.invalid(option, "list", other)),
        }
    }
}

impl ClassSettings {
    pub(crate) fn from_options(record: &str, options: &OptionTable) -> Result<Self, DefinitionError> {
        let reader = Reader {
            record,
            scope: "class",
        };
        let mut settings = Self::default();
        for (name, inherited) in options {
            let value = &inherited.value;
            match *name {
                "suppress_defaults" => settings.suppress_defaults = reader.bool(name, value)?,
                "suppress_none" => settings.suppress_none = reader.bool(name, value)?,
                "store_type" => {
                    settings.store_type = match reader.string(name, value)?.as_str() {
                        "off" => StoreType::Off,
                        "name" => StoreType::Name,
                        "qualname" => StoreType::Qualname,
                        other => {
                            return Err(DefinitionError::InvalidOption {
                                record: record.to_string(),
                                option: name.to_string(),
                                message: format!(
                                    "expected one of \"auto\", \"off\", \"name\", \"qualname\", found {other:?}"
                                ),
                            });
                        }
                    }
                }
                "flatten" => settings.flatten = reader.bool(name, value)?,
                "allow_extra_fields" => settings.allow_extra_fields = reader.bool(name, value)?,
                "validate" => settings.validate = reader.bool(name, value)?,
                "doc" => settings.doc = Some(reader.string(name, value)?),
                "comment" => settings.comment = Some(reader.string(name, value)?),
                "help" => settings.help = Some(reader.string(name, value)?),
                "exec" => settings.exec = Some(reader.string(name, value)?),
                "version" => settings.version = Some(reader.int(name, value)?),
                "suppress_version" => settings.suppress_version = reader.bool(name, value)?,
                "table" => settings.table = Some(reader.string(name, value)?),
                other => return Err(reader.unknown(other)),
            }
        }
        Ok(settings)
    }
}

impl FieldSettings {
    pub(crate) fn from_options(
        record: &str,
        field: &str,
        options: &OptionTable,
    ) -> Result<Self, DefinitionError> {
        let reader = Reader {
            record,
            scope: "field",
        };
        let mut settings = Self::default();
        for (name, inherited) in options {
            let value = &inherited.value;
            let option = format!("{field}.{name}");
            let option = option.as_str();
            match *name {
                "suppress" => settings.suppress = Some(reader.bool(option, value)?),
                "suppress_default" => settings.suppress_default = Some(reader.bool(option, value)?),
                "suppress_none" => settings.suppress_none = Some(reader.bool(option, value)?),
                "alias" => settings.alias = Some(reader.string(option, value)?),
                "rename" => settings.rename = Some(reader.string(option, value)?),
                "flatten" => settings.flatten = Some(reader.bool(option, value)?),
                "doc" => settings.doc = Some(reader.string(option, value)?),
                "comment" => settings.comment = Some(reader.string(option, value)?),
                "help" => settings.help = Some(reader.string(option, value)?),
                "args" => settings.args = Some(reader.list(option, value)?),
                "choices" => settings.choices = Some(reader.list(option, value)?),
                "metavar" => settings.metavar = Some(reader.string(option, value)?),
                "group" => settings.group = Some(reader.string(option, value)?),
                "parse_exclude" => settings.parse_exclude = reader.bool(option, value)?,
                "nargs" => {
                    settings.nargs = Some(match value {
                        OptionValue::Int(count) => count.to_string(),
                        other => reader.string(option, other)?,
                    })
                }
                "exec" => settings.exec = reader.bool(option, value)?,
                "subprocess_exclude" => settings.subprocess_exclude = reader.bool(option, value)?,
                "sql" => settings.sql = reader.bool(option, value)?,
                "primary_key" => settings.primary_key = reader.bool(option, value)?,
                "unique" => settings.unique = reader.bool(option, value)?,
                "nullable" => settings.nullable = Some(reader.bool(option, value)?),
                _ => return Err(reader.unknown(option)),
            }
        }
        Ok(settings)
    }
}
