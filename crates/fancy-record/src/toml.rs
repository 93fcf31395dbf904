//! TOML documents on top of the mapping representation.
//!
//! Nested maps become tables, lists of maps become arrays of tables, and maps nested
//! inside arrays become inline tables. TOML has no null, so null map entries are left
//! out when writing and absent optional fields decode as null when reading.
//!
//! Field descriptions are written as comments above their keys, and the record's own
//! description heads the document.

use std::io::{Read, Write};

use toml_edit::{Array, ArrayOfTables, DocumentMut, InlineTable, Item, Table};
use tracing::trace;

use crate::convert::DecodeOptions;
use crate::error::{ConversionError, Result};
use crate::registry::{RecordSchema, TYPE_KEY};
use crate::shape::TypeShape;
use crate::value::{Mapping, Value};
use crate::Record;

/// TOML rendering and parsing for every [`Record`].
pub trait TomlRecord: Record {
    fn to_toml_document(&self) -> Result<DocumentMut> {
        let schema = Self::schema()?;
        let mut document = mapping_to_document(&self.to_mapping()?)?;
        annotate(document.as_table_mut(), schema)?;
        Ok(document)
    }

    fn to_toml_string(&self) -> Result<String> {
        let schema = Self::schema()?;
        let body = self.to_toml_document()?.to_string();
        Ok(match schema.description() {
            Some(description) => format!("{}\n{body}", comment_lines(description)),
            None => body,
        })
    }

    fn to_toml_writer<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(self.to_toml_string()?.as_bytes())?;
        Ok(())
    }

    fn from_toml_str(text: &str) -> Result<Self> {
        let mapping = document_to_mapping(&text.parse::<DocumentMut>()?);
        let options = DecodeOptions {
            missing_as_null: true,
            ..DecodeOptions::default()
        };
        Ok(Self::from_mapping_with(&mapping, options)?)
    }

    fn from_toml_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Self::from_toml_str(&text)
    }
}

impl<T: Record> TomlRecord for T {}

pub(crate) fn mapping_to_document(mapping: &Mapping) -> Result<DocumentMut, ConversionError> {
    let mut document = DocumentMut::new();
    fill_table(document.as_table_mut(), mapping)?;
    Ok(document)
}

pub(crate) fn document_to_mapping(document: &DocumentMut) -> Mapping {
    table_to_mapping(document.as_table())
}

fn fill_table(table: &mut Table, mapping: &Mapping) -> Result<(), ConversionError> {
    for (key, value) in mapping {
        let item = match value {
            Value::Null => continue,
            Value::Map(map) => {
                let mut nested = Table::new();
                fill_table(&mut nested, map)?;
                Item::Table(nested)
            }
            Value::List(items) if !items.is_empty() && items.iter().all(|item| item.as_map().is_some()) => {
                let mut tables = ArrayOfTables::new();
                for map in items.iter().filter_map(Value::as_map) {
                    let mut nested = Table::new();
                    fill_table(&mut nested, map)?;
                    tables.push(nested);
                }
                Item::ArrayOfTables(tables)
            }
            other => Item::Value(
                to_toml_value(other).map_err(|err| err.with_path_prefix(key.clone()))?,
            ),
        };
        table.insert(key, item);
    }
    Ok(())
}

fn to_toml_value(value: &Value) -> Result<toml_edit::Value, ConversionError> {
    Ok(match value {
        Value::Null => return Err(ConversionError::type_mismatch("TOML value", "null")),
        Value::Bool(value) => (*value).into(),
        Value::Int(value) => (*value).into(),
        Value::Float(value) => (*value).into(),
        Value::Str(value) => value.as_str().into(),
        Value::List(items) => {
            let mut array = Array::new();
            for (index, item) in items.iter().enumerate() {
                array.push(to_toml_value(item).map_err(|err| err.with_path_prefix(index.to_string()))?);
            }
            toml_edit::Value::Array(array)
        }
        Value::Map(map) => {
            let mut inline = InlineTable::new();
            for (key, item) in map {
                if item.is_null() {
                    continue;
                }
                inline.insert(
                    key,
                    to_toml_value(item).map_err(|err| err.with_path_prefix(key.clone()))?,
                );
            }
            toml_edit::Value::InlineTable(inline)
        }
    })
}

fn table_to_mapping(table: &Table) -> Mapping {
    table
        .iter()
        .filter_map(|(key, item)| Some((key.to_string(), item_to_value(item)?)))
        .collect()
}

fn item_to_value(item: &Item) -> Option<Value> {
    match item {
        Item::None => None,
        Item::Value(value) => Some(from_toml_value(value)),
        Item::Table(table) => Some(Value::Map(table_to_mapping(table))),
        Item::ArrayOfTables(tables) => Some(Value::List(
            tables.iter().map(|table| Value::Map(table_to_mapping(table))).collect(),
        )),
    }
}

fn from_toml_value(value: &toml_edit::Value) -> Value {
    match value {
        toml_edit::Value::String(text) => Value::Str(text.value().clone()),
        toml_edit::Value::Integer(number) => Value::Int(*number.value()),
        toml_edit::Value::Float(number) => Value::Float(*number.value()),
        toml_edit::Value::Boolean(flag) => Value::Bool(*flag.value()),
        toml_edit::Value::Datetime(datetime) => Value::Str(datetime.value().to_string()),
        toml_edit::Value::Array(array) => Value::List(array.iter().map(from_toml_value).collect()),
        toml_edit::Value::InlineTable(inline) => Value::Map(
            inline
                .iter()
                .map(|(key, value)| (key.to_string(), from_toml_value(value)))
                .collect(),
        ),
    }
}

fn comment_lines(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.trim().is_empty() {
                "#\n".to_string()
            } else {
                format!("# {line}\n")
            }
        })
        .collect()
}

/// Writes field descriptions as comments, walking nested and flattened records.
fn annotate(table: &mut Table, schema: &RecordSchema) -> Result<(), ConversionError> {
    for field in &schema.fields {
        if let Some(nested) = field.flattened() {
            annotate(table, nested.schema()?)?;
            continue;
        }

        let key = field.key();
        let Some(item) = table.get_mut(key) else {
            continue;
        };
        if let Some(description) = field.description() {
            let comment = comment_lines(description);
            match item {
                Item::Table(nested) => nested.decor_mut().set_prefix(format!("\n{comment}")),
                Item::ArrayOfTables(tables) => {
                    if let Some(first) = tables.iter_mut().next() {
                        first.decor_mut().set_prefix(format!("\n{comment}"));
                    }
                }
                _ => {
                    if let Some(mut key) = table.key_mut(key) {
                        key.leaf_decor_mut().set_prefix(comment);
                    }
                }
            }
        }

        match (field.shape.required(), table.get_mut(key)) {
            (TypeShape::Record(nested), Some(Item::Table(sub))) => annotate(sub, nested.schema()?)?,
            (TypeShape::Union(members), Some(Item::Table(sub))) => {
                if let Some(member) = union_member(members, sub)? {
                    annotate(sub, member)?;
                }
            }
            (TypeShape::Sequence(inner), Some(Item::ArrayOfTables(tables))) => {
                if let TypeShape::Record(nested) = inner.required() {
                    let nested = nested.schema()?;
                    for sub in tables.iter_mut() {
                        annotate(sub, nested)?;
                    }
                }
            }
            _ => {}
        }
    }
    trace!(record = schema.name, "toml comments written");
    Ok(())
}

fn union_member(
    members: &[crate::declare::RecordRef],
    table: &Table,
) -> Result<Option<&'static RecordSchema>, ConversionError> {
    let Some(tag) = table.get(TYPE_KEY).and_then(Item::as_str) else {
        return Ok(None);
    };
    for member in members {
        let schema = member.schema()?;
        if !schema.has_type_field() && schema.matches_tag(tag) {
            return Ok(Some(schema));
        }
    }
    Ok(None)
}
