//! Table definitions and flat rows for records.
//!
//! Only the table layout and the row conversion live here; executing statements is left
//! to whichever database driver the caller uses.

use std::collections::HashSet;

use convert_case::{Case, Casing};
use indexmap::IndexMap;
use tracing::trace;

use crate::convert::{DecodeOptions, EncodeOptions, encode_data};
use crate::data::{Data, RecordData};
use crate::error::{ConversionError, DefinitionError, Result};
use crate::registry::{FieldSpec, RecordSchema};
use crate::shape::{Primitive, TypeShape};
use crate::value::{Mapping, Value};
use crate::Record;

/// Name of the surrogate key added when no field is a primary key.
pub const ROW_ID: &str = "_id";

/// One table row, keyed by column name.
pub type Row = IndexMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Boolean,
    Integer,
    Real,
    Text,
    /// Lists, maps and untyped values, stored as JSON text.
    Json,
}

impl SqlType {
    pub fn sql_name(self) -> &'static str {
        match self {
            SqlType::Boolean => "BOOLEAN",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Text | SqlType::Json => "TEXT",
        }
    }

    fn of(shape: &TypeShape) -> Self {
        match shape.required() {
            TypeShape::Primitive(Primitive::Bool) => SqlType::Boolean,
            TypeShape::Primitive(Primitive::Int) => SqlType::Integer,
            TypeShape::Primitive(Primitive::Float) => SqlType::Real,
            TypeShape::Primitive(Primitive::Str) => SqlType::Text,
            _ => SqlType::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub primary_key: bool,
    pub autoincrement: bool,
    pub unique: bool,
    /// Literal rendered as the column's `DEFAULT`, already in column form.
    pub default: Option<Value>,
}

impl Column {
    fn row_id() -> Self {
        Self {
            name: ROW_ID.to_string(),
            sql_type: SqlType::Integer,
            nullable: false,
            primary_key: true,
            autoincrement: true,
            unique: false,
            default: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for the table.
    pub fn create_table_sql(&self) -> String {
        let keys: Vec<&Column> = self.columns.iter().filter(|column| column.primary_key).collect();
        let composite = keys.len() > 1;

        let mut lines: Vec<String> = self
            .columns
            .iter()
            .map(|column| {
                let mut line = format!("{} {}", quote_ident(&column.name), column.sql_type.sql_name());
                if column.primary_key && !composite {
                    line.push_str(" PRIMARY KEY");
                    if column.autoincrement {
                        line.push_str(" AUTOINCREMENT");
                    }
                } else if !column.nullable {
                    line.push_str(" NOT NULL");
                }
                if column.unique {
                    line.push_str(" UNIQUE");
                }
                if let Some(default) = &column.default {
                    line.push_str(" DEFAULT ");
                    line.push_str(&sql_literal(default));
                }
                line
            })
            .collect();
        if composite {
            let names: Vec<String> = keys.iter().map(|column| quote_ident(&column.name)).collect();
            lines.push(format!("PRIMARY KEY ({})", names.join(", ")));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            quote_ident(&self.name),
            lines.join(",\n    ")
        )
    }

    /// Parameterized `INSERT` for every column except an autoincrement key.
    pub fn insert_sql(&self) -> String {
        let names: Vec<String> = self
            .columns
            .iter()
            .filter(|column| !column.autoincrement)
            .map(|column| quote_ident(&column.name))
            .collect();
        let params = vec!["?"; names.len()];
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&self.name),
            names.join(", "),
            params.join(", ")
        )
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(number) => number.to_string(),
        Value::Float(number) => number.to_string(),
        Value::Str(text) => format!("'{}'", text.replace('\'', "''")),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

/// Table layout and row conversion for every [`Record`].
///
/// Nested record fields are spread into their own columns; every other non-scalar is
/// stored as JSON text.
pub trait SqlRecord: Record {
    fn table_schema() -> Result<TableSchema> {
        Ok(table_schema_of(Self::schema()?)?)
    }

    fn create_table_sql() -> Result<String> {
        Ok(Self::table_schema()?.create_table_sql())
    }

    /// Column values of this instance. The surrogate `_id` column is not included.
    ///
    /// Fails with the same definition error as [`SqlRecord::table_schema`] when the
    /// record has no valid table layout.
    fn to_row(&self) -> Result<Row> {
        Self::table_schema()?;
        let schema = Self::schema()?;
        let record = self.to_data().into_record(schema.record)?;
        let mut row = Row::new();
        fill_row(schema, record, &mut row)?;
        Ok(row)
    }

    fn from_row(row: &Row) -> Result<Self> {
        let schema = Self::schema()?;
        let mut mapping = Mapping::new();
        read_row(schema, row, &mut mapping)?;
        let options = DecodeOptions {
            missing_as_null: true,
            ..DecodeOptions::default()
        };
        Ok(Self::from_mapping_with(&mapping, options)?)
    }
}

impl<T: Record> SqlRecord for T {}

fn sql_error(schema: &RecordSchema, message: impl Into<String>) -> DefinitionError {
    DefinitionError::Sql {
        record: schema.name.to_string(),
        message: message.into(),
    }
}

fn table_schema_of(schema: &RecordSchema) -> Result<TableSchema, DefinitionError> {
    let mut columns = Vec::new();
    collect_columns(schema, schema, &mut columns)?;

    let mut seen = HashSet::new();
    for column in &columns {
        if !seen.insert(column.name.as_str()) {
            return Err(sql_error(schema, format!("duplicate column `{}`", column.name)));
        }
    }

    if !columns.iter().any(|column| column.primary_key) {
        if seen.contains(ROW_ID) {
            return Err(sql_error(
                schema,
                format!("column `{ROW_ID}` is reserved for the generated primary key"),
            ));
        }
        columns.insert(0, Column::row_id());
    }

    let name = schema
        .settings
        .table
        .clone()
        .unwrap_or_else(|| schema.name.to_case(Case::Snake));
    trace!(record = schema.name, table = %name, columns = columns.len(), "table schema derived");
    Ok(TableSchema { name, columns })
}

fn collect_columns(
    root: &RecordSchema,
    schema: &RecordSchema,
    columns: &mut Vec<Column>,
) -> Result<(), DefinitionError> {
    for field in schema.fields.iter().filter(|field| field.settings.sql) {
        match (&field.shape, field.shape.required()) {
            (TypeShape::Record(nested), _) => {
                collect_columns(root, nested.schema()?, columns)?;
                continue;
            }
            (TypeShape::Optional(_), TypeShape::Record(nested)) => {
                return Err(sql_error(
                    root,
                    format!(
                        "optional record `{}` in field `{}` cannot be spread into columns",
                        nested.name(),
                        field.name
                    ),
                ));
            }
            _ => {}
        }

        let sql_type = SqlType::of(&field.shape);
        let default = match field.default_data() {
            Some(default) => column_value(sql_type, default).ok(),
            None => None,
        };
        columns.push(Column {
            name: field.name.to_string(),
            sql_type,
            nullable: field.settings.nullable.unwrap_or(field.shape.is_optional()),
            primary_key: field.settings.primary_key,
            autoincrement: false,
            unique: field.settings.unique,
            default: default.filter(|value| !value.is_null()),
        });
    }
    Ok(())
}

fn column_value(sql_type: SqlType, data: Data) -> Result<Value, ConversionError> {
    let value = encode_data(data, EncodeOptions::default())?;
    Ok(match (sql_type, value) {
        (_, Value::Null) => Value::Null,
        (SqlType::Json, value) => Value::Str(serde_json::Value::from(value).to_string()),
        (_, value) => value,
    })
}

fn fill_row(schema: &RecordSchema, mut record: RecordData, row: &mut Row) -> Result<(), ConversionError> {
    for field in &schema.fields {
        let data = record.take(field.name)?;
        if !field.settings.sql {
            continue;
        }
        if let TypeShape::Record(nested) = &field.shape {
            let nested_record = data
                .into_record(*nested)
                .map_err(|err| err.with_path_prefix(field.name))?;
            fill_row(nested.schema()?, nested_record, row)?;
            continue;
        }
        let value = column_value(SqlType::of(&field.shape), data)
            .map_err(|err| err.with_path_prefix(field.name))?;
        row.insert(field.name.to_string(), value);
    }
    Ok(())
}

fn read_row(schema: &RecordSchema, row: &Row, mapping: &mut Mapping) -> Result<(), ConversionError> {
    for field in schema.fields.iter().filter(|field| field.settings.sql) {
        if let TypeShape::Record(nested) = &field.shape {
            let mut nested_mapping = Mapping::new();
            read_row(nested.schema()?, row, &mut nested_mapping)?;
            if field.flattened().is_some() {
                mapping.extend(nested_mapping);
            } else {
                mapping.insert(field.key().to_string(), Value::Map(nested_mapping));
            }
            continue;
        }

        let Some(value) = row.get(field.name) else {
            continue;
        };
        let value = read_column(field, value).map_err(|err| err.with_path_prefix(field.name))?;
        mapping.insert(field.key().to_string(), value);
    }
    Ok(())
}

fn read_column(field: &FieldSpec, value: &Value) -> Result<Value, ConversionError> {
    Ok(match (SqlType::of(&field.shape), value) {
        (_, Value::Null) => Value::Null,
        // SQLite hands booleans back as 0 or 1.
        (SqlType::Boolean, Value::Int(flag @ (0 | 1))) => Value::Bool(*flag == 1),
        (SqlType::Json, Value::Str(text)) => serde_json::from_str::<serde_json::Value>(text)
            .map(Value::from)
            .map_err(|err| ConversionError::type_mismatch("JSON text", format!("invalid JSON ({err})")))?,
        (_, value) => value.clone(),
    })
}
