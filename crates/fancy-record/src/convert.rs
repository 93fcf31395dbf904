//! Shape-directed conversion between [`Data`] trees and mappings.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::trace;

use crate::data::{Data, RecordData};
use crate::declare::RecordRef;
use crate::error::ConversionError;
use crate::registry::{RecordSchema, TYPE_KEY, VERSION_KEY};
use crate::shape::{self, Primitive, TypeShape};
use crate::value::{Mapping, Value};
use crate::FieldType;

/// Options for the encode direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Keep fields that would otherwise be dropped for being null or equal to their
    /// default. Fields marked `suppress` are still dropped.
    pub full: bool,
}

impl EncodeOptions {
    pub fn full() -> Self {
        Self { full: true }
    }
}

/// Options for the decode direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Overrides every record's `allow_extra_fields` setting when set.
    pub strict: Option<bool>,
    /// Decode absent optional fields without a default as null instead of failing.
    pub missing_as_null: bool,
}

impl DecodeOptions {
    pub fn strict() -> Self {
        Self {
            strict: Some(true),
            ..Self::default()
        }
    }
}

/// Encodes an arbitrary field value.
pub fn to_value<T: FieldType>(value: &T) -> Result<Value, ConversionError> {
    encode_data(value.to_data(), EncodeOptions::default())
}

/// Decodes an arbitrary field value, e.g. a union, from a mapping value.
pub fn from_value<T: FieldType>(value: &Value) -> Result<T, ConversionError> {
    let shape = shape::resolve(&T::type_decl(), std::any::type_name::<T>(), "<value>")?;
    let data = decode_value(&shape, value, true, &DecodeOptions::default())?;
    T::from_data(data)
}

pub(crate) fn encode_data(data: Data, options: EncodeOptions) -> Result<Value, ConversionError> {
    Ok(match data {
        Data::Null => Value::Null,
        Data::Bool(value) => Value::Bool(value),
        Data::Int(value) => Value::Int(value),
        Data::Float(value) => Value::Float(value),
        Data::Str(value) => Value::Str(value),
        Data::List(items) => Value::List(
            items
                .into_iter()
                .enumerate()
                .map(|(index, item)| {
                    encode_data(item, options).map_err(|err| err.with_path_prefix(index.to_string()))
                })
                .collect::<Result<_, _>>()?,
        ),
        Data::Map(map) => Value::Map(
            map.into_iter()
                .map(|(key, value)| {
                    let value = encode_data(value, options)
                        .map_err(|err| err.with_path_prefix(key.clone()))?;
                    Ok((key, value))
                })
                .collect::<Result<_, ConversionError>>()?,
        ),
        Data::Record(record) => {
            let schema = record.record().schema()?;
            Value::Map(encode_record(schema, record, options)?)
        }
    })
}

#[tracing::instrument(
    level = "trace",
    name = "fancy_record.convert.encode",
    skip_all,
    fields(record = schema.name, full = options.full)
)]
pub(crate) fn encode_record(
    schema: &RecordSchema,
    mut record: RecordData,
    options: EncodeOptions,
) -> Result<Mapping, ConversionError> {
    let class = &schema.settings;
    let mut mapping = Mapping::new();
    if let Some(marker) = schema.type_marker() {
        mapping.insert(TYPE_KEY.to_string(), Value::Str(marker.to_string()));
    }
    if let Some(version) = schema.emits_version() {
        mapping.insert(VERSION_KEY.to_string(), Value::Int(version));
    }

    for field in &schema.fields {
        let value = record.take(field.name)?;
        match field.settings.suppress {
            Some(true) => continue,
            Some(false) => {}
            None if !options.full => {
                let suppress_none = field.settings.suppress_none.unwrap_or(class.suppress_none);
                if value.is_null() && suppress_none {
                    continue;
                }
                let suppress_default = field
                    .settings
                    .suppress_default
                    .unwrap_or(class.suppress_defaults);
                if suppress_default && field.default_data().is_some_and(|default| default == value) {
                    continue;
                }
            }
            None => {}
        }

        if let Some(nested) = field.flattened() {
            let nested_schema = nested.schema()?;
            let nested_record = value
                .into_record(nested)
                .map_err(|err| err.with_path_prefix(field.name))?;
            let nested_mapping = encode_record(nested_schema, nested_record, options)
                .map_err(|err| err.with_path_prefix(field.name))?;
            mapping.extend(nested_mapping);
        } else {
            let key = field.key().to_string();
            let value = encode_data(value, options).map_err(|err| err.with_path_prefix(key.clone()))?;
            mapping.insert(key, value);
        }
    }

    trace!(keys = mapping.len(), "record encoded");
    Ok(mapping)
}

pub(crate) fn decode_record(
    schema: &RecordSchema,
    mapping: &Mapping,
    options: &DecodeOptions,
) -> Result<Data, ConversionError> {
    decode_record_inner(schema, mapping, options, false)
}

/// `strict_top` rejects unknown keys at this level only; nested records keep their own setting.
#[tracing::instrument(
    level = "trace",
    name = "fancy_record.convert.decode",
    skip_all,
    fields(record = schema.name, keys = mapping.len())
)]
fn decode_record_inner(
    schema: &RecordSchema,
    mapping: &Mapping,
    options: &DecodeOptions,
    strict_top: bool,
) -> Result<Data, ConversionError> {
    let class = &schema.settings;
    let mut consumed: HashSet<&str> = HashSet::new();

    if !schema.has_type_field() && let Some(tag) = mapping.get(TYPE_KEY) {
        match tag {
            Value::Str(tag) if schema.matches_tag(tag) => {}
            other => {
                return Err(ConversionError::TypeMismatch {
                    path: vec![TYPE_KEY.to_string()],
                    expected: format!("type `{}`", schema.name),
                    found: match other {
                        Value::Str(tag) => format!("type `{tag}`"),
                        other => other.kind().to_string(),
                    },
                });
            }
        }
        consumed.insert(TYPE_KEY);
    }

    if let Some(version) = class.version
        && let Some(found) = mapping.get(VERSION_KEY)
    {
        if found.as_i64() != Some(version) {
            return Err(ConversionError::TypeMismatch {
                path: vec![VERSION_KEY.to_string()],
                expected: format!("version {version}"),
                found: format!("version {found}"),
            });
        }
        consumed.insert(VERSION_KEY);
    }

    let mut record = RecordData::new(schema.record);
    for field in &schema.fields {
        if let Some(nested) = field.flattened() {
            let nested_schema = nested.schema()?;
            let nested_mapping: Mapping = nested_schema
                .keys()
                .iter()
                .filter_map(|key| mapping.get_key_value(key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            consumed.extend(nested_mapping.keys().filter_map(|key| {
                mapping.get_key_value(key.as_str()).map(|(key, _)| key.as_str())
            }));
            let data = decode_record(nested_schema, &nested_mapping, options)?;
            record.insert(field.name, data);
            continue;
        }

        let key = field.key();
        let found = mapping.get_key_value(key).or_else(|| {
            field
                .settings
                .rename
                .as_deref()
                .and_then(|old| mapping.get_key_value(old))
        });

        let data = match found {
            Some((found_key, value)) => {
                consumed.insert(found_key.as_str());
                decode_value(&field.shape, value, class.validate, options)
                    .map_err(|err| err.with_path_prefix(key))?
            }
            None => match field.default_data() {
                Some(default) => default,
                None if options.missing_as_null && field.shape.is_optional() => Data::Null,
                None => {
                    return Err(ConversionError::MissingField {
                        path: Vec::new(),
                        field: field.name.to_string(),
                        alias: field.settings.alias.clone(),
                    });
                }
            },
        };
        record.insert(field.name, data);
    }

    let strict = strict_top || options.strict.unwrap_or(!class.allow_extra_fields);
    if strict && consumed.len() < mapping.len() {
        let keys: Vec<String> = mapping
            .keys()
            .filter(|key| !consumed.contains(key.as_str()))
            .cloned()
            .collect();
        return Err(ConversionError::UnknownKey {
            path: Vec::new(),
            record: schema.name.to_string(),
            keys,
        });
    }

    Ok(Data::Record(record))
}

/// Decodes one value against its shape. `validate = false` coerces mismatched scalars
/// (e.g. `"3"` for an int) instead of rejecting them.
pub(crate) fn decode_value(
    shape: &TypeShape,
    value: &Value,
    validate: bool,
    options: &DecodeOptions,
) -> Result<Data, ConversionError> {
    let mismatch = || ConversionError::type_mismatch(shape.describe(), value.kind());

    match shape {
        TypeShape::Primitive(primitive) => {
            decode_primitive(*primitive, value, validate).ok_or_else(mismatch)
        }
        TypeShape::Optional(inner) => match value {
            Value::Null => Ok(Data::Null),
            value => decode_value(inner, value, validate, options),
        },
        TypeShape::Sequence(inner) => match value {
            Value::List(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    decode_value(inner, item, validate, options)
                        .map_err(|err| err.with_path_prefix(index.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Data::List),
            _ => Err(mismatch()),
        },
        TypeShape::Mapping(key_shape, inner) => match value {
            Value::Map(map) => {
                let mut out = IndexMap::with_capacity(map.len());
                for (key, item) in map {
                    if decode_primitive(*key_shape, &Value::Str(key.clone()), false).is_none() {
                        return Err(ConversionError::TypeMismatch {
                            path: vec![key.clone()],
                            expected: format!("{} key", key_shape.name()),
                            found: format!("{key:?}"),
                        });
                    }
                    let item = decode_value(inner, item, validate, options)
                        .map_err(|err| err.with_path_prefix(key.clone()))?;
                    out.insert(key.clone(), item);
                }
                Ok(Data::Map(out))
            }
            _ => Err(mismatch()),
        },
        TypeShape::Record(record) => match value {
            Value::Map(map) => decode_record(record.schema()?, map, options),
            _ => Err(mismatch()),
        },
        TypeShape::Union(members) => match value {
            Value::Map(map) => decode_union(members, map, options),
            _ => Err(mismatch()),
        },
    }
}

fn decode_primitive(primitive: Primitive, value: &Value, validate: bool) -> Option<Data> {
    match (primitive, value) {
        (Primitive::Any, value) => Some(Data::from(value.clone())),
        (Primitive::Bool, Value::Bool(value)) => Some(Data::Bool(*value)),
        (Primitive::Int, Value::Int(value)) => Some(Data::Int(*value)),
        (Primitive::Float, Value::Float(value)) => Some(Data::Float(*value)),
        (Primitive::Float, Value::Int(value)) => Some(Data::Float(*value as f64)),
        (Primitive::Str, Value::Str(value)) => Some(Data::Str(value.clone())),
        _ if validate => None,
        (Primitive::Bool, Value::Str(text)) => match text.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(Data::Bool(true)),
            "false" | "0" | "no" => Some(Data::Bool(false)),
            _ => None,
        },
        (Primitive::Bool, Value::Int(value)) if *value == 0 || *value == 1 => {
            Some(Data::Bool(*value == 1))
        }
        (Primitive::Int, Value::Str(text)) => text.trim().parse().ok().map(Data::Int),
        (Primitive::Int, Value::Float(value)) if value.fract() == 0.0 => {
            Some(Data::Int(*value as i64))
        }
        (Primitive::Int, Value::Bool(value)) => Some(Data::Int(i64::from(*value))),
        (Primitive::Float, Value::Str(text)) => text.trim().parse().ok().map(Data::Float),
        (Primitive::Str, Value::Bool(_) | Value::Int(_) | Value::Float(_)) => {
            Some(Data::Str(value.to_string()))
        }
        _ => None,
    }
}

fn decode_union(
    members: &[RecordRef],
    map: &Mapping,
    options: &DecodeOptions,
) -> Result<Data, ConversionError> {
    if let Some(Value::Str(tag)) = map.get(TYPE_KEY) {
        let mut shadowed = false;
        for member in members {
            let schema = member.schema()?;
            if schema.has_type_field() {
                shadowed = true;
            } else if schema.matches_tag(tag) {
                return decode_record(schema, map, options);
            }
        }
        if !shadowed {
            let names: Vec<&str> = members.iter().map(RecordRef::name).collect();
            return Err(ConversionError::TypeMismatch {
                path: vec![TYPE_KEY.to_string()],
                expected: format!("one of {}", names.join(", ")),
                found: format!("type `{tag}`"),
            });
        }
    }

    // Without a usable marker every variant is tried; unknown keys at the variant's
    // own level disqualify it.
    let mut matches = Vec::new();
    for member in members {
        if let Ok(data) = decode_record_inner(member.schema()?, map, options, true) {
            matches.push((member, data));
        }
    }

    match matches.len() {
        1 => Ok(matches.remove(0).1),
        0 => {
            let names: Vec<&str> = members.iter().map(RecordRef::name).collect();
            Err(ConversionError::type_mismatch(
                format!("one of {}", names.join(", ")),
                "map matching no variant",
            ))
        }
        _ => Err(ConversionError::AmbiguousType {
            path: Vec::new(),
            candidates: matches
                .iter()
                .map(|(member, _)| member.name().to_string())
                .collect(),
        }),
    }
}
