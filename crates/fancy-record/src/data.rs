//! Native-side data tree and the [`FieldType`] conversions into it.
//!
//! A record instance lowers into [`Data`] before it is encoded, and a decoded mapping is
//! lifted back through [`Data`] into the concrete Rust type. Unlike [`Value`], a `Data` tree
//! remembers which record type produced each nested record, which is what lets union
//! variants and type markers survive the trip.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use indexmap::IndexMap;

use crate::declare::RecordRef;
use crate::error::ConversionError;
use crate::shape::TypeDecl;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Data {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Data>),
    Map(IndexMap<String, Data>),
    Record(RecordData),
}

impl Data {
    pub fn kind(&self) -> &'static str {
        match self {
            Data::Null => "null",
            Data::Bool(_) => "bool",
            Data::Int(_) => "int",
            Data::Float(_) => "float",
            Data::Str(_) => "string",
            Data::List(_) => "list",
            Data::Map(_) => "map",
            Data::Record(_) => "record",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Data::Null)
    }

    /// Unwraps a record produced by `expected`.
    pub fn into_record(self, expected: RecordRef) -> Result<RecordData, ConversionError> {
        match self {
            Data::Record(record) if record.record == expected => Ok(record),
            Data::Record(record) => Err(ConversionError::type_mismatch(
                format!("record `{}`", expected.name()),
                format!("record `{}`", record.record.name()),
            )),
            other => Err(ConversionError::type_mismatch(
                format!("record `{}`", expected.name()),
                other.kind(),
            )),
        }
    }

    /// Converts back into a plain [`Value`]; nested records are rejected.
    pub fn into_value(self) -> Result<Value, ConversionError> {
        Ok(match self {
            Data::Null => Value::Null,
            Data::Bool(value) => Value::Bool(value),
            Data::Int(value) => Value::Int(value),
            Data::Float(value) => Value::Float(value),
            Data::Str(value) => Value::Str(value),
            Data::List(items) => Value::List(
                items
                    .into_iter()
                    .map(Data::into_value)
                    .collect::<Result<_, _>>()?,
            ),
            Data::Map(map) => Value::Map(
                map.into_iter()
                    .map(|(key, value)| Ok((key, value.into_value()?)))
                    .collect::<Result<_, ConversionError>>()?,
            ),
            Data::Record(record) => {
                return Err(ConversionError::type_mismatch(
                    "plain value",
                    format!("record `{}`", record.record.name()),
                ));
            }
        })
    }
}

impl From<Value> for Data {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Data::Null,
            Value::Bool(value) => Data::Bool(value),
            Value::Int(value) => Data::Int(value),
            Value::Float(value) => Data::Float(value),
            Value::Str(value) => Data::Str(value),
            Value::List(items) => Data::List(items.into_iter().map(Data::from).collect()),
            Value::Map(map) => Data::Map(
                map.into_iter()
                    .map(|(key, value)| (key, Data::from(value)))
                    .collect(),
            ),
        }
    }
}

/// Field values of one record instance, keyed by field name.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordData {
    record: RecordRef,
    fields: IndexMap<&'static str, Data>,
}

impl RecordData {
    pub fn new(record: RecordRef) -> Self {
        Self {
            record,
            fields: IndexMap::new(),
        }
    }

    pub fn with(mut self, name: &'static str, value: Data) -> Self {
        self.fields.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &'static str, value: Data) {
        self.fields.insert(name, value);
    }

    pub fn record(&self) -> RecordRef {
        self.record
    }

    pub fn get(&self, name: &str) -> Option<&Data> {
        self.fields.get(name)
    }

    pub fn take(&mut self, name: &str) -> Result<Data, ConversionError> {
        self.fields
            .shift_remove(name)
            .ok_or_else(|| ConversionError::MissingField {
                path: Vec::new(),
                field: name.to_string(),
                alias: None,
            })
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &Data)> {
        self.fields.iter().map(|(name, value)| (*name, value))
    }
}

/// A Rust type usable as a record field.
///
/// Implemented for the primitives, `String`, `Option`, `Vec`, the standard map types with
/// scalar keys, `Box`, [`Value`] and every type deriving `Record` or `Union`.
pub trait FieldType: Sized + 'static {
    fn type_decl() -> TypeDecl;

    fn to_data(&self) -> Data;

    fn from_data(data: Data) -> Result<Self, ConversionError>;
}

impl FieldType for bool {
    fn type_decl() -> TypeDecl {
        TypeDecl::Bool
    }

    fn to_data(&self) -> Data {
        Data::Bool(*self)
    }

    fn from_data(data: Data) -> Result<Self, ConversionError> {
        match data {
            Data::Bool(value) => Ok(value),
            other => Err(ConversionError::type_mismatch("bool", other.kind())),
        }
    }
}

macro_rules! impl_int {
    ($ty:ty) => {
        impl FieldType for $ty {
            fn type_decl() -> TypeDecl {
                TypeDecl::Int
            }

            fn to_data(&self) -> Data {
                // Values beyond i64 saturate; the mapping model has one integer width.
                Data::Int(i64::try_from(*self).unwrap_or(i64::MAX))
            }

            fn from_data(data: Data) -> Result<Self, ConversionError> {
                match data {
                    Data::Int(value) => <$ty>::try_from(value).map_err(|_| {
                        ConversionError::type_mismatch(
                            stringify!($ty),
                            format!("out-of-range integer {value}"),
                        )
                    }),
                    other => Err(ConversionError::type_mismatch(stringify!($ty), other.kind())),
                }
            }
        }
    };
}

impl_int!(i8);
impl_int!(i16);
impl_int!(i32);
impl_int!(i64);
impl_int!(isize);
impl_int!(u8);
impl_int!(u16);
impl_int!(u32);
impl_int!(u64);
impl_int!(usize);

macro_rules! impl_float {
    ($ty:ty) => {
        impl FieldType for $ty {
            fn type_decl() -> TypeDecl {
                TypeDecl::Float
            }

            fn to_data(&self) -> Data {
                Data::Float(f64::from(*self))
            }

            fn from_data(data: Data) -> Result<Self, ConversionError> {
                match data {
                    Data::Float(value) => Ok(value as $ty),
                    Data::Int(value) => Ok(value as $ty),
                    other => Err(ConversionError::type_mismatch(stringify!($ty), other.kind())),
                }
            }
        }
    };
}

impl_float!(f32);
impl_float!(f64);

impl FieldType for String {
    fn type_decl() -> TypeDecl {
        TypeDecl::Str
    }

    fn to_data(&self) -> Data {
        Data::Str(self.clone())
    }

    fn from_data(data: Data) -> Result<Self, ConversionError> {
        match data {
            Data::Str(value) => Ok(value),
            other => Err(ConversionError::type_mismatch("string", other.kind())),
        }
    }
}

impl FieldType for Value {
    fn type_decl() -> TypeDecl {
        TypeDecl::Any
    }

    fn to_data(&self) -> Data {
        Data::from(self.clone())
    }

    fn from_data(data: Data) -> Result<Self, ConversionError> {
        data.into_value()
    }
}

impl<T: FieldType> FieldType for Option<T> {
    fn type_decl() -> TypeDecl {
        TypeDecl::Optional(Box::new(T::type_decl()))
    }

    fn to_data(&self) -> Data {
        match self {
            Some(value) => value.to_data(),
            None => Data::Null,
        }
    }

    fn from_data(data: Data) -> Result<Self, ConversionError> {
        match data {
            Data::Null => Ok(None),
            other => T::from_data(other).map(Some),
        }
    }
}

impl<T: FieldType> FieldType for Box<T> {
    fn type_decl() -> TypeDecl {
        T::type_decl()
    }

    fn to_data(&self) -> Data {
        (**self).to_data()
    }

    fn from_data(data: Data) -> Result<Self, ConversionError> {
        T::from_data(data).map(Box::new)
    }
}

impl<T: FieldType> FieldType for Vec<T> {
    fn type_decl() -> TypeDecl {
        TypeDecl::Sequence(Box::new(T::type_decl()))
    }

    fn to_data(&self) -> Data {
        Data::List(self.iter().map(FieldType::to_data).collect())
    }

    fn from_data(data: Data) -> Result<Self, ConversionError> {
        match data {
            Data::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| T::from_data(item).map_err(|err| err.with_path_prefix(index.to_string())))
                .collect(),
            other => Err(ConversionError::type_mismatch("list", other.kind())),
        }
    }
}

/// Scalar types usable as map keys; mapping keys are always strings.
pub trait MapKey: Sized {
    fn key_decl() -> TypeDecl;

    fn to_key(&self) -> String;

    fn from_key(key: &str) -> Result<Self, ConversionError>;
}

impl MapKey for String {
    fn key_decl() -> TypeDecl {
        TypeDecl::Str
    }

    fn to_key(&self) -> String {
        self.clone()
    }

    fn from_key(key: &str) -> Result<Self, ConversionError> {
        Ok(key.to_string())
    }
}

impl MapKey for bool {
    fn key_decl() -> TypeDecl {
        TypeDecl::Bool
    }

    fn to_key(&self) -> String {
        self.to_string()
    }

    fn from_key(key: &str) -> Result<Self, ConversionError> {
        key.parse()
            .map_err(|_| ConversionError::type_mismatch("bool key", format!("{key:?}")))
    }
}

macro_rules! impl_int_key {
    ($ty:ty) => {
        impl MapKey for $ty {
            fn key_decl() -> TypeDecl {
                TypeDecl::Int
            }

            fn to_key(&self) -> String {
                self.to_string()
            }

            fn from_key(key: &str) -> Result<Self, ConversionError> {
                key.parse().map_err(|_| {
                    ConversionError::type_mismatch(
                        concat!(stringify!($ty), " key"),
                        format!("{key:?}"),
                    )
                })
            }
        }
    };
}

impl_int_key!(i32);
impl_int_key!(i64);
impl_int_key!(u32);
impl_int_key!(u64);
impl_int_key!(usize);

fn map_from_data<K, V, M>(data: Data) -> Result<M, ConversionError>
where
    K: MapKey,
    V: FieldType,
    M: FromIterator<(K, V)>,
{
    match data {
        Data::Map(map) => map
            .into_iter()
            .map(|(key, value)| {
                let parsed = K::from_key(&key).map_err(|err| err.with_path_prefix(key.clone()))?;
                let value = V::from_data(value).map_err(|err| err.with_path_prefix(key))?;
                Ok((parsed, value))
            })
            .collect(),
        other => Err(ConversionError::type_mismatch("map", other.kind())),
    }
}

impl<K, V> FieldType for HashMap<K, V>
where
    K: MapKey + Eq + Hash + 'static,
    V: FieldType,
{
    fn type_decl() -> TypeDecl {
        TypeDecl::Mapping(Box::new(K::key_decl()), Box::new(V::type_decl()))
    }

    fn to_data(&self) -> Data {
        // Hash order is unstable; sort keys so encoded output is reproducible.
        let mut entries: Vec<(String, Data)> = self
            .iter()
            .map(|(key, value)| (key.to_key(), value.to_data()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Data::Map(entries.into_iter().collect())
    }

    fn from_data(data: Data) -> Result<Self, ConversionError> {
        map_from_data(data)
    }
}

impl<K, V> FieldType for BTreeMap<K, V>
where
    K: MapKey + Ord + 'static,
    V: FieldType,
{
    fn type_decl() -> TypeDecl {
        TypeDecl::Mapping(Box::new(K::key_decl()), Box::new(V::type_decl()))
    }

    fn to_data(&self) -> Data {
        Data::Map(
            self.iter()
                .map(|(key, value)| (key.to_key(), value.to_data()))
                .collect(),
        )
    }

    fn from_data(data: Data) -> Result<Self, ConversionError> {
        map_from_data(data)
    }
}

impl<K, V> FieldType for IndexMap<K, V>
where
    K: MapKey + Eq + Hash + 'static,
    V: FieldType,
{
    fn type_decl() -> TypeDecl {
        TypeDecl::Mapping(Box::new(K::key_decl()), Box::new(V::type_decl()))
    }

    fn to_data(&self) -> Data {
        Data::Map(
            self.iter()
                .map(|(key, value)| (key.to_key(), value.to_data()))
                .collect(),
        )
    }

    fn from_data(data: Data) -> Result<Self, ConversionError> {
        map_from_data(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_integers_reject_out_of_range_values() {
        let err = u8::from_data(Data::Int(300)).unwrap_err();
        assert!(matches!(err, ConversionError::TypeMismatch { .. }));
        assert_eq!(u8::from_data(Data::Int(255)).unwrap(), 255);
    }

    #[test]
    fn floats_accept_integral_data() {
        assert_eq!(f64::from_data(Data::Int(3)).unwrap(), 3.0);
    }

    #[test]
    fn integer_keyed_maps_round_trip_through_string_keys() {
        let mut scores = BTreeMap::new();
        scores.insert(2u32, "b".to_string());
        scores.insert(1u32, "a".to_string());
        let data = scores.to_data();
        let Data::Map(ref map) = data else {
            panic!("expected map data");
        };
        assert_eq!(map.keys().collect::<Vec<_>>(), ["1", "2"]);
        assert_eq!(BTreeMap::<u32, String>::from_data(data).unwrap(), scores);
    }

    #[test]
    fn vec_errors_carry_the_index() {
        let err = Vec::<i32>::from_data(Data::List(vec![Data::Int(1), Data::Str("x".into())]))
            .unwrap_err();
        assert_eq!(err.path(), ["1".to_string()]);
    }
}
