//! Declared field types and their normalized shapes.

use std::collections::HashSet;

use crate::declare::RecordRef;
use crate::error::DefinitionError;

/// A field type as reported by [`FieldType::type_decl`](crate::FieldType::type_decl).
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDecl {
    Bool,
    Int,
    Float,
    Str,
    /// Any mapping value, passed through untouched.
    Any,
    Optional(Box<TypeDecl>),
    Sequence(Box<TypeDecl>),
    Mapping(Box<TypeDecl>, Box<TypeDecl>),
    Record(RecordRef),
    Union {
        name: &'static str,
        members: Vec<TypeDecl>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Bool,
    Int,
    Float,
    Str,
    Any,
}

impl Primitive {
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Bool => "bool",
            Primitive::Int => "int",
            Primitive::Float => "float",
            Primitive::Str => "string",
            Primitive::Any => "any",
        }
    }
}

/// Normalized shape of a field type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeShape {
    Primitive(Primitive),
    Optional(Box<TypeShape>),
    Sequence(Box<TypeShape>),
    Mapping(Primitive, Box<TypeShape>),
    Record(RecordRef),
    /// Two or more record variants, in declaration order.
    Union(Vec<RecordRef>),
}

impl TypeShape {
    pub fn is_optional(&self) -> bool {
        matches!(self, TypeShape::Optional(_))
    }

    /// Shape with any `Optional` wrapper removed.
    pub fn required(&self) -> &TypeShape {
        match self {
            TypeShape::Optional(inner) => inner,
            other => other,
        }
    }

    pub fn as_record(&self) -> Option<RecordRef> {
        match self {
            TypeShape::Record(record) => Some(*record),
            _ => None,
        }
    }

    pub fn as_primitive(&self) -> Option<Primitive> {
        match self {
            TypeShape::Primitive(primitive) => Some(*primitive),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            TypeShape::Primitive(primitive) => primitive.name().to_string(),
            TypeShape::Optional(inner) => format!("optional {}", inner.describe()),
            TypeShape::Sequence(inner) => format!("list of {}", inner.describe()),
            TypeShape::Mapping(key, value) => {
                format!("map of {} to {}", key.name(), value.describe())
            }
            TypeShape::Record(record) => format!("record `{}`", record.name()),
            TypeShape::Union(members) => {
                let names: Vec<&str> = members.iter().map(RecordRef::name).collect();
                format!("one of {}", names.join(", "))
            }
        }
    }
}

/// Resolves a declared type into its shape.
///
/// `record` and `field` name the declaration site for error messages. Nested records are
/// kept as lazy references and are not resolved here.
pub fn resolve(decl: &TypeDecl, record: &str, field: &str) -> Result<TypeShape, DefinitionError> {
    let unsupported = |message: String| DefinitionError::UnsupportedType {
        record: record.to_string(),
        field: field.to_string(),
        message,
    };

    match decl {
        TypeDecl::Bool => Ok(TypeShape::Primitive(Primitive::Bool)),
        TypeDecl::Int => Ok(TypeShape::Primitive(Primitive::Int)),
        TypeDecl::Float => Ok(TypeShape::Primitive(Primitive::Float)),
        TypeDecl::Str => Ok(TypeShape::Primitive(Primitive::Str)),
        TypeDecl::Any => Ok(TypeShape::Primitive(Primitive::Any)),
        TypeDecl::Optional(inner) => match resolve(inner, record, field)? {
            // Option<Option<T>> has a single null, so it collapses.
            TypeShape::Optional(inner) => Ok(TypeShape::Optional(inner)),
            inner => Ok(TypeShape::Optional(Box::new(inner))),
        },
        TypeDecl::Sequence(inner) => Ok(TypeShape::Sequence(Box::new(resolve(
            inner, record, field,
        )?))),
        TypeDecl::Mapping(key, value) => {
            let key = match resolve(key, record, field)? {
                TypeShape::Primitive(primitive @ (Primitive::Str | Primitive::Int | Primitive::Bool)) => {
                    primitive
                }
                other => {
                    return Err(unsupported(format!(
                        "map keys must be strings, integers or booleans, not {}",
                        other.describe()
                    )));
                }
            };
            Ok(TypeShape::Mapping(key, Box::new(resolve(value, record, field)?)))
        }
        TypeDecl::Record(record_ref) => Ok(TypeShape::Record(*record_ref)),
        TypeDecl::Union { name, members } => resolve_union(name, members, record, field),
    }
}

fn resolve_union(
    union: &str,
    members: &[TypeDecl],
    record: &str,
    field: &str,
) -> Result<TypeShape, DefinitionError> {
    let invalid = |message: String| DefinitionError::InvalidUnion {
        union: union.to_string(),
        message,
    };

    if members.is_empty() {
        return Err(invalid("a union needs at least one variant".to_string()));
    }

    let mut records = Vec::with_capacity(members.len());
    let mut names = HashSet::new();
    for member in members {
        match resolve(member, record, field)? {
            TypeShape::Record(member) => {
                if !names.insert(member.name()) {
                    return Err(invalid(format!(
                        "variant name `{}` is used more than once",
                        member.name()
                    )));
                }
                records.push(member);
            }
            other => {
                return Err(invalid(format!(
                    "every variant must be a record type, found {}",
                    other.describe()
                )));
            }
        }
    }

    if records.len() == 1 {
        return Ok(TypeShape::Record(records[0]));
    }
    Ok(TypeShape::Union(records))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_optional_collapses() {
        let decl = TypeDecl::Optional(Box::new(TypeDecl::Optional(Box::new(TypeDecl::Int))));
        assert_eq!(
            resolve(&decl, "R", "f").unwrap(),
            TypeShape::Optional(Box::new(TypeShape::Primitive(Primitive::Int)))
        );
    }

    #[test]
    fn float_map_keys_are_rejected() {
        let decl = TypeDecl::Mapping(Box::new(TypeDecl::Float), Box::new(TypeDecl::Str));
        let err = resolve(&decl, "R", "scores").unwrap_err();
        assert!(matches!(err, DefinitionError::UnsupportedType { ref field, .. } if field == "scores"));
    }

    #[test]
    fn union_of_primitives_is_rejected() {
        let decl = TypeDecl::Union {
            name: "Mixed",
            members: vec![TypeDecl::Int, TypeDecl::Str],
        };
        let err = resolve(&decl, "R", "f").unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidUnion { ref union, .. } if union == "Mixed"));
    }

    #[test]
    fn empty_union_is_rejected() {
        let decl = TypeDecl::Union {
            name: "Never",
            members: Vec::new(),
        };
        assert!(resolve(&decl, "R", "f").is_err());
    }
}
