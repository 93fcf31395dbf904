//! Command-line parsers derived from record schemas.
//!
//! Each field becomes one argument. Nested records contribute their own arguments under
//! a help heading, and the parsed values are assembled into a mapping that goes through
//! the regular decode path, so defaults, aliases and flattening behave exactly as they do
//! for JSON and TOML input.

use std::collections::HashSet;
use std::ffi::OsString;

use clap::builder::{PossibleValuesParser, TypedValueParser, ValueParser};
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use convert_case::{Case, Casing};
use tracing::{debug, info};

use crate::convert::DecodeOptions;
use crate::error::{DefinitionError, Error, Result};
use crate::registry::{FieldSpec, RecordSchema};
use crate::shape::{Primitive, TypeShape};
use crate::telemetry;
use crate::value::{Mapping, Value};
use crate::Record;

/// Builds a parser for `Self` and constructs instances from command-line arguments.
pub trait CliRecord: Record {
    /// Parser with one argument per field.
    fn command() -> Result<Command> {
        let schema = Self::schema()?;
        build_command(schema)
    }

    /// Assembles an instance from matches produced by [`CliRecord::command`].
    fn from_arg_matches(matches: &ArgMatches) -> Result<Self> {
        let schema = Self::schema()?;
        let mut mapping = Mapping::new();
        collect_values(schema, matches, "", &mut mapping)?;
        debug!(record = schema.name, keys = mapping.len(), "command line collected");
        let options = DecodeOptions {
            missing_as_null: true,
            ..DecodeOptions::default()
        };
        Ok(Self::from_mapping_with(&mapping, options)?)
    }

    /// Parses `args`, whose first item is the program name.
    fn from_cli_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command()?.try_get_matches_from(args)?;
        Self::from_arg_matches(&matches)
    }
}

impl<T: Record> CliRecord for T {}

/// A program whose arguments are a record.
///
/// ```ignore
/// #[derive(Record)]
/// struct Greet {
///     name: String,
/// }
///
/// impl CliApp for Greet {
///     fn run(&self) -> anyhow::Result<()> {
///         println!("hello {}", self.name);
///         Ok(())
///     }
/// }
///
/// fn main() -> anyhow::Result<()> {
///     Greet::main()
/// }
/// ```
pub trait CliApp: CliRecord {
    fn run(&self) -> anyhow::Result<()>;

    /// Parses the process arguments and runs. Help, version and usage errors are printed
    /// and end the process the way clap does.
    fn main() -> anyhow::Result<()> {
        match Self::main_from(std::env::args_os()) {
            Err(err) => match err.downcast::<Error>() {
                Ok(Error::Cli(err)) => err.exit(),
                Ok(other) => Err(other.into()),
                Err(other) => Err(other),
            },
            Ok(()) => Ok(()),
        }
    }

    fn main_from<I, T>(args: I) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        if let Err(err) = telemetry::init_tracing() {
            debug!(error = %err, "tracing already configured");
        }
        let app = Self::from_cli_args(args)?;
        info!(record = Self::declaration().name, "running");
        app.run()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgKind {
    Flag,
    Scalar(Primitive),
    Many(Primitive),
    Nested,
}

fn cli_error(schema: &RecordSchema, field: &FieldSpec, message: impl Into<String>) -> DefinitionError {
    DefinitionError::Cli {
        record: schema.name.to_string(),
        field: field.name.to_string(),
        message: message.into(),
    }
}

/// `None` when the field is left out of the parser.
fn classify(schema: &RecordSchema, field: &FieldSpec) -> Result<Option<ArgKind>, DefinitionError> {
    if field.settings.parse_exclude {
        return Ok(None);
    }
    let kind = match (&field.shape, field.shape.required()) {
        (_, TypeShape::Primitive(Primitive::Bool)) => ArgKind::Flag,
        (_, TypeShape::Primitive(primitive)) => ArgKind::Scalar(*primitive),
        (_, TypeShape::Sequence(inner)) => match inner.as_primitive() {
            Some(primitive) => ArgKind::Many(primitive),
            None => {
                return Err(cli_error(
                    schema,
                    field,
                    format!("{} cannot be read from the command line", field.shape.describe()),
                ));
            }
        },
        (TypeShape::Record(_), _) => ArgKind::Nested,
        (shape, _) => {
            return Err(cli_error(
                schema,
                field,
                format!(
                    "{} cannot be read from the command line; hint: mark the field `parse_exclude`",
                    shape.describe()
                ),
            ));
        }
    };
    Ok(Some(kind))
}

fn build_command(schema: &RecordSchema) -> Result<Command> {
    let mut command = Command::new(schema.name.to_case(Case::Kebab));
    if let Some(about) = schema.settings.help.as_deref().or(schema.description()) {
        command = command.about(about.to_string());
    }
    let mut flags = HashSet::from(["--help".to_string(), "-h".to_string()]);
    let command = add_args(command, schema, "", None, &mut flags)?;
    debug!(
        record = schema.name,
        args = command.get_arguments().count(),
        "command built"
    );
    Ok(command)
}

fn add_args(
    mut command: Command,
    schema: &RecordSchema,
    prefix: &str,
    heading: Option<&str>,
    flags: &mut HashSet<String>,
) -> Result<Command, DefinitionError> {
    for field in &schema.fields {
        let Some(kind) = classify(schema, field)? else {
            continue;
        };
        let id = arg_id(prefix, field.name);
        let heading = field.settings.group.as_deref().or(heading);

        if kind == ArgKind::Nested {
            let Some(nested) = field.shape.as_record() else {
                continue;
            };
            let nested = nested.schema()?;
            command = add_args(command, nested, &id, Some(heading.unwrap_or(nested.name)), flags)?;
            continue;
        }

        let arg = build_arg(schema, field, kind, id, heading, flags)?;
        command = command.arg(arg);
    }
    Ok(command)
}

fn arg_id(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn default_flag(name: &str) -> String {
    if name.chars().count() == 1 {
        format!("-{name}")
    } else {
        format!("--{}", name.replace('_', "-"))
    }
}

fn build_arg(
    schema: &RecordSchema,
    field: &FieldSpec,
    kind: ArgKind,
    id: String,
    heading: Option<&str>,
    flags: &mut HashSet<String>,
) -> Result<Arg, DefinitionError> {
    let names = match &field.settings.args {
        Some(names) if names.is_empty() => {
            return Err(cli_error(schema, field, "`args` must name at least one flag"));
        }
        Some(names) => names.clone(),
        None => vec![default_flag(field.name)],
    };
    let positional = !names[0].starts_with('-');

    let mut arg = Arg::new(id);
    if positional {
        arg = arg.value_name(names[0].clone());
    } else {
        let mut has_long = false;
        let mut has_short = false;
        for name in &names {
            if !flags.insert(name.clone()) {
                return Err(cli_error(schema, field, format!("flag `{name}` is used more than once")));
            }
            if let Some(long) = name.strip_prefix("--") {
                arg = if has_long {
                    arg.visible_alias(long.to_string())
                } else {
                    arg.long(long.to_string())
                };
                has_long = true;
                continue;
            }
            let mut chars = name.chars().skip(1);
            let (Some(short), None) = (chars.next(), chars.next()) else {
                return Err(cli_error(
                    schema,
                    field,
                    format!("flag `{name}` must be `-x` or `--name`"),
                ));
            };
            arg = if has_short {
                arg.visible_short_alias(short)
            } else {
                arg.short(short)
            };
            has_short = true;
        }
    }

    if let Some(help) = field
        .settings
        .help
        .as_deref()
        .or(field.settings.doc.as_deref())
        .or(field.doc)
    {
        arg = arg.help(help.to_string());
    }
    if let Some(metavar) = &field.settings.metavar {
        arg = arg.value_name(metavar.clone());
    }
    if let Some(heading) = heading {
        arg = arg.help_heading(heading.to_string());
    }

    let required = !field.has_default() && !field.shape.is_optional();
    arg = match kind {
        ArgKind::Flag => {
            if positional {
                return Err(cli_error(schema, field, "boolean fields must use a flag, not a positional name"));
            }
            arg.action(ArgAction::SetTrue)
        }
        ArgKind::Scalar(primitive) => {
            let arg = arg
                .action(ArgAction::Set)
                .required(required)
                .value_parser(value_parser_for(schema, field, primitive)?);
            match field.settings.nargs.as_deref() {
                None => arg,
                Some("?") => arg.num_args(0..=1),
                Some(other) => {
                    return Err(cli_error(
                        schema,
                        field,
                        format!("nargs {other:?} needs a list field"),
                    ));
                }
            }
        }
        ArgKind::Many(primitive) => {
            let arg = arg
                .action(ArgAction::Append)
                .required(required)
                .value_parser(value_parser_for(schema, field, primitive)?);
            match field.settings.nargs.as_deref() {
                None | Some("*") => arg.num_args(0..),
                Some("+") => arg.num_args(1..),
                Some("?") => arg.num_args(0..=1),
                Some(count) => match count.parse::<usize>() {
                    Ok(count) => arg.num_args(count),
                    Err(_) => {
                        return Err(cli_error(
                            schema,
                            field,
                            format!("nargs must be \"*\", \"+\", \"?\" or a count, found {count:?}"),
                        ));
                    }
                },
            }
        }
        ArgKind::Nested => arg,
    };
    Ok(arg)
}

fn value_parser_for(
    schema: &RecordSchema,
    field: &FieldSpec,
    primitive: Primitive,
) -> Result<ValueParser, DefinitionError> {
    let Some(choices) = &field.settings.choices else {
        return Ok(match primitive {
            Primitive::Bool => value_parser!(bool).into(),
            Primitive::Int => value_parser!(i64).into(),
            Primitive::Float => value_parser!(f64).into(),
            Primitive::Str | Primitive::Any => value_parser!(String).into(),
        });
    };

    for choice in choices {
        let parses = match primitive {
            Primitive::Bool => choice.parse::<bool>().is_ok(),
            Primitive::Int => choice.parse::<i64>().is_ok(),
            Primitive::Float => choice.parse::<f64>().is_ok(),
            Primitive::Str | Primitive::Any => true,
        };
        if !parses {
            return Err(cli_error(
                schema,
                field,
                format!("choice {choice:?} is not a valid {}", primitive.name()),
            ));
        }
    }

    let parser = PossibleValuesParser::new(choices.iter().cloned());
    Ok(match primitive {
        Primitive::Bool => parser.try_map(|text| text.parse::<bool>()).into(),
        Primitive::Int => parser.try_map(|text| text.parse::<i64>()).into(),
        Primitive::Float => parser.try_map(|text| text.parse::<f64>()).into(),
        Primitive::Str | Primitive::Any => parser.into(),
    })
}

fn collect_values(
    schema: &RecordSchema,
    matches: &ArgMatches,
    prefix: &str,
    mapping: &mut Mapping,
) -> Result<(), DefinitionError> {
    for field in &schema.fields {
        let Some(kind) = classify(schema, field)? else {
            continue;
        };
        let id = arg_id(prefix, field.name);
        let value = match kind {
            ArgKind::Nested => {
                let Some(nested) = field.shape.as_record() else {
                    continue;
                };
                let mut nested_mapping = Mapping::new();
                collect_values(nested.schema()?, matches, &id, &mut nested_mapping)?;
                if field.flattened().is_some() {
                    mapping.extend(nested_mapping);
                    continue;
                }
                Value::Map(nested_mapping)
            }
            ArgKind::Flag => {
                if matches.value_source(&id) == Some(ValueSource::CommandLine) {
                    Value::Bool(true)
                } else if field.has_default() || field.shape.is_optional() {
                    continue;
                } else {
                    Value::Bool(false)
                }
            }
            ArgKind::Scalar(primitive) => match scalar_value(matches, &id, primitive) {
                Some(value) => value,
                None => continue,
            },
            ArgKind::Many(primitive) => match many_values(matches, &id, primitive) {
                Some(values) => Value::List(values),
                None => continue,
            },
        };
        mapping.insert(field.key().to_string(), value);
    }
    Ok(())
}

fn scalar_value(matches: &ArgMatches, id: &str, primitive: Primitive) -> Option<Value> {
    match primitive {
        Primitive::Bool => matches.get_one::<bool>(id).map(|value| Value::Bool(*value)),
        Primitive::Int => matches.get_one::<i64>(id).map(|value| Value::Int(*value)),
        Primitive::Float => matches.get_one::<f64>(id).map(|value| Value::Float(*value)),
        Primitive::Str | Primitive::Any => {
            matches.get_one::<String>(id).map(|value| Value::Str(value.clone()))
        }
    }
}

fn many_values(matches: &ArgMatches, id: &str, primitive: Primitive) -> Option<Vec<Value>> {
    if matches.value_source(id) != Some(ValueSource::CommandLine) {
        return None;
    }
    let values = match primitive {
        Primitive::Bool => matches
            .get_many::<bool>(id)
            .map(|values| values.map(|value| Value::Bool(*value)).collect()),
        Primitive::Int => matches
            .get_many::<i64>(id)
            .map(|values| values.map(|value| Value::Int(*value)).collect()),
        Primitive::Float => matches
            .get_many::<f64>(id)
            .map(|values| values.map(|value| Value::Float(*value)).collect()),
        Primitive::Str | Primitive::Any => matches
            .get_many::<String>(id)
            .map(|values| values.map(|value| Value::Str(value.clone())).collect()),
    };
    Some(values.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_flags_follow_field_names() {
        assert_eq!(default_flag("x"), "-x");
        assert_eq!(default_flag("max_depth"), "--max-depth");
    }

    #[test]
    fn nested_ids_are_dotted() {
        assert_eq!(arg_id("", "port"), "port");
        assert_eq!(arg_id("server", "port"), "server.port");
    }
}
