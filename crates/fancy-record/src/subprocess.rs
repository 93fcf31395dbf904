//! Argument lists for external programs, built from record fields.

use std::process::{Command, ExitStatus, Output};

use tracing::debug;

use crate::convert::{EncodeOptions, encode_data};
use crate::data::{Data, RecordData};
use crate::error::{Error, Result};
use crate::registry::{FieldSpec, RecordSchema};
use crate::shape::{Primitive, TypeShape};
use crate::Record;

/// Renders a record as a command line and runs it.
///
/// The executable is the class `exec` option, or else the value of the field marked
/// `exec`. Every other field becomes arguments in declaration order:
///
/// - `bool` fields emit their flag only when true;
/// - lists emit the flag once, followed by every item, and nothing when empty;
/// - null values, `subprocess_exclude` fields and fields with an empty `args` list emit nothing;
/// - a field whose first `args` entry has no leading dash is positional and emits only its value;
/// - nested records contribute their own field arguments.
pub trait SubprocessRecord: Record {
    fn get_executable(&self) -> Result<Option<String>> {
        let schema = Self::schema()?;
        if let Some(exec) = &schema.settings.exec {
            return Ok(Some(exec.clone()));
        }
        let Some(field) = schema.fields.iter().find(|field| field.settings.exec) else {
            return Ok(None);
        };
        let mut record = self.to_data().into_record(schema.record)?;
        match record.take(field.name)? {
            Data::Str(exec) => Ok(Some(exec)),
            Data::Null => Ok(None),
            other => Err(Error::Subprocess(format!(
                "executable field `{}` holds a {}, not a string",
                field.name,
                other.kind()
            ))),
        }
    }

    /// Full command line, executable first. With `suppress_defaults`, fields equal to
    /// their default are left out.
    fn get_args(&self, suppress_defaults: bool) -> Result<Vec<String>> {
        let schema = Self::schema()?;
        let Some(executable) = self.get_executable()? else {
            return Err(Error::Subprocess(format!(
                "no executable identified for `{}`",
                schema.name
            )));
        };
        let mut args = vec![executable];
        let record = self.to_data().into_record(schema.record)?;
        push_record_args(schema, record, suppress_defaults, &mut args)?;
        Ok(args)
    }

    /// [`Command`] for [`SubprocessRecord::get_args`], ready for further configuration.
    fn command(&self) -> Result<Command> {
        let args = self.get_args(false)?;
        let mut command = Command::new(&args[0]);
        command.args(&args[1..]);
        Ok(command)
    }

    /// Runs the program with inherited stdio and waits for it to exit.
    fn run_subprocess(&self) -> Result<ExitStatus> {
        let mut command = self.command()?;
        debug!(program = ?command.get_program(), "running subprocess");
        Ok(command.status()?)
    }

    /// Runs the program and captures its output.
    fn run_subprocess_output(&self) -> Result<Output> {
        let mut command = self.command()?;
        debug!(program = ?command.get_program(), "running subprocess");
        Ok(command.output()?)
    }
}

impl<T: Record> SubprocessRecord for T {}

fn push_record_args(
    schema: &RecordSchema,
    mut record: RecordData,
    suppress_defaults: bool,
    args: &mut Vec<String>,
) -> Result<()> {
    for field in &schema.fields {
        let data = record.take(field.name)?;
        if field.settings.exec || field.settings.subprocess_exclude || data.is_null() {
            continue;
        }
        if let TypeShape::Record(nested) = field.shape.required() {
            let nested_record = data.into_record(*nested)?;
            push_record_args(nested.schema()?, nested_record, suppress_defaults, args)?;
            continue;
        }
        if suppress_defaults && field.default_data().is_some_and(|default| default == data) {
            continue;
        }
        push_field_args(field, data, args)?;
    }
    Ok(())
}

fn push_field_args(field: &FieldSpec, data: Data, args: &mut Vec<String>) -> Result<()> {
    let flag = match field.settings.args.as_deref() {
        Some([]) => return Ok(()),
        Some([first, ..]) if first.starts_with('-') => Some(first.clone()),
        Some(_) => None,
        None if field.name.chars().count() == 1 => Some(format!("-{}", field.name)),
        None => Some(format!("--{}", field.name.replace('_', "-"))),
    };

    match (field.shape.required(), data) {
        (TypeShape::Primitive(Primitive::Bool), Data::Bool(set)) => {
            if set && let Some(flag) = flag {
                args.push(flag);
            }
        }
        (_, Data::List(items)) => {
            if items.is_empty() {
                return Ok(());
            }
            args.extend(flag);
            for item in items {
                args.push(render(item)?);
            }
        }
        (_, data) => {
            args.extend(flag);
            args.push(render(data)?);
        }
    }
    Ok(())
}

/// Scalars render bare; anything structured renders as JSON.
fn render(data: Data) -> Result<String> {
    Ok(encode_data(data, EncodeOptions::default())?.to_string())
}
