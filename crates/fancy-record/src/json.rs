//! JSON text on top of the mapping representation.

use std::io::{Read, Write};

use crate::error::{ConversionError, Result};
use crate::value::Value;
use crate::Record;

/// JSON rendering and parsing for every [`Record`].
pub trait JsonRecord: Record {
    fn to_json_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::Value::from(Value::Map(self.to_mapping()?)))
    }

    fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(&Value::Map(self.to_mapping()?))?)
    }

    fn to_json_string_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&Value::Map(self.to_mapping()?))?)
    }

    fn to_json_writer<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer(writer, &Value::Map(self.to_mapping()?))?;
        Ok(())
    }

    fn from_json_value(value: serde_json::Value) -> Result<Self> {
        match Value::from(value) {
            Value::Map(mapping) => Ok(Self::from_mapping(&mapping)?),
            other => Err(ConversionError::type_mismatch("JSON object", other.kind()).into()),
        }
    }

    fn from_json_str(text: &str) -> Result<Self> {
        Self::from_json_value(serde_json::from_str(text)?)
    }

    fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        Self::from_json_value(serde_json::from_reader(reader)?)
    }
}

impl<T: Record> JsonRecord for T {}
