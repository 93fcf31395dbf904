//! Option-only parents for `#[record(extends(...))]`.

use std::sync::LazyLock;

use crate::declare::{Declaration, Declared};

/// Stores the module-qualified type name under `"type"`, so subtypes and union variants
/// can be told apart when decoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBase;

impl Declared for JsonBase {
    fn declaration() -> &'static Declaration {
        static DECLARATION: LazyLock<Declaration> = LazyLock::new(|| {
            Declaration::mixin("JsonBase", concat!(module_path!(), "::JsonBase"))
                .option("store_type", "qualname")
        });
        &DECLARATION
    }
}

/// Writes every field to TOML, including those equal to their default.
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlBase;

impl Declared for TomlBase {
    fn declaration() -> &'static Declaration {
        static DECLARATION: LazyLock<Declaration> = LazyLock::new(|| {
            Declaration::mixin("TomlBase", concat!(module_path!(), "::TomlBase"))
                .option("suppress_defaults", false)
        });
        &DECLARATION
    }
}

/// Configuration records: every field is written out, defaults included.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigBase;

impl Declared for ConfigBase {
    fn declaration() -> &'static Declaration {
        static DECLARATION: LazyLock<Declaration> = LazyLock::new(|| {
            Declaration::mixin("ConfigBase", concat!(module_path!(), "::ConfigBase"))
                .option("suppress_defaults", false)
        });
        &DECLARATION
    }
}
