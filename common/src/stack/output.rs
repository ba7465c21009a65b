use super::Target;
use serde_json::Value;

/// Where an exported value comes from
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Producer {
    pub(crate) stack: String,
    pub(crate) target: Target,
    pub(crate) export: String,
}

/// A value one stack publishes for others
///
/// Resolving an output from another stack yields an import of its export and
/// records the dependency on the producing stack. Literal outputs carry
/// values known at declaration time and never create dependencies
#[derive(Clone, Debug, PartialEq)]
pub struct Output {
    pub(crate) value: Value,
    pub(crate) producer: Option<Producer>,
}

impl Output {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            producer: None,
        }
    }
}
