use crate::{error::PropertyError, Symbol};

/// Primitive type of a node property, used to convert XML attribute text.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PropertyType {
    String,
    Int,
    Long,
    Double,
    Bool,
    /// Any other type. The attribute text is handed over unconverted.
    Raw,
}

/// One entry of a node type's property schema.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct PropertySpec {
    pub ty: PropertyType,
    pub key: Symbol,
}

impl PropertySpec {
    pub fn new(key: impl Into<Symbol>, ty: PropertyType) -> Self {
        Self {
            ty,
            key: key.into(),
        }
    }

    pub fn string(key: impl Into<Symbol>) -> Self {
        Self::new(key, PropertyType::String)
    }

    pub fn int(key: impl Into<Symbol>) -> Self {
        Self::new(key, PropertyType::Int)
    }

    pub fn long(key: impl Into<Symbol>) -> Self {
        Self::new(key, PropertyType::Long)
    }

    pub fn double(key: impl Into<Symbol>) -> Self {
        Self::new(key, PropertyType::Double)
    }

    pub fn bool(key: impl Into<Symbol>) -> Self {
        Self::new(key, PropertyType::Bool)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum PropertyValue {
    String(String),
    Int(i32),
    Long(i64),
    Double(f64),
    Bool(bool),
}

impl PropertyValue {
    /// Converts attribute text to the property's primitive type.
    pub fn parse(spec: &PropertySpec, text: &str) -> Result<Self, PropertyError> {
        let err = || PropertyError {
            key: spec.key.to_string(),
            ty: spec.ty,
            value: text.to_owned(),
        };
        Ok(match spec.ty {
            PropertyType::String | PropertyType::Raw => Self::String(text.to_owned()),
            PropertyType::Int => Self::Int(text.trim().parse().map_err(|_| err())?),
            PropertyType::Long => Self::Long(text.trim().parse().map_err(|_| err())?),
            PropertyType::Double => Self::Double(text.trim().parse().map_err(|_| err())?),
            PropertyType::Bool => Self::Bool(parse_bool(text).ok_or_else(err)?),
        })
    }
}

/// Case-insensitive `true`/`false`, surrounding whitespace allowed.
pub(crate) fn parse_bool(text: &str) -> Option<bool> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// `timeout-ms` -> `TimeoutMs`, `max_retries` -> `MaxRetries`, `Count` -> `Count`.
pub fn to_pascal_case(input: &str) -> String {
    input
        .split(|c| c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
