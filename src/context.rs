use std::collections::HashMap;

use derive_more::From;
use serde::{Deserialize, Serialize};

/// Type alias for a HashMap representing the key-value context of a visitor.
///
/// Keys are strings naming a context attribute.
///
/// # Examples
/// ```
/// # use flagship::{Context, ContextValue};
/// let context = [
///     ("age".to_owned(), 30.0.into()),
///     ("is_vip".to_owned(), true.into()),
///     ("plan".to_owned(), "premium".into()),
/// ].into_iter().collect::<Context>();
/// ```
pub type Context = HashMap<String, ContextValue>;

/// Enum representing possible values of a visitor context attribute.
///
/// Only booleans, strings, and numbers are accepted; any other shape is rejected at the type
/// level rather than at runtime.
///
/// Conveniently implements `From` conversions for `String`, `&str`, `f64`, and `bool` types.
///
/// Examples:
/// ```
/// # use flagship::ContextValue;
/// let string_value: ContextValue = "example".into();
/// let number_value: ContextValue = 42.0.into();
/// let bool_value: ContextValue = true.into();
/// ```
#[derive(Debug, Serialize, Deserialize, PartialEq, PartialOrd, From, Clone)]
#[serde(untagged)]
pub enum ContextValue {
    /// A string value.
    String(String),
    /// A numerical value.
    Number(f64),
    /// A boolean value.
    Boolean(bool),
}

impl ContextValue {
    /// Return the string content if this value is a string.
    pub fn as_str(&self) -> Option<&str> {
        if let ContextValue::String(s) = self {
            Some(s.as_str())
        } else {
            None
        }
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}
