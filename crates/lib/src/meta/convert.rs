//! Conversion of metadata values into concrete Rust types.
//!
//! The conversion policy is total and explicit:
//! - numbers widen (`Int` converts to `f64`), and floats with no fractional
//!   part narrow to integers when they fit
//! - strings parse into primitives (`"42"` converts to `i64`)
//! - a one-element list converts as its only element (boxed-sequence
//!   flattening), and a scalar converts into a one-element `Vec`
//! - `Null` converts to `None` for `Option<T>` and to an empty `Vec`
//!
//! Anything else fails with a [`ConversionError`]; no silent defaults.

use thiserror::Error;

use super::value::Value;
use crate::document::Document;

/// A value could not be converted to the requested type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot convert {from} value `{value}` to {to}")]
pub struct ConversionError {
  pub from: &'static str,
  pub to: &'static str,
  pub value: String,
}

impl ConversionError {
  pub fn new(value: &Value, to: &'static str) -> Self {
    Self {
      from: value.type_name(),
      to,
      value: value.to_string(),
    }
  }
}

/// Types that can be produced from a metadata [`Value`].
pub trait FromValue: Sized {
  fn from_value(value: Value) -> Result<Self, ConversionError>;
}

/// Unwrap a one-element list to its element.
fn unbox(value: Value) -> Value {
  match value {
    Value::List(mut items) if items.len() == 1 => items.remove(0),
    other => other,
  }
}

impl FromValue for Value {
  fn from_value(value: Value) -> Result<Self, ConversionError> {
    Ok(value)
  }
}

impl FromValue for bool {
  fn from_value(value: Value) -> Result<Self, ConversionError> {
    match unbox(value) {
      Value::Bool(b) => Ok(b),
      Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Ok(true),
      Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Ok(false),
      other => Err(ConversionError::new(&other, "bool")),
    }
  }
}

impl FromValue for i64 {
  fn from_value(value: Value) -> Result<Self, ConversionError> {
    match unbox(value) {
      Value::Int(i) => Ok(i),
      Value::Float(x) if x.fract() == 0.0 && x >= i64::MIN as f64 && x < i64::MAX as f64 => Ok(x as i64),
      Value::String(s) => s
        .trim()
        .parse::<i64>()
        .map_err(|_| ConversionError::new(&Value::String(s.clone()), "i64")),
      other => Err(ConversionError::new(&other, "i64")),
    }
  }
}

macro_rules! narrow_int {
  ($($ty:ty),*) => {
    $(
      impl FromValue for $ty {
        fn from_value(value: Value) -> Result<Self, ConversionError> {
          let shown = value.clone();
          let wide = i64::from_value(value).map_err(|e| ConversionError { to: stringify!($ty), ..e })?;
          <$ty>::try_from(wide).map_err(|_| ConversionError::new(&shown, stringify!($ty)))
        }
      }
    )*
  };
}

narrow_int!(i32, u32, u64, usize);

impl FromValue for f64 {
  fn from_value(value: Value) -> Result<Self, ConversionError> {
    match unbox(value) {
      Value::Float(x) => Ok(x),
      Value::Int(i) => Ok(i as f64),
      Value::String(s) => s
        .trim()
        .parse::<f64>()
        .map_err(|_| ConversionError::new(&Value::String(s.clone()), "f64")),
      other => Err(ConversionError::new(&other, "f64")),
    }
  }
}

impl FromValue for String {
  fn from_value(value: Value) -> Result<Self, ConversionError> {
    match unbox(value) {
      Value::String(s) => Ok(s),
      scalar @ (Value::Bool(_) | Value::Int(_) | Value::Float(_)) => Ok(scalar.to_string()),
      other => Err(ConversionError::new(&other, "string")),
    }
  }
}

impl FromValue for Document {
  fn from_value(value: Value) -> Result<Self, ConversionError> {
    match unbox(value) {
      Value::Document(doc) => Ok(doc),
      other => Err(ConversionError::new(&other, "document")),
    }
  }
}

impl<T: FromValue> FromValue for Option<T> {
  fn from_value(value: Value) -> Result<Self, ConversionError> {
    match value {
      Value::Null => Ok(None),
      other => T::from_value(other).map(Some),
    }
  }
}

impl<T: FromValue> FromValue for Vec<T> {
  fn from_value(value: Value) -> Result<Self, ConversionError> {
    match value {
      Value::Deferred(_) => Err(ConversionError::new(&value, "list")),
      other => other.into_values().into_iter().map(T::from_value).collect(),
    }
  }
}
