//! Dynamically typed metadata values.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::Config;
use crate::document::Document;

/// A metadata value.
///
/// Values are immutable and cheap to clone: documents and deferred configs
/// are reference counted, so a list of documents stored under a group key
/// references its members rather than copying them.
#[derive(Clone, Default)]
pub enum Value {
  #[default]
  Null,
  Bool(bool),
  Int(i64),
  Float(f64),
  String(String),
  List(Vec<Value>),
  Map(BTreeMap<String, Value>),
  /// A reference to another document.
  Document(Document),
  /// A value computed on every read against the current document and context.
  Deferred(Arc<Config<Value>>),
}

impl Value {
  /// Wrap a config so it is evaluated each time the value is read.
  pub fn deferred(config: Config<Value>) -> Self {
    Value::Deferred(Arc::new(config))
  }

  /// Name of the variant, used in conversion errors.
  pub fn type_name(&self) -> &'static str {
    match self {
      Value::Null => "null",
      Value::Bool(_) => "bool",
      Value::Int(_) => "int",
      Value::Float(_) => "float",
      Value::String(_) => "string",
      Value::List(_) => "list",
      Value::Map(_) => "map",
      Value::Document(_) => "document",
      Value::Deferred(_) => "deferred",
    }
  }

  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }

  pub fn is_deferred(&self) -> bool {
    matches!(self, Value::Deferred(_))
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_document(&self) -> Option<&Document> {
    match self {
      Value::Document(doc) => Some(doc),
      _ => None,
    }
  }

  /// Collect the documents referenced by a list value.
  ///
  /// Returns `None` unless the value is a list made only of documents.
  pub fn as_documents(&self) -> Option<Vec<Document>> {
    match self {
      Value::List(items) => items.iter().map(|item| item.as_document().cloned()).collect(),
      Value::Document(doc) => Some(vec![doc.clone()]),
      _ => None,
    }
  }

  /// Adapt a value into a sequence.
  ///
  /// Lists are flattened one level, `Null` yields no values, and anything
  /// else becomes a one-element sequence.
  pub fn into_values(self) -> Vec<Value> {
    match self {
      Value::Null => Vec::new(),
      Value::List(items) => items,
      other => vec![other],
    }
  }

  /// Total ordering used by sorting modules.
  ///
  /// Numbers compare numerically across `Int` and `Float`; values of
  /// different kinds order by kind.
  pub fn compare(&self, other: &Value) -> Ordering {
    match (self, other) {
      (Value::Int(a), Value::Int(b)) => a.cmp(b),
      (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
      (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
      (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
      (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
      (Value::String(a), Value::String(b)) => a.cmp(b),
      (Value::List(a), Value::List(b)) => {
        for (left, right) in a.iter().zip(b.iter()) {
          let ord = left.compare(right);
          if ord != Ordering::Equal {
            return ord;
          }
        }
        a.len().cmp(&b.len())
      }
      (Value::Document(a), Value::Document(b)) => a.id().cmp(&b.id()),
      _ => self.rank().cmp(&other.rank()),
    }
  }

  fn rank(&self) -> u8 {
    match self {
      Value::Null => 0,
      Value::Bool(_) => 1,
      Value::Int(_) | Value::Float(_) => 2,
      Value::String(_) => 3,
      Value::List(_) => 4,
      Value::Map(_) => 5,
      Value::Document(_) => 6,
      Value::Deferred(_) => 7,
    }
  }
}

impl PartialEq for Value {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Value::Null, Value::Null) => true,
      (Value::Bool(a), Value::Bool(b)) => a == b,
      (Value::Int(a), Value::Int(b)) => a == b,
      (Value::Float(a), Value::Float(b)) => a == b,
      (Value::String(a), Value::String(b)) => a == b,
      (Value::List(a), Value::List(b)) => a == b,
      (Value::Map(a), Value::Map(b)) => a == b,
      (Value::Document(a), Value::Document(b)) => Document::ptr_eq(a, b),
      (Value::Deferred(a), Value::Deferred(b)) => Arc::ptr_eq(a, b),
      _ => false,
    }
  }
}

impl fmt::Debug for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Null => write!(f, "Null"),
      Value::Bool(b) => write!(f, "Bool({b})"),
      Value::Int(i) => write!(f, "Int({i})"),
      Value::Float(x) => write!(f, "Float({x})"),
      Value::String(s) => write!(f, "String({s:?})"),
      Value::List(items) => f.debug_list().entries(items).finish(),
      Value::Map(map) => f.debug_map().entries(map).finish(),
      Value::Document(doc) => write!(f, "Document({})", doc.id()),
      Value::Deferred(_) => write!(f, "Deferred"),
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Null => Ok(()),
      Value::Bool(b) => write!(f, "{b}"),
      Value::Int(i) => write!(f, "{i}"),
      Value::Float(x) => write!(f, "{x}"),
      Value::String(s) => write!(f, "{s}"),
      Value::List(items) => {
        write!(f, "[")?;
        for (i, item) in items.iter().enumerate() {
          if i > 0 {
            write!(f, ", ")?;
          }
          write!(f, "{item}")?;
        }
        write!(f, "]")
      }
      Value::Map(map) => {
        write!(f, "{{")?;
        for (i, (key, value)) in map.iter().enumerate() {
          if i > 0 {
            write!(f, ", ")?;
          }
          write!(f, "{key}: {value}")?;
        }
        write!(f, "}}")
      }
      Value::Document(doc) => write!(f, "{}", doc.id()),
      Value::Deferred(_) => write!(f, "<deferred>"),
    }
  }
}

impl From<bool> for Value {
  fn from(value: bool) -> Self {
    Value::Bool(value)
  }
}

impl From<i32> for Value {
  fn from(value: i32) -> Self {
    Value::Int(value.into())
  }
}

impl From<i64> for Value {
  fn from(value: i64) -> Self {
    Value::Int(value)
  }
}

impl From<u32> for Value {
  fn from(value: u32) -> Self {
    Value::Int(value.into())
  }
}

impl From<u64> for Value {
  fn from(value: u64) -> Self {
    match i64::try_from(value) {
      Ok(i) => Value::Int(i),
      Err(_) => Value::Float(value as f64),
    }
  }
}

impl From<usize> for Value {
  fn from(value: usize) -> Self {
    Value::from(value as u64)
  }
}

impl From<f32> for Value {
  fn from(value: f32) -> Self {
    Value::Float(value.into())
  }
}

impl From<f64> for Value {
  fn from(value: f64) -> Self {
    Value::Float(value)
  }
}

impl From<&str> for Value {
  fn from(value: &str) -> Self {
    Value::String(value.to_string())
  }
}

impl From<String> for Value {
  fn from(value: String) -> Self {
    Value::String(value)
  }
}

impl From<&String> for Value {
  fn from(value: &String) -> Self {
    Value::String(value.clone())
  }
}

impl From<Document> for Value {
  fn from(value: Document) -> Self {
    Value::Document(value)
  }
}

impl From<Config<Value>> for Value {
  fn from(value: Config<Value>) -> Self {
    Value::deferred(value)
  }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
  fn from(values: Vec<T>) -> Self {
    Value::List(values.into_iter().map(Into::into).collect())
  }
}

impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(value: Option<T>) -> Self {
    value.map(Into::into).unwrap_or(Value::Null)
  }
}

impl<T: Into<Value>> From<BTreeMap<String, T>> for Value {
  fn from(map: BTreeMap<String, T>) -> Self {
    Value::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
  }
}

impl From<serde_json::Value> for Value {
  fn from(value: serde_json::Value) -> Self {
    match value {
      serde_json::Value::Null => Value::Null,
      serde_json::Value::Bool(b) => Value::Bool(b),
      serde_json::Value::Number(n) => match n.as_i64() {
        Some(i) => Value::Int(i),
        None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
      },
      serde_json::Value::String(s) => Value::String(s),
      serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
      serde_json::Value::Object(map) => Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
    }
  }
}
