//! Grouping documents by one or more keys.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::debug;

use super::{Module, ModuleError};
use crate::config::{Config, ConfigError};
use crate::consts::{GROUP_DOCUMENTS, GROUP_KEY};
use crate::document::{Content, Document};
use crate::execute::ExecutionContext;
use crate::meta::Value;

/// Equality used to decide whether two group keys are the same.
pub trait KeyComparer: Send + Sync + fmt::Debug {
  fn equals(&self, a: &Value, b: &Value) -> bool;
}

/// Exact equality: `"a"` and `"A"` differ, and so do `"1"` and `1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ordinal;

impl KeyComparer for Ordinal {
  fn equals(&self, a: &Value, b: &Value) -> bool {
    a == b
  }
}

/// Scalar keys compare by their text ignoring case, so `1` and `"1"` match
/// as do `"a"` and `"A"`. Other values compare exactly.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseInsensitive;

impl KeyComparer for CaseInsensitive {
  fn equals(&self, a: &Value, b: &Value) -> bool {
    match (scalar_text(a), scalar_text(b)) {
      (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
      _ => a == b,
    }
  }
}

fn scalar_text(value: &Value) -> Option<String> {
  match value {
    Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_) => Some(value.to_string()),
    _ => None,
  }
}

/// Groups documents by one or more keys per document.
///
/// Emits one document per distinct key, in first-seen key order. Each group
/// document has the key under [`GROUP_KEY`] and the contributing documents,
/// in input order, under [`GROUP_DOCUMENTS`]. A document yielding several
/// keys joins several groups. Documents yielding no keys are dropped.
pub struct GroupByMany {
  keys: Config<Vec<Value>>,
  filter: Option<Config<bool>>,
  comparer: Arc<dyn KeyComparer>,
}

impl GroupByMany {
  /// Group by the value(s) of `keys`, evaluated per document.
  pub fn new<T>(keys: Config<T>) -> Self
  where
    T: Into<Value> + Clone + Send + Sync + 'static,
  {
    Self {
      keys: keys.into_values(),
      filter: None,
      comparer: Arc::new(Ordinal),
    }
  }

  /// Group by the value(s) stored under a metadata key.
  pub fn by_key(key: impl Into<String>) -> Self {
    let key = key.into();
    Self::new(Config::from_document_async(move |doc: Document, ctx: ExecutionContext| {
      let key = key.clone();
      async move { Ok::<_, ConfigError>(doc.get(&key, &ctx).await?.unwrap_or_default()) }
    }))
  }

  /// Only group documents for which `predicate` is true.
  pub fn filter(mut self, predicate: Config<bool>) -> Self {
    self.filter = Some(predicate);
    self
  }

  pub fn with_comparer(mut self, comparer: impl KeyComparer + 'static) -> Self {
    self.comparer = Arc::new(comparer);
    self
  }
}

struct Group {
  key: Value,
  members: Vec<Document>,
}

#[async_trait]
impl Module for GroupByMany {
  async fn execute(&self, inputs: Vec<Document>, context: &ExecutionContext) -> Result<Vec<Document>, ModuleError> {
    if inputs.is_empty() {
      return Ok(Vec::new());
    }

    let selector = self
      .keys
      .clone()
      .zip(self.filter.clone().unwrap_or(Config::Constant(true)));

    let selected = try_join_all(inputs.iter().map(|doc| {
      let selector = &selector;
      async move {
        selector
          .get_value(Some(doc), context)
          .await
          .map_err(|e| ModuleError::from(e).for_document(doc.id()))
      }
    }))
    .await?;

    let mut groups: Vec<Group> = Vec::new();
    for (doc, (keys, included)) in inputs.iter().zip(selected) {
      if !included {
        continue;
      }

      let mut seen: Vec<&Value> = Vec::new();
      for key in keys.iter().filter(|k| !k.is_null()) {
        if seen.iter().any(|s| self.comparer.equals(s, key)) {
          continue;
        }
        seen.push(key);

        match groups.iter_mut().find(|g| self.comparer.equals(&g.key, key)) {
          Some(group) => group.members.push(doc.clone()),
          None => groups.push(Group {
            key: key.clone(),
            members: vec![doc.clone()],
          }),
        }
      }
    }

    debug!(
      pipeline = context.pipeline(),
      inputs = inputs.len(),
      groups = groups.len(),
      "grouped documents"
    );

    Ok(
      groups
        .into_iter()
        .map(|group| {
          context.new_document(
            [
              (GROUP_KEY, group.key),
              (GROUP_DOCUMENTS, Value::from(group.members)),
            ],
            Content::empty(),
          )
        })
        .collect(),
    )
  }
}
