//! Layered, immutable metadata.
//!
//! A [`Metadata`] is a persistent map: every "write" produces a new layer
//! whose parent is the previous snapshot, so existing holders never observe
//! a change. Lookups walk the chain from the newest layer to the root and
//! stop at the first hit.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::convert::FromValue;
use super::value::Value;
use crate::config::{ConfigError, ConfigResult};
use crate::document::Document;
use crate::execute::ExecutionContext;

struct Layer {
  /// Insertion-ordered items; keys are unique within a layer.
  items: Vec<(String, Value)>,
  parent: Option<Arc<Layer>>,
}

impl Layer {
  fn get(&self, key: &str) -> Option<&Value> {
    self.items.iter().find(|(k, _)| k == key).map(|(_, v)| v)
  }
}

/// An immutable chain of metadata layers.
#[derive(Clone, Default)]
pub struct Metadata {
  top: Option<Arc<Layer>>,
}

impl Metadata {
  /// Create empty metadata.
  pub fn new() -> Self {
    Self::default()
  }

  /// Create single-layer metadata from key/value pairs.
  pub fn from_items<I, K, V>(items: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
  {
    Self::new().with_layer(items)
  }

  /// Return new metadata with `items` layered over this snapshot.
  ///
  /// Later duplicates within `items` replace earlier ones. An empty set of
  /// additions returns this snapshot unchanged rather than an empty layer.
  pub fn with_layer<I, K, V>(&self, items: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
  {
    let mut collected: Vec<(String, Value)> = Vec::new();
    for (key, value) in items {
      let key = key.into();
      let value = value.into();
      match collected.iter_mut().find(|(existing, _)| *existing == key) {
        Some(slot) => slot.1 = value,
        None => collected.push((key, value)),
      }
    }

    if collected.is_empty() {
      return self.clone();
    }

    Self {
      top: Some(Arc::new(Layer {
        items: collected,
        parent: self.top.clone(),
      })),
    }
  }

  /// Layers from newest to oldest.
  fn layers(&self) -> impl Iterator<Item = &Layer> {
    std::iter::successors(self.top.as_deref(), |layer| layer.parent.as_deref())
  }

  /// The snapshot this one was layered over, if any.
  pub fn parent(&self) -> Option<Metadata> {
    self.top.as_ref().map(|layer| Metadata {
      top: layer.parent.clone(),
    })
  }

  /// Number of layers in the chain.
  pub fn depth(&self) -> usize {
    self.layers().count()
  }

  /// Look up a stored value without resolving deferred values.
  pub fn get_raw(&self, key: &str) -> Option<&Value> {
    self.layers().find_map(|layer| layer.get(key))
  }

  pub fn contains_key(&self, key: &str) -> bool {
    self.get_raw(key).is_some()
  }

  /// Distinct keys in first-insertion order across the chain.
  pub fn keys(&self) -> Vec<&str> {
    let layers: Vec<&Layer> = self.layers().collect();
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for layer in layers.into_iter().rev() {
      for (key, _) in &layer.items {
        if seen.insert(key.as_str()) {
          keys.push(key.as_str());
        }
      }
    }
    keys
  }

  /// Effective key/value pairs, with newer layers shadowing older ones.
  pub fn entries(&self) -> Vec<(String, Value)> {
    self
      .keys()
      .into_iter()
      .filter_map(|key| self.get_raw(key).map(|value| (key.to_string(), value.clone())))
      .collect()
  }

  pub fn len(&self) -> usize {
    self.keys().len()
  }

  pub fn is_empty(&self) -> bool {
    self.top.is_none()
  }

  /// Look up a value, resolving a deferred value against `document` and
  /// `context`.
  ///
  /// Deferred values are evaluated on every call; nothing is cached.
  pub async fn get(
    &self,
    key: &str,
    document: Option<&Document>,
    context: &ExecutionContext,
  ) -> ConfigResult<Option<Value>> {
    match self.get_raw(key) {
      Some(value) => resolve(value.clone(), document, context).await.map(Some),
      None => Ok(None),
    }
  }

  /// Look up and convert a value. Missing keys yield `Ok(None)`.
  pub async fn get_as<T: FromValue>(
    &self,
    key: &str,
    document: Option<&Document>,
    context: &ExecutionContext,
  ) -> ConfigResult<Option<T>> {
    match self.get(key, document, context).await? {
      Some(value) => T::from_value(value)
        .map(Some)
        .map_err(|source| ConfigError::KeyConversion {
          key: key.to_string(),
          source,
        }),
      None => Ok(None),
    }
  }

  /// Convert a stored value without resolving it.
  ///
  /// Fails with a conversion error if the stored value is deferred.
  pub fn get_raw_as<T: FromValue>(&self, key: &str) -> ConfigResult<Option<T>> {
    match self.get_raw(key) {
      Some(value) => T::from_value(value.clone())
        .map(Some)
        .map_err(|source| ConfigError::KeyConversion {
          key: key.to_string(),
          source,
        }),
      None => Ok(None),
    }
  }

  /// Resolve every deferred value once and flatten the chain into a single
  /// layer.
  pub async fn materialize(&self, document: Option<&Document>, context: &ExecutionContext) -> ConfigResult<Metadata> {
    let mut resolved = Vec::new();
    for (key, value) in self.entries() {
      resolved.push((key, resolve(value, document, context).await?));
    }
    Ok(Metadata::from_items(resolved))
  }
}

/// Resolve a value until it is no longer deferred.
pub async fn resolve(value: Value, document: Option<&Document>, context: &ExecutionContext) -> ConfigResult<Value> {
  let mut value = value;
  loop {
    match value {
      Value::Deferred(config) => value = config.get_value(document, context).await?,
      other => return Ok(other),
    }
  }
}

impl fmt::Debug for Metadata {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_map().entries(self.entries()).finish()
  }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Metadata {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Metadata::from_items(iter)
  }
}
