//! Setting a metadata value on every document.

use async_trait::async_trait;

use super::{Module, ModuleError, for_each_document};
use crate::config::Config;
use crate::document::Document;
use crate::execute::ExecutionContext;
use crate::meta::Value;

/// Sets a metadata key on every document.
///
/// By default the value is evaluated once per document when the module runs.
/// With [`SetMetadata::deferred`] the config itself is stored and evaluated
/// on every read of the key instead.
pub struct SetMetadata {
  key: String,
  value: Config<Value>,
  deferred: bool,
}

impl SetMetadata {
  pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
    Self::from_config(key, Config::constant(value.into()))
  }

  pub fn from_config<T>(key: impl Into<String>, value: Config<T>) -> Self
  where
    T: Into<Value> + Clone + Send + Sync + 'static,
  {
    Self {
      key: key.into(),
      value: value.into_value(),
      deferred: false,
    }
  }

  /// Store the config instead of its result.
  pub fn deferred(mut self) -> Self {
    self.deferred = true;
    self
  }
}

#[async_trait]
impl Module for SetMetadata {
  fn validate(&self) -> Result<(), String> {
    if self.key.is_empty() {
      return Err("metadata key must not be empty".to_string());
    }
    Ok(())
  }

  async fn execute(&self, inputs: Vec<Document>, context: &ExecutionContext) -> Result<Vec<Document>, ModuleError> {
    if self.deferred {
      let stored = Value::deferred(self.value.clone());
      return Ok(
        inputs
          .into_iter()
          .map(|doc| doc.clone_with([(self.key.clone(), stored.clone())], None))
          .collect(),
      );
    }

    let key = self.key.clone();
    let value = self.value.clone();
    for_each_document(inputs, context, move |doc, ctx| {
      let key = key.clone();
      let value = value.clone();
      async move {
        let resolved = value.get_value(Some(&doc), &ctx).await?;
        Ok::<_, ModuleError>(doc.clone_with([(key, resolved)], None))
      }
    })
    .await
  }
}
