//! Stable ordering of documents by a key.

use async_trait::async_trait;
use futures::future::try_join_all;

use super::{Module, ModuleError};
use crate::config::Config;
use crate::document::Document;
use crate::execute::ExecutionContext;
use crate::meta::Value;

/// Stable sort by a per-document value. Documents with equal keys keep their
/// input order.
pub struct OrderBy {
  key: Config<Value>,
  descending: bool,
}

impl OrderBy {
  pub fn new<T>(key: Config<T>) -> Self
  where
    T: Into<Value> + Clone + Send + Sync + 'static,
  {
    Self {
      key: key.into_value(),
      descending: false,
    }
  }

  /// Order by a metadata key. Documents missing the key sort first.
  pub fn by_key(key: impl Into<String>) -> Self {
    let key = key.into();
    Self::new(Config::from_document_async(move |doc: Document, ctx: ExecutionContext| {
      let key = key.clone();
      async move { Ok::<_, crate::config::ConfigError>(doc.get(&key, &ctx).await?.unwrap_or_default()) }
    }))
  }

  pub fn descending(mut self) -> Self {
    self.descending = true;
    self
  }
}

#[async_trait]
impl Module for OrderBy {
  async fn execute(&self, inputs: Vec<Document>, context: &ExecutionContext) -> Result<Vec<Document>, ModuleError> {
    let keys = try_join_all(inputs.iter().map(|doc| async move {
      self
        .key
        .get_value(Some(doc), context)
        .await
        .map_err(|e| ModuleError::from(e).for_document(doc.id()))
    }))
    .await?;

    let mut keyed: Vec<(Value, Document)> = keys.into_iter().zip(inputs).collect();
    keyed.sort_by(|(a, _), (b, _)| {
      let ord = a.compare(b);
      if self.descending { ord.reverse() } else { ord }
    });

    Ok(keyed.into_iter().map(|(_, doc)| doc).collect())
  }
}
