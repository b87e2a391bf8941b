//! Filtering documents with a predicate.

use async_trait::async_trait;

use super::{Module, ModuleError, for_each_document};
use crate::config::Config;
use crate::document::Document;
use crate::execute::ExecutionContext;

/// Keeps the documents for which a predicate holds, in input order.
pub struct FilterDocuments {
  predicate: Config<bool>,
}

impl FilterDocuments {
  pub fn new(predicate: impl Into<Config<bool>>) -> Self {
    Self {
      predicate: predicate.into(),
    }
  }
}

#[async_trait]
impl Module for FilterDocuments {
  async fn execute(&self, inputs: Vec<Document>, context: &ExecutionContext) -> Result<Vec<Document>, ModuleError> {
    let predicate = self.predicate.clone();
    let kept = for_each_document(inputs, context, move |doc, ctx| {
      let predicate = predicate.clone();
      async move {
        let keep = predicate.get_value(Some(&doc), &ctx).await?;
        Ok::<_, ModuleError>(keep.then_some(doc))
      }
    })
    .await?;
    Ok(kept.into_iter().flatten().collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::document::Content;
  use crate::pipeline::Phase;

  #[tokio::test]
  async fn keeps_matching_documents_in_order() {
    let ctx = ExecutionContext::standalone("test", Phase::Process);
    let inputs: Vec<_> = (0..6).map(|i| Document::from_items([("i", i)], Content::empty())).collect();
    let module = FilterDocuments::new(Config::from_document(|doc, _| {
      Ok(doc.metadata().get_raw_as::<i64>("i")?.unwrap_or(0) % 2 == 0)
    }));

    let out = module.execute(inputs, &ctx).await.unwrap();
    let kept: Vec<_> = out.iter().filter_map(|d| d.metadata().get_raw_as::<i64>("i").ok().flatten()).collect();
    assert_eq!(kept, vec![0, 2, 4]);
  }

  #[tokio::test]
  async fn constant_predicate() {
    let ctx = ExecutionContext::standalone("test", Phase::Process);
    let out = FilterDocuments::new(false).execute(vec![Document::new()], &ctx).await.unwrap();
    assert!(out.is_empty());
  }
}
