//! Modules that produce documents from configuration.

use async_trait::async_trait;

use super::{Module, ModuleError, for_each_document};
use crate::config::{Config, ContextConfig};
use crate::document::Document;
use crate::execute::ExecutionContext;

/// Replaces each input with the documents a config produces for it.
///
/// Inputs are processed concurrently; outputs keep input order.
pub struct ExecuteDocuments {
  produce: Config<Vec<Document>>,
}

impl ExecuteDocuments {
  pub fn new(produce: Config<Vec<Document>>) -> Self {
    Self { produce }
  }
}

#[async_trait]
impl Module for ExecuteDocuments {
  async fn execute(&self, inputs: Vec<Document>, context: &ExecutionContext) -> Result<Vec<Document>, ModuleError> {
    let produce = self.produce.clone();
    let nested = for_each_document(inputs, context, move |doc, ctx| {
      let produce = produce.clone();
      async move { Ok::<_, ModuleError>(produce.get_value(Some(&doc), &ctx).await?) }
    })
    .await?;
    Ok(nested.into_iter().flatten().collect())
  }
}

/// Produces documents from the execution context, ignoring its inputs.
///
/// Used to seed a pipeline in the Input phase, where no document exists to
/// evaluate against.
pub struct CreateDocuments {
  produce: ContextConfig<Vec<Document>>,
}

impl CreateDocuments {
  pub fn new(produce: impl Into<ContextConfig<Vec<Document>>>) -> Self {
    Self {
      produce: produce.into(),
    }
  }
}

#[async_trait]
impl Module for CreateDocuments {
  async fn execute(&self, _inputs: Vec<Document>, context: &ExecutionContext) -> Result<Vec<Document>, ModuleError> {
    Ok(self.produce.get_value(context).await?)
  }
}
