//! Modules: the units of work inside a pipeline phase.
//!
//! A module consumes the ordered documents produced by the previous module
//! (or nothing, for the first module of the Input phase) and produces a new
//! ordered sequence. Modules hold only configuration; all per-run state
//! comes in through the [`ExecutionContext`].

mod filter;
mod front_matter;
mod generate;
mod group;
mod metadata;
mod order;
mod parse;

pub use filter::FilterDocuments;
pub use front_matter::{Delimiter, ExtractFrontMatter, FrontMatterSplit, split_front_matter};
pub use generate::{CreateDocuments, ExecuteDocuments};
pub use group::{CaseInsensitive, GroupByMany, KeyComparer, Ordinal};
pub use metadata::SetMetadata;
pub use order::OrderBy;
pub use parse::{ParseJson, ParseYaml};

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinSet;

use crate::config::ConfigError;
use crate::document::{Document, DocumentId};
use crate::execute::ExecutionContext;

/// Errors raised by a module.
#[derive(Debug, Error)]
pub enum ModuleError {
  /// The failure is attributed to a specific input document.
  #[error("{document}: {source}")]
  Document {
    document: DocumentId,
    #[source]
    source: Box<ModuleError>,
  },

  #[error(transparent)]
  Config(ConfigError),

  #[error("failed to read content: {0}")]
  Content(#[from] std::io::Error),

  #[error("failed to parse {format}: {message}")]
  Parse { format: &'static str, message: String },

  #[error("outputs of pipeline '{pipeline}' are unavailable: {reason}")]
  OutputsUnavailable { pipeline: String, reason: String },

  #[error("cancelled")]
  Cancelled,

  #[error("{0}")]
  Failed(String),
}

impl ModuleError {
  /// Attribute this error to `document`.
  ///
  /// Cancellation and already-attributed errors are returned unchanged.
  pub fn for_document(self, document: DocumentId) -> Self {
    match self {
      ModuleError::Cancelled | ModuleError::Document { .. } => self,
      other => ModuleError::Document {
        document,
        source: Box::new(other),
      },
    }
  }

  pub fn is_cancelled(&self) -> bool {
    match self {
      ModuleError::Cancelled => true,
      ModuleError::Document { source, .. } => source.is_cancelled(),
      _ => false,
    }
  }

  /// The document the failure is attributed to, if any.
  pub fn document(&self) -> Option<DocumentId> {
    match self {
      ModuleError::Document { document, .. } => Some(*document),
      _ => None,
    }
  }
}

impl From<ConfigError> for ModuleError {
  fn from(err: ConfigError) -> Self {
    match err {
      ConfigError::Cancelled => ModuleError::Cancelled,
      other => ModuleError::Config(other),
    }
  }
}

/// A step in a pipeline phase.
#[async_trait]
pub trait Module: Send + Sync {
  /// Name used in logs and error attribution.
  fn name(&self) -> &str {
    let full = std::any::type_name::<Self>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
  }

  /// Check the module's configuration before anything runs.
  fn validate(&self) -> Result<(), String> {
    Ok(())
  }

  async fn execute(&self, inputs: Vec<Document>, context: &ExecutionContext) -> Result<Vec<Document>, ModuleError>;
}

/// Run `func` on every input document concurrently.
///
/// Results are returned in input order. The first failure aborts the
/// remaining tasks and is returned attributed to its document.
pub async fn for_each_document<T, F, Fut>(
  inputs: Vec<Document>,
  context: &ExecutionContext,
  func: F,
) -> Result<Vec<T>, ModuleError>
where
  T: Send + 'static,
  F: Fn(Document, ExecutionContext) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<T, ModuleError>> + Send + 'static,
{
  context.check_cancelled()?;

  let count = inputs.len();
  let func = Arc::new(func);
  let mut join_set = JoinSet::new();

  for (index, doc) in inputs.into_iter().enumerate() {
    let func = Arc::clone(&func);
    let ctx = context.clone();
    join_set.spawn(async move {
      let id = doc.id();
      let result = func(doc, ctx).await.map_err(|e| e.for_document(id));
      (index, result)
    });
  }

  let mut slots: Vec<Option<T>> = (0..count).map(|_| None).collect();
  let cancel = context.cancellation_token();

  loop {
    let joined = tokio::select! {
      biased;
      _ = cancel.cancelled() => return Err(ModuleError::Cancelled),
      joined = join_set.join_next() => joined,
    };

    match joined {
      None => break,
      Some(Ok((index, Ok(value)))) => slots[index] = Some(value),
      Some(Ok((_, Err(err)))) => return Err(err),
      Some(Err(err)) if err.is_panic() => {
        return Err(ModuleError::Failed(format!("document task panicked: {err}")));
      }
      Some(Err(_)) => return Err(ModuleError::Cancelled),
    }
  }

  Ok(slots.into_iter().flatten().collect())
}
