//! Lazily evaluated configuration values.
//!
//! A [`Config<T>`] is one of:
//! - a constant
//! - a function of the execution context
//! - a function of the current document and the execution context
//!
//! Evaluation happens on every [`Config::get_value`] call; nothing is
//! memoized. Constant and context-bound configs can be used anywhere a
//! document-bound config is expected. The reverse only fails at evaluation
//! time, with [`ConfigError::DocumentRequired`], when no document is
//! available.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use thiserror::Error;

use crate::document::Document;
use crate::execute::ExecutionContext;
use crate::meta::{ConversionError, FromValue, Value};

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Function of the execution context only.
pub type ContextFn<T> = dyn Fn(ExecutionContext) -> BoxFuture<'static, ConfigResult<T>> + Send + Sync;

/// Function of the current document and the execution context.
pub type DocumentFn<T> = dyn Fn(Document, ExecutionContext) -> BoxFuture<'static, ConfigResult<T>> + Send + Sync;

/// Errors raised while evaluating a config or reading metadata.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("a document is required to evaluate this value but none is available")]
  DocumentRequired,

  #[error("metadata key not found: {0}")]
  MissingKey(String),

  #[error(transparent)]
  Conversion(#[from] ConversionError),

  #[error("metadata key '{key}': {source}")]
  KeyConversion {
    key: String,
    #[source]
    source: ConversionError,
  },

  #[error("failed to read content: {0}")]
  Content(#[from] std::io::Error),

  #[error("{0}")]
  Failed(String),

  #[error("evaluation cancelled")]
  Cancelled,
}

impl ConfigError {
  pub fn failed(message: impl fmt::Display) -> Self {
    ConfigError::Failed(message.to_string())
  }
}

/// A lazily evaluated value.
pub enum Config<T> {
  Constant(T),
  Context(Arc<ContextFn<T>>),
  Document(Arc<DocumentFn<T>>),
}

impl<T: Clone> Clone for Config<T> {
  fn clone(&self) -> Self {
    match self {
      Config::Constant(value) => Config::Constant(value.clone()),
      Config::Context(func) => Config::Context(Arc::clone(func)),
      Config::Document(func) => Config::Document(Arc::clone(func)),
    }
  }
}

impl<T> Config<T>
where
  T: Clone + Send + Sync + 'static,
{
  pub fn constant(value: T) -> Self {
    Config::Constant(value)
  }

  /// A config computed from the execution context.
  pub fn from_context<F>(func: F) -> Self
  where
    F: Fn(&ExecutionContext) -> ConfigResult<T> + Send + Sync + 'static,
  {
    Config::Context(Arc::new(move |ctx: ExecutionContext| {
      let result = func(&ctx);
      async move { result }.boxed()
    }))
  }

  pub fn from_context_async<F, Fut>(func: F) -> Self
  where
    F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ConfigResult<T>> + Send + 'static,
  {
    Config::Context(Arc::new(move |ctx| func(ctx).boxed()))
  }

  /// A config computed from the current document and the execution context.
  pub fn from_document<F>(func: F) -> Self
  where
    F: Fn(&Document, &ExecutionContext) -> ConfigResult<T> + Send + Sync + 'static,
  {
    Config::Document(Arc::new(move |doc: Document, ctx: ExecutionContext| {
      let result = func(&doc, &ctx);
      async move { result }.boxed()
    }))
  }

  pub fn from_document_async<F, Fut>(func: F) -> Self
  where
    F: Fn(Document, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ConfigResult<T>> + Send + 'static,
  {
    Config::Document(Arc::new(move |doc, ctx| func(doc, ctx).boxed()))
  }

  pub fn requires_document(&self) -> bool {
    matches!(self, Config::Document(_))
  }

  /// Evaluate the config.
  ///
  /// Fails with [`ConfigError::DocumentRequired`] if the config is
  /// document-bound and `document` is `None`, and with
  /// [`ConfigError::Cancelled`] if the run has been cancelled.
  pub async fn get_value(&self, document: Option<&Document>, context: &ExecutionContext) -> ConfigResult<T> {
    context.check_cancelled()?;
    match self {
      Config::Constant(value) => Ok(value.clone()),
      Config::Context(func) => func(context.clone()).await,
      Config::Document(func) => match document {
        Some(doc) => func(doc.clone(), context.clone()).await,
        None => Err(ConfigError::DocumentRequired),
      },
    }
  }

  /// Transform the result of this config. The transform runs on every
  /// evaluation.
  pub fn map<U, F>(self, func: F) -> Config<U>
  where
    U: Clone + Send + Sync + 'static,
    F: Fn(T) -> U + Send + Sync + 'static,
  {
    self.try_map(move |value| Ok(func(value)))
  }

  pub fn try_map<U, F>(self, func: F) -> Config<U>
  where
    U: Clone + Send + Sync + 'static,
    F: Fn(T) -> ConfigResult<U> + Send + Sync + 'static,
  {
    let func = Arc::new(func);
    match self {
      Config::Document(inner) => Config::Document(Arc::new(move |doc, ctx| {
        let inner = Arc::clone(&inner);
        let func = Arc::clone(&func);
        async move { func(inner(doc, ctx).await?) }.boxed()
      })),
      source => Config::Context(Arc::new(move |ctx| {
        let source = source.clone();
        let func = Arc::clone(&func);
        async move { func(source.get_value(None, &ctx).await?) }.boxed()
      })),
    }
  }

  /// Combine two configs into one yielding both results.
  ///
  /// The combination is document-bound if either side is.
  pub fn zip<U>(self, other: Config<U>) -> Config<(T, U)>
  where
    U: Clone + Send + Sync + 'static,
  {
    match (self, other) {
      (Config::Constant(left), Config::Constant(right)) => Config::Constant((left, right)),
      (left, right) if left.requires_document() || right.requires_document() => {
        Config::Document(Arc::new(move |doc, ctx| {
          let left = left.clone();
          let right = right.clone();
          async move {
            let a = left.get_value(Some(&doc), &ctx).await?;
            let b = right.get_value(Some(&doc), &ctx).await?;
            Ok((a, b))
          }
          .boxed()
        }))
      }
      (left, right) => Config::Context(Arc::new(move |ctx| {
        let left = left.clone();
        let right = right.clone();
        async move {
          let a = left.get_value(None, &ctx).await?;
          let b = right.get_value(None, &ctx).await?;
          Ok((a, b))
        }
        .boxed()
      })),
    }
  }

  /// Restrict this config to context-only evaluation.
  ///
  /// The cast always succeeds; evaluating a document-bound config through
  /// the result fails with [`ConfigError::DocumentRequired`].
  pub fn into_context(self) -> ContextConfig<T> {
    ContextConfig(self)
  }
}

impl<T> Config<T>
where
  T: Into<Value> + Clone + Send + Sync + 'static,
{
  /// Adapt the result into a sequence of values: a single value becomes a
  /// one-element sequence and a list is flattened one level.
  pub fn into_values(self) -> Config<Vec<Value>> {
    self.map(|value| value.into().into_values())
  }

  pub fn into_value(self) -> Config<Value> {
    self.map(Into::into)
  }

  /// Convert the result with the [`FromValue`] policy.
  pub fn cast<U>(self) -> Config<U>
  where
    U: FromValue + Clone + Send + Sync + 'static,
  {
    self.try_map(|value| U::from_value(value.into()).map_err(ConfigError::from))
  }
}

impl<T> From<T> for Config<T> {
  fn from(value: T) -> Self {
    Config::Constant(value)
  }
}

impl<T> fmt::Debug for Config<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Config::Constant(_) => write!(f, "Config::Constant"),
      Config::Context(_) => write!(f, "Config::Context"),
      Config::Document(_) => write!(f, "Config::Document"),
    }
  }
}

/// A config evaluated without a document, as the Input phase requires.
pub struct ContextConfig<T>(Config<T>);

impl<T: Clone> Clone for ContextConfig<T> {
  fn clone(&self) -> Self {
    ContextConfig(self.0.clone())
  }
}

impl<T> ContextConfig<T>
where
  T: Clone + Send + Sync + 'static,
{
  pub async fn get_value(&self, context: &ExecutionContext) -> ConfigResult<T> {
    self.0.get_value(None, context).await
  }

  pub fn into_config(self) -> Config<T> {
    self.0
  }
}

impl<T> From<T> for ContextConfig<T> {
  fn from(value: T) -> Self {
    ContextConfig(Config::Constant(value))
  }
}

impl<T> fmt::Debug for ContextConfig<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("ContextConfig").field(&self.0).finish()
  }
}
