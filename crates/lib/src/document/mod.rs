//! Immutable documents.
//!
//! A [`Document`] pairs a [`Metadata`] snapshot with a [`Content`] handle.
//! Documents are never modified: cloning produces a new document whose
//! metadata is layered over the original. A revision keeps the original
//! [`DocumentId`]; a derived document gets a fresh one.

mod content;

pub use content::{Content, ContentReader, ContentSource};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ConfigResult};
use crate::execute::ExecutionContext;
use crate::meta::{FromValue, Metadata, Value};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a logical document, stable across revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(u64);

impl DocumentId {
  fn next() -> Self {
    DocumentId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
  }

  pub fn as_u64(&self) -> u64 {
    self.0
  }
}

impl fmt::Display for DocumentId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "doc:{}", self.0)
  }
}

struct DocumentData {
  id: DocumentId,
  source: Option<PathBuf>,
  metadata: Metadata,
  content: Content,
}

/// An immutable document. Cloning the handle is cheap.
#[derive(Clone)]
pub struct Document {
  inner: Arc<DocumentData>,
}

impl Document {
  /// An empty document with a fresh identity.
  pub fn new() -> Self {
    Self::from_parts(DocumentId::next(), None, Metadata::new(), Content::empty())
  }

  /// A document with a fresh identity.
  pub fn from_items<I, K, V>(items: I, content: Content) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
  {
    Self::with_metadata(Metadata::from_items(items), content)
  }

  pub fn with_metadata(metadata: Metadata, content: Content) -> Self {
    Self::from_parts(DocumentId::next(), None, metadata, content)
  }

  fn from_parts(id: DocumentId, source: Option<PathBuf>, metadata: Metadata, content: Content) -> Self {
    Self {
      inner: Arc::new(DocumentData {
        id,
        source,
        metadata,
        content,
      }),
    }
  }

  pub fn id(&self) -> DocumentId {
    self.inner.id
  }

  pub fn source(&self) -> Option<&Path> {
    self.inner.source.as_deref()
  }

  pub fn metadata(&self) -> &Metadata {
    &self.inner.metadata
  }

  pub fn content(&self) -> &Content {
    &self.inner.content
  }

  /// A revision with `source` recorded as the originating path.
  pub fn with_source(&self, source: impl Into<PathBuf>) -> Self {
    Self::from_parts(
      self.id(),
      Some(source.into()),
      self.metadata().clone(),
      self.content().clone(),
    )
  }

  /// A revision with replaced content and unchanged metadata.
  pub fn with_content(&self, content: Content) -> Self {
    Self::from_parts(self.id(), self.inner.source.clone(), self.metadata().clone(), content)
  }

  /// A revision of this document.
  ///
  /// Metadata is this document's metadata with `items` layered on top;
  /// content is `content` if given, otherwise shared with this document. The
  /// identity is kept.
  pub fn clone_with<I, K, V>(&self, items: I, content: Option<Content>) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
  {
    Self::from_parts(
      self.id(),
      self.inner.source.clone(),
      self.metadata().with_layer(items),
      content.unwrap_or_else(|| self.content().clone()),
    )
  }

  /// A revision whose metadata is replaced by `metadata`.
  pub fn with_replaced_metadata(&self, metadata: Metadata) -> Self {
    Self::from_parts(self.id(), self.inner.source.clone(), metadata, self.content().clone())
  }

  /// A new document derived from this one: same metadata and content, fresh
  /// identity.
  pub fn derive<I, K, V>(&self, items: I, content: Option<Content>) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
  {
    Self::from_parts(
      DocumentId::next(),
      self.inner.source.clone(),
      self.metadata().with_layer(items),
      content.unwrap_or_else(|| self.content().clone()),
    )
  }

  /// Whether both handles refer to the same document instance.
  pub fn ptr_eq(a: &Document, b: &Document) -> bool {
    Arc::ptr_eq(&a.inner, &b.inner)
  }

  pub fn get_raw(&self, key: &str) -> Option<&Value> {
    self.metadata().get_raw(key)
  }

  /// Read a metadata value, resolving deferred values against this document.
  pub async fn get(&self, key: &str, context: &ExecutionContext) -> ConfigResult<Option<Value>> {
    self.metadata().get(key, Some(self), context).await
  }

  pub async fn get_as<T: FromValue>(&self, key: &str, context: &ExecutionContext) -> ConfigResult<Option<T>> {
    self.metadata().get_as(key, Some(self), context).await
  }

  /// Like [`Document::get_as`], but a missing key is an error.
  pub async fn require<T: FromValue>(&self, key: &str, context: &ExecutionContext) -> ConfigResult<T> {
    self
      .get_as(key, context)
      .await?
      .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
  }

  pub async fn read_string(&self) -> std::io::Result<String> {
    self.content().read_string().await
  }
}

impl Default for Document {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for Document {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Document")
      .field("id", &self.inner.id)
      .field("source", &self.inner.source)
      .field("metadata", &self.inner.metadata)
      .field("content", &self.inner.content)
      .finish()
  }
}
