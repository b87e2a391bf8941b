//! Re-openable document content.
//!
//! Content is never read eagerly. Every [`Content::open`] call asks the
//! underlying [`ContentSource`] for a fresh reader, so a file-backed source
//! observes the file as it is at read time.

use std::fmt;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

pub type ContentReader = Pin<Box<dyn AsyncRead + Send>>;

/// A source of bytes that can be opened any number of times.
#[async_trait]
pub trait ContentSource: Send + Sync + fmt::Debug {
  /// Open a new reader positioned at the start of the content.
  async fn open(&self) -> io::Result<ContentReader>;

  /// Length in bytes, if known without reading.
  fn len_hint(&self) -> Option<u64> {
    None
  }
}

#[derive(Debug)]
struct MemoryContent(Arc<[u8]>);

#[async_trait]
impl ContentSource for MemoryContent {
  async fn open(&self) -> io::Result<ContentReader> {
    Ok(Box::pin(Cursor::new(Arc::clone(&self.0))))
  }

  fn len_hint(&self) -> Option<u64> {
    Some(self.0.len() as u64)
  }
}

#[derive(Debug)]
struct FileContent(PathBuf);

#[async_trait]
impl ContentSource for FileContent {
  async fn open(&self) -> io::Result<ContentReader> {
    let file = tokio::fs::File::open(&self.0).await?;
    Ok(Box::pin(file))
  }
}

/// Document content: empty, or a shared handle to a [`ContentSource`].
///
/// Cloning shares the source; documents produced by grouping reference the
/// same content without copying it.
#[derive(Clone, Default)]
pub struct Content {
  source: Option<Arc<dyn ContentSource>>,
}

impl Content {
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn from_string(text: impl Into<String>) -> Self {
    Self::from_bytes(text.into().into_bytes())
  }

  pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
    let bytes: Vec<u8> = bytes.into();
    Self::from_source(MemoryContent(bytes.into()))
  }

  /// Content read from `path` each time it is opened.
  pub fn from_file(path: impl AsRef<Path>) -> Self {
    Self::from_source(FileContent(path.as_ref().to_path_buf()))
  }

  pub fn from_source(source: impl ContentSource + 'static) -> Self {
    Self {
      source: Some(Arc::new(source)),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.source.is_none()
  }

  /// Whether both handles share the same underlying source.
  pub fn ptr_eq(&self, other: &Content) -> bool {
    match (&self.source, &other.source) {
      (Some(a), Some(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
      (None, None) => true,
      _ => false,
    }
  }

  pub fn len_hint(&self) -> Option<u64> {
    match &self.source {
      Some(source) => source.len_hint(),
      None => Some(0),
    }
  }

  pub async fn open(&self) -> io::Result<ContentReader> {
    match &self.source {
      Some(source) => source.open().await,
      None => Ok(Box::pin(tokio::io::empty())),
    }
  }

  pub async fn read_bytes(&self) -> io::Result<Vec<u8>> {
    let mut reader = self.open().await?;
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(buf)
  }

  pub async fn read_string(&self) -> io::Result<String> {
    let bytes = self.read_bytes().await?;
    String::from_utf8(bytes).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
  }
}

impl fmt::Debug for Content {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.source {
      Some(source) => f.debug_tuple("Content").field(source).finish(),
      None => write!(f, "Content(empty)"),
    }
  }
}

impl From<&str> for Content {
  fn from(text: &str) -> Self {
    Content::from_string(text)
  }
}

impl From<String> for Content {
  fn from(text: String) -> Self {
    Content::from_string(text)
  }
}
