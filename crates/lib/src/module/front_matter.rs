//! Front matter extraction.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{Module, ModuleError, for_each_document};
use crate::consts::{DEFAULT_DELIMITER_CHAR, DEFAULT_DELIMITER_MIN};
use crate::document::{Content, Document};
use crate::execute::ExecutionContext;

/// How the line separating front matter from the body is recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delimiter {
  /// A line made only of `ch`, repeated at least `min` times. Trailing
  /// whitespace is ignored; leading whitespace disqualifies the line.
  Repeated { ch: char, min: usize },
  /// A line exactly equal to the string.
  Literal(String),
}

impl Default for Delimiter {
  fn default() -> Self {
    Delimiter::Repeated {
      ch: DEFAULT_DELIMITER_CHAR,
      min: DEFAULT_DELIMITER_MIN,
    }
  }
}

impl Delimiter {
  /// One or more repetitions of `ch`.
  pub fn repeated(ch: char) -> Self {
    Delimiter::Repeated { ch, min: 1 }
  }

  pub fn literal(text: impl Into<String>) -> Self {
    Delimiter::Literal(text.into())
  }

  pub fn validate(&self) -> Result<(), String> {
    match self {
      Delimiter::Repeated { ch, .. } if ch.is_whitespace() => {
        Err(format!("delimiter character {ch:?} must not be whitespace"))
      }
      Delimiter::Repeated { min: 0, .. } => Err("delimiter must repeat at least once".to_string()),
      Delimiter::Literal(text) if text.is_empty() => Err("delimiter must not be empty".to_string()),
      Delimiter::Literal(text) if text.contains('\n') => Err("delimiter must be a single line".to_string()),
      _ => Ok(()),
    }
  }

  /// Whether `line` (without its newline) is a delimiter line.
  pub fn matches(&self, line: &str) -> bool {
    match self {
      Delimiter::Repeated { ch, min } => {
        let trimmed = line.trim_end();
        !trimmed.is_empty() && trimmed.chars().all(|c| c == *ch) && trimmed.chars().count() >= *min
      }
      Delimiter::Literal(text) => line.strip_suffix('\r').unwrap_or(line) == text,
    }
  }
}

/// Content split at a front matter delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontMatterSplit {
  /// Lines before the delimiter, each followed by a newline.
  pub front_matter: String,
  /// Lines after the delimiter line.
  pub body: String,
}

/// Split `content` at the first delimiter line.
///
/// When `ignore_first_line` is set and the first line is a delimiter, that
/// line opens the front matter instead of closing it. Returns `None` when no
/// closing delimiter exists.
pub fn split_front_matter(content: &str, delimiter: &Delimiter, ignore_first_line: bool) -> Option<FrontMatterSplit> {
  let lines: Vec<&str> = content.split('\n').collect();

  let start = match lines.first() {
    Some(first) if ignore_first_line && delimiter.matches(first) => 1,
    _ => 0,
  };

  let boundary = (start..lines.len()).find(|&i| delimiter.matches(lines[i]))?;

  let mut front_matter = lines[start..boundary].join("\n");
  front_matter.push('\n');

  Some(FrontMatterSplit {
    front_matter,
    body: lines[boundary + 1..].join("\n"),
  })
}

/// Splits front matter off each document's content.
///
/// The body replaces the content. The front matter is handed to the handler
/// modules as the content of a revision of the document, and the metadata of
/// the first document they produce is layered onto the result. Documents
/// without a delimiter pass through unchanged and the handlers do not run.
pub struct ExtractFrontMatter {
  delimiter: Delimiter,
  ignore_first_line: bool,
  handlers: Vec<Arc<dyn Module>>,
}

impl Default for ExtractFrontMatter {
  fn default() -> Self {
    Self {
      delimiter: Delimiter::default(),
      ignore_first_line: true,
      handlers: Vec::new(),
    }
  }
}

impl ExtractFrontMatter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_delimiter(mut self, delimiter: Delimiter) -> Self {
    self.delimiter = delimiter;
    self
  }

  pub fn ignore_delimiter_on_first_line(mut self, ignore: bool) -> Self {
    self.ignore_first_line = ignore;
    self
  }

  /// Append a module run on the front matter.
  pub fn handler(mut self, module: impl Module + 'static) -> Self {
    self.handlers.push(Arc::new(module));
    self
  }
}

async fn extract(
  doc: Document,
  ctx: ExecutionContext,
  delimiter: Delimiter,
  ignore_first_line: bool,
  handlers: Arc<[Arc<dyn Module>]>,
) -> Result<Document, ModuleError> {
  let text = doc.read_string().await?;
  let Some(split) = split_front_matter(&text, &delimiter, ignore_first_line) else {
    return Ok(doc);
  };

  let body = Content::from_string(split.body);
  if handlers.is_empty() {
    return Ok(doc.with_content(body));
  }

  let mut outputs = vec![doc.with_content(Content::from_string(split.front_matter))];
  for handler in handlers.iter() {
    ctx.check_cancelled()?;
    outputs = handler.execute(outputs, &ctx).await?;
  }

  let delta: Vec<_> = match outputs.first() {
    Some(parsed) => parsed
      .metadata()
      .entries()
      .into_iter()
      .filter(|(key, value)| doc.get_raw(key) != Some(value))
      .collect(),
    None => Vec::new(),
  };

  debug!(document = %doc.id(), keys = delta.len(), "extracted front matter");
  Ok(doc.clone_with(delta, Some(body)))
}

#[async_trait]
impl Module for ExtractFrontMatter {
  fn validate(&self) -> Result<(), String> {
    self.delimiter.validate()?;
    for handler in &self.handlers {
      handler.validate().map_err(|e| format!("{}: {e}", handler.name()))?;
    }
    Ok(())
  }

  async fn execute(&self, inputs: Vec<Document>, context: &ExecutionContext) -> Result<Vec<Document>, ModuleError> {
    let delimiter = self.delimiter.clone();
    let ignore_first_line = self.ignore_first_line;
    let handlers: Arc<[Arc<dyn Module>]> = self.handlers.clone().into();

    for_each_document(inputs, context, move |doc, ctx| {
      extract(doc, ctx, delimiter.clone(), ignore_first_line, Arc::clone(&handlers))
    })
    .await
  }
}
