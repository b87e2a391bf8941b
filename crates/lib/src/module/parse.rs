//! Structured content parsers that lift an object into metadata.

use async_trait::async_trait;

use super::{Module, ModuleError, for_each_document};
use crate::document::Document;
use crate::execute::ExecutionContext;
use crate::meta::Value;

/// Layer the fields of an object-shaped value onto `doc`.
fn apply_object(doc: Document, parsed: serde_json::Value, format: &'static str) -> Result<Document, ModuleError> {
  match parsed {
    serde_json::Value::Null => Ok(doc),
    serde_json::Value::Object(map) => Ok(doc.clone_with(map.into_iter().map(|(k, v)| (k, Value::from(v))), None)),
    other => Err(ModuleError::Parse {
      format,
      message: format!("expected an object, found {}", json_kind(&other)),
    }),
  }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
  match value {
    serde_json::Value::Null => "null",
    serde_json::Value::Bool(_) => "a boolean",
    serde_json::Value::Number(_) => "a number",
    serde_json::Value::String(_) => "a string",
    serde_json::Value::Array(_) => "an array",
    serde_json::Value::Object(_) => "an object",
  }
}

/// Parses JSON content into metadata. Content must be a JSON object; empty
/// content leaves the document unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseJson;

impl ParseJson {
  pub fn new() -> Self {
    Self
  }
}

#[async_trait]
impl Module for ParseJson {
  async fn execute(&self, inputs: Vec<Document>, context: &ExecutionContext) -> Result<Vec<Document>, ModuleError> {
    for_each_document(inputs, context, |doc, _| async move {
      let text = doc.read_string().await?;
      if text.trim().is_empty() {
        return Ok(doc);
      }
      let parsed: serde_json::Value = serde_json::from_str(&text).map_err(|e| ModuleError::Parse {
        format: "json",
        message: e.to_string(),
      })?;
      apply_object(doc, parsed, "json")
    })
    .await
  }
}

/// Parses YAML content into metadata. Content must be a YAML mapping; empty
/// content leaves the document unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseYaml;

impl ParseYaml {
  pub fn new() -> Self {
    Self
  }
}

#[async_trait]
impl Module for ParseYaml {
  async fn execute(&self, inputs: Vec<Document>, context: &ExecutionContext) -> Result<Vec<Document>, ModuleError> {
    for_each_document(inputs, context, |doc, _| async move {
      let text = doc.read_string().await?;
      if text.trim().is_empty() {
        return Ok(doc);
      }
      let parsed: serde_json::Value = serde_yaml::from_str(&text).map_err(|e| ModuleError::Parse {
        format: "yaml",
        message: e.to_string(),
      })?;
      apply_object(doc, parsed, "yaml")
    })
    .await
  }
}
