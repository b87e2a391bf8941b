//! Shared modules and helpers for pipeline integration tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use quire_lib::module::CreateDocuments;
use quire_lib::{Config, Content, Document, ExecutionContext, Module, ModuleError, Value};

/// Input module producing `count` documents tagged with the pipeline name.
pub fn seed(count: usize) -> CreateDocuments {
  CreateDocuments::new(
    Config::from_context(move |ctx| {
      Ok(
        (0..count)
          .map(|i| ctx.new_document([("origin", Value::from(ctx.pipeline())), ("n", Value::from(i))], Content::empty()))
          .collect(),
      )
    })
    .into_context(),
  )
}

/// Metadata value of `key` rendered as a string, for assertions.
pub fn text(doc: &Document, key: &str) -> Option<String> {
  doc.get_raw(key).map(|v| v.to_string())
}

/// Shared, ordered log of module events.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
  pub fn push(&self, event: String) {
    self.0.lock().unwrap().push(event);
  }

  pub fn events(&self) -> Vec<String> {
    self.0.lock().unwrap().clone()
  }

  pub fn position(&self, event: &str) -> Option<usize> {
    self.events().iter().position(|e| e == event)
  }
}

/// Records `start:<pipeline>:<phase>` and `end:<pipeline>:<phase>`, sleeping
/// in between, and passes documents through.
pub struct Record {
  pub log: EventLog,
  pub delay: Duration,
}

impl Record {
  pub fn new(log: &EventLog, delay_ms: u64) -> Self {
    Self {
      log: log.clone(),
      delay: Duration::from_millis(delay_ms),
    }
  }
}

#[async_trait]
impl Module for Record {
  async fn execute(&self, inputs: Vec<Document>, context: &ExecutionContext) -> Result<Vec<Document>, ModuleError> {
    let tag = format!("{}:{}", context.pipeline(), context.phase());
    self.log.push(format!("start:{tag}"));
    tokio::time::sleep(self.delay).await;
    self.log.push(format!("end:{tag}"));
    Ok(inputs)
  }
}

/// Always fails.
pub struct Fail;

#[async_trait]
impl Module for Fail {
  async fn execute(&self, _inputs: Vec<Document>, _context: &ExecutionContext) -> Result<Vec<Document>, ModuleError> {
    Err(ModuleError::Failed("deliberate failure".to_string()))
  }
}

/// Always panics.
pub struct Explode;

#[async_trait]
impl Module for Explode {
  async fn execute(&self, _inputs: Vec<Document>, _context: &ExecutionContext) -> Result<Vec<Document>, ModuleError> {
    panic!("module exploded");
  }
}

/// Never finishes on its own.
pub struct Hang;

#[async_trait]
impl Module for Hang {
  async fn execute(&self, _inputs: Vec<Document>, _context: &ExecutionContext) -> Result<Vec<Document>, ModuleError> {
    std::future::pending::<()>().await;
    Ok(Vec::new())
  }
}

/// Appends the documents another pipeline produced in its Process phase.
pub struct Concat(pub &'static str);

#[async_trait]
impl Module for Concat {
  async fn execute(&self, inputs: Vec<Document>, context: &ExecutionContext) -> Result<Vec<Document>, ModuleError> {
    let mut docs = inputs;
    docs.extend(context.outputs_of(self.0).await?);
    Ok(docs)
  }
}
