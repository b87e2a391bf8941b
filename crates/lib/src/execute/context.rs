//! The execution context handed to every module and config evaluation.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::gate::{GateState, PhaseTable};
use crate::config::{ConfigError, ConfigResult};
use crate::document::{Content, Document};
use crate::meta::{Metadata, Value};
use crate::module::ModuleError;
use crate::pipeline::Phase;

struct ContextData {
  pipeline: String,
  phase: Phase,
  dependencies: BTreeSet<String>,
  isolated: bool,
  settings: Metadata,
  cancel: CancellationToken,
  table: Option<Arc<PhaseTable>>,
}

/// Identity of the running pipeline and phase, the document factory, the
/// cancellation signal and read access to other pipelines' results.
///
/// Cloning is cheap.
#[derive(Clone)]
pub struct ExecutionContext {
  inner: Arc<ContextData>,
}

impl ExecutionContext {
  pub(crate) fn new(
    pipeline: &str,
    phase: Phase,
    dependencies: BTreeSet<String>,
    isolated: bool,
    settings: Metadata,
    cancel: CancellationToken,
    table: Arc<PhaseTable>,
  ) -> Self {
    Self {
      inner: Arc::new(ContextData {
        pipeline: pipeline.to_string(),
        phase,
        dependencies,
        isolated,
        settings,
        cancel,
        table: Some(table),
      }),
    }
  }

  /// A context outside of any engine run, for driving modules directly.
  ///
  /// Reading other pipelines' outputs always fails.
  pub fn standalone(pipeline: impl Into<String>, phase: Phase) -> Self {
    Self {
      inner: Arc::new(ContextData {
        pipeline: pipeline.into(),
        phase,
        dependencies: BTreeSet::new(),
        isolated: false,
        settings: Metadata::new(),
        cancel: CancellationToken::new(),
        table: None,
      }),
    }
  }

  fn rebuild(&self, update: impl FnOnce(&mut ContextData)) -> Self {
    let mut data = ContextData {
      pipeline: self.inner.pipeline.clone(),
      phase: self.inner.phase,
      dependencies: self.inner.dependencies.clone(),
      isolated: self.inner.isolated,
      settings: self.inner.settings.clone(),
      cancel: self.inner.cancel.clone(),
      table: self.inner.table.clone(),
    };
    update(&mut data);
    Self { inner: Arc::new(data) }
  }

  pub fn with_settings(&self, settings: Metadata) -> Self {
    self.rebuild(|data| data.settings = settings)
  }

  pub fn with_cancellation(&self, cancel: CancellationToken) -> Self {
    self.rebuild(|data| data.cancel = cancel)
  }

  pub(crate) fn for_phase(&self, phase: Phase) -> Self {
    self.rebuild(|data| data.phase = phase)
  }

  pub fn pipeline(&self) -> &str {
    &self.inner.pipeline
  }

  pub fn phase(&self) -> Phase {
    self.inner.phase
  }

  pub fn is_isolated(&self) -> bool {
    self.inner.isolated
  }

  /// Engine-wide settings; the parent layer of every document created
  /// through [`ExecutionContext::new_document`].
  pub fn settings(&self) -> &Metadata {
    &self.inner.settings
  }

  pub fn cancellation_token(&self) -> CancellationToken {
    self.inner.cancel.clone()
  }

  pub fn is_cancelled(&self) -> bool {
    self.inner.cancel.is_cancelled()
  }

  pub fn check_cancelled(&self) -> ConfigResult<()> {
    if self.is_cancelled() {
      return Err(ConfigError::Cancelled);
    }
    Ok(())
  }

  /// Create a document with a fresh identity. Its metadata is `items`
  /// layered over the engine settings.
  pub fn new_document<I, K, V>(&self, items: I, content: Content) -> Document
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
  {
    Document::with_metadata(self.settings().with_layer(items), content)
  }

  /// Create a revision of `document`; see [`Document::clone_with`].
  pub fn clone_document<I, K, V>(&self, document: &Document, items: I, content: Option<Content>) -> Document
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
  {
    document.clone_with(items, content)
  }

  /// Read another pipeline's Process phase documents.
  ///
  /// During Process only declared dependencies are readable. During
  /// PostProcess and Output any non-isolated pipeline, or a declared
  /// dependency, is readable. Nothing is readable during Input or from an
  /// isolated pipeline.
  pub async fn outputs_of(&self, pipeline: &str) -> Result<Vec<Document>, ModuleError> {
    let unavailable = |reason: &str| ModuleError::OutputsUnavailable {
      pipeline: pipeline.to_string(),
      reason: reason.to_string(),
    };

    let Some(table) = &self.inner.table else {
      return Err(unavailable("no engine run is active"));
    };
    if self.is_isolated() {
      return Err(unavailable("isolated pipelines cannot read other pipelines"));
    }
    if !table.contains(pipeline) {
      return Err(unavailable("no such pipeline"));
    }

    let declared = self.inner.dependencies.contains(pipeline);
    let allowed = match self.phase() {
      Phase::Input => false,
      Phase::Process => declared,
      Phase::PostProcess | Phase::Output => declared || !table.is_isolated(pipeline),
    };
    if !allowed {
      return Err(unavailable(&format!("not readable during the {} phase", self.phase())));
    }

    let Some(gate) = table.gate(pipeline, Phase::Process) else {
      return Err(unavailable("no such pipeline"));
    };

    let state = tokio::select! {
      biased;
      _ = self.inner.cancel.cancelled() => return Err(ModuleError::Cancelled),
      state = gate.settled() => state,
    };

    match state {
      GateState::Completed(docs) => Ok(docs.as_ref().clone()),
      GateState::Cancelled => Err(ModuleError::Cancelled),
      GateState::Failed | GateState::Pending => Err(unavailable("pipeline did not complete")),
    }
  }
}

impl fmt::Debug for ExecutionContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ExecutionContext")
      .field("pipeline", &self.inner.pipeline)
      .field("phase", &self.inner.phase)
      .field("isolated", &self.inner.isolated)
      .field("cancelled", &self.is_cancelled())
      .finish()
  }
}
