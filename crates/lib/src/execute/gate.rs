//! Per-pipeline, per-phase completion gates.
//!
//! Every pipeline owns one gate per phase. A gate is published exactly once,
//! with the phase's documents or with the reason it never produced any, and
//! can be awaited by any number of readers.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::warn;

use crate::document::Document;
use crate::pipeline::Phase;

/// State of a phase gate.
#[derive(Debug, Clone)]
pub enum GateState {
  Pending,
  Completed(Arc<Vec<Document>>),
  Failed,
  Cancelled,
}

impl GateState {
  pub fn is_settled(&self) -> bool {
    !matches!(self, GateState::Pending)
  }
}

/// A write-once cell that readers can await.
#[derive(Debug)]
pub struct PhaseGate {
  tx: watch::Sender<GateState>,
}

impl Default for PhaseGate {
  fn default() -> Self {
    Self {
      tx: watch::Sender::new(GateState::Pending),
    }
  }
}

impl PhaseGate {
  /// Publish `state`. Returns false if the gate was already published.
  pub fn publish(&self, state: GateState) -> bool {
    self.tx.send_if_modified(|current| {
      if current.is_settled() {
        return false;
      }
      *current = state;
      true
    })
  }

  pub fn state(&self) -> GateState {
    self.tx.borrow().clone()
  }

  /// Wait until the gate is published.
  pub async fn settled(&self) -> GateState {
    let mut rx = self.tx.subscribe();
    let settled = match rx.wait_for(GateState::is_settled).await {
      Ok(state) => state.clone(),
      // the sender lives as long as `self`
      Err(_) => self.state(),
    };
    settled
  }
}

struct PipelineGates {
  isolated: bool,
  phases: [PhaseGate; 4],
}

/// Gates for every registered pipeline.
pub struct PhaseTable {
  pipelines: BTreeMap<String, PipelineGates>,
}

impl PhaseTable {
  /// Create a table with pending gates for `(name, isolated)` pipelines.
  pub fn new<'a>(pipelines: impl IntoIterator<Item = (&'a str, bool)>) -> Self {
    Self {
      pipelines: pipelines
        .into_iter()
        .map(|(name, isolated)| {
          (
            name.to_string(),
            PipelineGates {
              isolated,
              phases: Default::default(),
            },
          )
        })
        .collect(),
    }
  }

  pub fn contains(&self, pipeline: &str) -> bool {
    self.pipelines.contains_key(pipeline)
  }

  pub fn is_isolated(&self, pipeline: &str) -> bool {
    self.pipelines.get(pipeline).is_some_and(|p| p.isolated)
  }

  pub fn gate(&self, pipeline: &str, phase: Phase) -> Option<&PhaseGate> {
    self.pipelines.get(pipeline).map(|p| &p.phases[phase.index()])
  }

  pub fn publish(&self, pipeline: &str, phase: Phase, state: GateState) {
    let Some(gate) = self.gate(pipeline, phase) else {
      return;
    };
    if !gate.publish(state) {
      warn!(pipeline, %phase, "phase gate already published");
    }
  }

  /// Names of all non-isolated pipelines.
  pub fn shared_pipelines(&self) -> impl Iterator<Item = &str> {
    self
      .pipelines
      .iter()
      .filter(|(_, p)| !p.isolated)
      .map(|(name, _)| name.as_str())
  }
}

/// Publishes a fallback state to any of a pipeline's gates still pending
/// when dropped, so readers never wait on a pipeline that stopped early.
pub struct GateGuard {
  table: Arc<PhaseTable>,
  pipeline: String,
  fallback: GateState,
}

impl GateGuard {
  pub fn new(table: Arc<PhaseTable>, pipeline: impl Into<String>) -> Self {
    Self {
      table,
      pipeline: pipeline.into(),
      fallback: GateState::Failed,
    }
  }

  pub fn set_fallback(&mut self, state: GateState) {
    self.fallback = state;
  }
}

impl Drop for GateGuard {
  fn drop(&mut self) {
    for phase in Phase::ALL {
      if let Some(gate) = self.table.gate(&self.pipeline, phase) {
        gate.publish(self.fallback.clone());
      }
    }
  }
}
