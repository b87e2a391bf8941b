//! Types for pipeline execution.
//!
//! This module defines the error types, per-pipeline statuses, the run result
//! and the engine configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::FALLBACK_PARALLELISM;
use crate::document::Document;
use crate::module::ModuleError;
use crate::pipeline::Phase;

/// Configuration errors detected before any phase runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
  /// Pipelines depend on each other in a cycle.
  #[error("dependency cycle detected: {}", .members.join(" -> "))]
  CycleDetected { members: Vec<String> },

  /// A pipeline depends on a name no pipeline is registered under.
  #[error("pipeline '{pipeline}' depends on unknown pipeline '{dependency}'")]
  UnknownDependency { pipeline: String, dependency: String },

  /// Two pipelines were registered under the same name.
  #[error("pipeline '{0}' is already registered")]
  DuplicatePipeline(String),

  /// An isolated pipeline declared dependencies.
  #[error("isolated pipeline '{0}' cannot declare dependencies")]
  IsolatedDependency(String),

  /// A module rejected its configuration.
  #[error("invalid module {module} in {pipeline}/{phase}: {message}")]
  InvalidModule {
    pipeline: String,
    phase: Phase,
    module: String,
    message: String,
  },
}

/// A failure captured while running a pipeline.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// A module failed.
  #[error("module {module} failed in {pipeline}/{phase}: {source}")]
  Module {
    pipeline: String,
    phase: Phase,
    module: String,
    #[source]
    source: ModuleError,
  },

  /// The pipeline's task panicked.
  #[error("pipeline '{pipeline}' panicked: {message}")]
  Panicked { pipeline: String, message: String },
}

/// Terminal status of a pipeline after a run.
#[derive(Debug)]
pub enum PipelineStatus {
  /// All phases ran; holds the Output phase's documents.
  Completed(Vec<Document>),
  /// A phase failed.
  Failed(ExecuteError),
  /// A dependency failed, so the pipeline did not run its Process phase.
  UpstreamFailed { dependency: String },
  /// The run was cancelled before the pipeline finished.
  Cancelled,
}

impl PipelineStatus {
  pub fn is_completed(&self) -> bool {
    matches!(self, PipelineStatus::Completed(_))
  }

  pub fn documents(&self) -> Option<&[Document]> {
    match self {
      PipelineStatus::Completed(docs) => Some(docs),
      _ => None,
    }
  }
}

/// Result of a run: the terminal status of every registered pipeline.
#[derive(Debug, Default)]
pub struct RunResult {
  pub pipelines: BTreeMap<String, PipelineStatus>,
}

impl RunResult {
  /// Returns true if every pipeline completed.
  pub fn is_success(&self) -> bool {
    self.pipelines.values().all(PipelineStatus::is_completed)
  }

  pub fn status(&self, name: &str) -> Option<&PipelineStatus> {
    self.pipelines.get(name)
  }

  /// Output documents of a completed pipeline.
  pub fn documents(&self, name: &str) -> Option<&[Document]> {
    self.status(name).and_then(PipelineStatus::documents)
  }

  pub fn completed(&self) -> usize {
    self.count(|s| matches!(s, PipelineStatus::Completed(_)))
  }

  /// Pipelines that failed, directly or because of a dependency.
  pub fn failed(&self) -> usize {
    self.count(|s| matches!(s, PipelineStatus::Failed(_) | PipelineStatus::UpstreamFailed { .. }))
  }

  pub fn cancelled(&self) -> usize {
    self.count(|s| matches!(s, PipelineStatus::Cancelled))
  }

  fn count(&self, pred: impl Fn(&PipelineStatus) -> bool) -> usize {
    self.pipelines.values().filter(|s| pred(s)).count()
  }
}

/// Configuration for pipeline execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Maximum number of pipeline phases executing at once.
  pub parallelism: usize,

  /// Cancel the rest of the run after the first pipeline failure.
  pub cancel_on_failure: bool,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
      cancel_on_failure: false,
    }
  }
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism()
    .map(|p| p.get())
    .unwrap_or(FALLBACK_PARALLELISM)
}
