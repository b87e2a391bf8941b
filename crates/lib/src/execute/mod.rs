//! Pipeline execution.
//!
//! This module provides the [`Engine`], which owns the registered pipelines
//! and runs them. It handles:
//! - DAG-based dependency validation and cycle reporting
//! - Concurrent execution of every pipeline, gated per phase
//! - Bounded parallelism of running phases
//! - Failure capture, upstream-failure propagation and cancellation

pub mod context;
pub mod dag;
pub mod gate;
pub mod types;

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::document::Document;
use crate::meta::Metadata;
use crate::pipeline::{Phase, Pipeline};

pub use context::ExecutionContext;
pub use dag::PipelineDag;
pub use gate::{GateGuard, GateState, PhaseGate, PhaseTable};
pub use types::{EngineConfig, EngineError, ExecuteError, PipelineStatus, RunResult};

/// Owns the registered pipelines and runs them.
pub struct Engine {
  config: EngineConfig,
  settings: Metadata,
  pipelines: BTreeMap<String, Arc<Pipeline>>,
}

impl Default for Engine {
  fn default() -> Self {
    Self::new(EngineConfig::default())
  }
}

impl Engine {
  pub fn new(config: EngineConfig) -> Self {
    Self {
      config,
      settings: Metadata::new(),
      pipelines: BTreeMap::new(),
    }
  }

  /// Set engine-wide settings, the parent layer of new documents.
  pub fn with_settings(mut self, settings: Metadata) -> Self {
    self.settings = settings;
    self
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn settings(&self) -> &Metadata {
    &self.settings
  }

  /// Register a pipeline under `name`.
  pub fn add_pipeline(&mut self, name: impl Into<String>, pipeline: Pipeline) -> Result<(), EngineError> {
    let name = name.into();
    if self.pipelines.contains_key(&name) {
      return Err(EngineError::DuplicatePipeline(name));
    }
    self.pipelines.insert(name, Arc::new(pipeline));
    Ok(())
  }

  pub fn pipeline(&self, name: &str) -> Option<&Pipeline> {
    self.pipelines.get(name).map(AsRef::as_ref)
  }

  pub fn pipeline_names(&self) -> impl Iterator<Item = &str> {
    self.pipelines.keys().map(String::as_str)
  }

  /// Check dependencies and module configuration without running anything.
  pub fn validate(&self) -> Result<PipelineDag, EngineError> {
    let dag = PipelineDag::build(&self.pipelines)?;

    for (name, pipeline) in &self.pipelines {
      for phase in Phase::ALL {
        for module in pipeline.modules(phase) {
          module.validate().map_err(|message| EngineError::InvalidModule {
            pipeline: name.clone(),
            phase,
            module: module.name().to_string(),
            message,
          })?;
        }
      }
    }

    Ok(dag)
  }

  /// Run every pipeline.
  ///
  /// Configuration errors are returned before any phase runs. Otherwise the
  /// result holds a terminal status for every registered pipeline.
  /// Cancelling `cancel` stops the run; pipelines that already completed
  /// keep their documents and the rest are marked cancelled.
  pub async fn run(&self, cancel: CancellationToken) -> Result<RunResult, EngineError> {
    let dag = self.validate()?;
    let waves = dag.waves()?;

    info!(
      pipeline_count = self.pipelines.len(),
      wave_count = waves.len(),
      parallelism = self.config.parallelism,
      "starting pipeline execution"
    );
    for (wave_idx, wave) in waves.iter().enumerate() {
      debug!(wave = wave_idx, pipelines = ?wave, "execution wave");
    }

    let cancel = cancel.child_token();
    let table = Arc::new(PhaseTable::new(
      self.pipelines.iter().map(|(name, p)| (name.as_str(), p.is_isolated())),
    ));
    let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));

    let mut join_set = JoinSet::new();
    for (name, pipeline) in &self.pipelines {
      let run = PipelineRun {
        name: name.clone(),
        pipeline: Arc::clone(pipeline),
        table: Arc::clone(&table),
        semaphore: Arc::clone(&semaphore),
        cancel: cancel.clone(),
        settings: self.settings.clone(),
      };
      let name = name.clone();

      join_set.spawn(async move {
        let outcome = AssertUnwindSafe(run.execute()).catch_unwind().await;
        (name, outcome)
      });
    }

    let mut result = RunResult::default();
    while let Some(join_result) = join_set.join_next().await {
      match join_result {
        Ok((name, Ok(status))) => {
          if matches!(status, PipelineStatus::Failed(_)) && self.config.cancel_on_failure {
            warn!(pipeline = %name, "cancelling run after pipeline failure");
            cancel.cancel();
          }
          result.pipelines.insert(name, status);
        }
        Ok((name, Err(payload))) => {
          let message = panic_message(payload.as_ref());
          error!(pipeline = %name, panic = %message, "pipeline task panicked");
          if self.config.cancel_on_failure {
            cancel.cancel();
          }
          result.pipelines.insert(
            name.clone(),
            PipelineStatus::Failed(ExecuteError::Panicked { pipeline: name, message }),
          );
        }
        Err(e) => {
          error!(error = %e, "pipeline task did not finish");
        }
      }
    }

    // a task that never reported was aborted with the runtime
    for name in self.pipelines.keys() {
      result
        .pipelines
        .entry(name.clone())
        .or_insert(PipelineStatus::Cancelled);
    }

    info!(
      completed = result.completed(),
      failed = result.failed(),
      cancelled = result.cancelled(),
      "pipeline execution complete"
    );

    Ok(result)
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic".to_string()
  }
}

/// Why a phase stopped.
enum PhaseStop {
  Cancelled,
  UpstreamFailed(String),
  Failed(ExecuteError),
}

/// One pipeline's walk through its phases.
struct PipelineRun {
  name: String,
  pipeline: Arc<Pipeline>,
  table: Arc<PhaseTable>,
  semaphore: Arc<Semaphore>,
  cancel: CancellationToken,
  settings: Metadata,
}

impl PipelineRun {
  async fn execute(self) -> PipelineStatus {
    let mut guard = GateGuard::new(Arc::clone(&self.table), &self.name);
    let base = ExecutionContext::new(
      &self.name,
      Phase::Input,
      self.pipeline.dependencies().clone(),
      self.pipeline.is_isolated(),
      self.settings.clone(),
      self.cancel.clone(),
      Arc::clone(&self.table),
    );

    let mut docs: Vec<Document> = Vec::new();
    for phase in Phase::ALL {
      let outcome = match self.wait_for_phase(phase).await {
        Ok(()) => self.run_phase(phase, docs, &base.for_phase(phase)).await,
        Err(stop) => Err(stop),
      };
      // the Output gate waits for every dependency to finish
      let outcome = match outcome {
        Ok(out) if phase == Phase::Output => self.await_dependencies(Phase::Output).await.map(|()| out),
        other => other,
      };

      match outcome {
        Ok(out) => {
          self
            .table
            .publish(&self.name, phase, GateState::Completed(Arc::new(out.clone())));
          docs = out;
        }
        Err(PhaseStop::Cancelled) => {
          warn!(pipeline = %self.name, %phase, "pipeline cancelled");
          guard.set_fallback(GateState::Cancelled);
          return PipelineStatus::Cancelled;
        }
        Err(PhaseStop::UpstreamFailed(dependency)) => {
          warn!(pipeline = %self.name, dependency = %dependency, "skipping pipeline due to failed dependency");
          return PipelineStatus::UpstreamFailed { dependency };
        }
        Err(PhaseStop::Failed(err)) => {
          error!(pipeline = %self.name, %phase, error = %err, "pipeline failed");
          return PipelineStatus::Failed(err);
        }
      }
    }

    info!(pipeline = %self.name, documents = docs.len(), "pipeline succeeded");
    PipelineStatus::Completed(docs)
  }

  /// Wait for the gates `phase` depends on.
  async fn wait_for_phase(&self, phase: Phase) -> Result<(), PhaseStop> {
    match phase {
      Phase::Process => self.await_dependencies(Phase::Process).await,
      Phase::PostProcess if !self.pipeline.is_isolated() => {
        let shared: Vec<String> = self.table.shared_pipelines().map(str::to_string).collect();
        for other in &shared {
          self.await_gate(other, Phase::Process).await?;
        }
        Ok(())
      }
      _ => Ok(()),
    }
  }

  /// Wait for every dependency's `phase` gate; any that did not complete
  /// stops this pipeline.
  async fn await_dependencies(&self, phase: Phase) -> Result<(), PhaseStop> {
    for dep in self.pipeline.dependencies() {
      match self.await_gate(dep, phase).await? {
        GateState::Completed(_) => {}
        GateState::Cancelled => return Err(PhaseStop::Cancelled),
        GateState::Failed | GateState::Pending => return Err(PhaseStop::UpstreamFailed(dep.clone())),
      }
    }
    Ok(())
  }

  async fn await_gate(&self, pipeline: &str, phase: Phase) -> Result<GateState, PhaseStop> {
    let Some(gate) = self.table.gate(pipeline, phase) else {
      return Err(PhaseStop::UpstreamFailed(pipeline.to_string()));
    };
    tokio::select! {
      biased;
      _ = self.cancel.cancelled() => Err(PhaseStop::Cancelled),
      state = gate.settled() => Ok(state),
    }
  }

  /// Run the modules of `phase` in sequence, each on the previous one's
  /// output. A permit is held only while modules run.
  async fn run_phase(
    &self,
    phase: Phase,
    inputs: Vec<Document>,
    ctx: &ExecutionContext,
  ) -> Result<Vec<Document>, PhaseStop> {
    if self.cancel.is_cancelled() {
      return Err(PhaseStop::Cancelled);
    }

    let modules = self.pipeline.modules(phase);
    if modules.is_empty() {
      return Ok(inputs);
    }

    let _permit = tokio::select! {
      biased;
      _ = self.cancel.cancelled() => return Err(PhaseStop::Cancelled),
      permit = self.semaphore.acquire() => permit.map_err(|_| PhaseStop::Cancelled)?,
    };

    debug!(
      pipeline = %self.name,
      %phase,
      modules = modules.len(),
      documents = inputs.len(),
      "running phase"
    );

    let mut docs = inputs;
    for module in modules {
      debug!(pipeline = %self.name, %phase, module = module.name(), documents = docs.len(), "executing module");

      let result = tokio::select! {
        biased;
        _ = self.cancel.cancelled() => return Err(PhaseStop::Cancelled),
        result = module.execute(docs, ctx) => result,
      };

      docs = match result {
        Ok(out) => out,
        Err(e) if e.is_cancelled() => return Err(PhaseStop::Cancelled),
        Err(source) => {
          return Err(PhaseStop::Failed(ExecuteError::Module {
            pipeline: self.name.clone(),
            phase,
            module: module.name().to_string(),
            source,
          }));
        }
      };
    }

    Ok(docs)
  }
}
