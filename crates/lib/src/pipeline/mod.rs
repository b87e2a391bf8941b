//! Pipeline definitions.
//!
//! A [`Pipeline`] is an ordered list of modules per [`Phase`], the names of
//! the pipelines it depends on, and an isolation flag. Pipelines are plain
//! data; the engine decides when and where they run.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::module::Module;

/// Execution stage of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
  /// Produces the initial documents. Modules receive no inputs.
  Input,
  /// Main transformation. Starts once every dependency's Process phase has
  /// published.
  Process,
  /// Starts once every non-isolated pipeline's Process phase has settled.
  PostProcess,
  /// Produces the pipeline's externally visible documents.
  Output,
}

impl Phase {
  pub const ALL: [Phase; 4] = [Phase::Input, Phase::Process, Phase::PostProcess, Phase::Output];

  pub fn index(self) -> usize {
    match self {
      Phase::Input => 0,
      Phase::Process => 1,
      Phase::PostProcess => 2,
      Phase::Output => 3,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Phase::Input => "input",
      Phase::Process => "process",
      Phase::PostProcess => "post-process",
      Phase::Output => "output",
    }
  }
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A named unit of work, registered with the engine under its name.
#[derive(Clone, Default)]
pub struct Pipeline {
  phases: [Vec<Arc<dyn Module>>; 4],
  dependencies: BTreeSet<String>,
  isolated: bool,
}

impl Pipeline {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn input(self, module: impl Module + 'static) -> Self {
    self.add(Phase::Input, module)
  }

  pub fn process(self, module: impl Module + 'static) -> Self {
    self.add(Phase::Process, module)
  }

  pub fn post_process(self, module: impl Module + 'static) -> Self {
    self.add(Phase::PostProcess, module)
  }

  pub fn output(self, module: impl Module + 'static) -> Self {
    self.add(Phase::Output, module)
  }

  /// Append a module to `phase`.
  pub fn add(self, phase: Phase, module: impl Module + 'static) -> Self {
    self.add_shared(phase, Arc::new(module))
  }

  pub fn add_shared(mut self, phase: Phase, module: Arc<dyn Module>) -> Self {
    self.phases[phase.index()].push(module);
    self
  }

  /// Declare a dependency on another pipeline by name.
  pub fn depends_on(mut self, name: impl Into<String>) -> Self {
    self.dependencies.insert(name.into());
    self
  }

  /// Mark the pipeline isolated.
  ///
  /// An isolated pipeline may not declare dependencies, cannot read other
  /// pipelines' outputs, and is not awaited by other pipelines' PostProcess
  /// phase. Other pipelines may still depend on it.
  pub fn isolated(mut self) -> Self {
    self.isolated = true;
    self
  }

  pub fn modules(&self, phase: Phase) -> &[Arc<dyn Module>] {
    &self.phases[phase.index()]
  }

  pub fn dependencies(&self) -> &BTreeSet<String> {
    &self.dependencies
  }

  pub fn is_isolated(&self) -> bool {
    self.isolated
  }
}

impl fmt::Debug for Pipeline {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut s = f.debug_struct("Pipeline");
    for phase in Phase::ALL {
      let names: Vec<&str> = self.modules(phase).iter().map(|m| m.name()).collect();
      s.field(phase.as_str(), &names);
    }
    s.field("dependencies", &self.dependencies)
      .field("isolated", &self.isolated)
      .finish()
  }
}
