//! Pipeline dependency graph.
//!
//! This module provides a directed acyclic graph (DAG) of pipelines, with an
//! edge from each dependency to its dependent, and computes the order and
//! parallel waves the engine reports.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};

use super::types::EngineError;
use crate::pipeline::Pipeline;

/// A DAG of registered pipelines.
pub struct PipelineDag {
  /// The underlying graph; node weights are pipeline names.
  graph: DiGraph<String, ()>,

  /// Map from pipeline name to node index.
  nodes: HashMap<String, NodeIndex>,
}

impl PipelineDag {
  /// Build the DAG from the registered pipelines.
  ///
  /// # Errors
  ///
  /// - `UnknownDependency` if a dependency names no registered pipeline.
  /// - `IsolatedDependency` if an isolated pipeline declares dependencies.
  /// - `CycleDetected` if dependencies form a cycle; the members of the first
  ///   cycle found are reported in name order.
  pub fn build(pipelines: &BTreeMap<String, Arc<Pipeline>>) -> Result<Self, EngineError> {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();

    // First pass: a node per pipeline
    for name in pipelines.keys() {
      let idx = graph.add_node(name.clone());
      nodes.insert(name.clone(), idx);
    }

    // Second pass: edges from dependency to dependent
    for (name, pipeline) in pipelines {
      if pipeline.is_isolated() && !pipeline.dependencies().is_empty() {
        return Err(EngineError::IsolatedDependency(name.clone()));
      }

      let dependent_idx = nodes[name];
      for dep in pipeline.dependencies() {
        let Some(&dep_idx) = nodes.get(dep) else {
          return Err(EngineError::UnknownDependency {
            pipeline: name.clone(),
            dependency: dep.clone(),
          });
        };
        graph.add_edge(dep_idx, dependent_idx, ());
      }
    }

    let dag = Self { graph, nodes };
    dag.verify_acyclic()?;
    Ok(dag)
  }

  /// Verify that the graph is acyclic, naming the cycle members otherwise.
  fn verify_acyclic(&self) -> Result<(), EngineError> {
    if toposort(&self.graph, None).is_ok() {
      return Ok(());
    }

    let cycle = tarjan_scc(&self.graph)
      .into_iter()
      .find(|scc| scc.len() > 1 || scc.iter().any(|&idx| self.graph.contains_edge(idx, idx)))
      .unwrap_or_default();

    let mut members: Vec<String> = cycle.into_iter().map(|idx| self.graph[idx].clone()).collect();
    members.sort();
    Err(EngineError::CycleDetected { members })
  }

  /// Get pipeline names in topological order.
  ///
  /// Dependencies come before dependents.
  pub fn topological_order(&self) -> Result<Vec<String>, EngineError> {
    let sorted = toposort(&self.graph, None).map_err(|cycle| EngineError::CycleDetected {
      members: vec![self.graph[cycle.node_id()].clone()],
    })?;
    Ok(sorted.into_iter().map(|idx| self.graph[idx].clone()).collect())
  }

  /// Get pipelines organized into dependency waves.
  ///
  /// Each wave contains pipelines whose dependencies are all in previous
  /// waves. Names within a wave are sorted.
  pub fn waves(&self) -> Result<Vec<Vec<String>>, EngineError> {
    // Kahn's algorithm, one level at a time
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();

    let mut waves = Vec::new();
    let mut remaining: Vec<NodeIndex> = self.graph.node_indices().collect();

    while !remaining.is_empty() {
      let (ready, rest): (Vec<NodeIndex>, Vec<NodeIndex>) =
        remaining.into_iter().partition(|idx| in_degree[idx] == 0);

      if ready.is_empty() {
        let mut members: Vec<String> = rest.iter().map(|&idx| self.graph[idx].clone()).collect();
        members.sort();
        return Err(EngineError::CycleDetected { members });
      }

      for &idx in &ready {
        for neighbor in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&neighbor) {
            *deg = deg.saturating_sub(1);
          }
        }
      }

      let mut wave: Vec<String> = ready.into_iter().map(|idx| self.graph[idx].clone()).collect();
      wave.sort();
      waves.push(wave);
      remaining = rest;
    }

    Ok(waves)
  }

  /// Get the direct dependencies of a pipeline, sorted.
  pub fn dependencies(&self, name: &str) -> Vec<String> {
    self.neighbors(name, Direction::Incoming)
  }

  /// Get the pipelines that directly depend on a pipeline, sorted.
  pub fn dependents(&self, name: &str) -> Vec<String> {
    self.neighbors(name, Direction::Outgoing)
  }

  fn neighbors(&self, name: &str, direction: Direction) -> Vec<String> {
    let Some(&idx) = self.nodes.get(name) else {
      return Vec::new();
    };

    let mut names: Vec<String> = self
      .graph
      .neighbors_directed(idx, direction)
      .map(|n| self.graph[n].clone())
      .collect();
    names.sort();
    names.dedup();
    names
  }

  /// Get the number of pipelines in the DAG.
  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
}
