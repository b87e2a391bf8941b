//! quire-lib: Core types and engine for quire
//!
//! This crate provides the content-transformation build engine:
//! - `Document`: immutable content plus layered, lazily resolved metadata
//! - `Config`: constant, context-bound or document-bound values
//! - `Module`: a step that turns one ordered set of documents into another
//! - `Pipeline`: modules across the Input, Process, PostProcess and Output phases
//! - `Engine`: dependency-ordered, concurrent execution of named pipelines
//!
//! The crate installs no tracing subscriber; drivers do.

pub mod config;
pub mod consts;
pub mod document;
pub mod execute;
pub mod meta;
pub mod module;
pub mod pipeline;

pub use config::{Config, ConfigError, ConfigResult, ContextConfig};
pub use document::{Content, ContentSource, Document, DocumentId};
pub use execute::{Engine, EngineConfig, EngineError, ExecuteError, ExecutionContext, PipelineStatus, RunResult};
pub use meta::{ConversionError, FromValue, Metadata, Value};
pub use module::{Module, ModuleError};
pub use pipeline::{Phase, Pipeline};

pub use tokio_util::sync::CancellationToken;
