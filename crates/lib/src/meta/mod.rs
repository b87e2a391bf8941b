//! Document metadata: values, layered maps, and typed conversion.

pub mod convert;
pub mod metadata;
pub mod value;

pub use convert::{ConversionError, FromValue};
pub use metadata::{Metadata, resolve};
pub use value::Value;
