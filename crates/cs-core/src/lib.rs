//! cs-core: response lineage and caller registry for chainscope
//!
//! Callers transform inputs into responses; every response remembers the
//! caller that produced it and the input it came from, so any output can be
//! traced back to its original seed. The crate does no I/O besides reading
//! backend configuration; network access is delegated to a [`Fetcher`].

pub mod caller;
pub mod config;
pub mod error;
pub mod fetch;
pub mod registry;
pub mod response;

pub use caller::{Caller, CallerKind, SystemContext, TransformFn, Transformed, content_hash};
pub use config::{ChatRequest, ConfigError, FetchConfig, GenerationSettings};
pub use error::{BoxError, LineageError};
pub use fetch::{ContextEntry, FetchError, Fetcher};
pub use registry::CallerRegistry;
pub use response::{CallerRef, Chain, Expanded, Generator, Input, Response, display_value};
