//! Model discovery, caching and resolution.
//!
//! - [`cache`]: per-provider TTL cache of discovered model lists
//! - [`discovery`]: concurrent provider listing behind the [`ModelSource`] seam
//! - [`resolver`]: favourite shorthand → full identifier + credential

pub mod cache;
pub mod discovery;
pub mod errors;
pub mod resolver;

pub use cache::ModelCache;
pub use discovery::{HttpModelSource, ModelDiscovery, ModelSource};
pub use errors::{ProviderFetchError, ResolveError};
pub use resolver::{resolve, ResolvedModel};
