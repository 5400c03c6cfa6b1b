//! Core domain types shared across the rule graph engine: target identity,
//! source paths, the deterministic digest primitives the rule-key engine is
//! built from, structured events and the external-collaborator traits.

pub mod config;
pub mod digest;
pub mod error;
pub mod event;
pub mod shared;
pub mod target;
pub mod traits;

pub use config::{BuildConfig, ConfigOverride, OutputLayout};
pub use digest::{Digest, DigestBuilder};
pub use error::{BuildError, ErrorReport, Result};
pub use event::{now_millis, BuildEvent, EventBus};
pub use shared::SharedStr;
pub use target::{
    CellName, Configuration, Flavor, FlavorSet, PackagePath, SourcePath, TargetLabel, TargetName,
};
pub use traits::{CellPaths, Filesystem, ProcessExecutor, ProcessOutput};
