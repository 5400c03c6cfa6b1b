//! The remote-execution action builder: a Merkle-tree input root shared
//! across rules via a read-mostly node cache, an upload gate deciding which
//! blobs a remote store still needs, and the per-rule dispatch state
//! machine.

pub mod action;
pub mod cache;
pub mod state;
pub mod tree;
pub mod upload;

pub use action::{RemoteAction, RemoteActionBuilder, ResolvedInput, Unsupported};
pub use cache::NodeCache;
pub use state::{IllegalTransition, RemoteExecutionMachine, RemoteState};
pub use tree::{Child, DirNode, TreeBuilder, TreeEntry};
pub use upload::{BlobProducer, UploadPlanner};
