//! Local step execution: concrete [`ruleforge_action::Step`] implementations
//! plus the filesystem and process-executor collaborators they run against.

pub mod local_fs;
pub mod process;
pub mod steps;

pub use local_fs::LocalFilesystem;
pub use process::TokioProcessExecutor;
pub use steps::{CopyStep, MkdirStep, ProcessStep, SymlinkTreeStep, WriteStep};
