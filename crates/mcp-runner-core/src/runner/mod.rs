mod container;
mod inner;

pub use container::{PreparedCommand, prepare_container_command};
pub use inner::{Initialized, RunnerInner, Uninitialized};
