//! Data models for the resource directory.
//!
//! Wire format is camelCase JSON; enum values keep the store's lowercase names.

mod change;
mod edit;
mod resource;
mod snapshot;
mod visitor;
mod vote;

pub use change::*;
pub use edit::*;
pub use resource::*;
pub use snapshot::*;
pub use visitor::*;
pub use vote::*;
