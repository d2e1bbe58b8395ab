pub mod catalog;
pub mod checkpoint;
pub mod snapshot;
