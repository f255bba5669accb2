pub mod entry;
pub mod sort;

pub use entry::*;
pub use sort::*;
