pub mod gen;
pub mod tables;
pub mod types;

pub use gen::*;
pub use tables::*;
pub use types::*;
