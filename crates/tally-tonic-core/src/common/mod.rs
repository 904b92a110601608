pub mod convert;
pub mod error;

pub use error::*;
