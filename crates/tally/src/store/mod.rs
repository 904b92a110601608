mod error;
mod interface;
mod memory;
mod schema;

pub use error::*;
pub use interface::*;
pub use memory::*;
pub use schema::*;
