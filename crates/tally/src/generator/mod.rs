mod increment;
mod interface;
mod mutex;

pub use increment::*;
pub use interface::*;
pub(crate) use mutex::*;
