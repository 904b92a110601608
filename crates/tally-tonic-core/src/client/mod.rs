mod config;
mod remote;

pub use config::*;
pub use remote::*;
