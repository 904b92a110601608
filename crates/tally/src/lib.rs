#![doc = include_str!("../README.md")]

mod config;
mod error;
mod generator;
mod store;

pub use crate::config::*;
pub use crate::error::*;
pub use crate::generator::*;
pub use crate::store::*;
