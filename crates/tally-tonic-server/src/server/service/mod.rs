//! gRPC service implementation.
//!
//! - [`handler`] - gRPC service entry point (`StoreService`).

pub mod handler;

#[cfg(test)]
mod tests;
