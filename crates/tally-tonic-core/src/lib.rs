#![doc = include_str!("../README.md")]

mod client;
mod common;
pub use client::*;
pub use common::*;
// Public re-export so downstream crates can access `tally` via
// `tally_tonic_core::tally`
pub use tally;

/// gRPC service and message definitions generated from `proto/tally.proto`.
pub mod proto {
    tonic::include_proto!("tally");

    /// Encoded file descriptor set, served through gRPC reflection.
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("tally_descriptor");
}
