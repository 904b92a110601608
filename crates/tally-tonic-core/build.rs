/// Builds the gRPC client and server code for `proto/tally.proto` using
/// `tonic-prost-build`.
///
/// Alongside the bindings, a file descriptor set is written to `OUT_DIR` so the
/// server can expose gRPC reflection.
///
/// Generated code is accessible via:
///
/// ```rust,ignore
/// pub mod proto {
///     tonic::include_proto!("tally");
/// }
/// ```
use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let descriptor_path = out_dir.join("tally_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();
    config.file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure().compile_with_config(
        config,
        &["proto/tally.proto"],
        &["proto"],
    )?;

    println!("cargo:rerun-if-changed=proto/tally.proto");
    Ok(())
}
