use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use std::path::PathBuf;

/// Runtime configuration for the `tally-tonic-server` binary.
///
/// All values are parsed from CLI arguments or environment variables. The
/// defaults keep every acknowledged write on disk, which is what counter
/// generators rely on to never reissue a value after a restart.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "tally-tonic-server",
    version,
    about = "A persistent gRPC counter store for tally generators"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix
    /// socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/tally.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a
    /// file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Directory holding the sled database.
    ///
    /// Environment variable: `DATA_DIR`
    #[arg(long, env = "DATA_DIR", default_value = "tally.db")]
    pub data_dir: PathBuf,

    /// Keep the database in a temporary location that is removed on exit.
    /// Useful for tests and benchmarks; counters do not survive a restart.
    ///
    /// Environment variable: `TEMPORARY`
    #[arg(long, env = "TEMPORARY", default_value_t = false)]
    pub temporary: bool,

    /// Flush the database before acknowledging a write.
    ///
    /// Disabling this trades durability for latency: a crash may lose the
    /// last acknowledged increments, so a restarted store can hand out a
    /// value twice.
    ///
    /// Environment variable: `SYNC_WRITES`
    #[arg(long, env = "SYNC_WRITES", default_value_t = true, action = clap::ArgAction::Set)]
    pub sync_writes: bool,

    /// Interval of sled's background flush, in milliseconds. `0` disables it.
    ///
    /// Environment variable: `FLUSH_EVERY_MS`
    #[arg(long, env = "FLUSH_EVERY_MS", default_value_t = 500)]
    pub flush_every_ms: u64,

    /// Size of sled's page cache, in bytes.
    ///
    /// Environment variable: `CACHE_CAPACITY`
    #[arg(long, env = "CACHE_CAPACITY", default_value_t = 64 * 1024 * 1024)]
    pub cache_capacity: u64,

    /// How long to wait for open connections to close after a shutdown
    /// signal, in milliseconds. Connections still open afterwards are cut.
    ///
    /// Environment variable: `SHUTDOWN_GRACE_MS`
    #[arg(long, env = "SHUTDOWN_GRACE_MS", default_value_t = 5_000)]
    pub shutdown_grace_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub data_dir: PathBuf,
    pub temporary: bool,
    pub sync_writes: bool,
    pub flush_every_ms: Option<u64>,
    pub cache_capacity: u64,
    pub shutdown_grace: Duration,
}

impl ServerConfig {
    /// Configuration for a throwaway in-memory store, used by tests.
    #[cfg(test)]
    pub fn temporary() -> Self {
        Self {
            server_addr: String::from("127.0.0.1:0"),
            uds: false,
            data_dir: PathBuf::new(),
            temporary: true,
            sync_writes: false,
            flush_every_ms: None,
            cache_capacity: 8 * 1024 * 1024,
            shutdown_grace: Duration::from_millis(200),
        }
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.cache_capacity == 0 {
            bail!("CACHE_CAPACITY must be greater than 0");
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            data_dir: args.data_dir,
            temporary: args.temporary,
            sync_writes: args.sync_writes,
            flush_every_ms: (args.flush_every_ms > 0).then_some(args.flush_every_ms),
            cache_capacity: args.cache_capacity,
            shutdown_grace: Duration::from_millis(args.shutdown_grace_ms),
        })
    }
}
