//! Command-line argument parsing for the dmproxy daemon

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "dmproxy.toml", env = "DMPROXY_CONFIG")]
    pub config: String,

    /// Address the statistics polling endpoint listens on
    #[arg(short, long, default_value = "127.0.0.1:9095", env = "DMPROXY_LISTEN")]
    pub listen: String,

    /// Number of worker threads (default: 1, use 0 for CPU cores)
    #[arg(short, long, env = "DMPROXY_THREADS")]
    pub threads: Option<usize>,
}

impl Args {
    /// Worker threads to run the runtime with; `0` means one per CPU core.
    #[must_use]
    pub fn worker_threads(&self) -> usize {
        let cores = std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1);
        match self.threads {
            None => 1,
            Some(0) => cores,
            Some(n) => n,
        }
    }
}
