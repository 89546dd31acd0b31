use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Registry listening host
    #[arg(long, env = "REGISTRY_HOST", default_value = "localhost")]
    pub host: String,

    /// Registry listening port
    #[arg(short, long, env = "REGISTRY_PORT", default_value_t = 5080)]
    pub port: u16,

    /// Storage backend type
    #[arg(short, long, env = "REGISTRY_STORAGE", default_value = "FILESYSTEM")]
    pub storage: String,

    /// Registry root path
    #[arg(long, env = "REGISTRY_ROOT", default_value = "testdata")]
    pub root: PathBuf,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Config {
            host: args.host,
            port: args.port,
            storage_backend: args.storage,
            root_dir: args.root,
        }
    }
}
