#![forbid(unsafe_code)]

mod config;
mod params;
mod protocol;
mod render;
mod server;
mod stdio;

use crm_storage::SqliteStore;

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

fn usage() -> &'static str {
    "crm_service: real-estate CRM entity service (newline JSON-RPC over stdio)\n\n\
USAGE:\n\
  crm_service [--storage-dir DIR] [--busy-timeout-ms MS] [--retry-attempts N]\n\
\n\
FLAGS:\n\
  -h, --help       Print this help and exit\n\
  -V, --version    Print version and exit\n\
\n\
ENVIRONMENT:\n\
  CRM_STORAGE_DIR, CRM_BUSY_TIMEOUT_MS, CRM_RETRY_ATTEMPTS  defaults for the flags above\n\
  CRM_LOG                                                   log filter (default: warn)\n"
}

fn version_line() -> String {
    format!("crm_service {SERVER_VERSION}")
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = std::env::args().collect::<Vec<_>>();
    if args
        .iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
    {
        print!("{}", usage());
        return Ok(());
    }
    if args
        .iter()
        .any(|arg| matches!(arg.as_str(), "-V" | "--version"))
    {
        println!("{}", version_line());
        return Ok(());
    }

    // stdout carries the protocol; logs go to stderr only.
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("CRM_LOG", "warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = config::ServiceConfig::parse(&args, |key| std::env::var(key).ok())?;
    let store = SqliteStore::open_with_config(&config.storage_dir, config.store)?;
    log::info!(
        "store ready at {} (busy_timeout={:?}, retry_attempts={})",
        store.storage_dir().display(),
        store.config().busy_timeout,
        store.config().retry_attempts
    );
    let mut server = server::CrmServer::new(store);
    stdio::run_stdio(&mut server)
}
