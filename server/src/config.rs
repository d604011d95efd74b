use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// Serves the curio viewer, its generation proxy and block persistence.
///
/// Every option can also be set through the environment or a `.env` file.
#[derive(Debug, Clone, clap::Parser)]
pub(crate) struct Config {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    pub(crate) bind_addr: SocketAddr,

    /// Postgres connection url. Blocks are kept in memory when unset.
    #[arg(long, env = "DATABASE_URL")]
    pub(crate) database_url: Option<String>,

    /// Function name the generation proxy is mounted under.
    #[arg(long, env = "PROXY_FUNCTION", default_value = "generate-content-page")]
    pub(crate) proxy_function: String,

    /// Function name of the generation engine, substituted for the proxy's
    /// name in the request url.
    #[arg(long, env = "UPSTREAM_FUNCTION", default_value = "generate-content")]
    pub(crate) upstream_function: String,

    /// Origin hosting the generation engine, e.g. `https://fn.example`.
    /// Defaults to the origin the proxy was called on.
    #[arg(long, env = "UPSTREAM_ORIGIN")]
    pub(crate) upstream_origin: Option<String>,

    /// Seconds to wait for the generation engine before giving up.
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 60)]
    pub(crate) upstream_timeout_secs: u64,

    /// Directory of compiled frontend assets.
    #[arg(long, env = "ASSETS_DIR", default_value = "assets")]
    pub(crate) assets_dir: PathBuf,

    /// Page served for every route the api does not claim.
    #[arg(long, env = "INDEX_FILE", default_value = "index.html")]
    pub(crate) index_file: PathBuf,
}

impl Config {
    pub(crate) fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}
