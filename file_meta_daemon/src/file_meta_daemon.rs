use file_meta_lib::{file_meta_routes, FileMetaDB, FileMetaError, FileMetaResult, FileMetaService};
use log::{info, warn, LevelFilter};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};
use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_FILE_META_CONFIG_PATH: &str = "/opt/file_meta/etc/file_meta_daemon.json";
pub const LOG_LEVEL_ENV: &str = "FILE_META_LOG";

#[derive(Debug, Clone)]
pub struct FileMetaDaemonRunOptions {
    pub config_path: PathBuf,
    /// false when the path is the built-in default, so a missing file is not fatal
    pub config_path_explicit: bool,
    pub listen_addr: Option<String>,
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileMetaDaemonConfig {
    #[serde(alias = "bind", alias = "addr")]
    pub listen_addr: String,
    #[serde(alias = "meta_db_path")]
    pub db_path: PathBuf,
    #[serde(alias = "log")]
    pub log_level: String,
}

impl Default for FileMetaDaemonConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            db_path: PathBuf::from("/opt/file_meta/var/file_meta.db"),
            log_level: "info".to_string(),
        }
    }
}

impl FileMetaDaemonConfig {
    pub fn load(options: &FileMetaDaemonRunOptions) -> FileMetaResult<Self> {
        let mut config = if options.config_path.exists() || options.config_path_explicit {
            read_json_config::<FileMetaDaemonConfig>(&options.config_path)?
        } else {
            FileMetaDaemonConfig::default()
        };
        if let Some(listen_addr) = options.listen_addr.as_ref() {
            config.listen_addr = listen_addr.clone();
        }
        if let Some(db_path) = options.db_path.as_ref() {
            config.db_path = db_path.clone();
        }
        Ok(config)
    }

    pub fn socket_addr(&self) -> FileMetaResult<SocketAddr> {
        self.listen_addr.parse::<SocketAddr>().map_err(|e| {
            FileMetaError::InvalidParam(format!("bad listen_addr {}: {}", self.listen_addr, e))
        })
    }
}

pub fn read_json_config<T: DeserializeOwned>(path: &Path) -> FileMetaResult<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| FileMetaError::IoError(format!("read {} failed: {}", path.display(), e)))?;
    serde_json::from_str::<T>(&content)
        .map_err(|e| FileMetaError::InvalidData(format!("parse {} failed: {}", path.display(), e)))
}

pub fn parse_level(level: &str) -> LevelFilter {
    match level.trim().to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

pub fn init_logging(config_level: &str) {
    let level = std::env::var(LOG_LEVEL_ENV)
        .map(|v| parse_level(&v))
        .unwrap_or_else(|_| parse_level(config_level));
    let log_config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build();
    // a logger may already be installed when embedded
    let _ = TermLogger::init(level, log_config, TerminalMode::Mixed, ColorChoice::Auto);
}

fn ensure_db_dir(db_path: &Path) -> FileMetaResult<()> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            FileMetaError::IoError(format!("create {} failed: {}", parent.display(), e))
        })?;
    }
    Ok(())
}

/// Resolves when `signal` fires. If the handler could not be installed the
/// server keeps running until the process is killed.
async fn shutdown_signal<S>(signal: S)
where
    S: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("file_meta_daemon: ctrl-c received, shutting down"),
        Err(e) => {
            warn!("file_meta_daemon: install ctrl-c handler failed: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

pub async fn run_file_meta_daemon(config: FileMetaDaemonConfig) -> FileMetaResult<()> {
    let addr = config.socket_addr()?;
    ensure_db_dir(&config.db_path)?;
    let db = FileMetaDB::new(&config.db_path)?;
    let service = Arc::new(FileMetaService::new(Arc::new(db)));

    let (bound, server) = warp::serve(file_meta_routes(service))
        .try_bind_with_graceful_shutdown(addr, shutdown_signal(tokio::signal::ctrl_c()))
        .map_err(|e| FileMetaError::IoError(format!("bind {} failed: {}", addr, e)))?;
    info!(
        "file_meta_daemon listening on {} (db {})",
        bound,
        config.db_path.display()
    );
    server.await;
    info!("file_meta_daemon stopped");
    Ok(())
}
