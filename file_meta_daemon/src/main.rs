mod file_meta_daemon;

use log::error;
use std::env;
use std::path::PathBuf;

use crate::file_meta_daemon::{
    init_logging, run_file_meta_daemon, FileMetaDaemonConfig, FileMetaDaemonRunOptions,
    DEFAULT_FILE_META_CONFIG_PATH,
};

fn usage() -> String {
    format!(
        "usage: file_meta_daemon [--config <path>] [--listen <addr>] [--db <path>]\n\
         defaults:\n\
         --config {}",
        DEFAULT_FILE_META_CONFIG_PATH
    )
}

fn parse_args(args: Vec<String>) -> Result<FileMetaDaemonRunOptions, String> {
    let mut options = FileMetaDaemonRunOptions {
        config_path: PathBuf::from(DEFAULT_FILE_META_CONFIG_PATH),
        config_path_explicit: false,
        listen_addr: None,
        db_path: None,
    };

    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        if flag == "-h" || flag == "--help" {
            return Err(usage());
        }
        i += 1;
        let value = args
            .get(i)
            .ok_or_else(|| format!("missing value for {}\n{}", flag, usage()))?;
        match flag {
            "--config" => {
                options.config_path = PathBuf::from(value);
                options.config_path_explicit = true;
            }
            "--listen" => options.listen_addr = Some(value.clone()),
            "--db" => options.db_path = Some(PathBuf::from(value)),
            other => {
                return Err(format!("unknown argument: {}\n{}", other, usage()));
            }
        }
        i += 1;
    }

    Ok(options)
}

#[tokio::main]
async fn main() {
    let options = match parse_args(env::args().skip(1).collect()) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{}", msg);
            std::process::exit(1);
        }
    };

    let config = match FileMetaDaemonConfig::load(&options) {
        Ok(v) => v,
        Err(err) => {
            eprintln!("load config failed: {}", err);
            std::process::exit(1);
        }
    };
    init_logging(&config.log_level);

    if let Err(err) = run_file_meta_daemon(config).await {
        error!("run file_meta_daemon failed: {}", err);
        std::process::exit(1);
    }
}
