use clap::Parser;
use std::path::PathBuf;

use crate::config;

#[derive(Parser, Debug)]
#[command(name = "sessioncore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Timeline core for a meeting recorder daemon", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/sessioncore.toml")]
    pub config: PathBuf,

    /// Directory persisted sessions are written under, overriding the config file
    #[arg(long)]
    pub sessions_dir: Option<PathBuf>,

    /// HTTP bind address, e.g. 0.0.0.0:8008, overriding the config file
    #[arg(long)]
    pub bind: Option<String>,

    /// Log level filter (error, warn, info, debug, trace), overriding the config file
    #[arg(long)]
    pub log_level: Option<String>,

    /// Verbose logging; equivalent to --log-level debug
    #[arg(short, long, action)]
    pub verbose: bool,
}

impl Args {
    /// Loads the configuration file and applies any CLI overrides.
    pub fn load_config(&self) -> Result<config::Config, Box<dyn std::error::Error>> {
        let mut cfg = config::Config::load(&self.config)?;

        if let Some(ref dir) = self.sessions_dir {
            cfg.server.sessions_dir = dir.clone();
        }
        if let Some(ref bind) = self.bind {
            if let Some((host, port)) = bind.rsplit_once(':') {
                cfg.server.host = host.to_string();
                cfg.server.port = port.parse()?;
            }
        }
        if let Some(ref level) = self.log_level {
            cfg.logging.level = level.clone();
        }
        if self.verbose {
            cfg.logging.level = "debug".to_string();
        }

        cfg.validate()?;
        Ok(cfg)
    }
}
