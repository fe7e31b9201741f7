use clap::Parser;
use std::path::PathBuf;

use projection_rtc::config;

#[derive(Parser, Debug)]
#[command(name = "projection-rtc")]
#[command(version)]
#[command(about = "WebRTC signaling client for screen projection", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/projection-rtc.toml")]
    pub config: PathBuf,

    /// Signaling server URL (overrides the config file)
    #[arg(short, long)]
    pub url: Option<String>,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,
}

impl Args {
    pub fn load_config(&self) -> Result<config::Config, Box<dyn std::error::Error>> {
        let mut config = config::Config::load(&self.config)?;
        if let Some(ref url) = self.url {
            config.signaling.url = url.clone();
        }
        Ok(config)
    }
}
