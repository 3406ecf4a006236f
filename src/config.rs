use std::{fs, path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::machine::MachineIdentity;
use crate::production::DEFAULT_WINDOW_CAPACITY;

#[derive(Debug, Parser)]
#[command(name = "packline")]
#[command(about = "Run/stop time accounting and throughput dashboard for one packaging machine")]
pub struct Cli {
    /// JSON settings file; missing keys fall back to defaults
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address to serve the API on, e.g. 0.0.0.0:3000
    #[arg(long)]
    pub listen: Option<String>,

    /// SQLite database path
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Seconds between throughput samples
    #[arg(long)]
    pub sample_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "snake_case")]
pub struct AppConfig {
    pub machine: MachineIdentity,
    pub listen: String,
    pub database_path: PathBuf,
    pub sample_interval_secs: u64,
    pub window_capacity: usize,
    pub min_units_per_sample: u64,
    pub max_units_per_sample: u64,
    pub expected_units_per_sample: u64,
    /// Offset from UTC used for display labels. Defaults to IST.
    pub utc_offset_minutes: i32,
    pub history_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            machine: MachineIdentity::default(),
            listen: "127.0.0.1:3000".into(),
            database_path: PathBuf::from("production_monitoring.sqlite3"),
            sample_interval_secs: 5,
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            min_units_per_sample: 10,
            max_units_per_sample: 20,
            expected_units_per_sample: 20,
            utc_offset_minutes: 330,
            history_limit: 100,
        }
    }
}

impl AppConfig {
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read settings from {}", path.display()))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("Invalid settings in {}", path.display()))?
            }
            None => AppConfig::default(),
        };

        if let Some(listen) = &cli.listen {
            config.listen = listen.clone();
        }
        if let Some(db) = &cli.db {
            config.database_path = db.clone();
        }
        if let Some(secs) = cli.sample_interval_secs {
            config.sample_interval_secs = secs;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_interval_secs == 0 {
            bail!("sample_interval_secs must be greater than zero");
        }
        if self.window_capacity == 0 {
            bail!("window_capacity must be greater than zero");
        }
        if self.min_units_per_sample > self.max_units_per_sample {
            bail!(
                "min_units_per_sample ({}) exceeds max_units_per_sample ({})",
                self.min_units_per_sample,
                self.max_units_per_sample
            );
        }
        if self.utc_offset_minutes.abs() >= 24 * 60 {
            bail!("utc_offset_minutes must be within one day");
        }
        if self.history_limit == 0 {
            bail!("history_limit must be greater than zero");
        }
        Ok(())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }
}
