use clap::Parser;
use demand_forecast::{Pipeline, PipelineConfig, Result, Stage};
use std::path::PathBuf;
use std::process;

/// Weekly regional demand forecasting pipeline
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// JSON configuration file; defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Held-out weeks per region
    #[arg(long)]
    test_weeks: Option<usize>,

    /// Weeks of context per LSTM window
    #[arg(long)]
    lookback: Option<usize>,

    /// Seed for every random draw
    #[arg(long)]
    seed: Option<u64>,

    /// Regions to forecast, comma separated
    #[arg(long, value_delimiter = ',')]
    regions: Option<Vec<String>>,

    /// Stage to run
    #[arg(value_enum)]
    stage: Stage,
}

impl Cli {
    fn config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(test_weeks) = self.test_weeks {
            config.test_weeks = test_weeks;
        }
        if let Some(lookback) = self.lookback {
            config.lookback = lookback;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(regions) = &self.regions {
            config.regions = regions.iter().map(|r| r.trim().to_string()).collect();
        }
        Ok(config)
    }
}

fn run(cli: Cli) -> Result<()> {
    let pipeline = Pipeline::new(cli.config()?)?;
    pipeline.run(cli.stage)
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}
