// simulation_main.rs
use clap::Parser;
use crossroad::global_variables::DEFAULT_RANDOM_SEED;
use crossroad::simulation_engine::simulation::run_simulation;
use crossroad::simulation_engine::vehicles::{demo_cars, random_cars};
use crossroad::{Car, CarId, ConflictCheck, Crossroad, CrossroadConfig, Trajectory};
use eyre::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Simulate cars crossing a signalled four-way crossroad
#[derive(Debug, Parser)]
#[command(name = "simulation_main", version)]
struct Cli {
    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    green_ms: Option<u64>,

    #[arg(long)]
    yellow_ms: Option<u64>,

    #[arg(long)]
    dwell_ms: Option<u64>,

    /// trajectory or direction-pairs
    #[arg(long)]
    conflict_check: Option<ConflictCheck>,

    /// Car trajectory such as N:S (repeatable)
    #[arg(long = "car")]
    cars: Vec<Trajectory>,

    /// Add this many cars on random trajectories
    #[arg(long, default_value_t = 0)]
    random_cars: usize,

    #[arg(long, default_value_t = DEFAULT_RANDOM_SEED)]
    seed: u64,

    /// Write every crossroad event to this CSV file
    #[arg(long)]
    events_csv: Option<PathBuf>,
}

impl Cli {
    fn crossroad_config(&self) -> Result<CrossroadConfig> {
        let mut config = match &self.config {
            Some(path) => CrossroadConfig::load(path)
                .context(format!("Failed to load config from {}", path.display()))?,
            None => CrossroadConfig::default(),
        };
        if let Some(ms) = self.green_ms {
            config.green_ms = ms;
        }
        if let Some(ms) = self.yellow_ms {
            config.yellow_ms = ms;
        }
        if let Some(ms) = self.dwell_ms {
            config.dwell_ms = ms;
        }
        if let Some(check) = self.conflict_check {
            config.conflict_check = check;
        }
        config.validate()?;
        Ok(config)
    }

    fn car_plan(&self, config: &CrossroadConfig) -> Vec<Car> {
        let mut cars: Vec<Car> = self
            .cars
            .iter()
            .enumerate()
            .map(|(i, trajectory)| Car {
                id: CarId(i as u64 + 1),
                trajectory: *trajectory,
                dwell: config.dwell(),
            })
            .collect();

        let offset = cars.len() as u64;
        cars.extend(
            random_cars(self.random_cars, self.seed, config.dwell())
                .into_iter()
                .map(|car| Car {
                    id: CarId(car.id.0 + offset),
                    ..car
                }),
        );

        if cars.is_empty() {
            cars = demo_cars(config.dwell());
        }
        cars
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = cli.crossroad_config()?;
    let cars = cli.car_plan(&config);

    let crossroad = Arc::new(Crossroad::new(&config)?);
    let report = run_simulation(Arc::clone(&crossroad), cars).await;

    if let Some(path) = &cli.events_csv {
        crossroad
            .events()
            .save_csv(path)
            .context(format!("Failed to write events to {}", path.display()))?;
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
