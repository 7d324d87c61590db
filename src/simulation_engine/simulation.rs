// simulation.rs
use crate::shared_data::SimulationReport;
use crate::simulation_engine::intersection::Crossroad;
use crate::simulation_engine::vehicles::Car;

use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

/// Runs every car as its own blocking task, waits for all of them, then shuts
/// the crossroad down and summarises the event log.
pub async fn run_simulation(crossroad: Arc<Crossroad>, cars: Vec<Car>) -> SimulationReport {
    let started = Instant::now();
    log::info!("Starting simulation with {} cars", cars.len());

    let mut tasks = JoinSet::new();
    for car in cars {
        let crossroad = Arc::clone(&crossroad);
        // enter() parks the thread, so cars must not run on the async workers
        tasks.spawn_blocking(move || (car.id, car.run(&crossroad)));
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((id, Ok(()))) => log::debug!("Car {} finished", id),
            Ok((id, Err(e))) => log::warn!("Car {} did not cross: {}", id, e),
            Err(e) => log::error!("Car task failed: {}", e),
        }
    }

    crossroad.shutdown();
    let report = SimulationReport::from_records(&crossroad.events().records(), started.elapsed());
    log::info!(
        "Simulation finished: {} cars in {}ms",
        report.cars_finished,
        report.duration_ms
    );
    report
}
