// intersection_main.rs
use intersection_signals::config::SimulationConfig;
use intersection_signals::monitoring::event_recorder::{
    read_event_log, summarize_events, CsvEventLog, EventHistory,
};
use intersection_signals::signal_system::scheduler::TokioScheduler;
use intersection_signals::{IntersectionController, Signal};
use std::error::Error;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => match SimulationConfig::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Could not load config '{}': {}", path, e);
                std::process::exit(1);
            }
        },
        None => SimulationConfig::default(),
    };

    if let Err(e) = run(config).await {
        eprintln!("Intersection error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: SimulationConfig) -> Result<(), Box<dyn Error>> {
    let scheduler = Arc::new(TokioScheduler::current()?);
    let mut controller = IntersectionController::new(scheduler, config.time_unit());
    let history = Arc::new(EventHistory::new());
    controller.add_event_sink(history.clone())?;

    if let Some(path) = &config.event_log {
        controller.add_event_sink(Arc::new(CsvEventLog::open(path)?))?;
    }

    for i in 1..=config.vehicle_signals {
        controller.register(Signal::vehicle(format!("vehicle-{}", i)))?;
    }
    for i in 1..=config.pedestrian_signals {
        controller.register(Signal::pedestrian(format!("pedestrian-{}", i)))?;
    }
    controller.connect_all()?;

    println!(
        "Starting intersection with {} signals (Ctrl-C to stop)...",
        controller.len()
    );
    controller.run(config.tick_interval())?;

    tokio::signal::ctrl_c().await?;
    controller.shutdown().await;

    println!("Signal summary for this run:");
    for summary in summarize_events(&history.events()) {
        println!("{:?}", summary);
    }
    if let Some(path) = &config.event_log {
        let logged = read_event_log(path)?;
        println!(
            "Event log {} holds {} events (cumulative across runs)",
            path.display(),
            logged.len()
        );
    }
    Ok(())
}
