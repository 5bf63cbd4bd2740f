//! Lifeline mission: four astronauts, one oxygen dispenser.
//!
//! Demonstrates:
//!   1. Starting a crew at staggered oxygen levels (5, 12, 25, 60)
//!   2. Priority arbitration: the most depleted astronaut is served first,
//!      even though the crew is started in reverse priority order
//!   3. Watching the event stream while sessions run on their own threads
//!   4. Stopping the run and reading the final dispenser snapshot
//!
//! Run with:
//!   cargo run -p lifeline-engine --example mission
//!
//! Set `RUST_LOG=lifeline_engine=debug` to see every enqueue, grant, and
//! release from the engine itself.

use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use lifeline_engine::{
    CrewSpec, SessionConfig, Simulation, SimulationConfig, SimulationEvent,
};
use tracing_subscriber::EnvFilter;

const MISSION_LENGTH: Duration = Duration::from_secs(8);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("=== Lifeline Mission ===\n");

    let config = SimulationConfig {
        seed: Some(42),
        session: SessionConfig {
            tick_delay: Duration::from_millis(500),
            ..SessionConfig::default()
        },
        ..SimulationConfig::default()
    };
    let mut sim = Simulation::new(config)?;
    let events = sim.subscribe();

    // Least urgent first, so the arbiter has to reorder them.
    sim.start_crew(vec![
        CrewSpec::new("Chris", 60),
        CrewSpec::new("Sally", 25),
        CrewSpec::new("Buzz", 12),
        CrewSpec::new("Neil", 5),
    ])?;

    println!("Crew at launch:");
    for a in sim.crew_snapshot() {
        println!(
            "  {:<6} O2 {:>3}%  {}  {}",
            a.name, a.oxygen, a.priority, a.state
        );
    }
    println!();

    let start = Instant::now();
    while let Some(remaining) = MISSION_LENGTH.checked_sub(start.elapsed()) {
        let event = match events.recv_timeout(remaining) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        let t = start.elapsed().as_secs_f64();
        match event {
            SimulationEvent::RequestStarted { name, priority, .. } => {
                println!("[{t:5.2}s] {name} requests oxygen ({priority})");
            }
            SimulationEvent::AccessGranted { name, waited, .. } => {
                println!("[{t:5.2}s] {name} granted after {}ms", waited.as_millis());
            }
            SimulationEvent::AccessReleased { name, held, .. } => {
                println!("[{t:5.2}s] {name} released after {}ms", held.as_millis());
            }
            SimulationEvent::RequestTimedOut { name, .. } => {
                println!("[{t:5.2}s] {name} gave up waiting");
            }
            SimulationEvent::RequestCancelled { name, .. } => {
                println!("[{t:5.2}s] {name} request cancelled");
            }
            SimulationEvent::MissionFailed { name, cycles, .. } => {
                println!("[{t:5.2}s] {name} LOST after {cycles} cycles");
            }
        }
    }

    let report = sim.stop();
    println!("\nStopped in {}ms", report.total_ms);

    println!("\nFinal crew:");
    for a in sim.crew_snapshot() {
        println!(
            "  {:<6} O2 {:>3}%  fatigue {:>3}  {:<10}  cycles {}",
            a.name, a.oxygen, a.fatigue, a.state.label(), a.cycles
        );
    }

    if let Some(snap) = sim.dispenser_snapshot() {
        let m = &snap.metrics;
        println!(
            "\nDispenser: {} grants, {} releases, {} cancelled, mean wait {}us, longest {}us",
            m.grants,
            m.releases,
            m.cancellations,
            m.mean_wait_us(),
            m.longest_wait_us
        );
    }

    for r in &report.reports {
        println!(
            "  {:<6} {:?}: {} refills, {} timeouts",
            r.name, r.outcome, r.refills, r.timeouts
        );
    }

    Ok(())
}
