//! Example fixed-rate game loop.
//!
//! Drives a scheduler from a tokio interval at roughly 60 passes per second
//! while a second task feeds scripted key presses through an event-bound
//! `Input` phase. Pressing `q` ends the loop early.
//!
//! # Usage
//!
//! ```bash
//! ticker [frames]
//! ```
//!
//! Set `RUST_LOG`-style filters through the tracing plugin below to see
//! scheduler internals, e.g. `cadence_schedule=debug`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use cadence_core_plugins::{Diagnostics, DiagnosticsPlugin, TracingFormat, TracingPlugin};
use cadence_schedule::prelude::*;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::Level;

const FRAME: Duration = Duration::from_millis(16);
const DEFAULT_FRAMES: u64 = 240;
const SCRIPT: &str = "ddaddaq";

/// Shared game state handed to every system.
#[derive(Debug, Default)]
struct World {
    frame: AtomicU64,
    position: Mutex<f64>,
    velocity: Mutex<f64>,
    quit: AtomicBool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Systems
// ─────────────────────────────────────────────────────────────────────────────

fn spawn(ctx: &SystemContext<World>) {
    *ctx.args().velocity.lock() = 1.0;
    tracing::info!("player spawned");
}

fn advance(ctx: &SystemContext<World>) {
    let world = ctx.args();
    world.frame.fetch_add(1, Ordering::Relaxed);
    let velocity = *world.velocity.lock();
    *world.position.lock() += velocity * ctx.delta_time().as_secs_f64();
}

fn report(ctx: &SystemContext<World>) {
    let world = ctx.args();
    tracing::info!(
        frame = world.frame.load(Ordering::Relaxed),
        position = *world.position.lock(),
        velocity = *world.velocity.lock(),
        "status"
    );
}

fn steer(reader: EventReader<char>) -> impl Fn(&SystemContext<World>) -> Result<(), SystemError> {
    move |ctx: &SystemContext<World>| {
        let world = ctx.args();
        for key in reader.read() {
            match key {
                'a' => *world.velocity.lock() -= 0.5,
                'd' => *world.velocity.lock() += 0.5,
                'q' => world.quit.store(true, Ordering::Relaxed),
                other => return Err(SystemError::failed(format!("unbound key '{other}'"))),
            }
            tracing::debug!(%key, "key handled");
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Setup
// ─────────────────────────────────────────────────────────────────────────────

fn build(scheduler: &Scheduler<World>, keys: &Signal<char>) -> Result<Diagnostics, ScheduleError> {
    let diagnostics = DiagnosticsPlugin::new();
    let stats = diagnostics.diagnostics();
    scheduler
        .add_plugin(
            TracingPlugin::default()
                .with_level(Level::INFO)
                .with_format(TracingFormat::Compact),
        )?
        .add_plugin(diagnostics)?;

    let input = Phase::named("Input");
    let status = Phase::named("Status");

    // Subscribe the reader before binding so payloads are queued when the
    // phase runs.
    let (pressed, reader, _) = on_event(keys, None)?;
    scheduler
        .insert_before(&input, &Phase::UPDATE)?
        .insert_on_event(&input, keys, None)?
        .set_run_condition(&input, pressed)?
        .insert_after(&status, &Phase::POST_UPDATE)?
        .set_run_condition(&status, time_passed(Duration::from_secs(1)))?;

    scheduler.add_system_in(SystemHandle::new(spawn).with_name("spawn"), &Phase::STARTUP)?;
    scheduler.add_system(SystemHandle::new(advance).with_name("advance"))?;
    scheduler.add_system_in(SystemHandle::new(report).with_name("report"), &status)?;
    scheduler.add_system_in(SystemHandle::new(steer(reader)).with_name("steer"), &input)?;

    Ok(stats)
}

#[tokio::main]
async fn main() {
    let frames = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(DEFAULT_FRAMES);

    let keys: Signal<char> = Signal::new();
    let scheduler = Scheduler::new(World::default());
    let diagnostics = match build(&scheduler, &keys) {
        Ok(diagnostics) => diagnostics,
        Err(error) => {
            tracing::error!(%error, "scheduler setup failed");
            return;
        }
    };

    let (sender, mut receiver) = mpsc::channel::<char>(8);
    tokio::spawn(async move {
        for key in SCRIPT.chars() {
            tokio::time::sleep(Duration::from_millis(400)).await;
            if sender.send(key).await.is_err() {
                break;
            }
        }
    });

    let mut ticker = interval(FRAME);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    for _ in 0..frames {
        tokio::select! {
            _ = ticker.tick() => {
                scheduler.run_all();
            }
            Some(key) = receiver.recv() => {
                keys.fire(&key);
            }
        }
        if scheduler.args().quit.load(Ordering::Relaxed) {
            tracing::info!("quit requested");
            break;
        }
    }

    for (_, stats) in diagnostics.snapshot() {
        tracing::info!(
            system = %stats.name,
            calls = stats.calls,
            errors = stats.errors,
            mean = ?stats.mean_duration(),
            "system stats"
        );
    }
    scheduler.cleanup();
}
