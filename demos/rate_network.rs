//! A small excitatory/inhibitory rate network mixing instantaneous and delayed connections.
//!
//! Usage: `cargo run --example rate_network [config.json]`
use std::error::Error;

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use rusty_rate::core::config::SimulationConfig;
use rusty_rate::core::connection::ConnectionParams;
use rusty_rate::core::context::SimulationContext;
use rusty_rate::core::recorder::Multimeter;
use rusty_rate::core::transfer::TransferFunction;
use rusty_rate::core::unit::UnitParams;

fn main() -> Result<(), Box<dyn Error>> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%H:%M:%S)} {l} - {m}{n}")))
        .build();
    let log_config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info))?;
    log4rs::init_config(log_config)?;

    let config = match std::env::args().nth(1) {
        Some(path) => SimulationConfig::load_from(path)?,
        None => SimulationConfig::build(0.1)?.with_seed(42),
    };
    let mut ctx = SimulationContext::new(config)?;

    let drive = ctx.create_unit(UnitParams::default().with_initial_rate(1.0).with_noise(1.0, 0.0))?;
    let excitatory = ctx.create_unit(
        UnitParams::new(TransferFunction::Tanh)
            .with_tau(10.0)
            .with_gain(2.0)
            .with_noise(0.0, 0.1),
    )?;
    let inhibitory = ctx.create_unit(
        UnitParams::new(TransferFunction::ThresholdLinear)
            .with_tau(5.0)
            .with_linear_summation(false),
    )?;

    ctx.connect(ConnectionParams::instantaneous(drive, excitatory, 1.0))?;
    ctx.connect(ConnectionParams::instantaneous(excitatory, inhibitory, 1.5))?;
    ctx.connect(ConnectionParams::instantaneous(inhibitory, excitatory, -1.0))?;
    ctx.connect(ConnectionParams::delayed(excitatory, excitatory, 0.5, 2.0))?;

    let mut multimeter = Multimeter::build(10)?;
    let report = ctx.simulate(200.0, &mut multimeter)?;

    println!(
        "{} steps, {} relaxation iterations (at most {} per step), {} convergence failures",
        report.steps,
        report.iterations,
        report.max_step_iterations,
        report.convergence_failures.len()
    );
    for sample in ctx.samples() {
        println!("unit {} at t = {:.1}: rate = {:.4}", sample.unit, sample.time, sample.rate);
    }

    let path = std::env::temp_dir().join("rate_network.json");
    multimeter.save_to(&path)?;
    println!("Recorded rates saved to {}", path.display());
    Ok(())
}
