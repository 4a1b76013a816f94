use anyhow::Context;
use clap::Parser;
use ds9097::{Ds9097, SerialPortLink};
use ds18b20::{Ds18b20, Ds18b20Group, celsius_to_fahrenheit};
use linux_embedded_hal::Delay;
use onewire_core::{OneWireError, Rom, discover};
use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

mod config;

use config::Config;

type Adapter = Ds9097<SerialPortLink, Delay>;

/// Read DS18B20 temperature sensors through a DS9097 serial 1-Wire adapter
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Discover the sensors on the bus and write them to the config file
    #[arg(short, long)]
    init: bool,
    /// Discover the sensors on the bus and list them
    #[arg(short, long)]
    walk: bool,
    /// Read the sensor at index N of the roster
    #[arg(short, long, value_name = "N")]
    temp: Option<usize>,
    /// Read every sensor of the roster (default)
    #[arg(short, long)]
    all: bool,
    /// Serial device of the adapter, overrides the config file
    #[arg(short, long, value_name = "DEVICE")]
    serial: Option<String>,
    /// Roster file
    #[arg(short, long, default_value = "digitemp.conf")]
    config: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<ExitCode> {
    let mut config = Config::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    if let Some(device) = &args.serial {
        config.device.clone_from(device);
    }
    log::debug!("{config:?}");

    if args.init {
        return init(config, &args.config);
    }
    if args.walk {
        return walk(&config);
    }
    if config.sensors.is_empty() {
        eprintln!("No sensors in {}, run with --init first", args.config.display());
        return Ok(ExitCode::FAILURE);
    }
    match args.temp {
        Some(index) if !args.all => read_one(&config, index),
        _ => read_all(&config),
    }
}

fn open(config: &Config) -> anyhow::Result<Adapter> {
    log::info!("Opening {}", config.device);
    Ds9097::open(&config.device, Delay)
        .with_context(|| format!("failed to open adapter on {}", config.device))
}

fn scan(config: &Config) -> anyhow::Result<Vec<Rom>> {
    let mut bus = open(config)?;
    match discover(&mut bus) {
        Ok(roms) => Ok(roms),
        Err(OneWireError::NoDevicePresent) => Ok(Vec::new()),
        Err(e) => Err(e).context("device search failed"),
    }
}

fn print_roms(roms: &[Rom]) {
    for (i, rom) in roms.iter().enumerate() {
        println!("ROM #{i}: {rom}");
    }
}

fn init(mut config: Config, path: &Path) -> anyhow::Result<ExitCode> {
    let roms = scan(&config)?;
    if roms.is_empty() {
        eprintln!("No sensors found on {}", config.device);
        return Ok(ExitCode::FAILURE);
    }
    print_roms(&roms);
    config.sensors = roms;
    config
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {} sensor(s) to {}", config.sensors.len(), path.display());
    Ok(ExitCode::SUCCESS)
}

fn walk(config: &Config) -> anyhow::Result<ExitCode> {
    let roms = scan(config)?;
    if roms.is_empty() {
        eprintln!("No sensors found on {}", config.device);
        return Ok(ExitCode::FAILURE);
    }
    print_roms(&roms);
    Ok(ExitCode::SUCCESS)
}

fn read_one(config: &Config, index: usize) -> anyhow::Result<ExitCode> {
    let Some(rom) = config.sensors.get(index) else {
        eprintln!(
            "Sensor {index} is not in the roster ({} sensor(s))",
            config.sensors.len()
        );
        return Ok(ExitCode::FAILURE);
    };
    let mut bus = open(config)?;
    let mut delay = Delay;
    match Ds18b20::new(*rom).read_temperature(&mut bus, &mut delay) {
        Ok(temp) => {
            println!("{:.2}", temp.to_num::<f32>());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("Sensor {index} ({rom}): {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn read_all(config: &Config) -> anyhow::Result<ExitCode> {
    let group = Ds18b20Group::new(config.sensors.iter().copied());
    let mut bus = open(config)?;
    let mut delay = Delay;
    let ok = group
        .read_all(&mut bus, &mut delay, |reading| match reading.result {
            Ok(temp) => println!(
                "{} Sensor {} C: {:.2} F: {:.2}",
                chrono::Local::now().format("%b %d %H:%M:%S"),
                reading.index,
                temp.to_num::<f32>(),
                celsius_to_fahrenheit(temp)
            ),
            Err(e) => eprintln!("Sensor {} ({}): {e}", reading.index, reading.rom),
        })
        .context("bus failure while reading sensors")?;
    log::info!("{ok}/{} sensor(s) read", group.len());
    Ok(ExitCode::SUCCESS)
}
