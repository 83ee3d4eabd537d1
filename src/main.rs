use chrono::Local;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use log::{error, info};
use std::path::Path;
use std::process::ExitCode;

use bmp180::bmp180::{Bmp180Error, Bmp180OverSampling, Config, BMP180};

const BMP180_BUS_PATH: &str = "/dev/i2c-1";

const EXIT_CODE_NO_ARGS: u8 = 0x01;
const EXIT_CODE_BMP180_INIT_FAILED: u8 = 0x61;
const EXIT_CODE_BMP180_MEASURE_FAILED: u8 = 0x62;

#[derive(Parser)]
#[command(name = "bmp180", about = "BMP180 pressure sensor test program")]
struct Args {
    /// Display temperature value.
    #[arg(short = 't', long)]
    temperature: bool,
    /// Display absolute air pressure value.
    #[arg(short = 'p', long)]
    pressure: bool,
    /// Set oversampling ratio. Valid values [0,1,2,3].
    #[arg(short = 's', long = "oss", value_parser = clap::value_parser!(u8).range(0..=3))]
    oss: Option<u8>,
    /// Set sensor altitude from the sea level in meters to display pressure at sea level.
    #[arg(short = 'a', long, default_value_t = 0.0)]
    altitude: f64,
}

fn print_usage() {
    let mut cmd = Args::command();
    let _ = cmd.print_help();
}

fn main() -> ExitCode {
    // -- read .env file
    dotenv::dotenv().ok();
    // -- setup logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let now = Local::now();
    info!("Starting up: {now}");

    if std::env::args().len() < 2 {
        println!("No arguments given.");
        print_usage();
        return ExitCode::from(EXIT_CODE_NO_ARGS);
    }

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if err.kind() == ErrorKind::DisplayHelp => {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        // -- anything getopt did not recognize has always printed the usage
        // -- text and exited with status zero
        Err(_) => {
            print_usage();
            return ExitCode::SUCCESS;
        }
    };

    if let Some(oss) = args.oss {
        println!("OSS set to {oss}");
    }
    println!("****** BMP180 PRESSURE SENSOR TEST PROGRAM *******");

    let oss = match args.oss.unwrap_or(0) {
        0 => Bmp180OverSampling::UltraLowPower,
        1 => Bmp180OverSampling::Standard,
        2 => Bmp180OverSampling::HighResolution,
        _ => Bmp180OverSampling::UltraHighResolution,
    };
    let config = Config {
        temperature: args.temperature,
        pressure: args.pressure,
        oss,
        altitude: args.altitude,
    };

    info!("Initializing BMP180 on {BMP180_BUS_PATH} with oversampling {oss}");
    let bus_path = Path::new(BMP180_BUS_PATH);
    let mut bmp180 = match BMP180::new(bus_path) {
        Ok(bmp180) => bmp180,
        Err(err) => {
            error!("ERROR - Failed to initialize BMP180: {err}");
            // -- a failed slave select has always exited with status zero;
            // -- kept as-is until the behavior is owned by someone
            return match err {
                Bmp180Error::SelectSlave(_) => ExitCode::SUCCESS,
                _ => ExitCode::from(EXIT_CODE_BMP180_INIT_FAILED),
            };
        }
    };

    let reading = match bmp180.measure(&config) {
        Ok(reading) => reading,
        Err(err) => {
            error!("ERROR - Failed to read BMP180 sensor data: {err}");
            return ExitCode::from(EXIT_CODE_BMP180_MEASURE_FAILED);
        }
    };

    if config.temperature {
        println!("Temperature: {:.2} C", reading.temperature_celsius());
    }
    if config.pressure {
        println!("Pressure {:.2} in hPa", reading.pressure_hpa());
    }
    if let Some(sea_level) = reading.sea_level_pressure {
        println!("Pressure at sea level: {sea_level:.2} hPa");
    }

    ExitCode::SUCCESS
}
