use anyhow::Result;
use barometer_rs::simulated::{pressure_loop, SimulatedSensorManager};
use barometer_rs::{
    BarometerClient, BarometerListener, BarometerPlugin, ErrorPayload, ListenerConfig,
    PressureReading, SensorAccuracy, TokioTimer,
};
use chrono::Utc;
use clap::Parser;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

#[derive(Parser, Debug)]
#[command(name = "barometer")]
#[command(about = "Barometer listener demo against a simulated pressure sensor", long_about = None)]
struct Args {
    /// Duration in seconds (0 = until Ctrl-C)
    #[arg(value_name = "SECONDS", default_value = "10")]
    duration: u64,

    /// Listener config file (JSON)
    #[arg(long)]
    config: Option<String>,

    /// Simulate a device without a pressure sensor
    #[arg(long)]
    no_sensor: bool,

    /// Sensor is present but never delivers samples (exercises the start timeout)
    #[arg(long)]
    silent: bool,

    /// Accuracy the simulated sensor reports (no-contact, unreliable, low, medium, high)
    #[arg(long, default_value = "high")]
    accuracy: SensorAccuracy,

    /// Simulated sensor sample period
    #[arg(long, default_value = "200")]
    sample_period_ms: u64,

    /// How often the watch reports the last reading
    #[arg(long, default_value = "1000")]
    watch_frequency_ms: u64,

    /// Print each result as a JSON line
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ListenerConfig::load(path)?,
        None => ListenerConfig::default(),
    };

    println!("[{}] Barometer demo starting", ts_now());
    println!("  Duration: {} seconds (0=until Ctrl-C)", args.duration);
    println!("  Sensor: {}", sensor_mode(&args));
    println!("  Reported accuracy: {}", args.accuracy);
    println!(
        "  Start timeout: {} ms, min accuracy: {}",
        config.start_timeout_ms, config.min_accuracy
    );

    let sensors = if args.no_sensor {
        SimulatedSensorManager::without_barometer()
    } else {
        SimulatedSensorManager::with_barometer()
    };
    let listener = BarometerListener::new(
        Box::new(sensors.clone()),
        Box::new(TokioTimer::current()?),
        config,
    );

    let feeder = if args.no_sensor || args.silent {
        None
    } else {
        Some(tokio::spawn(pressure_loop(
            listener.clone(),
            sensors,
            Duration::from_millis(args.sample_period_ms),
            args.accuracy,
        )))
    };

    let plugin = BarometerPlugin::new(listener.clone());
    let client = BarometerClient::current(plugin.clone())?;

    let json = args.json;
    let on_error: Arc<dyn Fn(ErrorPayload) + Send + Sync> = Arc::new(move |error: ErrorPayload| {
        if json {
            println!("{}", serde_json::json!({ "error": error }));
        } else {
            println!("[{}] ERROR {}: {}", ts_now(), error.code, error.message);
        }
    });
    let watch = client.watch_pressure(
        move |reading: PressureReading| {
            if json {
                println!("{}", serde_json::json!({ "pressure": reading }));
            } else {
                println!(
                    "[{}] {:.2} hPa (captured {})",
                    ts_now(),
                    reading.val,
                    reading.timestamp
                );
            }
        },
        Some(on_error),
        Some(Duration::from_millis(args.watch_frequency_ms)),
    )?;

    if args.duration > 0 {
        sleep(Duration::from_secs(args.duration)).await;
        println!("[{}] Duration reached, stopping...", ts_now());
    } else {
        tokio::signal::ctrl_c().await?;
        println!("[{}] Interrupted, stopping...", ts_now());
    }

    client.clear_watch(watch)?;
    plugin.on_destroy()?;
    if let Some(feeder) = feeder {
        feeder.abort();
    }

    let snapshot = listener.snapshot()?;
    println!("\n=== Final State ===");
    println!("Status: {:?}", snapshot.status);
    match client.last_pressure()? {
        Some(reading) => println!("Last pressure: {:.2} hPa at {}", reading.val, reading.timestamp),
        None => println!("Last pressure: none"),
    }

    Ok(())
}

fn sensor_mode(args: &Args) -> &'static str {
    if args.no_sensor {
        "absent"
    } else if args.silent {
        "present, silent"
    } else {
        "present"
    }
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
