//! `sensord` — the sensor multiplexing service binary.
//!
//! Wires the HAL, identity, and policy layers behind `SensorService`, then
//! either runs the dispatch loop in the foreground or executes one shell
//! command against a freshly built instance, following the same
//! `run()`-returns-`Result`, `main()`-logs-and-exits-1 split as `evo_hal`.

use clap::Parser;
use sensord::cli::{Args, Command};
use sensord::shell;
use sensord_common::config::ConfigLoader;
use sensord_common::hal::SimulatedHal;
use sensord_common::sensor::{ReportingMode, Sensor, SensorFlags, SensorType};
use sensord_core::dispatch::run_dispatch_loop;
use sensord_core::runtime_loop::{run_runtime_sensor_loop, RuntimeSensorQueue};
use sensord_core::wakelock::run_ack_receiver;
use sensord_core::SensorService;
use sensord_identity::key;
use sensord_identity::IdentityModule;
use sensord_policy::mode::BuildType;
use sensord_policy::InMemoryPackageManager;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("sensord startup failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_tracing(&args);

    info!("sensord v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = sensord_common::config::ServiceConfig::load(&args.config).unwrap_or_else(|err| {
        info!(%err, "using default configuration");
        sensord_common::config::ServiceConfig::default()
    });
    config.validate()?;

    let service_dir = Path::new(&config.service_dir);
    let hmac_key = key::load_or_generate(&service_dir.join("hmac_key"));
    let identity = IdentityModule::new(hmac_key);
    let build_type = if cfg!(debug_assertions) { BuildType::Debug } else { BuildType::User };

    let hal = SimulatedHal::new(default_sensor_list());
    let service = Arc::new(SensorService::new(
        Box::new(hal),
        identity,
        build_type,
        config.automotive_mode,
        config.socket_buffer_events,
        config.registration_ring_capacity,
    )?);

    if let Some(command) = args.command {
        let packages = InMemoryPackageManager::new();
        let outcome = shell::run(&service, &packages, true, command);
        println!("{}", outcome.text);
        std::process::exit(outcome.exit_code);
    }

    if !args.foreground {
        info!("no subcommand given and --foreground not set, printing help");
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("received shutdown signal");
        shutdown_handler.store(true, Ordering::SeqCst);
    })?;

    let (_ack_tx, ack_rx) = mpsc::channel::<sensord_core::AckMessage>();
    let ack_holder = service.holder.clone();
    let ack_wakelock = service.wakelock.clone();
    let ack_shutdown = shutdown.clone();
    let ack_timeout = Duration::from_millis(config.ack_timeout_ms);
    let ack_handle = std::thread::spawn(move || {
        run_ack_receiver(ack_rx, ack_holder, ack_wakelock, ack_timeout, ack_shutdown);
    });

    let dispatch_service = service.clone();
    let dispatch_shutdown = shutdown.clone();
    let poll_batch_size = config.poll_batch_size;
    let dispatch_handle = std::thread::spawn(move || {
        if let Err(err) = run_dispatch_loop(dispatch_service, poll_batch_size, 0, 0, dispatch_shutdown) {
            error!(%err, "dispatch loop exited with an error");
        }
    });

    let runtime_queue = Arc::new(RuntimeSensorQueue::new());
    let runtime_service = service.clone();
    let runtime_shutdown = shutdown.clone();
    let runtime_batch_size = config.poll_batch_size;
    let runtime_handle = std::thread::spawn(move || {
        if let Err(err) =
            run_runtime_sensor_loop(runtime_service, runtime_queue, runtime_batch_size, runtime_shutdown)
        {
            error!(%err, "runtime-sensor loop exited with an error");
        }
    });

    dispatch_handle.join().ok();
    ack_handle.join().ok();
    runtime_handle.join().ok();

    info!("sensord shutdown complete");
    Ok(())
}

fn default_sensor_list() -> Vec<Sensor> {
    let base = |handle: i32, sensor_type: SensorType, name: &str| Sensor {
        handle,
        sensor_type,
        name: name.to_string(),
        min_delay_ns: 10_000_000,
        max_delay_ns: 200_000_000,
        fifo_max_event_count: 0,
        reporting_mode: ReportingMode::Continuous,
        flags: SensorFlags::empty(),
        required_permission: None,
        required_app_op: None,
        uuid: [0; 16],
        device_id: 0,
    };

    vec![
        base(1, SensorType::Accelerometer, "accelerometer"),
        base(2, SensorType::Gyroscope, "gyroscope"),
        base(3, SensorType::MagneticField, "magnetic-field"),
    ]
}

fn setup_tracing(args: &Args) {
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
