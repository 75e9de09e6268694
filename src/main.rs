use log::{error, info, warn};
use time::OffsetDateTime;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tokio::time::{interval, Duration, MissedTickBehavior};

use weight_acquisition::bluetooth::bluez::open_default_adapter;
use weight_acquisition::bluetooth::permissions::{initialize, AutoGrant};
use weight_acquisition::config::AppConfig;
use weight_acquisition::console::{Command, HELP};
use weight_acquisition::device::DeviceSelector;
use weight_acquisition::models::{LinkStatus, WeightReading};
use weight_acquisition::utils::{format_datetime, summarize};

fn log_status(status: &LinkStatus) {
    info!(
        "Progressor: connected={} monitoring={} loading={}",
        status.is_connected, status.is_monitoring, status.is_loading
    );
    if let Some(e) = &status.error {
        error!("Progressor: {}", e);
    }
}

/// Apply one operator command; returns false when the service should exit
async fn handle_command(selector: &mut DeviceSelector, command: Command) -> bool {
    if command.needs_progressor() && selector.progressor().is_none() {
        warn!("'{:?}' needs the Progressor; select it with 'progressor'", command);
        return true;
    }

    match command {
        Command::Tare => {
            if let Some(link) = selector.progressor() {
                link.tare().await;
            }
        }
        Command::Connect => {
            if let Some(link) = selector.progressor() {
                link.scan_and_connect();
            }
        }
        Command::Cancel => {
            if let Some(link) = selector.progressor() {
                link.stop_scanning();
            }
        }
        Command::Stop => {
            if let Some(link) = selector.progressor() {
                link.stop_monitoring().await;
            }
        }
        Command::Reset => {
            selector.reset();
            info!("Readings cleared");
        }
        Command::Select(selection) => selector.select(selection).await,
        Command::Status => {
            info!(
                "Device: {} | current: {} | peak: {:.2} kg | {} samples",
                selector.selection(),
                selector.current_reading(),
                selector.max_weight(),
                selector.samples().len()
            );
            if let Some(status) = selector.link_status() {
                log_status(&status);
            }
        }
        Command::Help => info!("{}", HELP),
        Command::Quit => return false,
    }
    true
}

async fn main_loop(
    config: AppConfig,
    mut shutdown: oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting weight acquisition service");

    let adapter = match initialize(config.platform, &AutoGrant, open_default_adapter).await {
        Ok(adapter) => adapter,
        Err(e) => {
            error!("Bluetooth not ready: {}", e);
            return Ok(());
        }
    };

    let mut selector = DeviceSelector::new(adapter, &config);
    selector.activate();
    info!("Selected device: {}", selector.selection());

    if config.auto_connect {
        if let Some(link) = selector.progressor() {
            link.scan_and_connect();
        }
    }

    let start_time = OffsetDateTime::now_utc();
    info!("Session started at: {}", format_datetime(&start_time));
    info!("{}", HELP);

    let mut ticker = interval(Duration::from_millis(config.poll_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut listening = true;

    let mut last_reading = WeightReading::default();
    let mut last_status: Option<LinkStatus> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let reading = selector.current_reading();
                if reading != last_reading {
                    info!("{}: {} (peak {:.2})", selector.selection(), reading, selector.max_weight());
                    last_reading = reading;
                }

                let status = selector.link_status();
                if status != last_status {
                    if let Some(status) = &status {
                        log_status(status);
                    }
                    last_status = status;
                }
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => match line.parse::<Command>() {
                        Ok(command) => {
                            if !handle_command(&mut selector, command).await {
                                info!("Quit requested");
                                break;
                            }
                        }
                        Err(e) => warn!("{}. {}", e, HELP),
                    },
                    Ok(None) => {
                        info!("Standard input closed, commands disabled");
                        stdin_open = false;
                    }
                    Err(e) => {
                        error!("Failed to read command: {}", e);
                        stdin_open = false;
                    }
                }
            }
            signal = &mut shutdown, if listening => {
                if signal.is_ok() {
                    info!("Program terminated by user. Exiting gracefully.");
                    break;
                }
                listening = false;
            }
        }
    }

    selector.deactivate().await;

    let end_time = OffsetDateTime::now_utc();
    info!("Session ended at: {}", format_datetime(&end_time));

    // Print summary
    match summarize(selector.selection(), &selector.samples()) {
        Some(summary) => {
            info!("Summary for {}:", summary.device);
            info!("  Peak weight: {:.2} kg", summary.peak);
            info!("  Average weight: {:.2} kg", summary.mean);
            info!("  Duration: {:.1} s", summary.duration_ms as f64 / 1000.0);
            info!("  Based on {} samples", summary.samples);
        }
        None => warn!("No data collected during this session!"),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match AppConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Handle Ctrl+C gracefully
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = tx.send(());
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    match main_loop(config, rx).await {
        Ok(_) => info!("Program completed successfully"),
        Err(e) => error!("Fatal error: {}", e),
    }

    Ok(())
}
