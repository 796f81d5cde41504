use futures::channel::mpsc::channel;
use futures::{StreamExt, SinkExt};
use log::info;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use pushup_counter::init_logging;
use pushup_counter::config::io::ConfigIO;
use pushup_counter::config::types::Config;
use pushup_counter::device::connection::spawn_connection;
use pushup_counter::device::types::{DeviceEvent, DeviceState};
use pushup_counter::error::{AppRunError, ConfigError};
use pushup_counter::rep::task::rep_counter_task;
use pushup_counter::rep::types::{RepCommand, RepEvent};

fn status_text(state: &DeviceState) -> Option<&'static str> {
    match state {
        DeviceState::Initial => None,
        DeviceState::Scanning { no_permission: false } => Some("sensor: disconnected (scanning…)"),
        DeviceState::Scanning { no_permission: true } => {
            Some("sensor: not allowed to access Bluetooth!")
        },
        DeviceState::Connecting => Some("sensor: connecting…"),
        DeviceState::Connected => Some("sensor: connected"),
    }
}

#[tokio::main]
async fn main() -> Result<(), AppRunError> {
    init_logging();
    info!(concat!("Push-up counter ", env!("CARGO_PKG_VERSION")));

    let mut config_io = ConfigIO::new_sync()?;
    let mut config_locker = config_io.locker()?;
    let _lock_guard = match config_locker.lock() {
        Ok(guard) => guard,
        Err(ConfigError::CanNotLock { .. }) => {
            eprintln!("This application has already been started");
            return Ok(());
        },
        Err(err) => return Err(err.into()),
    };

    let config = match config_io.read().await {
        Ok(config) => config,
        Err(err) if err.is_file_not_found_error() => {
            info!("Config file not found, using defaults");
            Config::default()
        },
        Err(err) => return Err(err.into()),
    };

    // write the tuning back so a fresh install has a file to edit
    config_io.save(&config).await?;
    info!("Using detector tuning {:?}", config.tuning);

    let cancel = CancellationToken::new();

    // device events fan out to the rep counter and to this display loop;
    // count updates come back from the rep counter
    let (count_sender, mut count_receiver) = channel::<RepEvent>(32);
    let (device_event_sender, mut command_sender, rep_handle) =
        rep_counter_task(cancel.clone(), config.tuning, vec![count_sender]);

    let (status_sender, mut status_receiver) = channel::<DeviceEvent>(128);
    let connection_handle =
        spawn_connection(cancel.clone(), vec![device_event_sender, status_sender]);

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    println!("count: 0");
    println!("Press Enter to start/stop counting, q + Enter to quit.");

    let mut running = false;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            },
            line = lines.next_line() => {
                match line? {
                    None => {
                        cancel.cancel();
                    },
                    Some(line) if line.trim() == "q" => {
                        cancel.cancel();
                    },
                    Some(_) => {
                        running = !running;
                        println!("{}", if running { "-- started --" } else { "-- stopped --" });
                        command_sender.send(RepCommand::SetRunning(running)).await
                            .expect("Failed to send RepCommand");
                    },
                }
            },
            Some(event) = status_receiver.next() => {
                if let DeviceEvent::StateChange(state) = event {
                    if let Some(status) = status_text(&state) {
                        println!("{}", status);
                    }
                }
            },
            Some(RepEvent::Count(count)) = count_receiver.next() => {
                println!("count: {}", count);
            },
        }
    }

    connection_handle.await.expect("Failed to join connection task");
    rep_handle.await.expect("Failed to join rep counter task");
    Ok(())
}
