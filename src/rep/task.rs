use tokio::spawn;
use tokio::task::JoinHandle;
use futures::channel::mpsc::{channel, Sender};
use tokio_util::sync::CancellationToken;
use futures::{StreamExt, SinkExt};

use crate::config::types::DetectorTuning;
use crate::device::types::DeviceEvent;
use crate::rep::detector::RepDetector;
use crate::rep::types::{RepCommand, RepEvent};

/**
 * Runs a `RepDetector` behind a single event queue. Device events and the
 * user's start/stop toggle both arrive through channels consumed by one
 * task, so a "stop" can never race an in-flight sample. Count updates are
 * fanned out to `count_senders`; a toggle re-emits the current count even
 * when it did not change, so the display always reflects the latest state.
 */
pub fn rep_counter_task(
    cancel: CancellationToken,
    tuning: DetectorTuning,
    mut count_senders: Vec<Sender<RepEvent>>,
) -> (Sender<DeviceEvent>, Sender<RepCommand>, JoinHandle<()>) {
    let (event_sender, mut event_receiver) = channel::<DeviceEvent>(128);
    let (command_sender, mut command_receiver) = channel::<RepCommand>(8);

    let handle = spawn(async move {
        let mut detector = RepDetector::new(tuning);

        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                Some(event) = event_receiver.next() => {
                    if let DeviceEvent::Pressure(pressure) = event {
                        if let Some(count) = detector.on_sample(pressure) {
                            for sender in &mut count_senders {
                                sender.send(RepEvent::Count(count)).await
                                    .expect("Failed to send RepEvent");
                            }
                        }
                    }
                },
                Some(command) = command_receiver.next() => {
                    match command {
                        RepCommand::SetRunning(running) => {
                            let count = detector.set_running(running);
                            for sender in &mut count_senders {
                                sender.send(RepEvent::Count(count)).await
                                    .expect("Failed to send RepEvent");
                            }
                        },
                    }
                },
            }
        }
    });

    (event_sender, command_sender, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_samples_between_start_and_stop() {
        let cancel = CancellationToken::new();
        let (count_sender, mut count_receiver) = channel::<RepEvent>(32);
        let (mut event_sender, mut command_sender, handle) =
            rep_counter_task(cancel.clone(), DetectorTuning::default(), vec![count_sender]);

        command_sender.send(RepCommand::SetRunning(true)).await.unwrap();
        let RepEvent::Count(count) = count_receiver.next().await.unwrap();
        assert_eq!(count, 0);

        for pressure in [1000, 1002, 998] {
            event_sender.send(DeviceEvent::Pressure(pressure)).await.unwrap();
        }
        let RepEvent::Count(count) = count_receiver.next().await.unwrap();
        assert_eq!(count, 1);

        command_sender.send(RepCommand::SetRunning(false)).await.unwrap();
        let RepEvent::Count(count) = count_receiver.next().await.unwrap();
        assert_eq!(count, 1);

        // stopped: samples are ignored
        event_sender.send(DeviceEvent::Pressure(996)).await.unwrap();

        command_sender.send(RepCommand::SetRunning(true)).await.unwrap();
        let RepEvent::Count(count) = count_receiver.next().await.unwrap();
        assert_eq!(count, 0);

        cancel.cancel();
        handle.await.expect("Failed to join rep_counter_task");
    }
}
