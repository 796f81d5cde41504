use std::future::Future;
use std::pin::Pin;
use futures::{Stream, StreamExt, SinkExt};
use futures::channel::mpsc::Sender;
use btleplug::api::{Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, ValueNotification};
use btleplug::platform::{Adapter, Manager, Peripheral};
use log::{debug, error, info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio::time::{sleep, Duration};

use crate::device::constants::{make_pressure_service_uuid, make_pressure_characteristic_uuid, make_ccc_descriptor_uuid, CONNECT_DELAY, CONNECT_DEADLINE, SETUP_DEADLINE};
use crate::device::fsm::{ConnectionFsm, ConnectionState, Request};
use crate::device::types::{DeviceEvent, DeviceState};

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

/**
 * The one live GATT session. Created when a connect attempt starts and
 * released before any new attempt, so two sessions never coexist.
 */
struct Session {
    peripheral: Peripheral,
    data_char: Option<Characteristic>,
    notifications: Option<NotificationStream>,
}

struct Driver {
    cancel: CancellationToken,
    fsm: ConnectionFsm,
    adapter: Adapter,
    session: Option<Session>,
    no_permission: bool,
    senders: Vec<Sender<DeviceEvent>>,
    previous_device_state: Option<DeviceState>,
}

/**
 * Guards a radio call with a deadline, in place of the missing timeout
 * support in some backends. A call that takes too long is reported as
 * `None` and treated by the caller like a lost link.
 */
async fn bounded<F, T>(limit: u64, what: &str, fut: F) -> Option<Result<T, btleplug::Error>>
where
    F: Future<Output = Result<T, btleplug::Error>>,
{
    tokio::select! {
        _ = sleep(Duration::from_millis(limit)) => {
            warn!("{} took too long", what);
            None
        }
        result = fut => Some(result),
    }
}

impl Driver {
    fn device_state(&self) -> DeviceState {
        match self.fsm.state() {
            ConnectionState::Idle => DeviceState::Initial,
            ConnectionState::Scanning | ConnectionState::Disconnected => DeviceState::Scanning {
                no_permission: self.no_permission,
            },
            ConnectionState::Connecting
            | ConnectionState::ServiceDiscovery
            | ConnectionState::NotifyEnabling => DeviceState::Connecting,
            ConnectionState::Streaming => DeviceState::Connected,
        }
    }

    async fn publish_state(&mut self) {
        let device_state = self.device_state();

        if self.previous_device_state.as_ref() != Some(&device_state) {
            for sender in &mut self.senders {
                let event = DeviceEvent::StateChange(device_state.clone());
                sender.send(event).await.expect("Failed to send DeviceEvent");
            }

            self.previous_device_state = Some(device_state);
        }
    }

    async fn publish_sample(&mut self, pressure: u32) {
        for sender in &mut self.senders {
            sender.send(DeviceEvent::Pressure(pressure)).await
                .expect("Failed to send DeviceEvent");
        }
    }

    /**
     * Executes the radio requests returned by the state machine. A request
     * whose completion is immediate (connect, discover, subscribe) feeds
     * its outcome straight back into the machine, which may return
     * follow-up requests; those are drained here as well.
     */
    async fn execute(&mut self, mut requests: Vec<Request>) {
        while !requests.is_empty() && !self.cancel.is_cancelled() {
            let mut follow_up: Vec<Request> = Vec::new();

            for request in requests {
                match request {
                    Request::StartScan => {
                        // The peripheral is matched by advertised name on
                        // our side, so no service filter is passed here.
                        match self.adapter.start_scan(ScanFilter::default()).await {
                            Ok(()) => {
                                self.no_permission = false;
                            },
                            Err(err) => {
                                warn!("Scanning failed: {:?}", err);
                                self.no_permission =
                                    matches!(err, btleplug::Error::PermissionDenied);
                                self.publish_state().await;
                                sleep(Duration::from_millis(CONNECT_DELAY)).await;
                                follow_up.push(Request::StartScan);
                            },
                        }
                    },
                    Request::StopScan => {
                        if let Err(err) = self.adapter.stop_scan().await {
                            warn!("Failed to stop scanning: {:?}", err);
                        }
                    },
                    Request::Connect => {
                        follow_up.extend(self.connect_session().await);
                    },
                    Request::DiscoverServices => {
                        follow_up.extend(self.discover_session().await);
                    },
                    Request::EnableNotifications => {
                        follow_up.extend(self.subscribe_session().await);
                    },
                    Request::ReleaseSession => {
                        self.release_session().await;
                    },
                }
            }

            requests = follow_up;
        }

        self.publish_state().await;
    }

    async fn connect_session(&mut self) -> Vec<Request> {
        let peripheral = match &self.session {
            Some(session) => session.peripheral.clone(),
            None => return self.link_lost().await,
        };

        info!("Connecting to peripheral...");
        match bounded(CONNECT_DEADLINE, "Connecting", peripheral.connect()).await {
            Some(Ok(())) => self.fsm.on_connected(),
            Some(Err(err)) => {
                warn!("Connecting to peripheral failed: {:?}", err);
                self.link_lost().await
            },
            None => self.link_lost().await,
        }
    }

    async fn discover_session(&mut self) -> Vec<Request> {
        let peripheral = match &self.session {
            Some(session) => session.peripheral.clone(),
            None => return self.link_lost().await,
        };

        info!("Connected; Discovering services...");
        match bounded(SETUP_DEADLINE, "Service discovery", peripheral.discover_services()).await {
            Some(Ok(())) => {},
            Some(Err(err)) => {
                warn!("Service discovery failed: {:?}", err);
                return self.link_lost().await;
            },
            None => return self.link_lost().await,
        }

        let pressure_service_uuid = make_pressure_service_uuid();
        let pressure_characteristic_uuid = make_pressure_characteristic_uuid();
        let ccc_descriptor_uuid = make_ccc_descriptor_uuid();

        let mut service_present = false;
        let mut data_char: Option<Characteristic> = None;

        for service in peripheral.services() {
            if !service.uuid.eq(&pressure_service_uuid) {
                continue;
            }
            service_present = true;

            for characteristic in &service.characteristics {
                if !characteristic.uuid.eq(&pressure_characteristic_uuid) {
                    continue;
                }

                // subscribe() writes the enable-notification value to this
                // descriptor; without it the subscribe is expected to fail
                let has_ccc = characteristic.descriptors.iter()
                    .any(|descriptor| descriptor.uuid.eq(&ccc_descriptor_uuid));
                if !has_ccc {
                    warn!("Characteristic has no notification configuration descriptor");
                }

                data_char = Some(characteristic.clone());
            }
        }

        let characteristic_present = data_char.is_some();
        if let Some(session) = &mut self.session {
            session.data_char = data_char;
        }

        match self.fsm.on_services_discovered(service_present, characteristic_present) {
            Ok(requests) => requests,
            Err(err) => {
                // Retrying the same peripheral would reproduce a profile
                // mismatch, so the session is left alone until the link
                // actually drops.
                error!("{}", err);
                Vec::new()
            },
        }
    }

    async fn subscribe_session(&mut self) -> Vec<Request> {
        let (peripheral, data_char) = match &self.session {
            Some(Session { peripheral, data_char: Some(data_char), .. }) => {
                (peripheral.clone(), data_char.clone())
            },
            _ => return self.link_lost().await,
        };

        info!("Subscribing to characteristic {:?}", data_char.uuid);
        match bounded(SETUP_DEADLINE, "Subscribing", peripheral.subscribe(&data_char)).await {
            Some(Ok(())) => {},
            Some(Err(err)) => {
                warn!("Subscribing to characteristic failed: {:?}", err);
                return self.link_lost().await;
            },
            None => return self.link_lost().await,
        }

        let notifications = match peripheral.notifications().await {
            Ok(stream) => stream,
            Err(err) => {
                warn!("Failed to obtain notification stream: {:?}", err);
                return self.link_lost().await;
            },
        };

        if let Some(session) = &mut self.session {
            session.notifications = Some(notifications);
        }

        info!("Peripheral ready");
        self.fsm.on_descriptor_written()
    }

    async fn release_session(&mut self) {
        if let Some(session) = self.session.take() {
            // Errors are expected here when the link is already gone.
            if let Some(Err(err)) =
                bounded(SETUP_DEADLINE, "Disconnecting", session.peripheral.disconnect()).await
            {
                debug!("Failed to disconnect peripheral: {:?}", err);
            }
        }
    }

    async fn link_lost(&mut self) -> Vec<Request> {
        warn!("Connection lost");

        // transition first: the new state must be published before the
        // reconnect delay, not after it
        let requests = self.fsm.on_disconnected();
        self.publish_state().await;
        sleep(Duration::from_millis(CONNECT_DELAY)).await;
        requests
    }

    async fn on_advertisement(&mut self, peripheral: Peripheral) {
        let properties = peripheral.properties().await;

        let name = match properties {
            Err(err) => {
                warn!("Could not query peripheral for properties: {:?}", err);
                return;
            },
            Ok(None) => return,
            Ok(Some(properties)) => match properties.local_name {
                None => return,
                Some(name) => name,
            },
        };

        let requests = self.fsm.on_advertisement(&name);
        if requests.is_empty() {
            return;
        }

        info!("Using peripheral {:?} {:?}", peripheral.id(), name);
        self.session = Some(Session {
            peripheral,
            data_char: None,
            notifications: None,
        });
        self.execute(requests).await;
    }

    async fn on_central_event(&mut self, event: CentralEvent) {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                if self.fsm.state() != ConnectionState::Scanning {
                    return;
                }

                match self.adapter.peripheral(&id).await {
                    Ok(peripheral) => self.on_advertisement(peripheral).await,
                    Err(err) => {
                        warn!("Failed to look up discovered peripheral: {:?}", err);
                    },
                }
            },
            CentralEvent::DeviceDisconnected(id) => {
                let ours = self.session.as_ref()
                    .map_or(false, |session| session.peripheral.id() == id);

                if ours {
                    let requests = self.link_lost().await;
                    self.execute(requests).await;
                }
            },
            _ => {},
        }
    }

    async fn on_notification(&mut self, notification: ValueNotification) {
        if !notification.uuid.eq(&make_pressure_characteristic_uuid()) {
            return;
        }

        match self.fsm.on_notification(&notification.value) {
            Ok(Some(pressure)) => self.publish_sample(pressure).await,
            Ok(None) => {},
            Err(err) => {
                // the sample is dropped, the session stays up
                warn!("Failed to decode pressure value: {}", err);
            },
        }
    }

    async fn run(&mut self) {
        let cancel = self.cancel.clone();

        let mut events = match self.adapter.events().await {
            Ok(events) => events,
            Err(err) => {
                warn!("Failed to obtain adapter event stream: {:?}", err);
                sleep(Duration::from_millis(CONNECT_DELAY)).await;
                return;
            },
        };

        let requests = self.fsm.start();
        self.execute(requests).await;

        loop {
            // poll first, act second: the select arms only bind values, so
            // no borrow of the driver is held while an event is handled
            let wake = tokio::select! {
                _ = cancel.cancelled() => Wake::Shutdown,
                event = events.next() => match event {
                    Some(event) => Wake::Central(event),
                    None => Wake::AdapterLost,
                },
                Some(notification) = next_notification(&mut self.session) => {
                    Wake::Notification(notification)
                },
            };

            match wake {
                Wake::Shutdown => {
                    self.release_session().await;
                    return;
                },
                Wake::AdapterLost => {
                    warn!("Adapter event stream closed");
                    self.release_session().await;
                    sleep(Duration::from_millis(CONNECT_DELAY)).await;
                    return;
                },
                Wake::Central(event) => {
                    self.on_central_event(event).await;
                    self.publish_state().await;
                },
                Wake::Notification(notification) => {
                    self.on_notification(notification).await;
                },
            }
        }
    }
}

enum Wake {
    Shutdown,
    AdapterLost,
    Central(CentralEvent),
    Notification(ValueNotification),
}

async fn next_notification(session: &mut Option<Session>) -> Option<ValueNotification> {
    match session {
        Some(Session { notifications: Some(stream), .. }) => stream.next().await,
        // no live notification stream; stay pending so the select! keeps
        // serving the other arms
        _ => std::future::pending().await,
    }
}

async fn connect_device(cancel: CancellationToken, senders: Vec<Sender<DeviceEvent>>) {
    let manager = loop {
        match Manager::new().await {
            Ok(manager) => break manager,
            Err(err) => {
                warn!("Failed to initialize BLE manager: {:?}", err);
                sleep(Duration::from_millis(CONNECT_DELAY)).await;
            },
        }

        if cancel.is_cancelled() {
            return;
        }
    };

    while !cancel.is_cancelled() {
        let adapter = match manager.adapters().await {
            Ok(adapters) => adapters.into_iter().next(),
            Err(err) => {
                warn!("Failed to query BLE adapters: {:?}", err);
                None
            },
        };

        let adapter = match adapter {
            Some(adapter) => adapter,
            None => {
                sleep(Duration::from_millis(CONNECT_DELAY)).await;
                continue;
            },
        };

        info!(
            "Scanning using adapter {}...",
            adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()),
        );

        let mut driver = Driver {
            cancel: cancel.clone(),
            fsm: ConnectionFsm::new(),
            adapter,
            session: None,
            no_permission: false,
            senders: senders.clone(),
            previous_device_state: None,
        };

        driver.run().await;
    }
}

/**
 * Spawns the connection manager. Lifecycle changes and decoded pressure
 * samples are fanned out to every sender; the task runs until the token is
 * cancelled.
 */
pub fn spawn_connection(
    cancel: CancellationToken,
    senders: Vec<Sender<DeviceEvent>>,
) -> JoinHandle<()> {
    spawn(async move {
        connect_device(cancel, senders).await;
    })
}
