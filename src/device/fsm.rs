use log::debug;

use crate::device::constants::DEVICE_NAME;
use crate::device::types::decode_pressure;
use crate::error::DeviceError;

/**
 * The lifecycle of the single peripheral session. `Disconnected` is not
 * terminal: handling a disconnect immediately re-enters `Scanning`, so the
 * state is only ever observed in passing.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Scanning,
    Connecting,
    ServiceDiscovery,
    NotifyEnabling,
    Streaming,
    Disconnected,
}

/**
 * A fire-and-forget request to the radio stack. The driver executes these;
 * their completion comes back later as a separate event.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    StartScan,
    StopScan,
    Connect,
    DiscoverServices,
    EnableNotifications,
    ReleaseSession,
}

/**
 * The connection manager as an explicit state machine, one entry point per
 * radio event. It holds no radio handles, which keeps the transition table
 * testable without a radio; the btleplug driver in `device::connection`
 * feeds it events and executes the requests it returns.
 */
#[derive(Debug)]
pub struct ConnectionFsm {
    state: ConnectionState,
    target_name: &'static str,
}

impl ConnectionFsm {
    pub fn new() -> Self {
        ConnectionFsm {
            state: ConnectionState::Idle,
            target_name: DEVICE_NAME,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /**
     * Begins scanning for advertisements.
     */
    pub fn start(&mut self) -> Vec<Request> {
        match self.state {
            ConnectionState::Idle | ConnectionState::Disconnected => {
                self.state = ConnectionState::Scanning;
                vec![Request::StartScan]
            },
            _ => Vec::new(),
        }
    }

    /**
     * An advertisement was seen. Only an exact name match while scanning
     * moves the machine forward; everything else is ignored.
     */
    pub fn on_advertisement(&mut self, name: &str) -> Vec<Request> {
        if self.state != ConnectionState::Scanning || name != self.target_name {
            return Vec::new();
        }

        debug!("Advertisement matched {:?}, connecting", name);
        self.state = ConnectionState::Connecting;
        vec![Request::StopScan, Request::Connect]
    }

    pub fn on_connected(&mut self) -> Vec<Request> {
        match self.state {
            ConnectionState::Connecting => {
                self.state = ConnectionState::ServiceDiscovery;
                vec![Request::DiscoverServices]
            },
            _ => Vec::new(),
        }
    }

    /**
     * The link dropped, or a radio request failed. Valid in every state:
     * the session is released and scanning starts over, which makes a lost
     * link self-healing rather than fatal.
     */
    pub fn on_disconnected(&mut self) -> Vec<Request> {
        self.state = ConnectionState::Disconnected;

        let mut requests = vec![Request::ReleaseSession];
        requests.extend(self.start());
        requests
    }

    /**
     * Service discovery finished. A missing service or characteristic means
     * the peripheral does not match the expected profile; retrying the same
     * peripheral would reproduce it, so it is surfaced instead of retried.
     */
    pub fn on_services_discovered(
        &mut self,
        service_present: bool,
        characteristic_present: bool,
    ) -> Result<Vec<Request>, DeviceError> {
        if self.state != ConnectionState::ServiceDiscovery {
            return Ok(Vec::new());
        }

        if !service_present {
            return Err(DeviceError::ProfileMismatch { missing: "service" });
        }
        if !characteristic_present {
            return Err(DeviceError::ProfileMismatch { missing: "characteristic" });
        }

        self.state = ConnectionState::NotifyEnabling;
        Ok(vec![Request::EnableNotifications])
    }

    /**
     * The enable-notification value was written to the configuration
     * descriptor; samples may now arrive.
     */
    pub fn on_descriptor_written(&mut self) -> Vec<Request> {
        if self.state == ConnectionState::NotifyEnabling {
            self.state = ConnectionState::Streaming;
        }
        Vec::new()
    }

    /**
     * A notification payload arrived. Returns the decoded sample while
     * streaming; notifications in any other state are late or duplicate
     * deliveries and are dropped without error.
     */
    pub fn on_notification(&mut self, payload: &[u8]) -> Result<Option<u32>, DeviceError> {
        if self.state != ConnectionState::Streaming {
            return Ok(None);
        }

        decode_pressure(payload).map(Some)
    }
}
