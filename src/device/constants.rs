use uuid::Uuid;

/**
 * The advertised name of the pressure sensor peripheral. Advertisements from
 * any other device are ignored.
 */
pub const DEVICE_NAME: &str = "DPS310_NANO2";

/**
 * The UUID of the Bluetooth BLE service exposing the barometric pressure
 * characteristic.
 */
pub const PRESSURE_SERVICE: &str = "713d0000-503e-4c75-ba94-3148f18d941e";

/**
 * The UUID of the Bluetooth BLE remote GATT characteristic that notifies
 * pressure samples.
 */
pub const PRESSURE_CHARACTERISTIC: &str = "713d0002-503e-4c75-ba94-3148f18d941e";

/**
 * The UUID of the Client Characteristic Configuration descriptor, to which
 * the standard "enable notification" value is written when subscribing.
 */
pub const CCC_DESCRIPTOR: &str = "00002902-0000-1000-8000-00805f9b34fb";

/**
 * How often (milliseconds) to attempt to reconnect.
 */
pub const CONNECT_DELAY: u64 = 1000;

/**
 * How long (milliseconds) connecting to the peripheral may take before the
 * attempt is abandoned and scanning starts over.
 */
pub const CONNECT_DEADLINE: u64 = 10_000;

/**
 * How long (milliseconds) service discovery and the notification subscribe
 * may take before the session is abandoned.
 */
pub const SETUP_DEADLINE: u64 = 5000;

pub fn make_pressure_service_uuid() -> Uuid {
    Uuid::parse_str(PRESSURE_SERVICE).unwrap()
}

pub fn make_pressure_characteristic_uuid() -> Uuid {
    Uuid::parse_str(PRESSURE_CHARACTERISTIC).unwrap()
}

pub fn make_ccc_descriptor_uuid() -> Uuid {
    Uuid::parse_str(CCC_DESCRIPTOR).unwrap()
}
