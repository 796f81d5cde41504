use crate::error::DeviceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceState {
    Initial,
    Scanning { no_permission: bool },
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub enum DeviceEvent {
    StateChange(DeviceState),
    Pressure(u32),
}

/**
 * Decodes a notification payload into a raw pressure sample. The peripheral
 * sends the pressure as an unsigned 32 bit little-endian integer in the
 * first four bytes of the characteristic value.
 */
pub fn decode_pressure(payload: &[u8]) -> Result<u32, DeviceError> {
    match payload.get(..4) {
        Some(bytes) => Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        None => Err(DeviceError::MalformedPayload { length: payload.len() }),
    }
}
