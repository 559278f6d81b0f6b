/// Per-profile sensor state and page decoding. Each channel accumulates decoded
/// samples against a [`Device`], keyed by the device id a channel resolves once it
/// locks onto a broadcaster.
pub mod fec;
pub mod hrm;
pub mod power;
mod timeseries;

use std::collections::HashMap;
use std::time::Instant;

pub use timeseries::TimeSeries;

use crate::channel::ChannelType;
use crate::message::{bytes_to_u16, bytes_to_u32};

const PAGE_MANUFACTURER_INFO: u8 = 0x50;
const PAGE_PRODUCT_INFO: u8 = 0x51;

/// Identifies a broadcaster: the 16-bit device number paired with its device type
/// byte (0x78 heart rate, 0x0B power, 0x11 FE-C). `0` is the wildcard search id and
/// is never a valid resolved id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub id: u16,
    pub device_type: u8,
}

impl DeviceId {
    pub fn new(id: u16, device_type: u8) -> Self {
        DeviceId { id, device_type }
    }

    pub fn is_valid(&self) -> bool {
        self.id != 0 && self.device_type != 0
    }
}

/// Common data pages (manufacturer/product info) appear across every ANT+ device
/// profile at the same page numbers and layout. Returns `true` if the payload was a
/// common page and has been fully handled; `false` means the caller should dispatch
/// the payload to its profile-specific decoder instead.
pub(crate) fn decode_common_page(payload: &[u8], metadata: &mut HashMap<String, f32>) -> bool {
    if payload.len() < 8 {
        return false;
    }
    match payload[0] {
        PAGE_MANUFACTURER_INFO => {
            metadata.insert("HW_REVISION".into(), payload[3] as f32);
            metadata.insert("MANUFACTURER_ID".into(), bytes_to_u16(&payload[4..6]) as f32);
            metadata.insert("MODEL_NUMBER".into(), bytes_to_u16(&payload[6..8]) as f32);
            true
        }
        PAGE_PRODUCT_INFO => {
            metadata.insert("SERIAL_NUMBER".into(), bytes_to_u32(&payload[4..8]) as f32);
            true
        }
        _ => false,
    }
}

#[derive(Debug, Clone)]
pub struct Device {
    pub id: DeviceId,
    pub metadata: HashMap<String, f32>,
    pub time_series: HashMap<String, TimeSeries>,
    decoder: Decoder,
}

#[derive(Debug, Clone)]
enum Decoder {
    Hr(hrm::HrState),
    Power(power::PowerState),
    Fec(fec::FecState),
}

impl Device {
    pub fn new(id: DeviceId, channel_type: ChannelType) -> Self {
        let decoder = match channel_type {
            ChannelType::HeartRate => Decoder::Hr(hrm::HrState::default()),
            ChannelType::Power => Decoder::Power(power::PowerState::default()),
            ChannelType::FitnessEquipment => Decoder::Fec(fec::FecState::default()),
            // `Pair` and `None` have no page decoder of their own; a device should
            // never actually be created on a channel in either state, but the match
            // must stay exhaustive as `ChannelType` grows.
            ChannelType::Pair | ChannelType::None => Decoder::Hr(hrm::HrState::default()),
        };
        Device {
            id,
            metadata: HashMap::new(),
            time_series: HashMap::new(),
            decoder,
        }
    }

    /// Looks up a single metric's sample history by name.
    pub fn time_series(&self, metric: &str) -> Option<&TimeSeries> {
        self.time_series.get(metric)
    }

    /// Looks up a single metadata value by key.
    pub fn metadata(&self, key: &str) -> Option<f32> {
        self.metadata.get(key).copied()
    }

    /// Feeds a decoded broadcast payload through this device's profile decoder.
    pub fn decode(&mut self, payload: &[u8], ts: Instant) {
        match &mut self.decoder {
            Decoder::Hr(state) => state.decode(payload, &mut self.metadata, &mut self.time_series, ts),
            Decoder::Power(state) => {
                state.decode(payload, &mut self.metadata, &mut self.time_series, ts)
            }
            Decoder::Fec(state) => state.decode(payload, &mut self.metadata, &mut self.time_series, ts),
        }
    }
}

/// Looks up the device registered under `id`, creating it with `channel_type`'s
/// decoder on first sight.
pub(crate) fn find_or_create(
    registry: &mut HashMap<DeviceId, Device>,
    id: DeviceId,
    channel_type: ChannelType,
) -> &mut Device {
    registry.entry(id).or_insert_with(|| Device::new(id, channel_type))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn device_id_rejects_wildcard() {
        assert!(!DeviceId::new(0, 0x78).is_valid());
        assert!(DeviceId::new(1234, 0x78).is_valid());
    }

    #[test]
    fn device_id_rejects_zero_device_type() {
        assert!(!DeviceId::new(1234, 0).is_valid());
    }

    #[test]
    fn manufacturer_common_page_sets_metadata() {
        let mut metadata = HashMap::new();
        let payload = [PAGE_MANUFACTURER_INFO, 0xFF, 0xFF, 2, 32, 0, 0x10, 0x00];
        assert!(decode_common_page(&payload, &mut metadata));
        assert_eq!(metadata["HW_REVISION"], 2.0);
        assert_eq!(metadata["MANUFACTURER_ID"], 32.0);
        assert_eq!(metadata["MODEL_NUMBER"], 16.0);
    }

    #[test]
    fn product_common_page_sets_serial() {
        let mut metadata = HashMap::new();
        let payload = [PAGE_PRODUCT_INFO, 0xFF, 0xFF, 0, 1, 0, 0, 0];
        assert!(decode_common_page(&payload, &mut metadata));
        assert_eq!(metadata["SERIAL_NUMBER"], 1.0);
    }

    #[test]
    fn product_common_page_serial_spans_full_u32() {
        // id_lo..id_hi bytes beyond the 16-bit range must survive, not truncate.
        let mut metadata = HashMap::new();
        let payload = [PAGE_PRODUCT_INFO, 0xFF, 0xFF, 0, 0x00, 0x00, 0x01, 0x00];
        assert!(decode_common_page(&payload, &mut metadata));
        assert_eq!(metadata["SERIAL_NUMBER"], 65536.0);
    }

    #[test]
    fn find_or_create_reuses_existing_device() {
        let mut registry = HashMap::new();
        let id = DeviceId::new(1234, 0x78);
        find_or_create(&mut registry, id, ChannelType::HeartRate).decode(
            &[0x00, 0, 0, 0, 0, 0, 0, 60],
            Instant::now(),
        );
        find_or_create(&mut registry, id, ChannelType::HeartRate).decode(
            &[0x00, 0, 0, 0, 0, 0, 0, 61],
            Instant::now(),
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry[&id].time_series["HEARTRATE"].len(), 2);
    }
}
