/// Wire protocol constants and outbound frame builders for configuring and driving
/// channels on the dongle.
use crate::frame::Frame;

pub const MESG_VERSION_ID: u8 = 0x3E;
pub const MESG_RESPONSE_EVENT_ID: u8 = 0x40;
/// Sentinel in a `CHANNEL_EVENT` payload's first byte marking an unsolicited event
/// notification (search timeout, channel closed) rather than an ack of a sent command.
pub const MESG_EVENT_ID: u8 = 0x01;
pub const MESG_UNASSIGN_CHANNEL_ID: u8 = 0x41;
pub const MESG_ASSIGN_CHANNEL_ID: u8 = 0x42;
pub const MESG_CHANNEL_MESG_PERIOD_ID: u8 = 0x43;
pub const MESG_CHANNEL_SEARCH_TIMEOUT_ID: u8 = 0x44;
pub const MESG_CHANNEL_RADIO_FREQ_ID: u8 = 0x45;
pub const MESG_NETWORK_KEY_ID: u8 = 0x46;
pub const MESG_RESET: u8 = 0x4A;
pub const MESG_OPEN_CHANNEL_ID: u8 = 0x4B;
pub const MESG_CLOSE_CHANNEL_ID: u8 = 0x4C;
pub const MESG_REQUEST: u8 = 0x4D;
pub const MESG_BROADCAST_DATA_ID: u8 = 0x4E;
pub const MESG_ACKNOWLEDGE_DATA_ID: u8 = 0x4F;
pub const MESG_CHANNEL_ID_ID: u8 = 0x51;
pub const MESG_LP_SEARCH_TIMEOUT_ID: u8 = 0x63;
pub const MESG_LIB_CONFIG_ID: u8 = 0x6E;
pub const MESG_STARTUP_MESG_ID: u8 = 0x6F;

pub const EVENT_RX_SEARCH_TIMEOUT: u8 = 0x01;
pub const EVENT_RX_FAIL: u8 = 0x02;
pub const EVENT_TX: u8 = 0x03;
pub const EVENT_TRANSFER_RX_FAILED: u8 = 0x04;
pub const EVENT_TRANSFER_TX_COMPLETED: u8 = 0x05;
pub const EVENT_TRANSFER_TX_FAILED: u8 = 0x06;
pub const EVENT_CHANNEL_CLOSED: u8 = 0x07;

pub const RESPONSE_NO_ERROR: u8 = 0x00;

pub const ASSIGN_CHANNEL_TYPE_RX: u8 = 0x00;
pub const ASSIGN_EXT_FLAG_BACKGROUND_SCAN: u8 = 0x01;
pub const LIB_CONFIG_EXTENDED_CHAN_ID: u8 = 0x80;
pub const TRANSMISSION_TYPE_SLAVE: u8 = 0x00;

pub const COMMON_STATUS_PAGE: u8 = 0x47;

pub fn reset() -> Frame {
    Frame::new(MESG_RESET, 0, &[0x00])
}

pub fn set_network_key(network_number: u8, key: &[u8; 8]) -> Frame {
    let mut data = vec![network_number];
    data.extend_from_slice(key);
    Frame::new(MESG_NETWORK_KEY_ID, data[0], &data[1..])
}

pub fn unassign_channel(channel: u8) -> Frame {
    Frame::new(MESG_UNASSIGN_CHANNEL_ID, channel, &[])
}

/// `ext_flags` carries `ASSIGN_EXT_FLAG_BACKGROUND_SCAN` when the caller wants a
/// wildcard device-id search rather than a specific pairing.
pub fn assign_channel(channel: u8, channel_type: u8, network: u8, ext_flags: u8) -> Frame {
    Frame::new(
        MESG_ASSIGN_CHANNEL_ID,
        channel,
        &[channel_type, network, ext_flags],
    )
}

pub fn set_channel_id(
    channel: u8,
    device_id: u16,
    device_type: u8,
    transmission_type: u8,
) -> Frame {
    Frame::new(
        MESG_CHANNEL_ID_ID,
        channel,
        &[
            (device_id & 0xFF) as u8,
            ((device_id >> 8) & 0xFF) as u8,
            device_type,
            transmission_type,
        ],
    )
}

pub fn set_search_timeout(channel: u8, timeout: u8) -> Frame {
    Frame::new(MESG_CHANNEL_SEARCH_TIMEOUT_ID, channel, &[timeout])
}

pub fn set_lp_search_timeout(channel: u8, timeout: u8) -> Frame {
    Frame::new(MESG_LP_SEARCH_TIMEOUT_ID, channel, &[timeout])
}

pub fn set_channel_period(channel: u8, period: u16) -> Frame {
    Frame::new(
        MESG_CHANNEL_MESG_PERIOD_ID,
        channel,
        &[(period & 0xFF) as u8, ((period >> 8) & 0xFF) as u8],
    )
}

pub fn set_channel_frequency(channel: u8, frequency: u8) -> Frame {
    Frame::new(MESG_CHANNEL_RADIO_FREQ_ID, channel, &[frequency])
}

pub fn set_lib_config(channel: u8, config: u8) -> Frame {
    Frame::new(MESG_LIB_CONFIG_ID, channel, &[config])
}

pub fn open_channel(channel: u8) -> Frame {
    Frame::new(MESG_OPEN_CHANNEL_ID, channel, &[])
}

pub fn close_channel(channel: u8) -> Frame {
    Frame::new(MESG_CLOSE_CHANNEL_ID, channel, &[])
}

pub fn request_message(channel: u8, requested_id: u8) -> Frame {
    Frame::new(MESG_REQUEST, channel, &[requested_id])
}

/// Builds the "request data page" acknowledged-data frame the poller sends to a
/// fitness-equipment channel to pull its current command-status page.
pub fn request_common_status_page(channel: u8) -> Frame {
    Frame::new(
        MESG_ACKNOWLEDGE_DATA_ID,
        channel,
        &[0x46, 0xFF, 0xFF, 0xFF, 0xFF, 0x81, COMMON_STATUS_PAGE, 0x01],
    )
}

/// Combines a little-endian byte slice (1-4 bytes) into a `u32`.
pub(crate) fn bytes_to_u32(b: &[u8]) -> u32 {
    b.iter()
        .enumerate()
        .fold(0u32, |acc, (i, &byte)| acc | ((byte as u32) << (8 * i)))
}

/// Combines a little-endian byte slice (1-2 bytes) into a `u16`.
pub(crate) fn bytes_to_u16(b: &[u8]) -> u16 {
    bytes_to_u32(b) as u16
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reset_frame() {
        let frame = reset();
        assert_eq!(frame.msg_type, MESG_RESET);
        assert_eq!(frame.payload, vec![0x00]);
    }

    #[test]
    fn set_network_key_frame() {
        let key = [0xB9, 0xA5, 0x21, 0xFB, 0xBD, 0x72, 0xC3, 0x45];
        let frame = set_network_key(0, &key);
        assert_eq!(frame.msg_type, MESG_NETWORK_KEY_ID);
        assert_eq!(frame.channel, 0);
        assert_eq!(frame.payload, key.to_vec());
    }

    #[test]
    fn assign_channel_frame() {
        let frame = assign_channel(0, 0x00, 0, ASSIGN_EXT_FLAG_BACKGROUND_SCAN);
        assert_eq!(frame.msg_type, MESG_ASSIGN_CHANNEL_ID);
        assert_eq!(frame.channel, 0);
        assert_eq!(frame.payload, vec![0x00, 0, 0x01]);
    }

    #[test]
    fn set_channel_id_frame() {
        let frame = set_channel_id(0, 1000, 0x78, TRANSMISSION_TYPE_SLAVE);
        assert_eq!(frame.msg_type, MESG_CHANNEL_ID_ID);
        assert_eq!(frame.payload[0], (1000 & 0xFF) as u8);
        assert_eq!(frame.payload[1], ((1000 >> 8) & 0xFF) as u8);
        assert_eq!(frame.payload[2], 0x78);
        assert_eq!(frame.payload[3], 0);
    }

    #[test]
    fn set_channel_period_frame() {
        let frame = set_channel_period(0, 0x1F86);
        assert_eq!(frame.msg_type, MESG_CHANNEL_MESG_PERIOD_ID);
        assert_eq!(frame.payload, vec![0x86, 0x1F]);
    }

    #[test]
    fn request_common_status_page_frame() {
        let frame = request_common_status_page(3);
        assert_eq!(frame.msg_type, MESG_ACKNOWLEDGE_DATA_ID);
        assert_eq!(frame.channel, 3);
        assert_eq!(
            frame.payload,
            vec![0x46, 0xFF, 0xFF, 0xFF, 0xFF, 0x81, 0x47, 0x01]
        );
    }

    #[test]
    fn bytes_to_u16_combines_little_endian() {
        assert_eq!(bytes_to_u16(&[0x00, 0x08]), 2048);
    }

    #[test]
    fn bytes_to_u32_combines_little_endian() {
        assert_eq!(bytes_to_u32(&[0x01, 0x00, 0x00]), 1);
    }
}
