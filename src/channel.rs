/// A channel is one of the dongle's logical radio slots. Bringing a channel from
/// `Idle` to `OpenUnpaired` is a rigid sequence of request/acknowledge exchanges
/// (§4.C); this module owns that state machine plus the set of devices a channel
/// has observed once it is open.
use std::collections::HashMap;
use std::time::Instant;

use crate::device::{find_or_create, Device, DeviceId};
use crate::error::StateError;
use crate::message::{self, MESG_EVENT_ID, RESPONSE_NO_ERROR};
use crate::transport::SharedPort;

/// Device profile a channel is configured for. Each non-`None` variant carries the
/// fixed `(device_type, period_ticks, rf_frequency_offset)` triple the dongle needs
/// to open a channel for that profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    None,
    HeartRate,
    Power,
    FitnessEquipment,
    Pair,
}

impl ChannelType {
    pub fn device_type_code(&self) -> u8 {
        match self {
            ChannelType::None => 0x00,
            ChannelType::HeartRate => 0x78,
            ChannelType::Power => 0x0B,
            ChannelType::FitnessEquipment => 0x11,
            ChannelType::Pair => 0x00,
        }
    }

    pub fn period_ticks(&self) -> u16 {
        match self {
            ChannelType::None => 0x0000,
            ChannelType::HeartRate => 0x1F86,
            ChannelType::Power => 0x1FF6,
            ChannelType::FitnessEquipment => 0x2000,
            ChannelType::Pair => 0x0000,
        }
    }

    pub fn rf_frequency_offset(&self) -> u8 {
        match self {
            ChannelType::None => 0x39,
            ChannelType::HeartRate => 0x39,
            ChannelType::Power => 0x39,
            ChannelType::FitnessEquipment => 0x39,
            ChannelType::Pair => 0x39,
        }
    }
}

/// Progresses strictly forward during a clean open; may fall back to `OpenUnpaired`
/// on an RX search timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Assigned,
    IdSet,
    SearchTimeoutSet,
    PeriodSet,
    FreqSet,
    OpenUnpaired,
    OpenPaired,
    Closed,
}

/// One logical radio slot. Owns the devices it has observed; the dispatcher's
/// per-channel worker thread is the sole mutator once a channel is open.
#[derive(Debug)]
pub struct Channel {
    pub number: u8,
    pub channel_type: ChannelType,
    pub state: ChannelState,
    pub device_id_filter: u16,
    pub network: u8,
    pub channel_flags: u8,
    pub search_timeout: u8,
    pub extended_messages: bool,
    pub devices: HashMap<DeviceId, Device>,
    /// Command code the channel is waiting to see acknowledged before advancing.
    /// `None` once the channel is open or before `start` has been called.
    pending_ack: Option<u8>,
}

impl Channel {
    pub fn new(number: u8) -> Self {
        Channel {
            number,
            channel_type: ChannelType::None,
            state: ChannelState::Idle,
            device_id_filter: 0,
            network: 0,
            channel_flags: 0,
            search_timeout: 0xFF,
            extended_messages: true,
            devices: HashMap::new(),
            pending_ack: None,
        }
    }

    /// Kicks off the open sequence: `Idle` -> send `UNASSIGN`/`ASSIGN_CHANNEL` ->
    /// `Assigned`. Subsequent steps are driven by [`Channel::on_event`] as the
    /// dongle acknowledges each command. Fails with [`StateError::WrongState`] if
    /// the channel is not currently `Idle`.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        &mut self,
        transport: &SharedPort,
        channel_type: ChannelType,
        device_id: u16,
        scanning: bool,
        network: u8,
        search_timeout: u8,
        extended_messages: bool,
    ) -> Result<(), StateError> {
        if self.state != ChannelState::Idle {
            return Err(StateError::WrongState);
        }
        self.channel_type = channel_type;
        self.device_id_filter = device_id;
        self.network = network;
        self.search_timeout = search_timeout;
        self.extended_messages = extended_messages;
        self.channel_flags = if scanning {
            message::ASSIGN_EXT_FLAG_BACKGROUND_SCAN
        } else {
            0
        };
        self.devices.clear();
        self.send_assign(transport);
        Ok(())
    }

    fn send_assign(&mut self, transport: &SharedPort) {
        let _ = transport.send_frame(&message::unassign_channel(self.number));
        let _ = transport.send_frame(&message::assign_channel(
            self.number,
            message::ASSIGN_CHANNEL_TYPE_RX,
            self.network,
            self.channel_flags,
        ));
        self.state = ChannelState::Assigned;
        self.pending_ack = Some(message::MESG_ASSIGN_CHANNEL_ID);
    }

    /// Handles a `CHANNEL_EVENT` (0x40) frame: either an unsolicited event
    /// (`payload[0] == MESG_EVENT_ID`) or an acknowledgement of the last command
    /// this channel sent. Unknown or stray acks leave the state unchanged.
    pub fn on_event(&mut self, payload: &[u8], transport: &SharedPort) {
        if payload.len() < 2 {
            return;
        }
        if payload[0] == MESG_EVENT_ID {
            self.on_unsolicited_event(payload[1], transport);
            return;
        }
        if payload[1] != RESPONSE_NO_ERROR || self.pending_ack != Some(payload[0]) {
            log::debug!(
                "channel {}: ignoring ack {:#x} (pending {:?}, code {:#x})",
                self.number,
                payload[0],
                self.pending_ack,
                payload[1]
            );
            return;
        }
        self.advance(payload[0], transport);
    }

    fn on_unsolicited_event(&mut self, event: u8, transport: &SharedPort) {
        match event {
            message::EVENT_RX_SEARCH_TIMEOUT => {
                if matches!(self.state, ChannelState::OpenUnpaired | ChannelState::OpenPaired) {
                    log::debug!("channel {}: search timeout, falling back to OpenUnpaired", self.number);
                    self.state = ChannelState::OpenUnpaired;
                }
            }
            message::EVENT_CHANNEL_CLOSED => {
                log::info!("channel {}: closed, reopening", self.number);
                self.state = ChannelState::Closed;
                self.send_assign(transport);
            }
            _ => log::trace!("channel {}: unhandled event {:#x}", self.number, event),
        }
    }

    fn advance(&mut self, acked: u8, transport: &SharedPort) {
        use ChannelState::*;
        match (self.state, acked) {
            (Assigned, id) if id == message::MESG_ASSIGN_CHANNEL_ID => {
                let _ = transport.send_frame(&message::set_channel_id(
                    self.number,
                    self.device_id_filter,
                    self.channel_type.device_type_code(),
                    message::TRANSMISSION_TYPE_SLAVE,
                ));
                self.state = IdSet;
                self.pending_ack = Some(message::MESG_CHANNEL_ID_ID);
            }
            (IdSet, id) if id == message::MESG_CHANNEL_ID_ID => {
                let _ = transport.send_frame(&message::set_search_timeout(self.number, 0));
                let _ = transport
                    .send_frame(&message::set_lp_search_timeout(self.number, self.search_timeout));
                self.state = SearchTimeoutSet;
                self.pending_ack = Some(message::MESG_LP_SEARCH_TIMEOUT_ID);
            }
            (SearchTimeoutSet, id) if id == message::MESG_LP_SEARCH_TIMEOUT_ID => {
                let _ = transport.send_frame(&message::set_channel_period(
                    self.number,
                    self.channel_type.period_ticks(),
                ));
                self.state = PeriodSet;
                self.pending_ack = Some(message::MESG_CHANNEL_MESG_PERIOD_ID);
            }
            (PeriodSet, id) if id == message::MESG_CHANNEL_MESG_PERIOD_ID => {
                let _ = transport.send_frame(&message::set_channel_frequency(
                    self.number,
                    self.channel_type.rf_frequency_offset(),
                ));
                self.state = FreqSet;
                self.pending_ack = Some(message::MESG_CHANNEL_RADIO_FREQ_ID);
            }
            (FreqSet, id) if id == message::MESG_CHANNEL_RADIO_FREQ_ID => {
                if self.extended_messages {
                    let _ = transport.send_frame(&message::set_lib_config(
                        self.number,
                        message::LIB_CONFIG_EXTENDED_CHAN_ID,
                    ));
                }
                let _ = transport.send_frame(&message::open_channel(self.number));
                self.state = OpenUnpaired;
                self.pending_ack = None;
                log::info!("channel {}: open", self.number);
            }
            _ => log::trace!(
                "channel {}: unexpected ack {:#x} in state {:?}",
                self.number,
                acked,
                self.state
            ),
        }
    }

    /// Records a reported `(device_id, device_type)` pair from a `CHANNEL_ID` (0x51)
    /// frame. Used to learn the resolved id after a wildcard search.
    pub fn on_id(&mut self, payload: &[u8]) {
        if payload.len() < 3 {
            return;
        }
        let id = message::bytes_to_u16(&payload[0..2]);
        if self.device_id_filter == 0 && id != 0 {
            self.device_id_filter = id;
        }
    }

    /// Routes a decoded broadcast/ack payload to the device it came from, creating
    /// the device on first sight. Drops the frame if it carries no valid extended
    /// device id. Raises `OpenUnpaired` to `OpenPaired` on the first accepted frame.
    pub fn enqueue_app(&mut self, device_id: Option<(u16, u8)>, payload: &[u8], ts: Instant) {
        let (id, device_type) = match device_id {
            Some(pair) => pair,
            None => {
                log::debug!("channel {}: dropping frame with no extended device id", self.number);
                return;
            }
        };
        let device_id = DeviceId::new(id, device_type);
        if !device_id.is_valid() {
            log::debug!("channel {}: dropping frame with invalid device id", self.number);
            return;
        }
        let device = find_or_create(&mut self.devices, device_id, self.channel_type);
        device.decode(payload, ts);
        if self.state == ChannelState::OpenUnpaired {
            self.state = ChannelState::OpenPaired;
        }
    }
}
