/// Public facade: brings up the transport, starts the dispatcher, and exposes the
/// per-channel open/devices surface callers actually use. Everything below this
/// module is an implementation detail of "open a channel, read its devices".
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::channel::{Channel, ChannelState, ChannelType};
use crate::config::Config;
use crate::device::Device;
use crate::dispatcher::{ChannelHandle, Dispatcher};
use crate::error::{AntError, StateError};
use crate::transport::{Port, SharedPort, Transport};
use crate::Result;

/// ANT network slot this core always programs the dongle's key into. The dongle
/// supports up to three networks; a single network is sufficient for every
/// profile this core understands.
pub const ANT_NETWORK: u8 = 0;

/// The published ANT+ network key. Devices advertising on the ANT+ profile only
/// respond once this key has been set on the channel's network.
pub const ANT_NETWORK_KEY: [u8; 8] = [0xB9, 0xA5, 0x21, 0xFB, 0xBD, 0x72, 0xC3, 0x45];

const WAIT_POLL_MIN: Duration = Duration::from_millis(10);
const WAIT_POLL_MAX: Duration = Duration::from_millis(200);

/// Owns the transport, the dispatcher threads, and every channel. Construct with
/// [`Ant::init`], drive channels through [`Ant::channel`], and call
/// [`Ant::shutdown`] (or simply drop it) when done.
pub struct Ant {
    transport: SharedPort,
    dispatcher: Dispatcher,
    channels: Vec<ChannelHandle>,
    config: Config,
    poll_interval_ms: Arc<AtomicU64>,
    start_time: Instant,
}

impl Ant {
    /// Resets the dongle, programs the network key, and brings every configured
    /// channel up in `Idle`. Blocks for the transport's reset dwell.
    pub fn init<T: Transport + 'static>(transport: T, config: Config) -> Result<Self> {
        let port: SharedPort = Arc::new(Port::new(Box::new(transport) as Box<dyn Transport>));
        port.reset()?;
        port.set_network_key(ANT_NETWORK, config.network_key)?;

        let poll_interval_ms = Arc::new(AtomicU64::new(config.poll_interval_ms));
        let (dispatcher, channels) =
            Dispatcher::start(port.clone(), &config, poll_interval_ms.clone());

        Ok(Ant {
            transport: port,
            dispatcher,
            channels,
            config,
            poll_interval_ms,
            start_time: Instant::now(),
        })
    }

    /// Wall-clock time this facade was brought up; used to express sample
    /// timestamps as milliseconds-since-start for a persistence collaborator.
    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn set_poll_interval_ms(&self, ms: u64) {
        self.poll_interval_ms.store(ms, Ordering::SeqCst);
    }

    pub fn channel_count(&self) -> u8 {
        self.channels.len() as u8
    }

    /// Returns a handle for driving and inspecting channel `index`.
    pub fn channel(&self, index: u8) -> ChannelRef<'_> {
        ChannelRef { ant: self, index }
    }

    fn handle(&self, index: u8) -> Result<&ChannelHandle> {
        self.channels
            .get(index as usize)
            .ok_or(AntError::State(StateError::WrongState))
    }

    /// Stops every dispatcher thread (listener, processor, then per-channel
    /// workers) and closes the transport.
    pub fn shutdown(&mut self) {
        self.dispatcher.shutdown();
        let _ = self.transport.close();
    }
}

impl Drop for Ant {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A lightweight handle scoping the facade's channel operations to a single
/// channel index, e.g. `ant.channel(0).start(ChannelType::HeartRate, 0, false, true)`.
pub struct ChannelRef<'a> {
    ant: &'a Ant,
    index: u8,
}

impl<'a> ChannelRef<'a> {
    /// Drives the channel from `Idle` through the open sequence (§4.C). When
    /// `wait` is `true`, blocks up to `channel_start_timeout_s` for the channel to
    /// reach `OpenUnpaired`/`OpenPaired`.
    pub fn start(
        &self,
        channel_type: ChannelType,
        device_id: u16,
        scanning: bool,
        wait: bool,
    ) -> Result<()> {
        let handle = self.ant.handle(self.index)?;
        {
            let mut channel = handle.lock().unwrap();
            channel.start(
                &self.ant.transport,
                channel_type,
                device_id,
                scanning,
                ANT_NETWORK,
                self.ant.config.search_timeout,
                self.ant.config.extended_messages,
            )?;
        }
        if wait {
            self.wait_for_open(handle)?;
        }
        Ok(())
    }

    fn wait_for_open(&self, handle: &ChannelHandle) -> Result<()> {
        let deadline = Instant::now()
            + Duration::from_secs(self.ant.config.channel_start_timeout_s);
        let mut backoff = WAIT_POLL_MIN;
        loop {
            {
                let channel = handle.lock().unwrap();
                if matches!(
                    channel.state,
                    ChannelState::OpenUnpaired | ChannelState::OpenPaired
                ) {
                    return Ok(());
                }
            }
            if !self.ant.dispatcher.is_running() {
                return Err(AntError::Timeout);
            }
            if Instant::now() >= deadline {
                return Err(AntError::Timeout);
            }
            thread::sleep(backoff);
            backoff = (backoff * 2).min(WAIT_POLL_MAX);
        }
    }

    /// Current open-sequence state.
    pub fn state(&self) -> Result<ChannelState> {
        Ok(self.ant.handle(self.index)?.lock().unwrap().state)
    }

    /// Snapshot of every device this channel has observed so far, copied out from
    /// under the channel's lock so callers can read freely without blocking the
    /// channel worker thread for long.
    pub fn devices(&self) -> Result<Vec<Device>> {
        let handle = self.ant.handle(self.index)?;
        let channel = handle.lock().unwrap();
        Ok(channel.devices.values().cloned().collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::MockTransport;

    fn config() -> Config {
        Config {
            channel_count: 1,
            channel_start_timeout_s: 1,
            ..Config::default()
        }
    }

    #[test]
    fn init_resets_and_sets_network_key() {
        let mut ant = Ant::init(MockTransport::new(), config()).unwrap();
        assert_eq!(ant.channel_count(), 1);
        ant.shutdown();
    }

    #[test]
    fn start_without_wait_returns_immediately() {
        let ant = Ant::init(MockTransport::new(), config()).unwrap();
        ant.channel(0)
            .start(ChannelType::HeartRate, 0, false, false)
            .unwrap();
    }

    #[test]
    fn start_on_out_of_range_channel_errors() {
        let ant = Ant::init(MockTransport::new(), config()).unwrap();
        let err = ant
            .channel(5)
            .start(ChannelType::HeartRate, 0, false, false)
            .unwrap_err();
        assert!(matches!(err, AntError::State(StateError::WrongState)));
    }

    #[test]
    fn wait_true_times_out_without_dongle_acks() {
        let ant = Ant::init(MockTransport::new(), config()).unwrap();
        let err = ant
            .channel(0)
            .start(ChannelType::HeartRate, 0, false, true)
            .unwrap_err();
        assert!(matches!(err, AntError::Timeout));
    }
}
