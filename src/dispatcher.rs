/// Three cooperating threads (listener, processor, poller) plus one worker thread
/// per channel, wired together with `crossbeam_channel` queues. This is the part of
/// the core that turns a raw byte stream into per-channel, per-device samples
/// without ever letting application-layer parsing block the USB read loop.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};

use crate::channel::Channel;
use crate::config::Config;
use crate::frame::Frame;
use crate::message;
use crate::transport::SharedPort;

pub type ChannelHandle = Arc<Mutex<Channel>>;

/// How long a channel worker or the poller waits on its queue/tick before
/// re-checking the shared `run` flag. Only affects shutdown latency.
const WORKER_RECV_TIMEOUT: Duration = Duration::from_millis(200);
const POLLER_TICK: Duration = Duration::from_millis(100);
const CHANNEL_QUEUE_DEPTH: usize = 256;

/// Work routed to a single channel's worker thread by the processor.
enum ChannelWork {
    /// A `CHANNEL_EVENT` (0x40) frame: drives the channel's open state machine.
    Event(Frame),
    /// A `CHANNEL_ID` (0x51) frame: records the resolved device id.
    Id(Frame),
    /// A `BROADCAST_DATA`/`ACK_DATA` frame: application-layer payload for a device.
    App(Frame),
}

/// Owns the three dispatcher threads and one worker thread per channel. Dropped (or
/// explicitly [`Dispatcher::shutdown`]) to stop the session.
pub struct Dispatcher {
    run: Arc<AtomicBool>,
    listener: Option<JoinHandle<()>>,
    processor: Option<JoinHandle<()>>,
    poller: Option<JoinHandle<()>>,
    workers: Vec<(Sender<ChannelWork>, JoinHandle<()>)>,
}

impl Dispatcher {
    /// Spawns every thread and returns the dispatcher handle alongside the
    /// per-channel handles the facade hands out to callers. `poll_interval_ms` is
    /// shared with the caller so [`crate::ant::Ant::set_poll_interval_ms`] can
    /// retune the poller without restarting the dispatcher.
    pub fn start(
        transport: SharedPort,
        config: &Config,
        poll_interval_ms: Arc<AtomicU64>,
    ) -> (Dispatcher, Vec<ChannelHandle>) {
        let run = Arc::new(AtomicBool::new(true));
        let channels: Vec<ChannelHandle> = (0..config.channel_count)
            .map(|n| Arc::new(Mutex::new(Channel::new(n))))
            .collect();

        let (inbound_tx, inbound_rx) = unbounded::<Frame>();

        let mut workers = Vec::with_capacity(channels.len());
        for channel in &channels {
            let (tx, rx) = bounded::<ChannelWork>(CHANNEL_QUEUE_DEPTH);
            let handle = spawn_channel_worker(channel.clone(), rx, transport.clone(), run.clone());
            workers.push((tx, handle));
        }

        let listener = spawn_listener(transport.clone(), inbound_tx, run.clone());
        let processor = spawn_processor(
            inbound_rx,
            workers.iter().map(|(tx, _)| tx.clone()).collect(),
            run.clone(),
        );
        let poller = spawn_poller(channels.clone(), transport, poll_interval_ms, run.clone());

        (
            Dispatcher {
                run,
                listener: Some(listener),
                processor: Some(processor),
                poller: Some(poller),
                workers,
            },
            channels,
        )
    }

    pub fn is_running(&self) -> bool {
        self.run.load(Ordering::SeqCst)
    }

    /// Cooperative shutdown: flips the shared flag, then joins listener, processor,
    /// and per-channel workers in that order.
    pub fn shutdown(&mut self) {
        self.run.store(false, Ordering::SeqCst);
        if let Some(h) = self.listener.take() {
            let _ = h.join();
        }
        if let Some(h) = self.processor.take() {
            let _ = h.join();
        }
        for (tx, handle) in self.workers.drain(..) {
            drop(tx);
            let _ = handle.join();
        }
        if let Some(h) = self.poller.take() {
            let _ = h.join();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Repeatedly calls `transport.read_frames()` and forwards every decoded frame.
/// Never performs application-layer work; a single slow channel must not be able to
/// stall USB reads.
fn spawn_listener(transport: SharedPort, out: Sender<Frame>, run: Arc<AtomicBool>) -> JoinHandle<()> {
    thread::spawn(move || {
        while run.load(Ordering::SeqCst) {
            match transport.read_frames() {
                Ok(frames) => {
                    for frame in frames {
                        if out.send(frame).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    log::error!("listener: transport read failed, stopping: {}", e);
                    return;
                }
            }
        }
        log::debug!("listener: shutting down");
    })
}

/// Dequeues one frame at a time and dispatches it by message type, per §4.D.
/// Unknown message types are logged and dropped.
fn spawn_processor(
    inbound: Receiver<Frame>,
    channel_senders: Vec<Sender<ChannelWork>>,
    run: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        while run.load(Ordering::SeqCst) {
            match inbound.recv_timeout(WORKER_RECV_TIMEOUT) {
                Ok(frame) => dispatch_frame(frame, &channel_senders),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        log::debug!("processor: shutting down");
    })
}

fn dispatch_frame(frame: Frame, channel_senders: &[Sender<ChannelWork>]) {
    let channel_idx = frame.channel as usize;
    match frame.msg_type {
        message::MESG_STARTUP_MESG_ID => {
            log::debug!("processor: dongle reset ack (startup notification)");
        }
        message::MESG_RESPONSE_EVENT_ID => route(channel_senders, channel_idx, ChannelWork::Event(frame)),
        message::MESG_CHANNEL_ID_ID => route(channel_senders, channel_idx, ChannelWork::Id(frame)),
        message::MESG_BROADCAST_DATA_ID | message::MESG_ACKNOWLEDGE_DATA_ID => {
            route(channel_senders, channel_idx, ChannelWork::App(frame))
        }
        other => log::debug!("processor: dropping unknown message type {:#x}", other),
    }
}

fn route(channel_senders: &[Sender<ChannelWork>], index: usize, work: ChannelWork) {
    match channel_senders.get(index) {
        Some(tx) => {
            if tx.send(work).is_err() {
                log::debug!("processor: channel {} worker gone", index);
            }
        }
        None => log::debug!("processor: frame for out-of-range channel {}", index),
    }
}

/// One thread per channel: application-page parsing and time-series append are
/// bounded but non-trivial, so they are kept off the shared processor to avoid
/// raising worst-case latency for every other channel under multi-sensor load.
fn spawn_channel_worker(
    channel: ChannelHandle,
    rx: Receiver<ChannelWork>,
    transport: SharedPort,
    run: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        while run.load(Ordering::SeqCst) {
            match rx.recv_timeout(WORKER_RECV_TIMEOUT) {
                Ok(ChannelWork::Event(frame)) => {
                    channel.lock().unwrap().on_event(&frame.payload, &transport);
                }
                Ok(ChannelWork::Id(frame)) => {
                    channel.lock().unwrap().on_id(&frame.payload);
                }
                Ok(ChannelWork::App(frame)) => {
                    channel
                        .lock()
                        .unwrap()
                        .enqueue_app(frame.device_id, &frame.payload, frame.timestamp);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    })
}

/// Every `poll_interval_ms`, requests a fresh `COMMON_STATUS` page from every open
/// fitness-equipment channel. Sleeps in short ticks between polls so shutdown stays
/// responsive instead of sleeping the full interval in one call.
fn spawn_poller(
    channels: Vec<ChannelHandle>,
    transport: SharedPort,
    poll_interval_ms: Arc<AtomicU64>,
    run: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut elapsed = Duration::ZERO;
        while run.load(Ordering::SeqCst) {
            let interval = Duration::from_millis(poll_interval_ms.load(Ordering::SeqCst));
            if elapsed >= interval {
                poll_once(&channels, &transport);
                elapsed = Duration::ZERO;
            }
            thread::sleep(POLLER_TICK);
            elapsed += POLLER_TICK;
        }
        log::debug!("poller: shutting down");
    })
}

fn poll_once(channels: &[ChannelHandle], transport: &SharedPort) {
    use crate::channel::{ChannelState, ChannelType};
    for channel in channels {
        let channel = channel.lock().unwrap();
        let is_open = matches!(channel.state, ChannelState::OpenUnpaired | ChannelState::OpenPaired);
        if is_open && channel.channel_type == ChannelType::FitnessEquipment {
            let _ = transport.send_frame(&message::request_common_status_page(channel.number));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::channel::ChannelType;
    use crate::transport::{MockTransport, Port};

    fn test_transport() -> (SharedPort, Arc<Mutex<Vec<Frame>>>) {
        let mock = MockTransport::new();
        let sent = mock.sent_handle();
        (
            Arc::new(Port::new(Box::new(mock) as Box<dyn crate::transport::Transport>)),
            sent,
        )
    }

    #[test]
    fn start_creates_one_channel_per_configured_count() {
        let config = Config {
            channel_count: 3,
            ..Config::default()
        };
        let (transport, _) = test_transport();
        let interval = Arc::new(AtomicU64::new(config.poll_interval_ms));
        let (mut dispatcher, channels) = Dispatcher::start(transport, &config, interval);
        assert_eq!(channels.len(), 3);
        dispatcher.shutdown();
    }

    #[test]
    fn poller_emits_request_for_open_fec_channel() {
        let config = Config {
            channel_count: 1,
            poll_interval_ms: 50,
            ..Config::default()
        };
        let (transport, sent) = test_transport();
        let interval = Arc::new(AtomicU64::new(config.poll_interval_ms));
        let (mut dispatcher, channels) = Dispatcher::start(transport, &config, interval);
        {
            let mut channel = channels[0].lock().unwrap();
            channel.channel_type = ChannelType::FitnessEquipment;
            channel.state = crate::channel::ChannelState::OpenUnpaired;
        }
        thread::sleep(Duration::from_millis(250));
        dispatcher.shutdown();
        let sent = sent.lock().unwrap();
        assert!(sent
            .iter()
            .any(|f| f.msg_type == message::MESG_ACKNOWLEDGE_DATA_ID
                && f.payload.starts_with(&[0x46, 0xFF, 0xFF, 0xFF, 0xFF, 0x81, 0x47, 0x01])));
    }

    #[test]
    fn dispatch_frame_routes_broadcast_to_channel_queue() {
        let (tx, rx) = bounded::<ChannelWork>(4);
        let frame = Frame::new(message::MESG_BROADCAST_DATA_ID, 0, &[0u8; 8]);
        dispatch_frame(frame, &[tx]);
        match rx.try_recv().unwrap() {
            ChannelWork::App(_) => {}
            _ => panic!("expected App work item"),
        }
    }

    #[test]
    fn dispatch_frame_drops_unknown_message_type() {
        let (tx, rx) = bounded::<ChannelWork>(4);
        let frame = Frame::new(0x99, 0, &[]);
        dispatch_frame(frame, &[tx]);
        assert!(rx.try_recv().is_err());
    }
}
