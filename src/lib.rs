//! `antplus-core` drives an ANT+ USB dongle: framing its serial protocol, walking
//! each channel through the dongle's configuration handshake, and decoding
//! application-layer pages for heart-rate, power-meter, and fitness-equipment
//! profiles into per-device time series.
//!
//! The USB transport itself, on-disk persistence, and scripting-language bindings
//! are external collaborators — this crate only needs something that implements
//! [`transport::Transport`].
//!
//! ```no_run
//! use antplus_core::ant::Ant;
//! use antplus_core::channel::ChannelType;
//! use antplus_core::config::Config;
//! use antplus_core::transport::UsbTransport;
//! use rusb::Context;
//!
//! # fn main() -> antplus_core::Result<()> {
//! let mut ctx = Context::new().map_err(|_| antplus_core::error::TransportError::NotFound)?;
//! let transport = UsbTransport::open_context(&mut ctx)?;
//! let ant = Ant::init(transport, Config::default())?;
//!
//! // Search for any heart-rate monitor on channel 0.
//! ant.channel(0).start(ChannelType::HeartRate, 0, true, true)?;
//! for device in ant.channel(0).devices()? {
//!     if let Some(hr) = device.time_series("HEARTRATE") {
//!         println!("{:?} bpm: {:?}", device.id, hr.latest());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
#![allow(dead_code)]

pub mod ant;
pub mod channel;
pub mod config;
mod dispatcher;
pub mod error;
pub mod frame;
pub mod message;
pub mod transport;

pub mod device;

pub type Result<T> = std::result::Result<T, error::AntError>;

pub use config::Config;
pub use error::AntError;
