//! wxgate - APRS-IS weather station gateway
//!
//! An HTTP ingest service collects range-validated weather readings into a
//! JSON document; a transmission daemon periodically encodes the current
//! reading into APRS frames and uplinks them to an APRS-IS server; a
//! supervisor keeps both services running. The protocol engine
//! (configuration, packet encoding, transmission sequencing, uplink) is
//! exposed here as the contract consumed by the daemon and any future
//! caller.

pub mod commands;
pub mod config;
pub mod daemon;
pub mod ingest;
pub mod metrics;
pub mod packet;
pub mod sequencer;
pub mod supervisor;
pub mod uplink;
pub mod weather;

pub use config::{ConfigError, StationConfig, WxFormat, WxPaths};
pub use packet::Frame;
pub use sequencer::{Sequencer, TxMode, TxOutcome};
pub use uplink::{AprsIsUplink, FrameSender};
pub use weather::WeatherReading;
