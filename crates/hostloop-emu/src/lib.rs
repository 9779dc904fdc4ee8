//! Hostloop emulation
//!
//! Emulated hosts and an Ethernet bus, each serialized onto its own
//! [`SingleThreadExecutor`](hostloop_sched::SingleThreadExecutor). A stack
//! deployed on a host is only ever entered from that host's worker thread,
//! the way it would run under a bare-metal main loop.
//!
//! # Example
//!
//! ```ignore
//! use hostloop_emu::{EthernetNetwork, FrameRecorder, InterfaceConfig};
//! use std::sync::Arc;
//!
//! let network = EthernetNetwork::new();
//! let eth = InterfaceConfig::parse("p1.eth1", "127.3.2.1", Some("255.255.255.0"), None)?;
//! network.add_host("peer_one", MyStack::new(), &[eth])?;
//!
//! let recorder = Arc::new(FrameRecorder::new());
//! network.bus().add_observer(recorder.clone());
//!
//! network.start()?;
//! network.set_up_interfaces()?;
//! network.stop()?;
//! ```

#![warn(missing_docs)]

pub mod bus;
pub mod config;
mod context;
pub mod error;
pub mod host;
pub mod network;
pub mod recorder;
pub mod stack;

pub use bus::{BusObserver, EthernetBus, FrameFilter, PortId, PortReceiver};
pub use config::{HostConfig, InterfaceConfig, NetworkConfig};
pub use error::EmuError;
pub use host::Host;
pub use network::{EthernetNetwork, StatusCallback};
pub use recorder::{FrameRecorder, RecordedFrame};
pub use stack::{
    EventSink, Frame, FrameSink, InterfaceEvent, InterfaceHooks, NetworkStack, StackError,
};
