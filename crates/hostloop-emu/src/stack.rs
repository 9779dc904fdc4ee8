//! Seam to the network stack deployed on an emulated host
//!
//! The emulation never looks inside a stack: it only initializes it, adds
//! interfaces, brings them up and feeds it received frames. Every call is
//! made from the host's executor thread.

use crate::config::InterfaceConfig;
use std::fmt;
use std::sync::Arc;

/// A raw Ethernet frame, shared between the receivers of a broadcast
pub type Frame = Arc<[u8]>;

/// Called by a stack to transmit a frame on one of its interfaces
pub type FrameSink = Arc<dyn Fn(Frame) + Send + Sync>;

/// Called by a stack when an interface changes state
pub type EventSink = Arc<dyn Fn(InterfaceEvent) + Send + Sync>;

/// Interface state change reported by a stack
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum InterfaceEvent {
    /// The link came up
    LinkUp,
    /// The link went down
    LinkDown,
    /// The interface was administratively enabled
    Up,
    /// The interface was administratively disabled
    Down,
}

/// Error codes reported by the stack
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StackError {
    /// Out of memory
    #[error("Out of memory")]
    OutOfMemory,
    /// Buffer error
    #[error("Buffer error")]
    Buffer,
    /// Timeout
    #[error("Timeout")]
    Timeout,
    /// Routing problem
    #[error("Routing problem")]
    Routing,
    /// Operation in progress
    #[error("Operation in progress")]
    InProgress,
    /// Illegal value
    #[error("Illegal value")]
    IllegalValue,
    /// Operation would block
    #[error("Operation would block")]
    WouldBlock,
    /// Address in use
    #[error("Address in use")]
    AddressInUse,
    /// Already connecting
    #[error("Already connecting")]
    AlreadyConnecting,
    /// Connection already established
    #[error("Connection already established")]
    AlreadyConnected,
    /// Not connected
    #[error("Not connected")]
    NotConnected,
    /// Low level interface error
    #[error("Low level interface error")]
    Interface,
    /// Connection aborted
    #[error("Connection aborted")]
    Aborted,
    /// Connection reset
    #[error("Connection reset")]
    Reset,
    /// Connection closed
    #[error("Connection closed")]
    Closed,
    /// Illegal argument
    #[error("Illegal argument")]
    IllegalArgument,
    /// Stack memory allocation failed
    #[error("Allocation failed")]
    Allocation,
}

impl StackError {
    /// Map a negative stack return code. `0` and unknown codes map to `None`.
    pub fn from_code(code: i8) -> Option<Self> {
        Some(match code {
            -1 => StackError::OutOfMemory,
            -2 => StackError::Buffer,
            -3 => StackError::Timeout,
            -4 => StackError::Routing,
            -5 => StackError::InProgress,
            -6 => StackError::IllegalValue,
            -7 => StackError::WouldBlock,
            -8 => StackError::AddressInUse,
            -9 => StackError::AlreadyConnecting,
            -10 => StackError::AlreadyConnected,
            -11 => StackError::NotConnected,
            -12 => StackError::Interface,
            -13 => StackError::Aborted,
            -14 => StackError::Reset,
            -15 => StackError::Closed,
            -16 => StackError::IllegalArgument,
            _ => return None,
        })
    }

    /// Turn a stack return code into a `Result`
    pub fn check(code: i8) -> Result<(), StackError> {
        match Self::from_code(code) {
            Some(err) => Err(err),
            None if code < 0 => Err(StackError::IllegalValue),
            None => Ok(()),
        }
    }
}

/// Callbacks a stack uses to talk back to the emulation
#[derive(Clone)]
pub struct InterfaceHooks {
    output: FrameSink,
    events: Option<EventSink>,
}

impl InterfaceHooks {
    /// Hooks that only carry an output sink
    pub fn new(output: FrameSink) -> Self {
        Self {
            output,
            events: None,
        }
    }

    /// Attach an interface event sink
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = Some(events);
        self
    }

    /// Hooks that drop every frame and event
    pub fn discard() -> Self {
        Self::new(Arc::new(|_: Frame| {}))
    }

    /// Transmit a frame
    pub fn transmit(&self, frame: Frame) {
        (self.output)(frame);
    }

    /// Report an interface event
    pub fn notify(&self, event: InterfaceEvent) {
        if let Some(events) = &self.events {
            events(event);
        }
    }
}

impl fmt::Debug for InterfaceHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceHooks")
            .field("events", &self.events.is_some())
            .finish_non_exhaustive()
    }
}

/// A network stack that must only be entered from one thread at a time
pub trait NetworkStack: Send + 'static {
    /// One-time initialization
    fn init(&mut self) -> Result<(), StackError>;

    /// Create an interface with the given addressing
    fn add_interface(
        &mut self,
        config: &InterfaceConfig,
        hooks: InterfaceHooks,
    ) -> Result<(), StackError>;

    /// Bring the link and then the interface up
    fn set_interface_up(&mut self, name: &str) -> Result<(), StackError>;

    /// Hand a received frame to an interface
    fn input(&mut self, interface: &str, frame: &[u8]) -> Result<(), StackError>;

    /// Names of all interfaces
    fn interface_names(&self) -> Vec<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_error_codes() {
        assert_eq!(StackError::from_code(-1), Some(StackError::OutOfMemory));
        assert_eq!(StackError::from_code(-16), Some(StackError::IllegalArgument));
        assert_eq!(StackError::from_code(0), None);
        assert_eq!(StackError::from_code(-17), None);
        assert_eq!(StackError::Reset.to_string(), "Connection reset");
    }

    #[test]
    fn test_check() {
        assert!(StackError::check(0).is_ok());
        assert_eq!(StackError::check(-3), Err(StackError::Timeout));
        assert_eq!(StackError::check(-100), Err(StackError::IllegalValue));
    }

    #[test]
    fn test_hooks_forward() {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let events = Arc::new(Mutex::new(Vec::new()));

        let hooks = {
            let frames = Arc::clone(&frames);
            let events = Arc::clone(&events);
            InterfaceHooks::new(Arc::new(move |frame: Frame| frames.lock().push(frame)))
                .with_events(Arc::new(move |event: InterfaceEvent| events.lock().push(event)))
        };

        hooks.transmit(Arc::from(&[1u8, 2, 3][..]));
        hooks.notify(InterfaceEvent::Up);

        assert_eq!(&*frames.lock()[0], &[1, 2, 3]);
        assert_eq!(*events.lock(), vec![InterfaceEvent::Up]);
    }

    #[test]
    fn test_discard_hooks() {
        let hooks = InterfaceHooks::discard();
        hooks.transmit(Arc::from(&[0u8][..]));
        hooks.notify(InterfaceEvent::LinkUp);
    }
}
