//! Emulated Ethernet bus
//!
//! Frames transmitted by any attached interface are delivered to every other
//! attached interface. Delivery runs on the bus's own worker, so observers,
//! filters and port receivers are never called concurrently.

use crate::context::ExecutionContext;
use crate::error::EmuError;
use crate::stack::{Frame, FrameSink};
use hostloop_sched::{ExecutorConfig, ResultHandle, SchedulerError, SingleThreadExecutor, IMMEDIATE, TOP_PRIORITY};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Identifies one interface attached to the bus
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId {
    /// Owning host
    pub host: String,
    /// Interface name on that host
    pub interface: String,
}

impl PortId {
    /// Create a port id
    pub fn new(host: impl Into<String>, interface: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            interface: interface.into(),
        }
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.host, self.interface)
    }
}

/// Sees every frame offered to the bus, forwarded or not
pub trait BusObserver: Send + Sync {
    /// Called once per broadcast, before delivery
    fn on_frame(&self, source: &PortId, frame: &Frame, forwarded: bool);
}

impl<F> BusObserver for F
where
    F: Fn(&PortId, &Frame, bool) + Send + Sync,
{
    fn on_frame(&self, source: &PortId, frame: &Frame, forwarded: bool) {
        self(source, frame, forwarded)
    }
}

/// Decides whether a frame is forwarded; all filters must accept it
pub type FrameFilter = Arc<dyn Fn(&PortId, &Frame) -> bool + Send + Sync>;

/// Receives frames delivered to a port
pub type PortReceiver = Arc<dyn Fn(&PortId, Frame) + Send + Sync>;

#[derive(Default)]
struct Wiring {
    ports: RwLock<Vec<(PortId, PortReceiver)>>,
    observers: RwLock<Vec<Arc<dyn BusObserver>>>,
    filters: RwLock<Vec<FrameFilter>>,
}

impl Wiring {
    /// Returns the number of ports the frame was delivered to
    fn deliver(&self, source: &PortId, frame: Frame) -> usize {
        // Snapshot so callbacks may rewire the bus
        let filters = self.filters.read().clone();
        let observers = self.observers.read().clone();
        let ports = self.ports.read().clone();

        let forwarded = filters.iter().all(|filter| filter(source, &frame));
        for observer in &observers {
            observer.on_frame(source, &frame, forwarded);
        }
        if !forwarded {
            trace!(source = %source, len = frame.len(), "frame filtered");
            return 0;
        }

        let mut delivered = 0;
        for (port, receiver) in ports.iter().filter(|(port, _)| port != source) {
            receiver(port, Frame::clone(&frame));
            delivered += 1;
        }
        trace!(source = %source, len = frame.len(), delivered, "frame delivered");
        delivered
    }
}

fn submit(
    executor: &SingleThreadExecutor,
    wiring: &Arc<Wiring>,
    source: PortId,
    frame: Frame,
) -> Result<ResultHandle<usize>, SchedulerError> {
    let wiring = Arc::clone(wiring);
    executor.schedule_delayed(IMMEDIATE, TOP_PRIORITY, move || {
        Ok(wiring.deliver(&source, frame))
    })
}

/// Broadcast medium connecting host interfaces
pub struct EthernetBus {
    wiring: Arc<Wiring>,
    context: ExecutionContext,
}

impl EthernetBus {
    /// Create a stopped bus
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            wiring: Arc::new(Wiring::default()),
            context: ExecutionContext::new(config),
        }
    }

    /// The bus executor
    pub fn executor(&self) -> &Arc<SingleThreadExecutor> {
        self.context.executor()
    }

    /// Whether the bus is accepting frames
    pub fn is_running(&self) -> bool {
        self.context.is_running()
    }

    /// Attach a port. `receiver` is called on the bus worker for every frame
    /// another port broadcasts.
    pub fn add_port(&self, port: PortId, receiver: PortReceiver) -> Result<(), EmuError> {
        let mut ports = self.wiring.ports.write();
        if ports.iter().any(|(existing, _)| existing == &port) {
            return Err(EmuError::DuplicatePort(port));
        }
        debug!(port = %port, "port attached");
        ports.push((port, receiver));
        Ok(())
    }

    /// Ports attached so far
    pub fn ports(&self) -> Vec<PortId> {
        self.wiring
            .ports
            .read()
            .iter()
            .map(|(port, _)| port.clone())
            .collect()
    }

    /// Register an observer
    pub fn add_observer(&self, observer: Arc<dyn BusObserver>) {
        self.wiring.observers.write().push(observer);
    }

    /// Register a filter
    pub fn add_filter(&self, filter: FrameFilter) {
        self.wiring.filters.write().push(filter);
    }

    /// Schedule delivery of `frame` from `source`. The handle resolves to
    /// the number of ports that received it.
    pub fn broadcast(&self, source: PortId, frame: Frame) -> Result<ResultHandle<usize>, EmuError> {
        Ok(submit(self.executor(), &self.wiring, source, frame)?)
    }

    /// Output sink for the interface behind `port`. Frames sent while the
    /// bus is stopped are dropped.
    pub fn output_sink(&self, port: PortId) -> FrameSink {
        let executor = Arc::clone(self.executor());
        let wiring = Arc::clone(&self.wiring);
        Arc::new(move |frame: Frame| {
            if let Err(e) = submit(&executor, &wiring, port.clone(), frame) {
                debug!(port = %port, error = %e, "frame dropped");
            }
        })
    }

    /// Start delivering frames
    pub fn start(&self) -> Result<(), EmuError> {
        self.context.start()
    }

    /// Deliver frames already queued, then join the worker
    pub fn stop(&self) -> Result<(), EmuError> {
        self.context.stop()
    }
}

impl fmt::Debug for EthernetBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EthernetBus")
            .field("ports", &self.ports())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    type Inbox = Arc<Mutex<Vec<(PortId, Vec<u8>)>>>;

    fn collecting(inbox: &Inbox) -> PortReceiver {
        let inbox = Arc::clone(inbox);
        Arc::new(move |port: &PortId, frame: Frame| inbox.lock().push((port.clone(), frame.to_vec())))
    }

    fn frame(bytes: &[u8]) -> Frame {
        Arc::from(bytes)
    }

    fn started_bus() -> (EthernetBus, Inbox) {
        let bus = EthernetBus::new(ExecutorConfig::named("bus-test"));
        let inbox = Inbox::default();
        for port in ["a", "b", "c"] {
            bus.add_port(PortId::new(port, "eth0"), collecting(&inbox)).unwrap();
        }
        bus.start().unwrap();
        (bus, inbox)
    }

    #[test]
    fn test_port_display() {
        assert_eq!(PortId::new("peer_one", "p1.eth1").to_string(), "peer_one/p1.eth1");
    }

    #[test]
    fn test_broadcast_skips_source() {
        let (bus, inbox) = started_bus();
        let delivered = bus
            .broadcast(PortId::new("a", "eth0"), frame(&[1, 2]))
            .unwrap()
            .await_result()
            .unwrap();
        bus.stop().unwrap();

        assert_eq!(delivered, 2);
        let mut receivers: Vec<String> = inbox.lock().iter().map(|(p, _)| p.host.clone()).collect();
        receivers.sort();
        assert_eq!(receivers, vec!["b", "c"]);
    }

    #[test]
    fn test_duplicate_port() {
        let bus = EthernetBus::new(ExecutorConfig::default());
        let inbox = Inbox::default();
        bus.add_port(PortId::new("a", "eth0"), collecting(&inbox)).unwrap();
        let err = bus
            .add_port(PortId::new("a", "eth0"), collecting(&inbox))
            .unwrap_err();
        assert!(matches!(err, EmuError::DuplicatePort(_)));
        assert_eq!(bus.ports().len(), 1);
    }

    #[test]
    fn test_filters_must_all_accept() {
        let (bus, inbox) = started_bus();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        bus.add_observer(Arc::new(move |source: &PortId, _: &Frame, forwarded: bool| {
            log.lock().push((source.host.clone(), forwarded))
        }));
        bus.add_filter(Arc::new(|_: &PortId, frame: &Frame| !frame.is_empty()));
        bus.add_filter(Arc::new(|source: &PortId, _: &Frame| source.host != "c"));

        let a = bus.broadcast(PortId::new("a", "eth0"), frame(&[1])).unwrap();
        let empty = bus.broadcast(PortId::new("a", "eth0"), frame(&[])).unwrap();
        let c = bus.broadcast(PortId::new("c", "eth0"), frame(&[1])).unwrap();

        assert_eq!(a.await_result().unwrap(), 2);
        assert_eq!(empty.await_result().unwrap(), 0);
        assert_eq!(c.await_result().unwrap(), 0);
        bus.stop().unwrap();

        assert_eq!(inbox.lock().len(), 2);
        assert_eq!(
            *seen.lock(),
            vec![
                ("a".to_string(), true),
                ("a".to_string(), false),
                ("c".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_output_sink_after_stop_drops_frame() {
        let (bus, inbox) = started_bus();
        let sink = bus.output_sink(PortId::new("a", "eth0"));
        bus.stop().unwrap();

        sink(frame(&[9]));
        assert!(inbox.lock().is_empty());
        assert_eq!(bus.executor().pending_count(), 0);
    }

    #[test]
    fn test_stop_delivers_queued_frames() {
        let (bus, inbox) = started_bus();
        let sink = bus.output_sink(PortId::new("b", "eth0"));
        for i in 0..5u8 {
            sink(frame(&[i]));
        }
        bus.stop().unwrap();

        let frames: Vec<Vec<u8>> = inbox
            .lock()
            .iter()
            .filter(|(p, _)| p.host == "a")
            .map(|(_, f)| f.clone())
            .collect();
        assert_eq!(frames, (0..5u8).map(|i| vec![i]).collect::<Vec<_>>());
    }

    #[test]
    fn test_broadcast_before_start_rejected() {
        let bus = EthernetBus::new(ExecutorConfig::default());
        let err = bus.broadcast(PortId::new("a", "eth0"), frame(&[1])).unwrap_err();
        assert!(matches!(err, EmuError::Scheduler(SchedulerError::Stopped)));
    }
}
