//! End-to-end tests for hosts exchanging frames over the bus

use crossbeam::channel::{self, Receiver, Sender};
use hostloop_emu::{
    EmuError, EthernetNetwork, Frame, FrameRecorder, InterfaceConfig, InterfaceEvent,
    InterfaceHooks, NetworkConfig, NetworkStack, PortId, StackError,
};
use hostloop_sched::{ExecutorConfig, IMMEDIATE};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// (receiving host, interface, frame bytes)
type Delivery = (String, String, Vec<u8>);

/// Stack that announces itself once per interface brought up, and reports
/// every received frame on a channel
struct AnnouncingStack {
    host: String,
    interfaces: Vec<(String, InterfaceHooks)>,
    received: Sender<Delivery>,
}

impl AnnouncingStack {
    fn new(host: &str, received: Sender<Delivery>) -> Self {
        Self {
            host: host.to_string(),
            interfaces: Vec::new(),
            received,
        }
    }

    fn send(&self, interface: &str, payload: &[u8]) -> Result<(), StackError> {
        let (_, hooks) = self
            .interfaces
            .iter()
            .find(|(name, _)| name == interface)
            .ok_or(StackError::IllegalArgument)?;
        hooks.transmit(Arc::from(payload));
        Ok(())
    }
}

impl NetworkStack for AnnouncingStack {
    fn init(&mut self) -> Result<(), StackError> {
        Ok(())
    }

    fn add_interface(&mut self, config: &InterfaceConfig, hooks: InterfaceHooks) -> Result<(), StackError> {
        self.interfaces.push((config.name.clone(), hooks));
        Ok(())
    }

    fn set_interface_up(&mut self, name: &str) -> Result<(), StackError> {
        let (_, hooks) = self
            .interfaces
            .iter()
            .find(|(n, _)| n == name)
            .ok_or(StackError::IllegalArgument)?;
        hooks.notify(InterfaceEvent::LinkUp);
        hooks.notify(InterfaceEvent::Up);
        hooks.transmit(Arc::from(self.host.as_bytes()));
        Ok(())
    }

    fn input(&mut self, interface: &str, frame: &[u8]) -> Result<(), StackError> {
        self.received
            .send((self.host.clone(), interface.to_string(), frame.to_vec()))
            .map_err(|_| StackError::Closed)
    }

    fn interface_names(&self) -> Vec<String> {
        self.interfaces.iter().map(|(name, _)| name.clone()).collect()
    }
}

fn eth(name: &str, address: &str) -> InterfaceConfig {
    InterfaceConfig::parse(name, address, Some("255.255.255.0"), Some("127.0.0.0")).unwrap()
}

fn two_peers() -> (EthernetNetwork<AnnouncingStack>, Receiver<Delivery>) {
    let (tx, rx) = channel::unbounded();
    let network = EthernetNetwork::with_executor_config(ExecutorConfig::named("it"));
    network
        .add_host("peer_one", AnnouncingStack::new("peer_one", tx.clone()), &[eth("p1.eth1", "127.3.2.1")])
        .unwrap();
    network
        .add_host("peer_two", AnnouncingStack::new("peer_two", tx), &[eth("p2.eth1", "127.3.2.2")])
        .unwrap();
    (network, rx)
}

#[test]
fn test_create_minimum_network() {
    let (tx, _rx) = channel::unbounded();
    let network = EthernetNetwork::new();
    network
        .add_host("peer_one", AnnouncingStack::new("peer_one", tx), &[eth("p1.eth1", "127.3.2.1")])
        .unwrap();

    let status_calls = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&status_calls);
    network.set_status_callback(move |_, _| {
        calls.fetch_add(1, Ordering::SeqCst);
    });

    let bus_calls = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&bus_calls);
    network
        .bus()
        .add_observer(Arc::new(move |_: &PortId, _: &Frame, _: bool| {
            calls.fetch_add(1, Ordering::SeqCst);
        }));

    network.start().unwrap();
    network.set_up_interfaces().unwrap();
    network.stop().unwrap();

    assert_eq!(status_calls.load(Ordering::SeqCst), 2);
    assert_eq!(bus_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_status_events_name_their_port() {
    let (network, _rx) = two_peers();
    let events = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&events);
    network.set_status_callback(move |port, event| log.lock().push((port.clone(), event)));

    network.start().unwrap();
    network.set_up_interfaces().unwrap();
    network.stop().unwrap();

    let mut events = events.lock().clone();
    events.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        events,
        vec![
            (PortId::new("peer_one", "p1.eth1"), InterfaceEvent::LinkUp),
            (PortId::new("peer_one", "p1.eth1"), InterfaceEvent::Up),
            (PortId::new("peer_two", "p2.eth1"), InterfaceEvent::LinkUp),
            (PortId::new("peer_two", "p2.eth1"), InterfaceEvent::Up),
        ]
    );
}

#[test]
fn test_announcements_reach_the_other_peer() {
    let (network, rx) = two_peers();
    network.start().unwrap();
    network.set_up_interfaces().unwrap();
    network.stop().unwrap();

    let mut deliveries: Vec<Delivery> = rx.try_iter().collect();
    deliveries.sort();
    assert_eq!(
        deliveries,
        vec![
            ("peer_one".to_string(), "p1.eth1".to_string(), b"peer_two".to_vec()),
            ("peer_two".to_string(), "p2.eth1".to_string(), b"peer_one".to_vec()),
        ]
    );
}

#[test]
fn test_execute_transmits_from_host_context() {
    let (network, rx) = two_peers();
    network.start().unwrap();

    let peer_one = network.host("peer_one").unwrap();
    peer_one
        .execute(IMMEDIATE, |stack| Ok(stack.send("p1.eth1", b"hello")?))
        .unwrap()
        .await_result()
        .unwrap();

    let (host, interface, frame) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(host, "peer_two");
    assert_eq!(interface, "p2.eth1");
    assert_eq!(frame, b"hello");

    network.stop().unwrap();
}

#[test]
fn test_filtered_frames_are_recorded_but_not_delivered() {
    let (network, rx) = two_peers();
    let recorder = Arc::new(FrameRecorder::new());
    network.bus().add_observer(recorder.clone());
    network
        .bus()
        .add_filter(Arc::new(|source: &PortId, _: &Frame| source.host != "peer_two"));

    network.start().unwrap();
    network.set_up_interfaces().unwrap();
    network.stop().unwrap();

    let mut frames = recorder.frames();
    frames.sort_by(|a, b| a.source.cmp(&b.source));
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].source, PortId::new("peer_one", "p1.eth1"));
    assert!(frames[0].forwarded);
    assert_eq!(frames[1].source, PortId::new("peer_two", "p2.eth1"));
    assert!(!frames[1].forwarded);

    let deliveries: Vec<Delivery> = rx.try_iter().collect();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].0, "peer_two");
}

#[test]
fn test_frames_after_stop_are_dropped() {
    let (network, rx) = two_peers();
    network.start().unwrap();
    network.stop().unwrap();

    let peer_one = network.host("peer_one").unwrap();
    let err = peer_one.set_up_interfaces(false).unwrap_err();
    assert!(matches!(err, EmuError::Scheduler(_)));
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_network_from_config() {
    let config = NetworkConfig::from_str(
        r#"
        [executor]
        thread_name = "cfg"

        [[hosts]]
        name = "peer_one"
        [[hosts.interfaces]]
        name = "p1.eth1"
        address = "127.3.2.1"
        mask = "255.255.255.0"

        [[hosts]]
        name = "peer_two"
        [[hosts.interfaces]]
        name = "p2.eth1"
        address = "127.3.2.2"
        mask = "255.255.255.0"
        "#,
    )
    .unwrap();

    let (tx, rx) = channel::unbounded();
    let network =
        EthernetNetwork::from_config(&config, |host| AnnouncingStack::new(&host.name, tx.clone()))
            .unwrap();
    drop(tx);

    network.start().unwrap();
    network.set_up_interfaces().unwrap();
    network.stop().unwrap();

    let receivers: Vec<String> = rx.try_iter().map(|(host, _, _)| host).collect();
    assert_eq!(receivers.len(), 2);
    assert!(receivers.contains(&"peer_one".to_string()));
    assert!(receivers.contains(&"peer_two".to_string()));
}
