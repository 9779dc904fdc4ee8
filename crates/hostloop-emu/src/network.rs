//! A bus plus the hosts attached to it

use crate::bus::{EthernetBus, PortId};
use crate::config::{HostConfig, InterfaceConfig, NetworkConfig};
use crate::error::EmuError;
use crate::host::Host;
use crate::stack::{EventSink, Frame, InterfaceEvent, InterfaceHooks, NetworkStack};
use hostloop_sched::ExecutorConfig;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Called with the port and the event whenever an interface changes state
pub type StatusCallback = Arc<dyn Fn(&PortId, InterfaceEvent) + Send + Sync>;

/// Emulated Ethernet network
pub struct EthernetNetwork<S: NetworkStack> {
    config: ExecutorConfig,
    bus: EthernetBus,
    hosts: RwLock<FxHashMap<String, Arc<Host<S>>>>,
    status_callback: Arc<RwLock<Option<StatusCallback>>>,
}

/// Executor config for one participant; worker threads are named after it
fn participant_config(base: &ExecutorConfig, participant: &str) -> ExecutorConfig {
    ExecutorConfig {
        thread_name: format!("{}-{}", base.thread_name, participant),
        ..base.clone()
    }
}

fn keep_first(
    outcome: Result<(), EmuError>,
    participant: &str,
    next: Result<(), EmuError>,
) -> Result<(), EmuError> {
    match next {
        Ok(()) => outcome,
        Err(e) => {
            warn!(participant, error = %e, "participant failed");
            outcome.and(Err(e))
        }
    }
}

impl<S: NetworkStack> EthernetNetwork<S> {
    /// Create an empty network with default executor settings
    pub fn new() -> Self {
        Self::with_executor_config(ExecutorConfig::default())
    }

    /// Create an empty network; `config` is shared by the bus and every host
    pub fn with_executor_config(config: ExecutorConfig) -> Self {
        Self {
            bus: EthernetBus::new(participant_config(&config, "bus")),
            config,
            hosts: RwLock::new(FxHashMap::default()),
            status_callback: Arc::new(RwLock::new(None)),
        }
    }

    /// Build every host of `config`, creating stacks with `factory`
    pub fn from_config<F>(config: &NetworkConfig, mut factory: F) -> Result<Self, EmuError>
    where
        F: FnMut(&HostConfig) -> S,
    {
        config.validate()?;
        let network = Self::with_executor_config(config.executor.clone());
        for host in &config.hosts {
            network.add_host(&host.name, factory(host), &host.interfaces)?;
        }
        info!(hosts = config.hosts.len(), "network built from config");
        Ok(network)
    }

    /// Create a host running `stack` and attach its interfaces to the bus.
    /// A host added after `start` is returned stopped.
    ///
    /// The stack is set up without holding the host registry, so status
    /// callbacks fired while interfaces are added may query the network.
    pub fn add_host(
        &self,
        name: &str,
        stack: S,
        interfaces: &[InterfaceConfig],
    ) -> Result<Arc<Host<S>>, EmuError> {
        if self.hosts.read().contains_key(name) {
            return Err(EmuError::DuplicateHost(name.to_string()));
        }

        let host = Arc::new(Host::new(
            name,
            stack,
            participant_config(&self.config, name),
        )?);

        let mut ports = Vec::with_capacity(interfaces.len());
        for interface in interfaces {
            let port = PortId::new(name, &interface.name);
            let hooks = InterfaceHooks::new(self.bus.output_sink(port.clone()))
                .with_events(self.event_sink(port.clone()));
            host.add_network_interface(interface, hooks)?;
            ports.push(port);
        }

        let mut hosts = self.hosts.write();
        // Another thread may have added the name while the stack was set up
        if hosts.contains_key(name) {
            return Err(EmuError::DuplicateHost(name.to_string()));
        }

        // Ports go on the bus only once every interface exists
        for port in ports {
            let weak = Arc::downgrade(&host);
            self.bus.add_port(
                port,
                Arc::new(move |port: &PortId, frame: Frame| {
                    let Some(host) = weak.upgrade() else {
                        return;
                    };
                    if let Err(e) = host.on_incoming_data(&port.interface, frame) {
                        debug!(port = %port, error = %e, "frame not delivered to host");
                    }
                }),
            )?;
        }

        debug!(host = name, interfaces = interfaces.len(), "host added");
        hosts.insert(name.to_string(), Arc::clone(&host));
        Ok(host)
    }

    /// Host by name
    pub fn host(&self, name: &str) -> Result<Arc<Host<S>>, EmuError> {
        self.hosts
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| EmuError::UnknownHost(name.to_string()))
    }

    /// Names of all hosts, sorted
    pub fn host_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.hosts.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// The bus connecting the hosts
    pub fn bus(&self) -> &EthernetBus {
        &self.bus
    }

    /// Receive interface state changes from every host
    pub fn set_status_callback<F>(&self, callback: F)
    where
        F: Fn(&PortId, InterfaceEvent) + Send + Sync + 'static,
    {
        *self.status_callback.write() = Some(Arc::new(callback));
    }

    /// Start the bus, then every host. A failing participant does not keep
    /// the others from starting; the first error is returned.
    pub fn start(&self) -> Result<(), EmuError> {
        let mut outcome = keep_first(Ok(()), "bus", self.bus.start());
        for host in self.snapshot() {
            outcome = keep_first(outcome, host.name(), host.start());
        }
        info!(ok = outcome.is_ok(), "network started");
        outcome
    }

    /// Stop the bus, then every host. Each drains its queued work first.
    /// Every participant is stopped even if an earlier one fails; the first
    /// error is returned.
    pub fn stop(&self) -> Result<(), EmuError> {
        let mut outcome = keep_first(Ok(()), "bus", self.bus.stop());
        for host in self.snapshot() {
            outcome = keep_first(outcome, host.name(), host.stop());
        }
        info!(ok = outcome.is_ok(), "network stopped");
        outcome
    }

    /// Bring up every interface of every host, waiting for each host
    pub fn set_up_interfaces(&self) -> Result<(), EmuError> {
        for host in self.snapshot() {
            host.set_up_interfaces(true)?;
        }
        Ok(())
    }

    fn snapshot(&self) -> Vec<Arc<Host<S>>> {
        let hosts = self.hosts.read();
        let mut snapshot: Vec<_> = hosts.values().cloned().collect();
        snapshot.sort_by(|a, b| a.name().cmp(b.name()));
        snapshot
    }

    fn event_sink(&self, port: PortId) -> EventSink {
        let callback = Arc::clone(&self.status_callback);
        Arc::new(move |event: InterfaceEvent| {
            let callback = callback.read().clone();
            if let Some(callback) = callback {
                callback(&port, event);
            }
        })
    }
}

impl<S: NetworkStack> Default for EthernetNetwork<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: NetworkStack> fmt::Debug for EthernetNetwork<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EthernetNetwork")
            .field("bus", &self.bus)
            .field("hosts", &self.host_names())
            .finish_non_exhaustive()
    }
}
