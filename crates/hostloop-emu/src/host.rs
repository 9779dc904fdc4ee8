//! Emulated host
//!
//! A host owns one network stack and one executor. The stack is only ever
//! entered from the executor's worker, reproducing the single main loop of
//! a bare-metal deployment. Before `start` the host is configured inline
//! from the calling thread.

use crate::config::InterfaceConfig;
use crate::context::ExecutionContext;
use crate::error::EmuError;
use crate::stack::{Frame, InterfaceHooks, NetworkStack};
use hostloop_sched::{ExecutorConfig, ResultHandle, SingleThreadExecutor, IMMEDIATE, TOP_PRIORITY};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// A host running one stack instance
pub struct Host<S: NetworkStack> {
    name: String,
    stack: Arc<Mutex<S>>,
    context: ExecutionContext,
    interfaces: RwLock<Vec<String>>,
}

impl<S: NetworkStack> Host<S> {
    /// Initialize `stack` and wrap it in a stopped host
    pub fn new(name: impl Into<String>, mut stack: S, config: ExecutorConfig) -> Result<Self, EmuError> {
        let name = name.into();
        config.validate()?;
        stack.init()?;
        debug!(host = %name, "stack initialized");

        Ok(Self {
            name,
            stack: Arc::new(Mutex::new(stack)),
            context: ExecutionContext::new(config),
            interfaces: RwLock::new(Vec::new()),
        })
    }

    /// Host name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The host executor
    pub fn executor(&self) -> &Arc<SingleThreadExecutor> {
        self.context.executor()
    }

    /// Whether the worker is accepting work
    pub fn is_running(&self) -> bool {
        self.context.is_running()
    }

    /// Names of the interfaces added through this host
    pub fn interface_names(&self) -> Vec<String> {
        self.interfaces.read().clone()
    }

    /// Add an interface to the stack.
    ///
    /// Runs on the worker once the host is started, inline before that.
    pub fn add_network_interface(
        &self,
        config: &InterfaceConfig,
        hooks: InterfaceHooks,
    ) -> Result<(), EmuError> {
        config.validate()?;

        let mut interfaces = self.interfaces.write();
        if interfaces.iter().any(|name| name == &config.name) {
            return Err(EmuError::DuplicateInterface {
                host: self.name.clone(),
                interface: config.name.clone(),
            });
        }

        if self.is_running() {
            let config = config.clone();
            let handle = self.execute(IMMEDIATE, move |stack| {
                Ok(stack.add_interface(&config, hooks)?)
            })?;
            EmuError::settle(handle.await_result())?;
        } else {
            self.stack.lock().add_interface(config, hooks)?;
        }

        interfaces.push(config.name.clone());
        debug!(host = %self.name, interface = %config.name, address = %config.address, "interface added");
        Ok(())
    }

    /// Spawn the host worker
    pub fn start(&self) -> Result<(), EmuError> {
        self.context.start()
    }

    /// Finish queued work, then join the worker
    pub fn stop(&self) -> Result<(), EmuError> {
        self.context.stop()
    }

    /// Bring the link and then the interface up for every interface of the
    /// stack, on the worker. With `sync` this waits for the work to finish.
    pub fn set_up_interfaces(&self, sync: bool) -> Result<ResultHandle<()>, EmuError> {
        let host = self.name.clone();
        let handle = self.execute(IMMEDIATE, move |stack| {
            for name in stack.interface_names() {
                stack.set_interface_up(&name)?;
                trace!(host = %host, interface = %name, "interface up");
            }
            Ok(())
        })?;

        if sync {
            EmuError::settle(handle.await_result())?;
        }
        Ok(handle)
    }

    /// Hand a frame received by `interface` to the stack, on the worker
    pub fn on_incoming_data(&self, interface: &str, frame: Frame) -> Result<ResultHandle<()>, EmuError> {
        if !self.interfaces.read().iter().any(|name| name == interface) {
            return Err(EmuError::UnknownInterface {
                host: self.name.clone(),
                interface: interface.to_string(),
            });
        }

        let interface = interface.to_string();
        self.execute(IMMEDIATE, move |stack| Ok(stack.input(&interface, &frame)?))
    }

    /// Run `action` against the stack on the worker after `delay`.
    ///
    /// Waiting on the returned handle from inside another action of the
    /// same host deadlocks.
    pub fn execute<T, F>(&self, delay: Duration, action: F) -> Result<ResultHandle<T>, EmuError>
    where
        T: Send + 'static,
        F: FnOnce(&mut S) -> anyhow::Result<T> + Send + 'static,
    {
        let stack = Arc::clone(&self.stack);
        let handle = self.executor().schedule_delayed(delay, TOP_PRIORITY, move || {
            let mut stack = stack.lock();
            action(&mut stack)
        })?;
        Ok(handle)
    }
}

impl<S: NetworkStack> fmt::Debug for Host<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("name", &self.name)
            .field("interfaces", &*self.interfaces.read())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
