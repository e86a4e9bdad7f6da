//! The network worker.
//!
//! All requests made through one network are served on its dedicated
//! thread. The worker moves through three stages, each its own type:
//! [`NetworkBuilder`] (options), [`Network`] (set up, not yet running) and
//! [`NetworkGuard`] (running). Dropping the guard stops and joins the
//! worker, so shutdown happens on every exit path of the owner.
//!
//! Networks are not process-wide: each guard has its own worker and its own
//! in-process services, and any number may run side by side.

use crate::storage::InMemEngine;
use crate::util::{Error, Result};
use futures::channel::oneshot;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct NetworkBuilder {
    thread_name: String,
    request_queue_depth: usize,
}

impl Default for NetworkBuilder {
    fn default() -> Self {
        Self {
            thread_name: "txnkv-network".to_owned(),
            request_queue_depth: 1024,
        }
    }
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Requests buffered per connection before senders wait.
    pub fn request_queue_depth(mut self, depth: usize) -> Self {
        self.request_queue_depth = depth;
        self
    }

    /// Sets up the network without starting it.
    pub fn build(self) -> Result<Network> {
        if self.request_queue_depth == 0 {
            return Err(Error::InvalidOptionValue(
                "request queue depth must be positive".to_owned(),
            ));
        }
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::internal(format!("cannot set up network: {}", e)))?;
        Ok(Network {
            runtime,
            options: self,
        })
    }
}

/// A network that has been set up but not run yet.
pub struct Network {
    runtime: Runtime,
    options: NetworkBuilder,
}

impl Network {
    /// Starts the worker thread. The network runs until the returned guard is
    /// stopped or dropped.
    pub fn run(self) -> Result<NetworkGuard> {
        let Network { runtime, options } = self;
        let handle = runtime.handle().clone();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let thread = std::thread::Builder::new()
            .name(options.thread_name.clone())
            .spawn(move || {
                runtime.block_on(async move {
                    // A dropped sender stops the network as well.
                    let _ = stop_rx.await;
                });
                runtime.shutdown_background();
            })
            .map_err(|e| Error::internal(format!("cannot start network thread: {}", e)))?;
        info!(thread = %options.thread_name, "network started");
        Ok(NetworkGuard {
            shared: Arc::new(Shared {
                handle,
                queue_depth: options.request_queue_depth,
                engines: Mutex::new(HashMap::new()),
            }),
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

/// Sets up and runs a network with default options.
pub fn boot() -> Result<NetworkGuard> {
    NetworkBuilder::default().build()?.run()
}

pub(crate) struct Shared {
    handle: Handle,
    queue_depth: usize,
    // In-process database service, one per connection string.
    engines: Mutex<HashMap<String, Arc<InMemEngine>>>,
}

/// A running network. Stops the worker when stopped explicitly or dropped.
pub struct NetworkGuard {
    shared: Arc<Shared>,
    stop: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl NetworkGuard {
    pub(crate) fn handle(&self) -> &Handle {
        &self.shared.handle
    }

    pub(crate) fn queue_depth(&self) -> usize {
        self.shared.queue_depth
    }

    /// Returns the service engine for `key`, creating it on first use.
    pub(crate) fn engine(
        &self,
        key: &str,
        make: impl FnOnce() -> InMemEngine,
    ) -> Result<Arc<InMemEngine>> {
        let mut engines = self
            .shared
            .engines
            .lock()
            .map_err(|_| Error::internal("network registry lock poisoned"))?;
        Ok(engines
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(make()))
            .clone())
    }

    /// Stops the worker and waits for it to exit.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let thread = match self.thread.take() {
            Some(t) => t,
            None => return Ok(()),
        };
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        thread
            .join()
            .map_err(|_| Error::internal("network thread panicked"))?;
        info!("network stopped");
        Ok(())
    }
}

impl Drop for NetworkGuard {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "network shutdown failed");
        } else {
            debug!("network guard dropped");
        }
    }
}
