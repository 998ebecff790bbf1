use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use powsrv_transport::{Endpoint, IpcListener, IpcStream, TransportError};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::handler::{handle_connection, ServerContext};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

type Connections = Arc<Mutex<HashMap<u64, IpcStream>>>;

/// A bound powsrv listener.
///
/// `serve` runs until the flag returned by [`PowServer::running_flag`] is
/// cleared. It then hangs up every open connection and waits for their
/// threads before returning.
pub struct PowServer {
    listener: IpcListener,
    context: Arc<ServerContext>,
    running: Arc<AtomicBool>,
}

impl PowServer {
    /// Bind `endpoint`. A stale Unix socket file is replaced.
    pub fn bind(endpoint: &Endpoint, context: ServerContext) -> Result<Self> {
        let listener = IpcListener::bind(endpoint)?;
        Ok(Self {
            listener,
            context: Arc::new(context),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Endpoint clients should dial.
    pub fn local_endpoint(&self) -> Endpoint {
        self.listener.local_endpoint()
    }

    /// Shared state handed to every connection.
    pub fn context(&self) -> &ServerContext {
        &self.context
    }

    /// Clear this flag to stop [`PowServer::serve`].
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Accept connections until stopped, one thread per connection.
    pub fn serve(&self) -> Result<()> {
        self.listener.set_nonblocking(true)?;

        let connections: Connections = Arc::new(Mutex::new(HashMap::new()));
        let mut workers: Vec<JoinHandle<()>> = Vec::new();
        let mut next_id = 0u64;

        info!(
            endpoint = %self.local_endpoint(),
            pow_type = %self.context.devices.pow_type(),
            devices = self.context.devices.len(),
            "powsrv started, waiting for connections"
        );

        while self.running.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok(stream) => {
                    let id = next_id;
                    next_id += 1;
                    if let Some(worker) = self.spawn_connection(id, stream, &connections) {
                        workers.push(worker);
                    }
                }
                Err(TransportError::Accept(err))
                    if err.kind() == std::io::ErrorKind::WouldBlock =>
                {
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
            workers.retain(|worker| !worker.is_finished());
        }

        let open: Vec<IpcStream> = lock(&connections).drain().map(|(_, s)| s).collect();
        info!(open = open.len(), "powsrv stopping");
        self.context.devices.abort_all();
        for stream in open {
            if let Err(err) = stream.shutdown() {
                debug!(error = %err, "connection shutdown failed");
            }
        }
        for worker in workers {
            if worker.join().is_err() {
                warn!("connection thread panicked");
            }
        }
        Ok(())
    }

    fn spawn_connection(
        &self,
        id: u64,
        stream: IpcStream,
        connections: &Connections,
    ) -> Option<JoinHandle<()>> {
        match stream.try_clone() {
            Ok(control) => {
                lock(connections).insert(id, control);
            }
            Err(err) => warn!(connection = id, error = %err, "cannot track connection"),
        }

        let context = Arc::clone(&self.context);
        let registry = Arc::clone(connections);
        let spawned = std::thread::Builder::new()
            .name(format!("powsrv-conn-{id}"))
            .spawn(move || {
                if let Err(err) = handle_connection(stream, &context) {
                    debug!(connection = id, error = %err, "connection ended with error");
                }
                lock(&registry).remove(&id);
            });

        match spawned {
            Ok(worker) => Some(worker),
            Err(err) => {
                warn!(connection = id, error = %err, "failed to spawn connection thread");
                lock(connections).remove(&id);
                None
            }
        }
    }
}

fn lock(connections: &Connections) -> MutexGuard<'_, HashMap<u64, IpcStream>> {
    connections.lock().unwrap_or_else(PoisonError::into_inner)
}
