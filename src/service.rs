//! Serial execution context for the registry.
//!
//! A worker thread owns the `SubscriptionRegistry` and applies every
//! operation in arrival order. Peer-death notices are received on the same
//! thread, so no operation ever races another on the subscription slot.
//!
//! ```text
//! Request Source ──┐
//!                  ├──► RegistryClient ──► command queue ──┐
//! Result Feed ─────┘                                       ├──► worker ──► SubscriptionRegistry
//! death hooks (any thread) ──────────► PeerLost queue ─────┘
//! ```

use crate::error::{RegistryError, Result};
use crate::registry::{SubscribeRequest, SubscriptionRegistry, SubscriptionSnapshot};
use crate::types::{Frequency, Owner, ScanResult};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Service configuration.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Max queued commands before callers block.
    /// Default: 64
    pub command_capacity: usize,

    /// Name of the worker thread.
    pub thread_name: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            command_capacity: 64,
            thread_name: "scan-registry".to_string(),
        }
    }
}

enum Command {
    Subscribe {
        request: SubscribeRequest,
        reply: Sender<bool>,
    },
    Unsubscribe {
        owner: Owner,
        reply: Sender<bool>,
    },
    DeliverResults {
        batch: Vec<ScanResult>,
    },
    Dump {
        reply: Sender<String>,
    },
    Snapshot {
        reply: Sender<Option<SubscriptionSnapshot>>,
    },
    TargetNames {
        reply: Sender<BTreeSet<String>>,
    },
    TargetFrequencies {
        reply: Sender<BTreeSet<Frequency>>,
    },
    Shutdown,
}

/// Starts the registry worker.
pub struct RegistryService;

impl RegistryService {
    /// Spawn a worker owning a fresh registry.
    pub fn spawn(config: RegistryConfig) -> Result<RegistryClient> {
        Self::spawn_with(config, SubscriptionRegistry::new())
    }

    /// Spawn a worker owning `registry`.
    pub fn spawn_with(
        config: RegistryConfig,
        registry: SubscriptionRegistry,
    ) -> Result<RegistryClient> {
        let (commands, receiver) = bounded(config.command_capacity);
        let worker = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || run(registry, receiver))?;

        debug!(thread = %config.thread_name, "registry service started");
        Ok(RegistryClient {
            commands,
            worker: Arc::new(Mutex::new(Some(worker))),
        })
    }
}

fn run(mut registry: SubscriptionRegistry, commands: Receiver<Command>) {
    let deaths = registry.peer_events();

    let mut running = true;
    while running {
        select! {
            recv(deaths) -> notice => {
                if let Ok(notice) = notice {
                    registry.on_peer_lost(notice);
                }
            }
            recv(commands) -> command => {
                // All pending deaths apply before the command.
                registry.process_peer_events();
                running = match command {
                    Ok(Command::Shutdown) | Err(_) => false,
                    Ok(command) => {
                        handle(&mut registry, command);
                        true
                    }
                };
            }
        }
    }

    debug!("registry service stopped");
}

fn handle(registry: &mut SubscriptionRegistry, command: Command) {
    // Reply failures mean the caller stopped waiting.
    match command {
        Command::Subscribe { request, reply } => {
            let _ = reply.send(registry.subscribe(request));
        }
        Command::Unsubscribe { owner, reply } => {
            let _ = reply.send(registry.unsubscribe(owner));
        }
        Command::DeliverResults { batch } => registry.deliver_results(&batch),
        Command::Dump { reply } => {
            let _ = reply.send(registry.dump_to_string());
        }
        Command::Snapshot { reply } => {
            let _ = reply.send(registry.snapshot());
        }
        Command::TargetNames { reply } => {
            let _ = reply.send(registry.target_names());
        }
        Command::TargetFrequencies { reply } => {
            let _ = reply.send(registry.target_frequencies());
        }
        Command::Shutdown => {}
    }
}

/// Cloneable handle to the registry worker.
///
/// Given to both the request source and the result feed.
#[derive(Clone)]
pub struct RegistryClient {
    commands: Sender<Command>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl RegistryClient {
    pub fn subscribe(&self, request: SubscribeRequest) -> Result<bool> {
        self.call(|reply| Command::Subscribe { request, reply })
    }

    pub fn unsubscribe(&self, owner: Owner) -> Result<bool> {
        self.call(|reply| Command::Unsubscribe { owner, reply })
    }

    /// Queue a result batch without waiting for it to be matched.
    pub fn deliver_results(&self, batch: Vec<ScanResult>) -> Result<()> {
        self.commands
            .send(Command::DeliverResults { batch })
            .map_err(|_| RegistryError::ServiceStopped)
    }

    pub fn dump(&self) -> Result<String> {
        self.call(|reply| Command::Dump { reply })
    }

    pub fn snapshot(&self) -> Result<Option<SubscriptionSnapshot>> {
        self.call(|reply| Command::Snapshot { reply })
    }

    pub fn target_names(&self) -> Result<BTreeSet<String>> {
        self.call(|reply| Command::TargetNames { reply })
    }

    pub fn target_frequencies(&self) -> Result<BTreeSet<Frequency>> {
        self.call(|reply| Command::TargetFrequencies { reply })
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// The registry is dropped on the worker, releasing any held liveness
    /// registration. Safe to call more than once.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("registry worker panicked");
            }
        }
    }

    fn call<T>(&self, make: impl FnOnce(Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = bounded(1);
        self.commands
            .send(make(reply))
            .map_err(|_| RegistryError::ServiceStopped)?;
        response.recv().map_err(|_| RegistryError::ServiceStopped)
    }
}
