//! Process mailboxes addressable by id or registered name

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::{BusError, Result, Signal};

static NEXT_PROCESS_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    static CURRENT_PROCESS: ProcessId;
}

/// Opaque process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(u64);

impl ProcessId {
    fn next() -> Self {
        Self(NEXT_PROCESS_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The process the current task runs as, if any
pub fn current_process() -> Option<ProcessId> {
    CURRENT_PROCESS.try_with(|id| *id).ok()
}

/// Run `fut` as process `id`. Sync calls made inside can detect self-delivery.
pub async fn with_process<F: Future>(id: ProcessId, fut: F) -> F::Output {
    CURRENT_PROCESS.scope(id, fut).await
}

/// How a signal is rendered before it reaches a mailbox
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageFormat {
    /// The whole signal
    #[default]
    Signal,
    /// Only the signal's data payload
    Data,
}

impl MessageFormat {
    pub fn render(&self, signal: &Signal) -> Message {
        match self {
            MessageFormat::Signal => Message::Signal(signal.clone()),
            MessageFormat::Data => Message::Data(signal.data.clone()),
        }
    }
}

/// Mailbox payload
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Signal(Signal),
    Data(Value),
}

/// Item delivered to a mailbox
#[derive(Debug)]
pub enum Envelope {
    /// Fire-and-forget
    Cast(Message),
    /// Request expecting a reply
    Call {
        message: Message,
        reply: oneshot::Sender<Value>,
    },
}

impl Envelope {
    pub fn message(&self) -> &Message {
        match self {
            Envelope::Cast(message) => message,
            Envelope::Call { message, .. } => message,
        }
    }

    /// Answer a call. Returns false for casts or if the caller gave up.
    pub fn reply(self, value: Value) -> bool {
        match self {
            Envelope::Cast(_) => false,
            Envelope::Call { reply, .. } => reply.send(value).is_ok(),
        }
    }
}

/// Sending side of a mailbox
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    id: ProcessId,
    sender: mpsc::UnboundedSender<Envelope>,
}

impl ProcessHandle {
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// A process is alive while its mailbox has not been dropped
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Send without waiting
    pub fn cast(&self, message: Message) -> Result<()> {
        trace!("◆ CAST -> {}", self.id);
        self.sender
            .send(Envelope::Cast(message))
            .map_err(|_| BusError::ProcessNotAlive(self.id))
    }

    /// Send and wait for a reply, bounded by `timeout`
    pub async fn call(&self, message: Message, timeout: Duration) -> Result<Value> {
        if current_process() == Some(self.id) {
            return Err(BusError::CallingSelf(self.id));
        }

        trace!("◆ CALL -> {}", self.id);
        let (reply, response) = oneshot::channel();
        self.sender
            .send(Envelope::Call { message, reply })
            .map_err(|_| BusError::ProcessNotAlive(self.id))?;

        match tokio::time::timeout(timeout, response).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(BusError::NoReply(self.id)),
            Err(_) => Err(BusError::Timeout(timeout.as_millis() as u64)),
        }
    }
}

/// Receiving side of a mailbox. Dropping it makes the process not alive.
#[derive(Debug)]
pub struct Mailbox {
    id: ProcessId,
    receiver: mpsc::UnboundedReceiver<Envelope>,
}

impl Mailbox {
    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.receiver.try_recv().ok()
    }

    /// Process envelopes until every handle is dropped, answering calls with
    /// the handler's return value. Runs as this process.
    pub async fn serve<F>(mut self, mut handler: F)
    where
        F: FnMut(&Message) -> Value + Send,
    {
        let id = self.id;
        with_process(id, async move {
            debug!("◆ PROCESS {} ONLINE", id);
            while let Some(envelope) = self.receiver.recv().await {
                let value = handler(envelope.message());
                envelope.reply(value);
            }
            debug!("◆ PROCESS {} OFFLINE", id);
        })
        .await
    }
}

/// Entry count at which `spawn` first sweeps out dead mailboxes
const SWEEP_FLOOR: usize = 64;

#[derive(Debug, Default)]
struct Entries {
    processes: HashMap<ProcessId, ProcessHandle>,
    names: HashMap<String, ProcessId>,
    sweep_at: usize,
}

impl Entries {
    fn sweep(&mut self) -> usize {
        let before = self.processes.len();
        self.processes.retain(|_, handle| handle.is_alive());
        let processes = &self.processes;
        self.names.retain(|_, id| processes.contains_key(id));
        before - self.processes.len()
    }
}

/// Table of live mailboxes
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<RwLock<Entries>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry
    pub fn global() -> &'static ProcessRegistry {
        static GLOBAL: OnceLock<ProcessRegistry> = OnceLock::new();
        GLOBAL.get_or_init(ProcessRegistry::new)
    }

    /// Create and register a new mailbox
    pub fn spawn(&self) -> (ProcessHandle, Mailbox) {
        let id = ProcessId::next();
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = ProcessHandle { id, sender };

        let mut entries = self.inner.write();
        entries.processes.insert(id, handle.clone());
        if entries.processes.len() >= entries.sweep_at.max(SWEEP_FLOOR) {
            let removed = entries.sweep();
            entries.sweep_at = (entries.processes.len() * 2).max(SWEEP_FLOOR);
            if removed > 0 {
                debug!("◆ SWEPT {} DEAD PROCESSES", removed);
            }
        }
        drop(entries);
        debug!("◆ PROCESS {} REGISTERED", id);

        (handle, Mailbox { id, receiver })
    }

    /// Bind `name` to a process. A name held by a dead process is reclaimed.
    pub fn register_name(&self, name: impl Into<String>, id: ProcessId) -> Result<()> {
        let name = name.into();
        let mut entries = self.inner.write();

        if !entries.processes.contains_key(&id) {
            return Err(BusError::ProcessNotFound(id.to_string()));
        }

        if let Some(existing) = entries.names.get(&name) {
            let holder_alive = entries
                .processes
                .get(existing)
                .map(|handle| handle.is_alive())
                .unwrap_or(false);
            if holder_alive && *existing != id {
                return Err(BusError::NameTaken(name));
            }
        }

        entries.names.insert(name, id);
        Ok(())
    }

    pub fn unregister_name(&self, name: &str) -> bool {
        self.inner.write().names.remove(name).is_some()
    }

    pub fn get(&self, id: ProcessId) -> Option<ProcessHandle> {
        self.inner.read().processes.get(&id).cloned()
    }

    pub fn whereis(&self, name: &str) -> Option<ProcessHandle> {
        let entries = self.inner.read();
        entries
            .names
            .get(name)
            .and_then(|id| entries.processes.get(id))
            .cloned()
    }

    /// Resolve an id, failing with `ProcessNotFound`
    pub fn lookup(&self, id: ProcessId) -> Result<ProcessHandle> {
        self.get(id)
            .ok_or_else(|| BusError::ProcessNotFound(id.to_string()))
    }

    /// Resolve a name, failing with `ProcessNotFound`
    pub fn lookup_name(&self, name: &str) -> Result<ProcessHandle> {
        self.whereis(name)
            .ok_or_else(|| BusError::ProcessNotFound(name.to_string()))
    }

    pub fn remove(&self, id: ProcessId) -> bool {
        let mut entries = self.inner.write();
        entries.names.retain(|_, holder| *holder != id);
        entries.processes.remove(&id).is_some()
    }

    /// Drop entries whose mailbox is gone. Returns how many were removed.
    /// `spawn` also sweeps whenever the table doubles.
    pub fn prune(&self) -> usize {
        self.inner.write().sweep()
    }

    pub fn len(&self) -> usize {
        self.inner.read().processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
