//! The host side: spawns the worker and correlates replies with calls.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::thread;

use log::{debug, error, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, oneshot};

use crate::envelope::{
    CallEnvelope, CorrelationId, PropertyChange, ReplyEnvelope, getter_name, setter_name,
};
use crate::error::BridgeError;
use crate::kernel::{Kernel, Notifier, Service, UnknownMethodPolicy, panic_message};

const CHANGE_CAPACITY: usize = 64;

type Settle = oneshot::Sender<Result<Value, String>>;

/// How the worker is started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerOptions {
    pub thread_name: String,
    pub unknown_method: UnknownMethodPolicy,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            thread_name: "conway-worker".to_string(),
            unknown_method: UnknownMethodPolicy::default(),
        }
    }
}

/// Outstanding calls, keyed by method name and then correlation id.
#[derive(Default)]
struct PendingTable {
    by_member: HashMap<String, HashMap<CorrelationId, Settle>>,
}

impl PendingTable {
    fn insert(&mut self, member: &str, id: CorrelationId, settle: Settle) {
        self.by_member
            .entry(member.to_owned())
            .or_default()
            .insert(id, settle);
    }

    /// Removes the entry; a second take for the same call finds nothing.
    fn take(&mut self, member: &str, id: CorrelationId) -> Option<Settle> {
        let calls = self.by_member.get_mut(member)?;
        let settle = calls.remove(&id);
        if calls.is_empty() {
            self.by_member.remove(member);
        }
        settle
    }

    fn len(&self) -> usize {
        self.by_member.values().map(HashMap::len).sum()
    }
}

/// Gateway to a service running on its own worker thread.
///
/// Calls never block: each one is sent immediately and answered through the
/// returned [`PendingCall`]. Replies are matched by correlation id only, so
/// calls may settle in any order. Must be spawned from inside a tokio runtime.
///
/// After [`terminate`](Bridge::terminate) every new call fails with
/// [`BridgeError::Terminated`]; calls still outstanding at that point stay
/// unsettled until the bridge itself is dropped. Terminating (or dropping)
/// blocks the calling thread until the worker thread has exited.
pub struct Bridge {
    outbox: Option<mpsc::UnboundedSender<String>>,
    pending: Arc<Mutex<PendingTable>>,
    next_id: AtomicU64,
    changes: broadcast::Sender<PropertyChange>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Bridge {
    /// Starts a worker thread, builds the service there with `factory` and
    /// begins dispatching its replies.
    pub fn spawn<S, F>(factory: F, options: WorkerOptions) -> Result<Self, BridgeError>
    where
        S: Service,
        F: FnOnce(Notifier) -> S + Send + 'static,
    {
        let (call_tx, call_rx) = mpsc::unbounded_channel::<String>();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel::<String>();
        let (change_tx, change_rx) = mpsc::unbounded_channel::<String>();
        let (init_tx, init_rx) = std::sync::mpsc::channel::<std::io::Result<()>>();
        let policy = options.unknown_method;

        let worker = thread::Builder::new()
            .name(options.thread_name.clone())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        let _ = init_tx.send(Err(err));
                        return;
                    }
                };

                let notifier = Notifier::new(change_tx);
                let service = factory(notifier.clone());
                let kernel = Kernel::new(service, reply_tx, notifier, policy);
                let _ = init_tx.send(Ok(()));

                runtime.block_on(kernel.run(call_rx));
            })?;

        match init_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(BridgeError::Spawn(err)),
            // The thread exited before signalling, so the factory panicked
            Err(_) => {
                let message = match worker.join() {
                    Err(payload) => panic_message(payload.as_ref()).to_owned(),
                    Ok(()) => "worker exited during startup".to_owned(),
                };
                error!("worker `{}` failed to start: {message}", options.thread_name);
                return Err(BridgeError::Startup(message));
            }
        }

        let pending = Arc::new(Mutex::new(PendingTable::default()));
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        tokio::spawn(dispatch(reply_rx, change_rx, Arc::clone(&pending), changes.clone()));

        debug!("worker `{}` started", options.thread_name);
        Ok(Self {
            outbox: Some(call_tx),
            pending,
            next_id: AtomicU64::new(1),
            changes,
            worker: Some(worker),
        })
    }

    /// Sends `method` with already-encoded arguments.
    pub fn call(&self, method: &str, args: Vec<Value>) -> PendingCall {
        let Some(outbox) = &self.outbox else {
            error!("`{method}` called on a terminated bridge");
            return PendingCall::failed(method, BridgeError::Terminated);
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (settle, settled) = oneshot::channel();
        // Registered before sending so the reply can never outrun its entry
        self.pending().insert(method, id, settle);

        let envelope = CallEnvelope {
            method: method.to_owned(),
            id,
            args,
        };
        let sent = serde_json::to_string(&envelope)
            .map_err(|source| BridgeError::Encode {
                method: method.to_owned(),
                source,
            })
            .and_then(|frame| outbox.send(frame).map_err(|_| BridgeError::Terminated));

        match sent {
            Ok(()) => PendingCall::waiting(method, id, settled),
            Err(err) => {
                self.pending().take(method, id);
                PendingCall::failed(method, err)
            }
        }
    }

    /// Sends `method`, encoding `args` first.
    ///
    /// A tuple or sequence is spread into positional arguments, `()` sends
    /// none, and any other value is sent as the single argument.
    pub fn invoke<A: Serialize>(&self, method: &str, args: A) -> PendingCall {
        match encode_args(&args) {
            Ok(args) => self.call(method, args),
            Err(source) => PendingCall::failed(
                method,
                BridgeError::Encode {
                    method: method.to_owned(),
                    source,
                },
            ),
        }
    }

    /// Writes a property through its conventional setter.
    pub fn set<T: Serialize>(&self, property: &str, value: T) -> PendingCall {
        self.invoke(&setter_name(property), (value,))
    }

    /// Reads a property through its conventional getter.
    pub fn get(&self, property: &str) -> PendingCall {
        self.call(&getter_name(property), Vec::new())
    }

    /// Follows writes to `member` published by the worker from now on.
    pub fn observe(&self, member: &str) -> PropertyWatch {
        PropertyWatch {
            member: member.to_owned(),
            changes: self.changes.subscribe(),
        }
    }

    /// Number of calls still waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.pending().len()
    }

    pub fn is_terminated(&self) -> bool {
        self.outbox.is_none()
    }

    /// Stops the worker and waits for its thread to exit.
    ///
    /// This is a blocking join, not an await. The kernel stops as soon as its
    /// inbox closes, so the wait is short, but in-flight synchronous handlers
    /// run to completion first. Use `tokio::task::block_in_place` around it
    /// when calling from a multi-thread runtime worker.
    pub fn terminate(&mut self) {
        if self.outbox.take().is_none() {
            return;
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("worker thread panicked while shutting down");
            }
        }
        debug!("worker terminated with {} call(s) outstanding", self.pending_calls());
    }

    fn pending(&self) -> MutexGuard<'_, PendingTable> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn encode_args<A: Serialize>(args: &A) -> Result<Vec<Value>, serde_json::Error> {
    Ok(match serde_json::to_value(args)? {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        single => vec![single],
    })
}

async fn dispatch(
    mut replies: mpsc::UnboundedReceiver<String>,
    mut changes: mpsc::UnboundedReceiver<String>,
    pending: Arc<Mutex<PendingTable>>,
    observers: broadcast::Sender<PropertyChange>,
) {
    loop {
        tokio::select! {
            Some(frame) = replies.recv() => settle_reply(&pending, &frame),
            Some(frame) = changes.recv() => publish_change(&observers, &frame),
            else => break,
        }
    }
    debug!("worker channels closed; dispatcher stopping");
}

fn settle_reply(pending: &Mutex<PendingTable>, frame: &str) {
    let reply: ReplyEnvelope = match serde_json::from_str(frame) {
        Ok(reply) => reply,
        Err(err) => {
            warn!("dropping malformed reply frame: {err}");
            return;
        }
    };

    let settle = pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take(&reply.member, reply.m_id);

    match settle {
        // The caller may have stopped waiting; that is not an error
        Some(settle) => {
            let _ = settle.send(reply.outcome.into());
        }
        None => debug!("ignoring stale reply to `{}` (#{})", reply.member, reply.m_id),
    }
}

fn publish_change(observers: &broadcast::Sender<PropertyChange>, frame: &str) {
    match serde_json::from_str::<PropertyChange>(frame) {
        Ok(change) => {
            // No subscribers is fine
            let _ = observers.send(change);
        }
        Err(err) => warn!("dropping malformed change frame: {err}"),
    }
}

enum CallState {
    Waiting(oneshot::Receiver<Result<Value, String>>),
    Failed(Option<BridgeError>),
}

/// A call that has been sent (or failed to send) and settles exactly once.
pub struct PendingCall {
    method: String,
    id: Option<CorrelationId>,
    state: CallState,
}

impl PendingCall {
    fn waiting(method: &str, id: CorrelationId, settled: oneshot::Receiver<Result<Value, String>>) -> Self {
        Self {
            method: method.to_owned(),
            id: Some(id),
            state: CallState::Waiting(settled),
        }
    }

    fn failed(method: &str, err: BridgeError) -> Self {
        Self {
            method: method.to_owned(),
            id: None,
            state: CallState::Failed(Some(err)),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Correlation id, if the call made it onto the wire.
    pub fn id(&self) -> Option<CorrelationId> {
        self.id
    }

    /// Waits for the reply and decodes its value into `R`.
    pub async fn decode<R: DeserializeOwned>(self) -> Result<R, BridgeError> {
        let method = self.method.clone();
        let value = self.await?;
        serde_json::from_value(value).map_err(|source| BridgeError::Decode { method, source })
    }
}

impl Future for PendingCall {
    type Output = Result<Value, BridgeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            CallState::Failed(err) => Poll::Ready(Err(err.take().unwrap_or(BridgeError::Terminated))),
            CallState::Waiting(settled) => Pin::new(settled).poll(cx).map(|outcome| match outcome {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(message)) => Err(BridgeError::Remote {
                    method: this.method.clone(),
                    message,
                }),
                // Settle handle dropped with the bridge
                Err(_) => Err(BridgeError::Terminated),
            }),
        }
    }
}

/// Successive values written to one worker-side property.
pub struct PropertyWatch {
    member: String,
    changes: broadcast::Receiver<PropertyChange>,
}

impl PropertyWatch {
    /// The next value written to the watched member, or `None` once the
    /// bridge is gone. Changes missed while lagging are skipped.
    pub async fn changed(&mut self) -> Option<Value> {
        loop {
            match self.changes.recv().await {
                Ok(change) if change.member == self.member => return Some(change.value),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!("watch on `{}` skipped {skipped} change(s)", self.member);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Like [`changed`](Self::changed), skipping values that do not decode as `T`.
    pub async fn next<T: DeserializeOwned>(&mut self) -> Option<T> {
        loop {
            let value = self.changed().await?;
            match serde_json::from_value(value) {
                Ok(decoded) => return Some(decoded),
                Err(err) => warn!("change of `{}` has an unexpected shape: {err}", self.member),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pending_entry_is_taken_once() {
        let mut table = PendingTable::default();
        let (settle, _settled) = oneshot::channel();
        table.insert("tick", 1, settle);
        assert_eq!(table.len(), 1);

        assert!(table.take("tick", 1).is_some());
        assert!(table.take("tick", 1).is_none());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_pending_lookup_needs_member_and_id() {
        let mut table = PendingTable::default();
        let (settle, _settled) = oneshot::channel();
        table.insert("tick", 4, settle);

        assert!(table.take("reset", 4).is_none());
        assert!(table.take("tick", 5).is_none());
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_and_duplicate_replies_are_ignored() {
        let pending = Mutex::new(PendingTable::default());
        let (settle, settled) = oneshot::channel();
        pending.lock().unwrap().insert("tick", 2, settle);

        settle_reply(&pending, r#"{"member":"tick","mId":99,"value":null}"#);
        settle_reply(&pending, r#"{"member":"tick","mId":2,"value":5}"#);
        settle_reply(&pending, r#"{"member":"tick","mId":2,"errorMsg":"again"}"#);
        settle_reply(&pending, "garbage");

        assert_eq!(settled.await.unwrap(), Ok(json!(5)));
        assert_eq!(pending.lock().unwrap().len(), 0);
    }

    #[test]
    fn test_encode_args_shapes() {
        assert!(encode_args(&()).unwrap().is_empty());
        assert_eq!(encode_args(&(1, "a")).unwrap(), vec![json!(1), json!("a")]);
        assert_eq!(encode_args(&(vec![1, 2],)).unwrap(), vec![json!([1, 2])]);
        assert_eq!(encode_args(&7).unwrap(), vec![json!(7)]);
    }

    #[test]
    fn test_encode_args_rejects_non_string_keys() {
        let mut map = HashMap::new();
        map.insert((0, 0), 1);
        assert!(encode_args(&(map,)).is_err());
    }

    struct Doomed;

    impl Service for Doomed {
        fn register(_: &mut crate::kernel::MethodTable<Self>) {}
    }

    #[test]
    fn test_factory_panic_is_a_startup_error() {
        let result = Bridge::spawn(|_| -> Doomed { panic!("no board today") }, WorkerOptions::default());
        match result {
            Err(BridgeError::Startup(message)) => assert_eq!(message, "no board today"),
            Err(other) => panic!("expected a startup error, got {other}"),
            Ok(_) => panic!("expected a startup error"),
        }
    }

    #[test]
    fn test_worker_options_from_partial_config() {
        let options: WorkerOptions = serde_json::from_value(json!({"unknown_method": "ignore"})).unwrap();
        assert_eq!(options.unknown_method, UnknownMethodPolicy::Ignore);
        assert_eq!(options.thread_name, "conway-worker");
    }
}
