//! The worker side: hosts a service and turns call frames into method calls.

use std::any::Any;
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::envelope::{
    CallEnvelope, CorrelationId, PropertyChange, ReplyEnvelope, getter_name, setter_name,
};
use crate::error::ArgError;

/// Result of a handler once it has been brought to wire form.
pub type HandlerResult = Result<Value, String>;

type DeferredResult = Pin<Box<dyn Future<Output = HandlerResult> + Send + 'static>>;
type Handler<S> = Box<dyn Fn(&mut S, Args, &Notifier) -> Completion>;

/// An object that can live behind the bridge.
pub trait Service: Sized + 'static {
    /// Lists the calls the worker will answer.
    fn register(methods: &mut MethodTable<Self>);
}

/// What the worker does when a call names a method nobody registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownMethodPolicy {
    /// Reply with an `errorMsg` naming the method.
    #[default]
    Reject,
    /// Drop the call; its future never settles.
    Ignore,
}

/// Positional arguments of one call.
#[derive(Debug, Clone, Default)]
pub struct Args(Vec<Value>);

impl Args {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decodes argument `index` into `T`.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, ArgError> {
        let value = self.0.get(index).ok_or(ArgError::Missing(index))?;
        T::deserialize(value).map_err(|source| ArgError::Invalid { index, source })
    }

    pub fn raw(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }
}

/// Handle for publishing property changes to the host outside the call protocol.
#[derive(Debug, Clone)]
pub struct Notifier {
    changes: UnboundedSender<String>,
}

impl Notifier {
    pub fn new(changes: UnboundedSender<String>) -> Self {
        Self { changes }
    }

    /// Best effort: nothing is reported if the host stopped listening.
    pub fn publish<T: Serialize>(&self, member: &str, value: &T) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.publish_value(member, value);
        Ok(())
    }

    fn publish_value(&self, member: &str, value: Value) {
        let change = PropertyChange {
            member: member.to_owned(),
            value,
        };
        match serde_json::to_string(&change) {
            Ok(frame) => {
                if self.changes.send(frame).is_err() {
                    debug!("host closed the change channel; dropped `{member}`");
                }
            }
            Err(err) => warn!("cannot encode change of `{member}`: {err}"),
        }
    }
}

/// The eventual outcome of a call: either already known or still running.
pub enum Completion {
    Ready(HandlerResult),
    Deferred(DeferredResult),
}

/// Name to handler lookup built once per worker.
pub struct MethodTable<S> {
    handlers: HashMap<String, Handler<S>>,
}

impl<S: 'static> Default for MethodTable<S> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<S: 'static> MethodTable<S> {
    /// Registers a synchronous method.
    pub fn method<R, E, F>(&mut self, name: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut S, &Args) -> Result<R, E> + 'static,
        R: Serialize,
        E: Display,
    {
        let member = name.to_owned();
        self.insert(name.to_owned(), move |service, args, _| {
            Completion::Ready(to_wire(&member, handler(service, &args)))
        })
    }

    /// Registers a method whose work finishes later. Each call runs as its own
    /// task, so same-named calls may complete in any order.
    pub fn deferred<R, E, Fut, F>(&mut self, name: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut S, &Args) -> Fut + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Serialize,
        E: Display,
    {
        let member = name.to_owned();
        self.insert(name.to_owned(), move |service, args, _| {
            let pending = handler(service, &args);
            let member = member.clone();
            Completion::Deferred(Box::pin(async move { to_wire(&member, pending.await) }))
        })
    }

    /// Registers `get_<name>` and `set_<name>`. A successful set also publishes
    /// the written value as a change of `name`.
    pub fn property<T, E, G, P>(&mut self, name: &str, get: G, set: P) -> &mut Self
    where
        T: Serialize + DeserializeOwned,
        E: Display,
        G: Fn(&S) -> T + 'static,
        P: Fn(&mut S, T) -> Result<(), E> + 'static,
    {
        self.method(&getter_name(name), move |service, _| Ok::<_, Infallible>(get(&*service)));

        let member = name.to_owned();
        self.insert(setter_name(name), move |service, args, notifier| {
            let written = args
                .get::<T>(0)
                .map_err(|err| err.to_string())
                .and_then(|value| set(service, value).map_err(|err| err.to_string()));

            if written.is_ok() {
                if let Some(raw) = args.raw(0) {
                    notifier.publish_value(&member, raw.clone());
                }
            }
            Completion::Ready(written.map(|()| Value::Null))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    fn insert<F>(&mut self, name: String, handler: F) -> &mut Self
    where
        F: Fn(&mut S, Args, &Notifier) -> Completion + 'static,
    {
        self.handlers.insert(name, Box::new(handler));
        self
    }

    fn invoke(&self, service: &mut S, name: &str, args: Args, notifier: &Notifier) -> Option<Completion> {
        self.handlers
            .get(name)
            .map(|handler| handler(service, args, notifier))
    }
}

fn to_wire<R: Serialize, E: Display>(member: &str, result: Result<R, E>) -> HandlerResult {
    let value = result.map_err(|err| err.to_string())?;
    serde_json::to_value(value).map_err(|err| format!("cannot encode result of `{member}`: {err}"))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Owns the service inside the worker and answers every call frame.
pub struct Kernel<S> {
    service: S,
    methods: MethodTable<S>,
    replies: UnboundedSender<String>,
    notifier: Notifier,
    unknown_method: UnknownMethodPolicy,
}

impl<S: Service> Kernel<S> {
    pub fn new(
        service: S,
        replies: UnboundedSender<String>,
        notifier: Notifier,
        unknown_method: UnknownMethodPolicy,
    ) -> Self {
        let mut methods = MethodTable::default();
        S::register(&mut methods);

        Self {
            service,
            methods,
            replies,
            notifier,
            unknown_method,
        }
    }

    pub fn methods(&self) -> &MethodTable<S> {
        &self.methods
    }

    /// Serves call frames until the host closes the inbox.
    pub async fn run(mut self, mut inbox: UnboundedReceiver<String>) {
        while let Some(frame) = inbox.recv().await {
            self.handle_frame(&frame);
        }
        debug!("inbox closed; kernel stopping");
    }

    pub fn handle_frame(&mut self, frame: &str) {
        match serde_json::from_str::<CallEnvelope>(frame) {
            Ok(call) => self.dispatch(call),
            Err(err) => warn!("dropping malformed call frame: {err}"),
        }
    }

    /// Runs one call. Deferred completions need a tokio runtime.
    pub fn dispatch(&mut self, call: CallEnvelope) {
        let CallEnvelope { method, id, args } = call;

        let invoked = panic::catch_unwind(AssertUnwindSafe(|| {
            self.methods
                .invoke(&mut self.service, &method, Args(args), &self.notifier)
        }));

        let completion = match invoked {
            Ok(Some(completion)) => completion,
            Ok(None) => match self.unknown_method {
                UnknownMethodPolicy::Ignore => {
                    debug!("ignoring call to unknown method `{method}` (#{id})");
                    return;
                }
                UnknownMethodPolicy::Reject => {
                    warn!("call to unknown method `{method}` (#{id})");
                    Completion::Ready(Err(format!("unknown method `{method}`")))
                }
            },
            Err(payload) => Completion::Ready(Err(format!(
                "`{method}` panicked: {}",
                panic_message(payload.as_ref())
            ))),
        };

        self.complete(method, id, completion);
    }

    fn complete(&self, method: String, id: CorrelationId, completion: Completion) {
        match completion {
            Completion::Ready(result) => send_reply(&self.replies, method, id, result),
            Completion::Deferred(pending) => {
                let replies = self.replies.clone();
                tokio::spawn(async move {
                    // A separate task so a panicking future still gets a reply
                    let result = match tokio::spawn(pending).await {
                        Ok(result) => result,
                        Err(err) => Err(format!("`{method}` did not complete: {err}")),
                    };
                    send_reply(&replies, method, id, result);
                });
            }
        }
    }
}

fn send_reply(replies: &UnboundedSender<String>, member: String, m_id: CorrelationId, result: HandlerResult) {
    let reply = ReplyEnvelope {
        member,
        m_id,
        outcome: result.into(),
    };
    match serde_json::to_string(&reply) {
        Ok(frame) => {
            if replies.send(frame).is_err() {
                debug!("host is gone; dropped reply to `{}` (#{m_id})", reply.member);
            }
        }
        Err(err) => warn!("cannot encode reply to `{}` (#{m_id}): {err}", reply.member),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Outcome;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct Counter {
        count: i64,
        label: String,
    }

    impl Service for Counter {
        fn register(methods: &mut MethodTable<Self>) {
            methods
                .method("add", |counter, args| {
                    let step: i64 = args.get(0)?;
                    counter.count += step;
                    Ok::<_, ArgError>(counter.count)
                })
                .method("fail", |_, _| Err::<(), _>("counter refused"))
                .method("explode", |_, _| -> Result<(), Infallible> { panic!("kaboom") })
                .method("tuple_keys", |_, _| {
                    let mut map = BTreeMap::new();
                    map.insert((1, 2), 3);
                    Ok::<_, Infallible>(map)
                })
                .deferred("later", |counter, args| {
                    let value: Result<i64, ArgError> = args.get(0);
                    let count = counter.count;
                    async move {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        value.map(|value| value + count)
                    }
                })
                .property(
                    "label",
                    |counter| counter.label.clone(),
                    |counter, label: String| {
                        counter.label = label;
                        Ok::<_, Infallible>(())
                    },
                );
        }
    }

    struct Harness {
        kernel: Kernel<Counter>,
        replies: mpsc::UnboundedReceiver<String>,
        changes: mpsc::UnboundedReceiver<String>,
    }

    fn harness(policy: UnknownMethodPolicy) -> Harness {
        let (reply_tx, replies) = mpsc::unbounded_channel();
        let (change_tx, changes) = mpsc::unbounded_channel();
        let kernel = Kernel::new(Counter::default(), reply_tx, Notifier::new(change_tx), policy);
        Harness {
            kernel,
            replies,
            changes,
        }
    }

    async fn next_reply(harness: &mut Harness) -> ReplyEnvelope {
        let frame = harness.replies.recv().await.unwrap();
        serde_json::from_str(&frame).unwrap()
    }

    #[tokio::test]
    async fn test_sync_method_replies_with_value() {
        let mut harness = harness(UnknownMethodPolicy::Reject);
        harness.kernel.handle_frame(r#"["add",1,5]"#);
        harness.kernel.handle_frame(r#"["add",2,2]"#);

        let first = next_reply(&mut harness).await;
        assert_eq!((first.member.as_str(), first.m_id), ("add", 1));
        assert_eq!(first.outcome, Outcome::Value(serde_json::json!(5)));
        assert_eq!(next_reply(&mut harness).await.outcome, Outcome::Value(serde_json::json!(7)));
    }

    #[tokio::test]
    async fn test_errors_become_error_replies() {
        let mut harness = harness(UnknownMethodPolicy::Reject);
        harness.kernel.handle_frame(r#"["fail",3]"#);
        harness.kernel.handle_frame(r#"["add",4,"five"]"#);
        harness.kernel.handle_frame(r#"["add",5]"#);

        assert_eq!(next_reply(&mut harness).await.outcome, Outcome::Error("counter refused".into()));
        match next_reply(&mut harness).await.outcome {
            Outcome::Error(message) => assert!(message.starts_with("argument 0")),
            other => panic!("expected an error, got {other:?}"),
        }
        assert_eq!(next_reply(&mut harness).await.outcome, Outcome::Error("missing argument 0".into()));
    }

    #[tokio::test]
    async fn test_panic_is_reported_and_kernel_survives() {
        let mut harness = harness(UnknownMethodPolicy::Reject);
        harness.kernel.handle_frame(r#"["explode",1]"#);
        harness.kernel.handle_frame(r#"["add",2,1]"#);

        match next_reply(&mut harness).await.outcome {
            Outcome::Error(message) => assert!(message.contains("kaboom")),
            other => panic!("expected an error, got {other:?}"),
        }
        assert_eq!(next_reply(&mut harness).await.outcome, Outcome::Value(serde_json::json!(1)));
    }

    #[tokio::test]
    async fn test_unencodable_result_fails_only_that_call() {
        let mut harness = harness(UnknownMethodPolicy::Reject);
        harness.kernel.handle_frame(r#"["tuple_keys",1]"#);
        harness.kernel.handle_frame(r#"["add",2,3]"#);

        let failed = next_reply(&mut harness).await;
        assert_eq!(failed.m_id, 1);
        assert!(matches!(failed.outcome, Outcome::Error(ref message) if message.contains("tuple_keys")));
        assert_eq!(next_reply(&mut harness).await.outcome, Outcome::Value(serde_json::json!(3)));
    }

    #[tokio::test]
    async fn test_unknown_method_policies() {
        let mut rejecting = harness(UnknownMethodPolicy::Reject);
        rejecting.kernel.handle_frame(r#"["nope",1]"#);
        assert_eq!(
            next_reply(&mut rejecting).await.outcome,
            Outcome::Error("unknown method `nope`".into())
        );

        let mut ignoring = harness(UnknownMethodPolicy::Ignore);
        ignoring.kernel.handle_frame(r#"["nope",1]"#);
        ignoring.kernel.handle_frame(r#"["add",2,1]"#);
        assert_eq!(next_reply(&mut ignoring).await.m_id, 2);
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped() {
        let mut harness = harness(UnknownMethodPolicy::Reject);
        harness.kernel.handle_frame("not json");
        harness.kernel.handle_frame(r#"["add",0,1]"#);
        harness.kernel.handle_frame(r#"["add",9,1]"#);
        assert_eq!(next_reply(&mut harness).await.m_id, 9);
    }

    #[tokio::test]
    async fn test_deferred_method_replies_later() {
        let mut harness = harness(UnknownMethodPolicy::Reject);
        harness.kernel.handle_frame(r#"["add",1,10]"#);
        harness.kernel.handle_frame(r#"["later",2,1]"#);

        assert_eq!(next_reply(&mut harness).await.m_id, 1);
        let later = next_reply(&mut harness).await;
        assert_eq!(later.member, "later");
        assert_eq!(later.outcome, Outcome::Value(serde_json::json!(11)));
    }

    #[tokio::test]
    async fn test_property_set_publishes_change() {
        let mut harness = harness(UnknownMethodPolicy::Reject);
        assert!(harness.kernel.methods().contains("get_label"));
        assert!(harness.kernel.methods().contains("set_label"));

        harness.kernel.handle_frame(r#"["set_label",1,"gliders"]"#);
        harness.kernel.handle_frame(r#"["get_label",2]"#);

        assert_eq!(next_reply(&mut harness).await.outcome, Outcome::Value(Value::Null));
        assert_eq!(
            next_reply(&mut harness).await.outcome,
            Outcome::Value(serde_json::json!("gliders"))
        );

        let change: PropertyChange = serde_json::from_str(&harness.changes.recv().await.unwrap()).unwrap();
        assert_eq!(change.member, "label");
        assert_eq!(change.value, serde_json::json!("gliders"));
    }

    #[tokio::test]
    async fn test_failed_set_publishes_nothing() {
        let mut harness = harness(UnknownMethodPolicy::Reject);
        harness.kernel.handle_frame(r#"["set_label",1,42]"#);

        assert!(matches!(next_reply(&mut harness).await.outcome, Outcome::Error(_)));
        assert!(harness.changes.try_recv().is_err());
    }

    #[test]
    fn test_args_decode_by_position() {
        let args = Args::new(vec![serde_json::json!(3), serde_json::json!([1, 2])]);
        assert_eq!(args.len(), 2);
        assert_eq!(args.get::<u8>(0).unwrap(), 3);
        assert_eq!(args.get::<Vec<i32>>(1).unwrap(), vec![1, 2]);
        assert!(matches!(args.get::<u8>(2), Err(ArgError::Missing(2))));
    }
}
