use futures::prelude::*;
use k8s_openapi::NamespaceResourceScope;
pub use kube::runtime::watcher::Event;
use kube::{
    api::Api,
    runtime::{
        watcher::{self, watcher},
        WatchStreamExt,
    },
    Client, Resource,
};
use serde::de::DeserializeOwned;
use std::{fmt, pin::Pin};
use tokio::time;
use tracing::{info, Instrument};

pub type EventStream<T> = Pin<Box<dyn Stream<Item = watcher::Result<Event<T>>> + Send + 'static>>;

type Connect<T> = Box<dyn Fn() -> EventStream<T> + Send + Sync + 'static>;

/// How long to wait before reopening a stream that ended.
const REOPEN_DELAY: time::Duration = time::Duration::from_secs(1);

/// Wraps a resource watch so that it never terminates.
///
/// Errors are logged and the same stream is polled again; the watcher backs
/// off internally. If the underlying stream ends, a new one is opened.
pub struct Watch<T> {
    span: tracing::Span,
    connect: Connect<T>,
    rx: Option<EventStream<T>>,
}

// === impl Watch ===

impl<T> Watch<T>
where
    T: Resource<Scope = NamespaceResourceScope>,
    T: Clone + DeserializeOwned + fmt::Debug + Send + Sync + 'static,
    T::DynamicType: Default,
{
    /// Watches all resources of kind `T` in `namespace`.
    pub fn namespaced(client: Client, namespace: &str) -> Self {
        let api = Api::<T>::namespaced(client, namespace);
        Self::new(move || {
            watcher(api.clone(), watcher::Config::default())
                .default_backoff()
                .boxed()
        })
    }
}

impl<T: Send + 'static> Watch<T> {
    pub fn new(connect: impl Fn() -> EventStream<T> + Send + Sync + 'static) -> Self {
        Self {
            span: tracing::Span::current(),
            connect: Box::new(connect),
            rx: None,
        }
    }

    pub fn instrument(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    /// Receive the next event in the stream.
    ///
    /// Errors are logged and skipped. If the stream ends, sleep before
    /// opening a new one.
    pub async fn recv(&mut self) -> Event<T> {
        loop {
            let next = {
                let connect = &self.connect;
                let rx = self.rx.get_or_insert_with(|| connect());
                rx.next().instrument(self.span.clone()).await
            };

            match next {
                Some(Ok(ev)) => return ev,
                Some(Err(error)) => {
                    info!(parent: &self.span, %error, "Watch failed");
                }
                None => {
                    info!(parent: &self.span, "Watch stream ended");
                    self.rx = None;
                    time::sleep(REOPEN_DELAY).await;
                    info!(parent: &self.span, "Restarting");
                }
            }
        }
    }

    /// Converts the watch into an infinite stream of events.
    pub fn into_stream(self) -> impl Stream<Item = Event<T>> + Send + 'static {
        stream::unfold(self, |mut watch| async move {
            let ev = watch.recv().await;
            Some((ev, watch))
        })
    }
}

impl<T> fmt::Debug for Watch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch")
            .field("connected", &self.rx.is_some())
            .finish()
    }
}
