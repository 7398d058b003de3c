use std::fmt;
use std::sync::Arc;

use core_types::{InterceptedRequest, InterceptedResponse};
use dataset_provider::DatasetProvider;
use tokio::runtime::Handle;

use crate::{Dispatcher, RouteTable};

/// Host continuation. Consumed by value, so it resolves at most once.
pub struct Continue<T> {
    next: Box<dyn FnOnce(T) + Send>,
}

impl<T> Continue<T> {
    pub fn new(next: impl FnOnce(T) + Send + 'static) -> Self {
        Self { next: Box::new(next) }
    }

    pub fn resolve(self, value: T) {
        (self.next)(value)
    }
}

impl<T> fmt::Debug for Continue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Continue")
    }
}

/// Entry point for the host's request/response interception.
///
/// Neither hook blocks on the network: the request side only schedules a
/// load, and the response side works with whatever snapshot is installed
/// at that moment.
#[derive(Clone)]
pub struct InterceptionHook {
    provider: DatasetProvider,
    dispatcher: Dispatcher,
    runtime: Handle,
}

impl InterceptionHook {
    pub fn new(provider: DatasetProvider, table: Arc<RouteTable>, runtime: Handle) -> Self {
        Self {
            provider,
            dispatcher: Dispatcher::new(table),
            runtime,
        }
    }

    pub fn provider(&self) -> &DatasetProvider {
        &self.provider
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn on_request(&self, req: InterceptedRequest, next: Continue<InterceptedRequest>) {
        match param_extract::extract(&req) {
            Some(params) => {
                let provider = self.provider.clone();
                self.runtime.spawn(async move {
                    if let Err(err) = provider.ensure_loaded(&params).await {
                        tracing::debug!(?err, range = %params.range, "background load failed");
                    }
                });
            }
            None => tracing::trace!(url = %req.url, "no reporting range in request"),
        }
        next.resolve(req);
    }

    pub fn on_response(&self, resp: InterceptedResponse, next: Continue<InterceptedResponse>) {
        let out = self.dispatcher.dispatch(resp, self.provider.current());
        next.resolve(out);
    }
}
