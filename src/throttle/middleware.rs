use crate::error::GateError;
use crate::throttle::{OperationClass, RequestThrottle};
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// Requests that can be throttled name their caller and operation class.
///
/// The identity is whatever the authentication layer resolved (a user id, an
/// API key fingerprint, a client address); the throttle treats it as opaque.
pub trait ThrottleTarget {
    fn identity(&self) -> &str;
    fn operation(&self) -> OperationClass;
}

/// A layer that enforces a [`RequestThrottle`] in front of a service.
#[derive(Clone, Debug)]
pub struct ThrottleLayer {
    throttle: RequestThrottle,
}

impl ThrottleLayer {
    /// Create a new throttle layer sharing `throttle`'s windows.
    pub fn new(throttle: RequestThrottle) -> Self {
        Self { throttle }
    }
}

impl<S> Layer<S> for ThrottleLayer {
    type Service = ThrottleService<S>;

    fn layer(&self, service: S) -> Self::Service {
        ThrottleService { inner: service, throttle: self.throttle.clone() }
    }
}

/// Middleware service that rejects requests over their window's budget.
#[derive(Clone, Debug)]
pub struct ThrottleService<S> {
    inner: S,
    throttle: RequestThrottle,
}

impl<S, Req> Service<Req> for ThrottleService<S>
where
    S: Service<Req>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    S::Response: Send + 'static,
    Req: ThrottleTarget,
{
    type Response = S::Response;
    type Error = GateError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(GateError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let operation = req.operation();
        let decision = self.throttle.check(req.identity(), operation);
        if !decision.is_allowed() {
            let retry_after = decision.retry_after(self.throttle.now());
            return Box::pin(futures::future::ready(Err(GateError::Throttled {
                operation,
                retry_after,
                reset_at: decision.reset_at,
            })));
        }

        let fut = self.inner.call(req);
        Box::pin(async move { fut.await.map_err(GateError::Inner) })
    }
}
