//! Request logging for the HTTP layer. The only routes here are the
//! WebSocket upgrade and CORS preflights, so one line per request with
//! timing is enough; per-event logging happens inside the session actor.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    time::Instant,
};
use tracing::{error, info};

pub struct RequestLogging;

impl<S, B> Transform<S, ServiceRequest> for RequestLogging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggingMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggingMiddleware { service }))
    }
}

pub struct RequestLoggingMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequestLoggingMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let started = Instant::now();
        let method = req.method().to_string();
        let uri = req.uri().to_string();
        let peer = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let elapsed_ms = started.elapsed().as_millis();

            match &result {
                Ok(response) => {
                    info!(
                        method = %method,
                        uri = %uri,
                        peer = %peer,
                        status = %response.status().as_u16(),
                        elapsed_ms = %elapsed_ms,
                        "request handled"
                    );
                }
                Err(err) => {
                    error!(
                        method = %method,
                        uri = %uri,
                        peer = %peer,
                        elapsed_ms = %elapsed_ms,
                        error = %err,
                        "request failed"
                    );
                }
            }

            result
        })
    }
}
