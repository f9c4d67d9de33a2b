use crate::metrics::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION};
use crate::models::Identity;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;
use tracing::{info, info_span, warn, Instrument};

/// Metric label for requests that matched no registered route.
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Access logging middleware: one structured line per request plus HTTP metrics.
///
/// The acting user is read from the [`Identity`] the auth guard leaves in the
/// request extensions, so it is only known after the handler ran. Metrics are
/// labelled by route pattern; paths that match no route share `"unmatched"`.
/// When [`RequestId`] wraps this middleware, the handler runs inside a
/// `request` span carrying the id, so auth guard events are tagged with it.
pub struct AccessLogger;

impl<S, B> Transform<S, ServiceRequest> for AccessLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AccessLoggerMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AccessLoggerMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct AccessLoggerMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AccessLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();

        Box::pin(async move {
            let method = req.method().to_string();
            let path = req.path().to_string();
            let route = req.match_pattern().unwrap_or_else(|| UNMATCHED_ROUTE.to_string());
            let ip = req.peer_addr().map(|addr| addr.to_string());
            let request_id = req
                .extensions()
                .get::<RequestIdValue>()
                .map(|id| id.0.clone())
                .unwrap_or_default();

            let span = info_span!("request", request_id = %request_id);
            let start_time = std::time::Instant::now();
            let res = svc.call(req).instrument(span).await;
            let elapsed = start_time.elapsed();

            HTTP_REQUEST_DURATION
                .with_label_values(&[method.as_str(), route.as_str()])
                .observe(elapsed.as_secs_f64());

            match &res {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let user = response
                        .request()
                        .extensions()
                        .get::<Identity>()
                        .map(|identity| identity.username.clone());

                    HTTP_REQUESTS_TOTAL
                        .with_label_values(&[method.as_str(), route.as_str(), status.to_string().as_str()])
                        .inc();

                    info!(
                        request_id = %request_id,
                        method = %method,
                        path = %path,
                        status = status,
                        duration_ms = elapsed.as_millis(),
                        ip = ?ip,
                        user = ?user,
                        "API_REQUEST"
                    );
                }
                Err(err) => {
                    HTTP_REQUESTS_TOTAL
                        .with_label_values(&[method.as_str(), route.as_str(), "error"])
                        .inc();

                    warn!(
                        request_id = %request_id,
                        method = %method,
                        path = %path,
                        error = %err,
                        ip = ?ip,
                        "REQUEST_ERROR"
                    );
                }
            }

            res
        })
    }
}

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Assigns each request an id, exposed to inner services as [`RequestIdValue`]
/// and returned to the client as `x-request-id`. Wrap it outside
/// [`AccessLogger`] so the access log can see the id.
pub struct RequestId;

impl<S, B> Transform<S, ServiceRequest> for RequestId
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestIdMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestIdMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct RequestIdMiddleware<S> {
    service: Rc<S>,
}

/// Per-request identifier placed in the request extensions by [`RequestId`].
#[derive(Debug, Clone)]
pub struct RequestIdValue(pub String);

impl<S, B> Service<ServiceRequest> for RequestIdMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Keep a caller-supplied UUID so a trace can span several services
        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| uuid::Uuid::parse_str(s).ok())
            .unwrap_or_else(uuid::Uuid::new_v4)
            .to_string();
        req.extensions_mut().insert(RequestIdValue(request_id.clone()));

        let svc = self.service.clone();

        Box::pin(async move {
            let mut res = svc.call(req).await?;
            if let Ok(value) = HeaderValue::from_str(&request_id) {
                res.headers_mut()
                    .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
            }
            Ok(res)
        })
    }
}
