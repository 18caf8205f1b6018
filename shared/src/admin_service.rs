use crate::http::{make_boxed_error_response, make_boxed_response};
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

/// Serves `/health` and `/ready` on the admin listener.
///
/// The readiness check returns the reason the service cannot handle work yet,
/// which is echoed back in the 503 body.
pub struct AdminService<F, E> {
    readiness: F,
    _error: PhantomData<fn() -> E>,
}

impl<F, E> AdminService<F, E>
where
    F: Fn() -> Result<(), String>,
{
    pub fn new(readiness: F) -> Self {
        Self {
            readiness,
            _error: PhantomData,
        }
    }
}

impl<F, E> Service<Request<Incoming>> for AdminService<F, E>
where
    F: Fn() -> Result<(), String> + Send + Sync + 'static,
    E: Send + 'static,
{
    type Response = Response<BoxBody<Bytes, Infallible>>;
    type Error = E;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let response = route(req.method(), req.uri().path(), &self.readiness);
        Box::pin(async move { Ok(response) })
    }
}

fn route<F>(method: &Method, path: &str, readiness: &F) -> Response<BoxBody<Bytes, Infallible>>
where
    F: Fn() -> Result<(), String>,
{
    if method != Method::GET {
        return make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED);
    }

    match path {
        "/health" => make_boxed_response(StatusCode::OK, "ok\n"),
        "/ready" => match readiness() {
            Ok(()) => make_boxed_response(StatusCode::OK, "ok\n"),
            Err(reason) => {
                tracing::warn!(%reason, "readiness check failed");
                make_boxed_response(StatusCode::SERVICE_UNAVAILABLE, format!("{reason}\n"))
            }
        },
        _ => make_boxed_error_response(StatusCode::NOT_FOUND),
    }
}
