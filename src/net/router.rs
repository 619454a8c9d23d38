use std::error::Error;

use super::Request;

pub type HandlerError = Box<dyn Error + Send + Sync>;
pub type HandlerResult = Result<(), HandlerError>;

/// Application handler bound to a single message type.
///
/// The dispatcher calls [`pre_handle`](Router::pre_handle), [`handle`](Router::handle)
/// and [`post_handle`](Router::post_handle) in that order for every routed request. An
/// error from one phase is logged and does not skip the phases after it.
pub trait Router: Send + Sync + 'static {
    fn pre_handle(&self, _request: &Request) -> HandlerResult {
        Ok(())
    }

    fn handle(&self, request: &Request) -> HandlerResult;

    fn post_handle(&self, _request: &Request) -> HandlerResult {
        Ok(())
    }
}

/// Plain closures act as routers with empty pre/post phases.
impl<F> Router for F
where
    F: Fn(&Request) -> HandlerResult + Send + Sync + 'static,
{
    fn handle(&self, request: &Request) -> HandlerResult {
        self(request)
    }
}
