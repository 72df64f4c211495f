use tracing::{debug, error};

use crate::endpoint::Outcome;
use crate::http::{Request, Response};
use crate::registry::EndpointRegistry;
use crate::status::StatusCode;

/// Upper bound on internal redirect hops for a single request. An alias
/// cycle exhausts this and is reported as a 500 instead of recursing.
pub const MAX_REDIRECT_HOPS: usize = 16;

/// Resolve a request to a final response, following internal redirects.
pub fn dispatch(registry: &EndpointRegistry, request: Request) -> Response {
    let mut request = request;

    for hop in 0..=MAX_REDIRECT_HOPS {
        let outcome = registry.with(request.resource(), |endpoint| endpoint.handle(&request));

        match outcome {
            None => {
                return Response::with_body(
                    StatusCode::NOT_FOUND,
                    format!("Could not find resource {}", request.target()),
                )
            }
            Some(Outcome::Respond(response)) => return response,
            Some(Outcome::Redirect(next)) => {
                debug!(hop, from = %request.resource(), to = %next.resource(),
                    "following internal redirect");
                request = next;
            }
        }
    }

    error!(resource = %request.resource(), max_hops = MAX_REDIRECT_HOPS,
        "redirect hop limit exceeded");
    Response::with_body(StatusCode::INTERNAL_SERVER_ERROR, "Redirect loop detected")
}
