//! The example service served through the relay.

use std::convert::Infallible;

use crate::http::Response;
use crate::routing::{Dispatcher, RouteError};

/// Greeting returned from `/`.
pub const GREETING: &str = "Hello from the tunnel example service.";

/// `GET /`
pub fn read_root() -> Result<Response, Infallible> {
    Ok(Response::ok([("message", GREETING)]))
}

/// Build the service's route table.
pub fn dispatcher() -> Result<Dispatcher, RouteError> {
    let mut builder = Dispatcher::builder();
    builder.register("/", read_root)?;
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Request;

    #[test]
    fn root_returns_greeting() {
        let dispatcher = dispatcher().unwrap();
        let resp = dispatcher.dispatch(&Request::new("/"));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body.len(), 1);
        assert_eq!(resp.body["message"], GREETING);
    }

    #[test]
    fn only_root_is_served() {
        let dispatcher = dispatcher().unwrap();
        assert_eq!(dispatcher.len(), 1);
        assert_eq!(dispatcher.dispatch(&Request::new("/missing")), Response::not_found());
    }
}
