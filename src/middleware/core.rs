use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::dispatcher::Reply;
use crate::task::IncomingRequest;

/// Middleware trait for intercepting requests and replies
///
/// Middleware runs on the main tier only, in registration order. `before`
/// may short-circuit with a reply and may deposit per-request context into
/// `locals`; whatever ends up there rides inside the `RenderTask` and is
/// visible to the renderer on either execution path.
pub trait Middleware: Send + Sync {
    /// Called before route matching and rendering.
    ///
    /// # Returns
    ///
    /// * `Some(Reply)` - Short-circuit and return this reply immediately
    /// * `None` - Continue to the next middleware and the dispatcher
    fn before(
        &self,
        _req: &IncomingRequest,
        _locals: &mut HashMap<String, Value>,
    ) -> Option<Reply> {
        None
    }

    /// Called after the reply is assembled; may modify it in place.
    fn after(&self, _req: &IncomingRequest, _res: &mut Reply, _latency: Duration) {}
}
