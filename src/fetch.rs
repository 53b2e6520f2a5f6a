//! Data stage: runs a route's data fetcher on the caller thread.
//!
//! The fetcher is the only place a request is allowed to do I/O before
//! rendering; it may fan out internally (spawn coroutines, gather several
//! upstream calls) but it completes strictly before the render stage starts.
//! Timing is wall-clock.

use std::time::Instant;

use serde_json::Value;
use tracing::{debug, error};
use url::Url;

use crate::error::DispatchError;
use crate::registry::{FetchContext, RouteDefinition};

/// Execute the route's data fetcher, timing it.
///
/// Routes without a fetcher yield `(Null, 0)` immediately. Any fetcher
/// error or panic is wrapped as `DataFetchFailed` carrying the original
/// message, paired with the elapsed time.
pub fn fetch_data(
    route: &RouteDefinition,
    url: &Url,
    ctx: &FetchContext,
) -> Result<(Value, u64), (DispatchError, u64)> {
    let Some(fetcher) = route.fetcher else {
        return Ok((Value::Null, 0));
    };

    let start = Instant::now();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| fetcher(url, ctx)));
    let duration_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(data)) => {
            debug!(route = route.name, duration_ms, "Data fetch complete");
            Ok((data, duration_ms))
        }
        Ok(Err(err)) => {
            error!(route = route.name, error = %err, "Data fetch failed");
            Err((DispatchError::data_fetch(route.name, err.to_string()), duration_ms))
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<String>()
                .cloned()
                .or_else(|| panic.downcast_ref::<&str>().map(|s| (*s).to_string()))
                .unwrap_or_else(|| "data fetcher panicked".to_string());
            error!(route = route.name, panic_message = %message, "Data fetcher panicked");
            Err((DispatchError::data_fetch(route.name, message), duration_ms))
        }
    }
}
