use std::collections::HashMap;
use std::io::Read;

use http::Method;
use may_minihttp::Request;

use crate::task::{IncomingRequest, RequestBody};

/// Extract the dispatcher's request shape from a `may_minihttp::Request`.
///
/// Header names are lowercased; repeated headers keep the last value. The
/// body is drained here, once — downstream stages see it as an owned blob
/// or not at all.
pub fn parse_request(req: Request) -> IncomingRequest {
    let method = req
        .method()
        .parse::<Method>()
        .unwrap_or(Method::GET);
    let path = req.path().to_string();

    let headers: HashMap<String, String> = req
        .headers()
        .iter()
        .map(|h| {
            (
                h.name.to_ascii_lowercase(),
                String::from_utf8_lossy(h.value).to_string(),
            )
        })
        .collect();

    let body = {
        let mut buf = String::new();
        match req.body().read_to_string(&mut buf) {
            Ok(0) => RequestBody::Empty,
            Ok(_) => RequestBody::Text(buf),
            Err(_) => RequestBody::Consumed,
        }
    };

    IncomingRequest {
        method,
        path,
        headers,
        body,
    }
}

/// Split a request path into (path, query) halves.
pub fn split_query(path: &str) -> (&str, Option<&str>) {
    match path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path, None),
    }
}
