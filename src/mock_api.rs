//! In-process mock API surface used as workload shaping.
//!
//! The builtin data fetchers call these instead of a real upstream so the
//! I/O-heavy and mixed workloads have a realistic wait profile without any
//! network dependency. Each call sleeps for a simulated latency before
//! returning deterministic JSON; the sleep is coroutine-aware on the main
//! tier, so concurrent requests overlap their waits.

use std::time::Duration;

use serde_json::{json, Value};

/// Simulated upstream latency per mock call.
const MOCK_LATENCY_MS: u64 = 5;

fn simulate_latency() {
    may::coroutine::sleep(Duration::from_millis(MOCK_LATENCY_MS));
}

/// User directory listing
pub fn users() -> Value {
    simulate_latency();
    json!([
        { "id": 1, "name": "Ada Lovelace", "role": "admin" },
        { "id": 2, "name": "Grace Hopper", "role": "editor" },
        { "id": 3, "name": "Annie Easley", "role": "viewer" },
        { "id": 4, "name": "Mary Jackson", "role": "viewer" }
    ])
}

/// Recent posts, newest first
pub fn posts(count: usize) -> Value {
    simulate_latency();
    let items: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "id": count - i,
                "title": format!("Post #{}", count - i),
                "author_id": (i % 4) + 1,
                "words": 180 + (i * 37) % 900
            })
        })
        .collect();
    Value::Array(items)
}

/// Product catalog snapshot
pub fn catalog() -> Value {
    simulate_latency();
    json!({
        "currency": "USD",
        "products": [
            { "sku": "KB-01", "name": "Keyboard", "price": 89.0, "stock": 12 },
            { "sku": "MS-02", "name": "Mouse", "price": 49.5, "stock": 40 },
            { "sku": "MN-27", "name": "Monitor 27\"", "price": 329.0, "stock": 7 },
            { "sku": "DK-11", "name": "Dock", "price": 199.0, "stock": 0 }
        ]
    })
}
