//! HTTP client pool keeping one persistent `reqwest::Client` per base URL.
//!
//! The model client and the MCP gateway client both talk to a single host for the life
//! of the process, so reusing one client per base URL keeps TCP and TLS sessions warm
//! across turns.
//!
//! No overall request timeout is configured here: a hung model or tool call blocks its
//! turn until the caller gives up. Only connection establishment is bounded.

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

lazy_static! {
    static ref HTTP_CLIENT_POOL: Mutex<HashMap<String, reqwest::Client>> =
        Mutex::new(HashMap::new());
}

/// Get or create the shared HTTP client for the given base URL.
pub fn get_http_client(base_url: &str) -> reqwest::Client {
    let mut pool = HTTP_CLIENT_POOL
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(client) = pool.get(base_url) {
        return client.clone();
    }

    let client = build_client(None);
    pool.insert(base_url.to_string(), client.clone());
    client
}

/// Build a dedicated client, optionally with a whole-request timeout.
pub fn build_client(request_timeout: Option<Duration>) -> reqwest::Client {
    let mut builder = reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .connect_timeout(Duration::from_secs(30));

    if let Some(timeout) = request_timeout {
        builder = builder.timeout(timeout);
    }

    builder.build().unwrap_or_else(|e| {
        log::warn!("falling back to default HTTP client: {}", e);
        reqwest::Client::new()
    })
}
