//! HTTP client pool for maintaining persistent connections per base URL.
//!
//! Every backend client asks this pool for its `reqwest::Client` instead of building one, so
//! that sessions talking to the same endpoint reuse TCP/TLS connections:
//! - `pool_idle_timeout`: keeps idle connections alive for 90 seconds
//! - `pool_max_idle_per_host`: up to 10 idle connections per host
//! - `tcp_keepalive`: keepalive probes every 60 seconds
//! - `timeout`: 300 seconds for the entire request, long enough for slow generations

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

lazy_static! {
    static ref HTTP_CLIENT_POOL: Mutex<HashMap<String, reqwest::Client>> =
        Mutex::new(HashMap::new());
}

/// Get or create a shared HTTP client for the given base URL.
pub fn get_http_client(base_url: &str) -> reqwest::Client {
    let mut pool = match HTTP_CLIENT_POOL.lock() {
        Ok(pool) => pool,
        Err(poisoned) => poisoned.into_inner(),
    };

    if let Some(client) = pool.get(base_url) {
        return client.clone();
    }

    let client = build_client();
    pool.insert(base_url.to_string(), client.clone());
    client
}

fn build_client() -> reqwest::Client {
    reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .timeout(Duration::from_secs(300))
        .build()
        .expect("Failed to build HTTP client")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pooled(url: &str) -> bool {
        HTTP_CLIENT_POOL.lock().unwrap().contains_key(url)
    }

    #[test]
    fn test_pool_caches_per_base_url() {
        let deepseek = "https://api.deepseek.com";
        let local = "http://127.0.0.1:11434/v1";

        let _a = get_http_client(deepseek);
        let _b = get_http_client(deepseek);
        let _c = get_http_client(local);

        assert!(pooled(deepseek));
        assert!(pooled(local));
    }
}
