use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

const WINDOW: Duration = Duration::from_secs(1);

/// Upper bound on tracked clients. Newcomers past it share one window.
pub const MAX_TRACKED_CLIENTS: usize = 10_000;
const OVERFLOW_KEY: &str = "overflow";
const UNKNOWN_PEER: &str = "unknown";

#[derive(Debug)]
struct WindowState {
    start: Instant,
    count: u32,
}

/// Fixed one-second windows, counted per client.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    rps: u32,
    trust_forwarded_for: bool,
    windows: Arc<Mutex<HashMap<String, WindowState>>>,
}

impl RateLimiter {
    pub fn new(rps: u32, trust_forwarded_for: bool) -> Self {
        Self {
            rps: rps.max(1),
            trust_forwarded_for,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn allow(&self, client: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let mut key = client;
        if !windows.contains_key(key) && windows.len() >= MAX_TRACKED_CLIENTS {
            windows.retain(|k, w| k == OVERFLOW_KEY || now.duration_since(w.start) < WINDOW);
            if windows.len() >= MAX_TRACKED_CLIENTS {
                key = OVERFLOW_KEY;
            }
        }
        let window = windows.entry(key.to_string()).or_insert(WindowState {
            start: now,
            count: 0,
        });
        if now.duration_since(window.start) >= WINDOW {
            window.start = now;
            window.count = 0;
        }
        if window.count < self.rps {
            window.count += 1;
            true
        } else {
            false
        }
    }

    fn tracked(&self) -> usize {
        self.windows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// The peer address, or the first `X-Forwarded-For` hop when the service
    /// sits behind a trusted proxy.
    fn client_key<B>(&self, req: &Request<B>) -> String {
        if self.trust_forwarded_for {
            let forwarded = req
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty());
            if let Some(hop) = forwarded {
                return hop.to_string();
            }
        }
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| UNKNOWN_PEER.to_string())
    }
}

pub async fn rps_middleware(
    State(state): State<RateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let client = state.client_key(&req);
    if !state.allow(&client, Instant::now()) {
        tracing::warn!(client = %client, "rate limit exceeded");
        return (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded").into_response();
    }
    next.run(req).await
}

pub fn new_rps_state(rps: u32, trust_forwarded_for: bool) -> RateLimiter {
    RateLimiter::new(rps, trust_forwarded_for)
}
