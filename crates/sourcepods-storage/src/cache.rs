//! Cache headers for git artifacts.
//!
//! Refs, `HEAD` and the files under `objects/info` change whenever a push
//! lands, so they are served [`CachePolicy::Volatile`]. Loose objects and
//! packs are content-addressed and never change once written, so they are
//! served [`CachePolicy::Immutable`]. The policy is fixed per route when the
//! router is built.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Response},
    middleware::Next,
};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// How long immutable artifacts may be cached.
pub const ONE_YEAR: Duration = Duration::from_secs(31_536_000);

const EXPIRED: &str = "Fri, 01 Jan 1980 00:00:00 GMT";

/// Cache policy for a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Revalidate on every request.
    Volatile,
    /// Cache publicly for a year.
    Immutable,
}

impl CachePolicy {
    /// Writes the policy's headers, using `now` as the response time.
    pub fn apply(self, headers: &mut HeaderMap, now: SystemTime) {
        match self {
            CachePolicy::Volatile => {
                headers.insert(header::EXPIRES, HeaderValue::from_static(EXPIRED));
                headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
                headers.insert(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("no-cache, max-age=0, must-revalidate"),
                );
            }
            CachePolicy::Immutable => {
                let date = epoch_seconds(now);
                let expires = date + ONE_YEAR.as_secs();
                headers.insert(header::DATE, HeaderValue::from(date));
                headers.insert(header::EXPIRES, HeaderValue::from(expires));
                headers.insert(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("public, max-age=31536000"),
                );
            }
        }
    }
}

fn epoch_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Axum middleware applying the route's cache policy.
///
/// The timestamp is taken before the handler runs and the status is left
/// alone. Non-2xx responses always get the volatile headers.
pub async fn cache_policy(
    State(policy): State<CachePolicy>,
    request: Request,
    next: Next,
) -> Response<Body> {
    let now = SystemTime::now();
    let mut response = next.run(request).await;

    let policy = if response.status().is_success() {
        policy
    } else {
        CachePolicy::Volatile
    };
    policy.apply(response.headers_mut(), now);
    response
}
