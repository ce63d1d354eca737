//! Request throttling
//!
//! - Per client IP: a fixed one-minute window of `requests_per_minute`
//! - Per login identifier: `login_failures` failed attempts within
//!   `login_window_minutes`

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use tokio::sync::RwLock;

use crate::config::RateLimitConfig;

/// Requests seen from one IP in the current window
#[derive(Debug, Clone, Copy)]
struct Window {
    started: DateTime<Utc>,
    count: u32,
}

/// Throttle shared by the middleware and the login handler
pub struct RateLimiter {
    requests_per_minute: u32,
    login_failures: u32,
    login_window: Duration,
    ip_windows: RwLock<HashMap<IpAddr, Window>>,
    login_attempts: RwLock<HashMap<String, Vec<DateTime<Utc>>>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            requests_per_minute: config.requests_per_minute,
            login_failures: config.login_failures,
            login_window: config.login_window(),
            ip_windows: RwLock::new(HashMap::new()),
            login_attempts: RwLock::new(HashMap::new()),
        }
    }

    /// Count a request from `ip`. Returns false once the window is full.
    pub async fn check_request(&self, ip: IpAddr) -> bool {
        self.check_request_at(ip, Utc::now()).await
    }

    async fn check_request_at(&self, ip: IpAddr, now: DateTime<Utc>) -> bool {
        if self.requests_per_minute == 0 {
            return true;
        }

        let mut windows = self.ip_windows.write().await;
        let window = windows.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });
        if now - window.started >= Duration::minutes(1) {
            *window = Window {
                started: now,
                count: 0,
            };
        }
        if window.count >= self.requests_per_minute {
            return false;
        }
        window.count += 1;
        true
    }

    /// Whether logins for `identifier` are currently blocked
    pub async fn is_login_limited(&self, identifier: &str) -> bool {
        if self.login_failures == 0 {
            return false;
        }

        let mut attempts = self.login_attempts.write().await;
        let cutoff = Utc::now() - self.login_window;

        let entry = attempts.entry(identifier.to_lowercase()).or_default();
        entry.retain(|time| *time > cutoff);
        entry.len() as u32 >= self.login_failures
    }

    pub async fn record_login_failure(&self, identifier: &str) {
        if self.login_failures == 0 {
            return;
        }
        let mut attempts = self.login_attempts.write().await;
        attempts
            .entry(identifier.to_lowercase())
            .or_default()
            .push(Utc::now());
    }

    /// Forget failures after a successful login
    pub async fn clear_login_failures(&self, identifier: &str) {
        self.login_attempts
            .write()
            .await
            .remove(&identifier.to_lowercase());
    }

    /// Drop stale windows and attempts
    pub async fn cleanup(&self) {
        let now = Utc::now();

        {
            let mut windows = self.ip_windows.write().await;
            windows.retain(|_, window| now - window.started < Duration::minutes(1));
        }

        {
            let cutoff = now - self.login_window;
            let mut attempts = self.login_attempts.write().await;
            attempts.retain(|_, times| {
                times.retain(|time| *time > cutoff);
                !times.is_empty()
            });
        }
    }

    #[cfg(test)]
    async fn tracked_ips(&self) -> usize {
        self.ip_windows.read().await.len()
    }
}
