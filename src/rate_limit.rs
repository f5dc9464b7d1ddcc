use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use eyre::Result;
use governor::{DefaultKeyedRateLimiter, Quota};
use log::debug;

use crate::error::Error;

const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Requests arriving without a peer address share this bucket.
const UNKNOWN_CLIENT: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

type ClientLimiter = DefaultKeyedRateLimiter<IpAddr>;

/// Request budget per client IP, one hourly and one daily quota.
#[derive(Clone)]
pub struct RateLimiter {
    hourly: Arc<ClientLimiter>,
    daily: Arc<ClientLimiter>,
}

impl RateLimiter {
    pub fn new(per_hour: u32, per_day: u32) -> Result<Self> {
        Self::with_periods((per_hour, HOUR), (per_day, DAY))
    }

    fn with_periods(hourly: (u32, Duration), daily: (u32, Duration)) -> Result<Self> {
        Ok(RateLimiter {
            hourly: Arc::new(governor::RateLimiter::keyed(quota(hourly.0, hourly.1)?)),
            daily: Arc::new(governor::RateLimiter::keyed(quota(daily.0, daily.1)?)),
        })
    }

    pub fn check(&self, client: IpAddr) -> bool {
        // the daily quota is only charged once the hourly one lets the request through
        self.hourly.check_key(&client).is_ok() && self.daily.check_key(&client).is_ok()
    }

    /// Drops clients whose quotas have fully refilled.
    pub fn retain_recent(&self) {
        self.hourly.retain_recent();
        self.daily.retain_recent();
    }

    pub fn tracked_clients(&self) -> usize {
        self.hourly.len().max(self.daily.len())
    }
}

fn quota(limit: u32, period: Duration) -> Result<Quota> {
    let burst = NonZeroU32::new(limit)
        .ok_or_else(|| Error::InvalidConfig("rate limits must be positive".to_string()))?;
    let quota = Quota::with_period(period / limit)
        .ok_or_else(|| Error::InvalidConfig(format!("rate limit {limit} is too high")))?;
    Ok(quota.allow_burst(burst))
}

pub async fn limit(State(limiter): State<RateLimiter>, request: Request, next: Next) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(address)| address.ip())
        .unwrap_or(UNKNOWN_CLIENT);
    if !limiter.check(client) {
        debug!("Rate limit exceeded for {}", client);
        return (StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response();
    }
    next.run(request).await
}
