use std::{thread, time::Duration};

use anyhow::{anyhow, Result};
use geo::Point;
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::Deserialize;
use tracing::{info, warn};
use ureq::{Agent, AgentBuilder};

pub const MAPBOX_URL: &str = "https://api.mapbox.com/geocoding/v5/mapbox.places";

pub trait Geocoder {
    /// Looks up `address` and returns (longitude, latitude), or `None` if nothing matched or the
    /// lookup failed. Exactly one request per call; rate limiting is up to the caller.
    fn geocode(&mut self, address: &str) -> Option<Point>;
}

pub struct Mapbox {
    agent: Agent,
    base_url: String,
    token: String,
}

impl Mapbox {
    pub fn new(base_url: &str, token: String) -> Self {
        Self {
            agent: AgentBuilder::new()
                .user_agent(concat!("placemarks/", env!("CARGO_PKG_VERSION")))
                .timeout(Duration::from_secs(30))
                .build(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, address: &str) -> String {
        format!(
            "{}/{}.json?access_token={}",
            self.base_url,
            urlencoding::encode(address),
            urlencoding::encode(&self.token)
        )
    }

    fn lookup(&self, address: &str) -> Result<Option<Point>> {
        // ureq's errors include the url, which carries the access token
        let response = self.agent.get(&self.url(address)).call().map_err(|e| match e {
            ureq::Error::Status(code, _) => anyhow!("HTTP status {code}"),
            ureq::Error::Transport(x) => anyhow!("{}", x.kind()),
        })?;
        let response: Response = response.into_json()?;
        Ok(response.first_center())
    }
}

impl Geocoder for Mapbox {
    fn geocode(&mut self, address: &str) -> Option<Point> {
        match self.lookup(address) {
            Ok(x) => x,
            Err(e) => {
                warn!("Error geocoding {address}: {e:#}");
                None
            }
        }
    }
}

/// Never makes a request. Used for dry runs.
pub struct Offline;

impl Geocoder for Offline {
    fn geocode(&mut self, address: &str) -> Option<Point> {
        info!("Dry run, not looking up {address}");
        None
    }
}

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Spaces out calls to the inner geocoder by at least `period`. A zero period disables the limit.
pub struct RateLimited<G: Geocoder> {
    inner: G,
    limiter: Option<DirectRateLimiter>,
    clock: DefaultClock,
}

impl<G: Geocoder> RateLimited<G> {
    pub fn new(inner: G, period: Duration) -> Self {
        Self {
            inner,
            limiter: Quota::with_period(period).map(RateLimiter::direct),
            clock: DefaultClock::default(),
        }
    }

    fn wait_for_permit(&self) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        while let Err(not_until) = limiter.check() {
            thread::sleep(not_until.wait_time_from(self.clock.now()));
        }
    }
}

impl<G: Geocoder> Geocoder for RateLimited<G> {
    fn geocode(&mut self, address: &str) -> Option<Point> {
        self.wait_for_permit();
        self.inner.geocode(address)
    }
}

#[derive(Deserialize)]
struct Response {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    // longitude, latitude
    center: [f64; 2],
}

impl Response {
    fn first_center(&self) -> Option<Point> {
        let [lon, lat] = self.features.first()?.center;
        Some(Point::new(lon, lat))
    }
}
