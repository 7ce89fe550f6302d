//! External TLE catalog

use chrono::NaiveDate;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const ENV_IDENTITY: &str = "SPACETRACK_IDENTITY";
pub const ENV_PASSWORD: &str = "SPACETRACK_PASSWORD";

const SPACE_TRACK_URL: &str = "https://www.space-track.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("No TLE data for {0}")]
    EmptyResult(String),
    #[error("Transport error: {0}")]
    Transport(String),
}

/// One request: element sets created in `[start, end)`, optionally for a
/// subset of catalog numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TleQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub norad_ids: Vec<u32>,
}

impl TleQuery {
    /// Everything created on `date`.
    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date.succ_opt().unwrap_or(date),
            norad_ids: Vec::new(),
        }
    }

    pub fn with_norad_ids(mut self, norad_ids: &[u32]) -> Self {
        self.norad_ids = norad_ids.to_vec();
        self
    }

    /// `gp_history` query path, always ending in `format/tle/`.
    pub fn path(&self) -> String {
        let range = format!(
            "{}--{}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        );
        if self.norad_ids.is_empty() {
            format!(
                "/basicspacedata/query/class/gp_history/CREATION_DATE/{}/orderby/NORAD_CAT_ID,EPOCH/format/tle/",
                range
            )
        } else {
            let ids: Vec<String> = self.norad_ids.iter().map(|id| id.to_string()).collect();
            format!(
                "/basicspacedata/query/class/gp_history/NORAD_CAT_ID/{}/CREATION_DATE/{}/orderby/EPOCH/format/tle/",
                ids.join(","),
                range
            )
        }
    }
}

impl std::fmt::Display for TleQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.start.format("%Y-%m-%d"))?;
        if self.end > self.start.succ_opt().unwrap_or(self.start) {
            write!(f, "..{}", self.end.format("%Y-%m-%d"))?;
        }
        if !self.norad_ids.is_empty() {
            write!(f, " ({} objects)", self.norad_ids.len())?;
        }
        Ok(())
    }
}

/// Provider of raw TLE text. Implementations block.
pub trait TleSource: Send {
    fn authenticate(&mut self) -> Result<(), SourceError>;

    /// Raw response text; an empty body is [`SourceError::EmptyResult`].
    fn fetch(&mut self, query: &TleQuery) -> Result<String, SourceError>;
}

/// Space-Track `gp_history` over a cookie session.
pub struct SpaceTrackSource {
    client: reqwest::blocking::Client,
    base_url: String,
    identity: String,
    password: String,
}

impl SpaceTrackSource {
    /// Builds a blocking client: call from a blocking thread, not from
    /// inside an async task.
    pub fn new(identity: &str, password: &str) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: SPACE_TRACK_URL.to_string(),
            identity: identity.to_string(),
            password: password.to_string(),
        })
    }

    /// Credentials from `SPACETRACK_IDENTITY` / `SPACETRACK_PASSWORD`.
    pub fn from_env() -> Result<Self, SourceError> {
        let identity = std::env::var(ENV_IDENTITY).unwrap_or_default();
        let password = std::env::var(ENV_PASSWORD).unwrap_or_default();
        if identity.is_empty() || password.is_empty() {
            return Err(SourceError::Authentication(format!(
                "set {} and {}",
                ENV_IDENTITY, ENV_PASSWORD
            )));
        }
        Self::new(&identity, &password)
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

impl TleSource for SpaceTrackSource {
    fn authenticate(&mut self) -> Result<(), SourceError> {
        let response = self
            .client
            .post(format!("{}/ajaxauth/login", self.base_url))
            .form(&[
                ("identity", self.identity.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        // Bad credentials still answer 200, with a "Login Failed" body.
        if !status.is_success() || body.contains("Failed") {
            return Err(SourceError::Authentication(format!("status {}", status)));
        }
        info!("Authenticated with Space-Track");
        Ok(())
    }

    fn fetch(&mut self, query: &TleQuery) -> Result<String, SourceError> {
        let url = format!("{}{}", self.base_url, query.path());
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(SourceError::Authentication(format!("status {}", status)));
        }
        if !status.is_success() {
            return Err(SourceError::Transport(format!("status {} for {}", status, query)));
        }

        let body = response
            .text()
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        if body.trim().is_empty() {
            return Err(SourceError::EmptyResult(query.to_string()));
        }
        Ok(body)
    }
}
