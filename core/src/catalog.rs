/*
    setlist-catalog | Authenticated catalog search for building DJ setlists.
    Copyright (C) 2025  Israel Alberto Roldan Vega

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};
use crate::models::{RemoteTrack, Track};
use crate::oauth::http_client;
use crate::provider::{CredentialProvider, GrantStrategy};
use log::{debug, info, warn};
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use url::Url;

/// Genre value meaning "do not filter by genre".
pub const ALL_GENRES: &str = "All";

/// Genres offered when creating a setlist. Any other string is accepted too.
pub const PRESET_GENRES: [&str; 6] = ["All", "House", "Hip-Hop", "Drum & Bass", "Techno", "Pop"];

/// Closed BPM interval. A lower bound of zero means "any tempo".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoRange {
    lower: f64,
    upper: f64,
}

impl TempoRange {
    /// Builds a range from two bounds in either order.
    ///
    /// Negative or non-finite values are treated as zero.
    pub fn new(a: f64, b: f64) -> Self {
        let a = sanitize_bpm(a);
        let b = sanitize_bpm(b);
        Self {
            lower: a.min(b),
            upper: a.max(b),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            lower: 0.0,
            upper: 0.0,
        }
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn is_bounded(&self) -> bool {
        self.lower > 0.0
    }
}

impl Default for TempoRange {
    fn default() -> Self {
        Self::unbounded()
    }
}

fn sanitize_bpm(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Filters for a catalog search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    tempo: TempoRange,
    genre: String,
}

impl SearchQuery {
    pub fn new(tempo: TempoRange, genre: impl Into<String>) -> Self {
        Self {
            tempo,
            genre: genre.into().trim().to_string(),
        }
    }

    /// No tempo or genre restriction.
    pub fn any() -> Self {
        Self::new(TempoRange::unbounded(), ALL_GENRES)
    }

    pub fn tempo(&self) -> TempoRange {
        self.tempo
    }

    pub fn genre(&self) -> &str {
        &self.genre
    }

    /// Lower-cased genre to send, or `None` for the "All" sentinel.
    pub fn genre_filter(&self) -> Option<String> {
        if self.genre == ALL_GENRES || self.genre.is_empty() {
            None
        } else {
            Some(self.genre.to_lowercase())
        }
    }

    fn query_pairs(&self, limit: u32) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("limit", limit.to_string())];

        if self.tempo.is_bounded() {
            // The API takes whole BPM values.
            pairs.push(("bpm[from]", (self.tempo.lower as u32).to_string()));
            pairs.push(("bpm[to]", (self.tempo.upper as u32).to_string()));
        }

        if let Some(genre) = self.genre_filter() {
            pairs.push(("genres", genre));
        }

        pairs
    }
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self::any()
    }
}

/// Authenticated client for the catalog search endpoint.
pub struct CatalogClient {
    http: Client,
    config: Arc<CatalogConfig>,
    credentials: CredentialProvider,
    tracks_url: Url,
}

impl CatalogClient {
    /// Client authenticating with the client-credentials grant.
    pub fn new(config: CatalogConfig) -> Result<Self> {
        Self::with_strategy(config, GrantStrategy::ClientCredentials)
    }

    pub fn with_strategy(config: CatalogConfig, strategy: GrantStrategy) -> Result<Self> {
        let config = Arc::new(config);
        let http = http_client(&config)?;
        let credentials = CredentialProvider::new(config.clone(), http.clone(), strategy)?;
        Self::with_provider(config, http, credentials)
    }

    /// Client sharing an existing provider (and its token cache).
    pub fn with_provider(
        config: Arc<CatalogConfig>,
        http: Client,
        credentials: CredentialProvider,
    ) -> Result<Self> {
        let tracks_url = config.tracks_url()?;
        Ok(Self {
            http,
            config,
            credentials,
            tracks_url,
        })
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialProvider {
        &self.credentials
    }

    /// The exact URL `search` would request for this query.
    pub fn search_url(&self, query: &SearchQuery) -> Url {
        let mut url = self.tracks_url.clone();
        url.query_pairs_mut()
            .extend_pairs(query.query_pairs(self.config.search_limit));
        url
    }

    /// Searches the catalog for tracks matching `query`.
    ///
    /// Records without a BPM value are left out of the result. Nothing is retried:
    /// a `401` drops the cached token so the next call fetches a new one, and every
    /// other failure is returned as is.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<Track>> {
        let token = self.credentials.token().await?;
        let url = self.search_url(query);

        let authorization = HeaderValue::from_str(&format!("OAuth {}", token.secret()))
            .map_err(|_| {
                CatalogError::InvalidRequest("Access token is not a valid header value".into())
            })?;

        debug!("Search request: {}", url);

        let response = self
            .http
            .get(url)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, authorization)
            .send()
            .await?;

        let status = response.status();
        info!("Search response status: {}", status);

        match status {
            StatusCode::OK => {
                let body = response.bytes().await?;
                decode_tracks(&body)
            }
            StatusCode::UNAUTHORIZED => {
                warn!("Search was rejected with 401, dropping the cached token");
                self.credentials.reject(&token);
                Err(CatalogError::Unauthorized)
            }
            StatusCode::TOO_MANY_REQUESTS => Err(CatalogError::RateLimited),
            other => Err(CatalogError::Server {
                status: other.as_u16(),
            }),
        }
    }
}

fn decode_tracks(body: &[u8]) -> Result<Vec<Track>> {
    let records: Vec<RemoteTrack> = serde_json::from_slice(body).map_err(|e| {
        warn!("Could not decode search response: {}", e);
        CatalogError::from(e)
    })?;

    let total = records.len();
    let tracks: Vec<Track> = records
        .into_iter()
        .filter_map(RemoteTrack::into_track)
        .collect();

    if tracks.len() < total {
        debug!(
            "Dropped {} of {} tracks without BPM",
            total - tracks.len(),
            total
        );
    }

    Ok(tracks)
}
