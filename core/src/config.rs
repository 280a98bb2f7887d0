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

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://api.soundcloud.com";
pub const DEFAULT_AUTHORIZE_URL: &str = "https://secure.soundcloud.com/connect";
pub const DEFAULT_REDIRECT_URI: &str = "setbuilder://callback";
pub const DEFAULT_SCOPE: &str = "non-expiring";
pub const DEFAULT_SEARCH_LIMIT: u32 = 50;
/// Tokens are dropped this long before the server-side expiry.
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(300);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const ENV_CLIENT_ID: &str = "SETLIST_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "SETLIST_CLIENT_SECRET";
pub const ENV_REDIRECT_URI: &str = "SETLIST_REDIRECT_URI";
pub const ENV_SCOPES: &str = "SETLIST_SCOPES";
pub const ENV_API_BASE: &str = "SETLIST_API_BASE";
pub const ENV_AUTHORIZE_URL: &str = "SETLIST_AUTHORIZE_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing {0}")]
    Missing(&'static str),
    #[error("Invalid URL for {field}: {source}")]
    InvalidUrl {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Application credentials and endpoints for the remote catalog.
///
/// Nothing here is compiled in: the client identifier and secret must be supplied
/// by the caller, either directly or through [`CatalogConfig::from_env`].
#[derive(Clone)]
pub struct CatalogConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Kept verbatim; the token endpoint compares it byte for byte with the one
    /// used to start the authorization.
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub api_base: Url,
    pub authorize_url: Url,
    pub search_limit: u32,
    pub expiry_margin: Duration,
    pub request_timeout: Duration,
}

impl CatalogConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let client_id = client_id.into().trim().to_string();
        let client_secret = client_secret.into().trim().to_string();

        if client_id.is_empty() {
            return Err(ConfigError::Missing("client id"));
        }
        if client_secret.is_empty() {
            return Err(ConfigError::Missing("client secret"));
        }

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scopes: vec![DEFAULT_SCOPE.to_string()],
            api_base: parse_base(DEFAULT_API_BASE, "api base")?,
            authorize_url: parse_url(DEFAULT_AUTHORIZE_URL, "authorize url")?,
            search_limit: DEFAULT_SEARCH_LIMIT,
            expiry_margin: DEFAULT_EXPIRY_MARGIN,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Reads the configuration from `SETLIST_*` environment variables.
    ///
    /// `SETLIST_CLIENT_ID` and `SETLIST_CLIENT_SECRET` are required; the rest fall
    /// back to the public catalog defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`CatalogConfig::from_env`] but with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let client_id = lookup(ENV_CLIENT_ID).ok_or(ConfigError::Missing(ENV_CLIENT_ID))?;
        let client_secret =
            lookup(ENV_CLIENT_SECRET).ok_or(ConfigError::Missing(ENV_CLIENT_SECRET))?;

        let mut config = Self::new(client_id, client_secret)?;

        if let Some(redirect) = lookup(ENV_REDIRECT_URI) {
            config = config.with_redirect_uri(redirect)?;
        }
        if let Some(scopes) = lookup(ENV_SCOPES) {
            config = config.with_scopes(
                scopes
                    .split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|s| !s.is_empty()),
            );
        }
        if let Some(base) = lookup(ENV_API_BASE) {
            config = config.with_api_base(&base)?;
        }
        if let Some(authorize) = lookup(ENV_AUTHORIZE_URL) {
            config = config.with_authorize_url(&authorize)?;
        }

        Ok(config)
    }

    pub fn with_api_base(mut self, base: &str) -> Result<Self, ConfigError> {
        self.api_base = parse_base(base, "api base")?;
        Ok(self)
    }

    pub fn with_authorize_url(mut self, url: &str) -> Result<Self, ConfigError> {
        self.authorize_url = parse_url(url, "authorize url")?;
        Ok(self)
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Result<Self, ConfigError> {
        let redirect_uri = redirect_uri.into().trim().to_string();
        parse_url(&redirect_uri, "redirect uri")?;
        self.redirect_uri = redirect_uri;
        Ok(self)
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_search_limit(mut self, limit: u32) -> Result<Self, ConfigError> {
        if limit == 0 {
            return Err(ConfigError::Invalid {
                field: "search limit",
                reason: "must be at least 1".to_string(),
            });
        }
        self.search_limit = limit;
        Ok(self)
    }

    pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
        self.expiry_margin = margin;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn token_url(&self) -> Result<Url, url::ParseError> {
        self.api_base.join("oauth2/token")
    }

    pub fn tracks_url(&self) -> Result<Url, url::ParseError> {
        self.api_base.join("tracks")
    }

    /// Scheme the consent collaborator should watch for, e.g. `setbuilder`.
    pub fn callback_scheme(&self) -> String {
        Url::parse(&self.redirect_uri)
            .map(|url| url.scheme().to_string())
            .unwrap_or_default()
    }

    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }
}

impl fmt::Debug for CatalogConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("api_base", &self.api_base.as_str())
            .field("authorize_url", &self.authorize_url.as_str())
            .field("search_limit", &self.search_limit)
            .field("expiry_margin", &self.expiry_margin)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn parse_url(raw: &str, field: &'static str) -> Result<Url, ConfigError> {
    Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl { field, source })
}

// A trailing slash keeps `join` from replacing the last path segment.
fn parse_base(raw: &str, field: &'static str) -> Result<Url, ConfigError> {
    let mut url = parse_url(raw, field)?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("{} cannot be used as a base URL", raw),
        });
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
