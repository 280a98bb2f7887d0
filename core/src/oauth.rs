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
use crate::models::{TokenErrorResponse, TokenResponse};
use crate::token::Token;
use log::{debug, info, warn};
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const INVALID_CLIENT: &str = "invalid_client";

/// Grant presented to the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    /// App-level credentials only, no user involved.
    ClientCredentials,
    /// Code returned by the consent step plus the PKCE verifier that started it.
    AuthorizationCode { code: String, verifier: String },
}

impl Grant {
    pub fn grant_type(&self) -> &'static str {
        match self {
            Grant::ClientCredentials => "client_credentials",
            Grant::AuthorizationCode { .. } => "authorization_code",
        }
    }

    fn form(&self, config: &CatalogConfig) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("grant_type", self.grant_type().to_string()),
            ("client_id", config.client_id.clone()),
            ("client_secret", config.client_secret.clone()),
        ];

        if let Grant::AuthorizationCode { code, verifier } = self {
            form.push(("redirect_uri", config.redirect_uri.clone()));
            form.push(("code", code.clone()));
            form.push(("code_verifier", verifier.clone()));
        }

        form
    }
}

/// Client for `POST {api_base}/oauth2/token`.
#[derive(Clone)]
pub struct TokenEndpoint {
    http: Client,
    config: Arc<CatalogConfig>,
    url: Url,
}

impl TokenEndpoint {
    pub fn new(http: Client, config: Arc<CatalogConfig>) -> Result<Self> {
        let url = config.token_url()?;
        Ok(Self { http, config, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Runs the client-credentials grant.
    pub async fn client_credentials(&self) -> Result<Token> {
        self.exchange(Grant::ClientCredentials).await
    }

    /// Sends a form-encoded token request and turns the response into a [`Token`].
    pub async fn exchange(&self, grant: Grant) -> Result<Token> {
        debug!("Requesting {} token from {}", grant.grant_type(), self.url);

        let response = self
            .http
            .post(self.url.clone())
            .header(ACCEPT, "application/json")
            .form(&grant.form(&self.config))
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        info!("Token response status: {}", status);

        token_from_response(&grant, status, &body)
    }
}

impl fmt::Debug for TokenEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenEndpoint")
            .field("url", &self.url.as_str())
            .finish()
    }
}

/// Whether `status` carries a token payload for `grant`.
///
/// The client-credentials grant only succeeds with `200`; the code exchange takes any 2xx.
fn is_token_status(grant: &Grant, status: StatusCode) -> bool {
    match grant {
        Grant::ClientCredentials => status == StatusCode::OK,
        Grant::AuthorizationCode { .. } => status.is_success(),
    }
}

fn token_from_response(grant: &Grant, status: StatusCode, body: &[u8]) -> Result<Token> {
    if is_token_status(grant, status) {
        let payload: TokenResponse = serde_json::from_slice(body)?;
        return Ok(Token::new(
            payload.access_token,
            Duration::from_secs(payload.expires_in),
        ));
    }

    if status == StatusCode::UNAUTHORIZED {
        if let Ok(error) = serde_json::from_slice::<TokenErrorResponse>(body) {
            if error.error_code.as_deref() == Some(INVALID_CLIENT) {
                warn!("Token endpoint rejected the client credentials");
                return Err(CatalogError::InvalidClient(invalid_client_message(
                    &error.message,
                )));
            }
        }
    }

    Err(CatalogError::TokenRequest {
        status: status.as_u16(),
        body: String::from_utf8_lossy(body).into_owned(),
    })
}

fn invalid_client_message(server_message: &str) -> String {
    let message = server_message.trim().trim_end_matches('.');
    let message = if message.is_empty() {
        "Invalid client credentials"
    } else {
        message
    };
    format!("{}. Please check your client ID and secret.", message)
}

/// HTTP client shared by the token endpoint and the catalog search.
pub fn http_client(config: &CatalogConfig) -> Result<Client> {
    Client::builder()
        .timeout(config.request_timeout)
        .connect_timeout(Duration::from_secs(10))
        .user_agent(format!("setlist-catalog/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| CatalogError::InvalidRequest(format!("Failed to build HTTP client: {}", e)))
}
