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

use crate::auth::{AuthorizationCodeFlow, ConsentPrompt};
use crate::config::CatalogConfig;
use crate::error::Result;
use crate::oauth::TokenEndpoint;
use crate::token::{Token, TokenCache};
use log::debug;
use reqwest::Client;
use std::fmt;
use std::sync::Arc;

/// How a missing token gets minted.
#[derive(Clone)]
pub enum GrantStrategy {
    /// Non-interactive app token. Used by catalog search.
    ClientCredentials,
    /// Interactive user token obtained through the given consent prompt.
    AuthorizationCode(Arc<dyn ConsentPrompt>),
}

impl fmt::Debug for GrantStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrantStrategy::ClientCredentials => f.write_str("ClientCredentials"),
            GrantStrategy::AuthorizationCode(_) => f.write_str("AuthorizationCode"),
        }
    }
}

/// Hands out access tokens, minting them with one [`GrantStrategy`] and keeping
/// them in one [`TokenCache`]. Clones share the cache.
#[derive(Clone, Debug)]
pub struct CredentialProvider {
    config: Arc<CatalogConfig>,
    endpoint: TokenEndpoint,
    cache: TokenCache,
    strategy: GrantStrategy,
}

impl CredentialProvider {
    pub fn new(config: Arc<CatalogConfig>, http: Client, strategy: GrantStrategy) -> Result<Self> {
        let endpoint = TokenEndpoint::new(http, config.clone())?;
        let cache = TokenCache::new(config.expiry_margin);

        Ok(Self {
            config,
            endpoint,
            cache,
            strategy,
        })
    }

    pub fn client_credentials(config: Arc<CatalogConfig>, http: Client) -> Result<Self> {
        Self::new(config, http, GrantStrategy::ClientCredentials)
    }

    pub fn authorization_code(
        config: Arc<CatalogConfig>,
        http: Client,
        consent: Arc<dyn ConsentPrompt>,
    ) -> Result<Self> {
        Self::new(config, http, GrantStrategy::AuthorizationCode(consent))
    }

    pub fn strategy(&self) -> &GrantStrategy {
        &self.strategy
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    pub fn endpoint(&self) -> &TokenEndpoint {
        &self.endpoint
    }

    /// A usable token, from the cache or from a single shared grant exchange.
    pub async fn token(&self) -> Result<Token> {
        let config = self.config.clone();
        let endpoint = self.endpoint.clone();
        let strategy = self.strategy.clone();

        self.cache
            .get_or_fetch(move || async move {
                match strategy {
                    GrantStrategy::ClientCredentials => endpoint.client_credentials().await,
                    GrantStrategy::AuthorizationCode(consent) => {
                        let mut flow = AuthorizationCodeFlow::new(config, endpoint);
                        flow.authenticate(consent.as_ref()).await
                    }
                }
            })
            .await
    }

    /// Forgets the cached token.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    /// Forgets `token` after the API answered `401` to it, unless a newer token
    /// has already replaced it.
    pub fn reject(&self, token: &Token) {
        if !self.cache.invalidate_if_current(token) {
            debug!("Rejected token was already replaced");
        }
    }
}
