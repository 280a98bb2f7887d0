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

pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod models;
pub mod oauth;
pub mod pkce;
pub mod provider;
pub mod token;

// Re-export key items for convenience
pub use auth::{
    code_from_callback, AuthorizationCodeFlow, AuthorizationRequest, ConsentError,
    ConsentOutcome, ConsentPrompt, FlowState,
};
pub use catalog::{CatalogClient, SearchQuery, TempoRange, ALL_GENRES, PRESET_GENRES};
pub use config::{CatalogConfig, ConfigError};
pub use error::{CatalogError, Result};
pub use models::{SearchReport, Track};
pub use oauth::{http_client, Grant, TokenEndpoint};
pub use pkce::PkcePair;
pub use provider::{CredentialProvider, GrantStrategy};
pub use token::{Token, TokenCache};
