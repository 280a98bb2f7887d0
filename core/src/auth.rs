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
use crate::oauth::{Grant, TokenEndpoint};
use crate::pkce::{self, PkcePair, CHALLENGE_METHOD};
use crate::token::Token;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use url::Url;

pub type ConsentError = Box<dyn std::error::Error + Send + Sync>;

/// What the user did on the consent page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentOutcome {
    /// The browser was redirected to the callback URL.
    Callback(Url),
    /// The user closed or declined the consent page.
    Cancelled,
}

/// Shows the authorization page to the user and waits for the redirect.
///
/// Implementations own the browser or webview; the flow only builds the URL and
/// reads the callback.
#[async_trait]
pub trait ConsentPrompt: Send + Sync {
    async fn request_consent(
        &self,
        authorize_url: &Url,
        callback_scheme: &str,
    ) -> std::result::Result<ConsentOutcome, ConsentError>;
}

#[derive(Debug, Clone)]
pub enum FlowState {
    Idle,
    AwaitingUserConsent,
    ExchangingCode,
    Authenticated(Token),
    Failed(CatalogError),
}

/// Authorization URL plus the secrets needed to finish that attempt.
#[derive(Debug)]
pub struct AuthorizationRequest {
    pub url: Url,
    pub state: String,
    pkce: PkcePair,
}

impl AuthorizationRequest {
    pub fn pkce(&self) -> &PkcePair {
        &self.pkce
    }
}

/// Interactive Authorization Code Flow with PKCE.
///
/// Every call to [`AuthorizationCodeFlow::authenticate`] is one attempt:
/// 1. A fresh PKCE pair and `state` value are generated.
/// 2. The authorization URL is handed to the [`ConsentPrompt`].
/// 3. The `code` from the callback is exchanged for a token.
///
/// Nothing is retried. The outcome stays readable through [`AuthorizationCodeFlow::state`].
pub struct AuthorizationCodeFlow {
    config: Arc<CatalogConfig>,
    endpoint: TokenEndpoint,
    state: FlowState,
}

impl AuthorizationCodeFlow {
    pub fn new(config: Arc<CatalogConfig>, endpoint: TokenEndpoint) -> Self {
        Self {
            config,
            endpoint,
            state: FlowState::Idle,
        }
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// Token obtained by the last successful attempt.
    pub fn token(&self) -> Option<&Token> {
        match &self.state {
            FlowState::Authenticated(token) => Some(token),
            _ => None,
        }
    }

    pub fn authorization_request(&self) -> AuthorizationRequest {
        let pkce = PkcePair::generate();
        let state = pkce::generate_state();

        let mut url = self.config.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("code_challenge", pkce.challenge())
            .append_pair("code_challenge_method", CHALLENGE_METHOD)
            .append_pair("state", &state)
            .append_pair("scope", &self.config.scope_param());

        AuthorizationRequest { url, state, pkce }
    }

    pub async fn authenticate(&mut self, consent: &dyn ConsentPrompt) -> Result<Token> {
        let result = self.attempt(consent).await;

        self.state = match &result {
            Ok(token) => {
                info!("Authorization code flow completed");
                FlowState::Authenticated(token.clone())
            }
            Err(CatalogError::AuthorizationCancelled) => {
                info!("Authorization cancelled by the user");
                FlowState::Failed(CatalogError::AuthorizationCancelled)
            }
            Err(err) => {
                warn!("Authorization code flow failed: {}", err);
                FlowState::Failed(err.clone())
            }
        };

        result
    }

    async fn attempt(&mut self, consent: &dyn ConsentPrompt) -> Result<Token> {
        let request = self.authorization_request();
        let callback_scheme = self.config.callback_scheme();

        self.state = FlowState::AwaitingUserConsent;
        debug!("Waiting for consent callback on scheme '{}'", callback_scheme);

        let outcome = consent
            .request_consent(&request.url, &callback_scheme)
            .await
            .map_err(|e| CatalogError::Authorization(e.to_string()))?;

        let callback = match outcome {
            ConsentOutcome::Callback(url) => url,
            ConsentOutcome::Cancelled => return Err(CatalogError::AuthorizationCancelled),
        };

        let code = code_from_callback(&callback, &request.state)?;

        self.state = FlowState::ExchangingCode;
        self.endpoint
            .exchange(Grant::AuthorizationCode {
                code,
                verifier: request.pkce.into_verifier(),
            })
            .await
    }
}

/// Pulls the authorization code out of the redirect URL.
pub fn code_from_callback(callback: &Url, expected_state: &str) -> Result<String> {
    let mut code = None;
    let mut state = None;
    let mut error = None;

    for (key, value) in callback.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        if error == "access_denied" {
            return Err(CatalogError::AuthorizationCancelled);
        }
        return Err(CatalogError::Authorization(format!(
            "Authorization server returned '{}'",
            error
        )));
    }

    if let Some(state) = state {
        if state != expected_state {
            return Err(CatalogError::Authorization(
                "Callback state does not match the authorization request".to_string(),
            ));
        }
    }

    code.filter(|c| !c.is_empty()).ok_or_else(|| {
        CatalogError::Authorization("Invalid callback URL: no authorization code".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::http_client;
    use std::collections::HashMap;

    struct FixedConsent(std::result::Result<ConsentOutcome, String>);

    #[async_trait]
    impl ConsentPrompt for FixedConsent {
        async fn request_consent(
            &self,
            _authorize_url: &Url,
            callback_scheme: &str,
        ) -> std::result::Result<ConsentOutcome, ConsentError> {
            assert_eq!(callback_scheme, "setbuilder");
            self.0.clone().map_err(Into::into)
        }
    }

    fn flow() -> AuthorizationCodeFlow {
        // Port 9 (discard) is never reached by these tests.
        let config = Arc::new(
            CatalogConfig::new("client-abc", "secret-xyz")
                .unwrap()
                .with_api_base("http://127.0.0.1:9")
                .unwrap(),
        );
        let endpoint = TokenEndpoint::new(http_client(&config).unwrap(), config.clone()).unwrap();
        AuthorizationCodeFlow::new(config, endpoint)
    }

    #[test]
    fn test_authorization_url_parameters() {
        let request = flow().authorization_request();
        let params: HashMap<String, String> = request.url.query_pairs().into_owned().collect();

        assert!(request
            .url
            .as_str()
            .starts_with("https://secure.soundcloud.com/connect?"));
        assert_eq!(params["client_id"], "client-abc");
        assert_eq!(params["redirect_uri"], "setbuilder://callback");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["code_challenge"], request.pkce().challenge());
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["state"], request.state);
        assert_eq!(params["scope"], "non-expiring");
        assert_eq!(
            pkce::derive_challenge(request.pkce().verifier()),
            params["code_challenge"]
        );
    }

    #[test]
    fn test_each_request_uses_fresh_secrets() {
        let flow = flow();
        let a = flow.authorization_request();
        let b = flow.authorization_request();
        assert_ne!(a.state, b.state);
        assert_ne!(a.pkce().verifier(), b.pkce().verifier());
    }

    #[test]
    fn test_code_from_callback() {
        let url = Url::parse("setbuilder://callback?code=abc123&state=s1").unwrap();
        assert_eq!(code_from_callback(&url, "s1").unwrap(), "abc123");

        // Some providers omit state on the redirect.
        let url = Url::parse("setbuilder://callback?code=abc123").unwrap();
        assert_eq!(code_from_callback(&url, "s1").unwrap(), "abc123");
    }

    #[test]
    fn test_callback_without_code_fails() {
        let url = Url::parse("setbuilder://callback?state=s1").unwrap();
        let err = code_from_callback(&url, "s1").unwrap_err();
        assert!(matches!(err, CatalogError::Authorization(_)));
    }

    #[test]
    fn test_callback_state_mismatch_fails() {
        let url = Url::parse("setbuilder://callback?code=abc&state=other").unwrap();
        let err = code_from_callback(&url, "s1").unwrap_err();
        match err {
            CatalogError::Authorization(msg) => assert!(msg.contains("state")),
            other => panic!("Expected Authorization error, got {:?}", other),
        }
    }

    #[test]
    fn test_access_denied_is_cancellation() {
        let url = Url::parse("setbuilder://callback?error=access_denied&state=s1").unwrap();
        let err = code_from_callback(&url, "s1").unwrap_err();
        assert!(matches!(err, CatalogError::AuthorizationCancelled));
    }

    #[tokio::test]
    async fn test_cancelled_consent_fails_flow() {
        let mut flow = flow();
        assert!(matches!(flow.state(), FlowState::Idle));

        let err = flow
            .authenticate(&FixedConsent(Ok(ConsentOutcome::Cancelled)))
            .await
            .unwrap_err();

        assert!(matches!(err, CatalogError::AuthorizationCancelled));
        assert!(matches!(
            flow.state(),
            FlowState::Failed(CatalogError::AuthorizationCancelled)
        ));
        assert!(flow.token().is_none());
    }

    #[tokio::test]
    async fn test_consent_transport_error_fails_flow() {
        let mut flow = flow();
        let err = flow
            .authenticate(&FixedConsent(Err("webview crashed".to_string())))
            .await
            .unwrap_err();

        match err {
            CatalogError::Authorization(msg) => assert!(msg.contains("webview crashed")),
            other => panic!("Expected Authorization error, got {:?}", other),
        }
        assert!(matches!(flow.state(), FlowState::Failed(_)));
    }

    #[tokio::test]
    async fn test_callback_without_code_never_reaches_exchange() {
        let mut flow = flow();
        let callback = Url::parse("setbuilder://callback").unwrap();
        let err = flow
            .authenticate(&FixedConsent(Ok(ConsentOutcome::Callback(callback))))
            .await
            .unwrap_err();

        assert!(matches!(err, CatalogError::Authorization(_)));
        assert!(matches!(
            flow.state(),
            FlowState::Failed(CatalogError::Authorization(_))
        ));
    }
}
