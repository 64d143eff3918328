//! Token authentication against the journal server.

use crate::sync::client::{ApiClient, HttpRequest};
use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Opaque bearer credential returned by the server.
///
/// The core never caches or refreshes it; the caller stores it and drops
/// it on [`Error::Unauthorized`].
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value of the `Authorization` header.
    pub fn header_value(&self) -> String {
        format!("Token {}", self.0)
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken([REDACTED])")
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

/// Exchanges a username and password for an [`AuthToken`].
#[derive(Debug, Clone)]
pub struct JournalAuthenticator {
    client: ApiClient,
}

impl JournalAuthenticator {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// One request, one token. A 400 from the token endpoint means the
    /// credentials were wrong and is reported as [`Error::Unauthorized`].
    pub fn get_auth_token(&self, username: &str, password: &str) -> Result<AuthToken> {
        let request = HttpRequest::post("api-token-auth/").form(vec![
            ("username".to_string(), username.to_string()),
            ("password".to_string(), password.to_string()),
        ]);

        let response = match self.client.execute(request) {
            Ok(response) => response,
            Err(Error::Http {
                status: 400,
                message,
            }) => {
                tracing::warn!(username, "login rejected");
                return Err(Error::Unauthorized {
                    status: 400,
                    message,
                });
            }
            Err(e) => return Err(e),
        };

        let body: TokenResponse = response.json()?;
        if body.token.is_empty() {
            return Err(Error::InvalidResponse("Empty auth token".to_string()));
        }

        tracing::debug!(username, "obtained auth token");
        Ok(AuthToken::new(body.token))
    }

    /// Invalidate `token` on the server.
    pub fn invalidate_token(&self, token: &AuthToken) -> Result<()> {
        self.client
            .execute(HttpRequest::post("api/logout/").auth(token))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::client::{Body, HttpResponse, Transport, TransportError};
    use std::sync::{Arc, Mutex};

    struct TokenServer {
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl Transport for TokenServer {
        fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
            self.requests.lock().unwrap().push(request.clone());
            match (&request.path[..], &request.body) {
                ("api-token-auth/", Some(Body::Form(fields))) => {
                    let password = fields.iter().find(|(k, _)| k == "password");
                    if password.map(|(_, v)| v.as_str()) == Some("correct horse") {
                        Ok(HttpResponse::new(200, br#"{"token": "abc123"}"#.to_vec()))
                    } else {
                        Ok(HttpResponse::new(
                            400,
                            br#"{"non_field_errors": ["Unable to log in"]}"#.to_vec(),
                        ))
                    }
                }
                ("api/logout/", _) if request.authorization.is_some() => {
                    Ok(HttpResponse::new(204, Vec::new()))
                }
                _ => Ok(HttpResponse::new(500, Vec::new())),
            }
        }
    }

    fn authenticator() -> (Arc<TokenServer>, JournalAuthenticator) {
        let server = Arc::new(TokenServer {
            requests: Mutex::new(Vec::new()),
        });
        let auth = JournalAuthenticator::new(ApiClient::new(server.clone()));
        (server, auth)
    }

    #[test]
    fn token_exchange() {
        let (server, auth) = authenticator();
        let token = auth.get_auth_token("alice", "correct horse").unwrap();
        assert_eq!(token.as_str(), "abc123");
        assert_eq!(token.header_value(), "Token abc123");

        let requests = server.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].authorization.is_none());
    }

    #[test]
    fn bad_credentials_are_unauthorized() {
        let (_, auth) = authenticator();
        let err = auth.get_auth_token("alice", "wrong").unwrap_err();
        assert!(matches!(err, Error::Unauthorized { .. }));
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn logout_sends_token() {
        let (server, auth) = authenticator();
        auth.invalidate_token(&AuthToken::new("abc123")).unwrap();

        let requests = server.requests.lock().unwrap();
        assert_eq!(requests[0].authorization.as_deref(), Some("Token abc123"));
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = AuthToken::new("abc123");
        assert!(!format!("{:?}", token).contains("abc123"));
    }
}
