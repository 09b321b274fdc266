//! Identity federation: verification of Google-issued ID tokens
//!
//! The front-end obtains an ID token from Google Identity Services and posts
//! it as an opaque credential. Verification checks the RS256 signature
//! against Google's published key set, the audience (our client id), the
//! issuer and the expiry, then extracts the claims we provision accounts from.

use anyhow::Result;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header, jwk::JwkSet};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const DEFAULT_CERTS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Claims extracted from a verified identity assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedIdentity {
    /// Provider subject identifier, stable per account
    pub subject: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// Reasons an identity assertion is rejected
#[derive(Error, Debug)]
pub enum FederationError {
    #[error("Invalid identity token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Unsupported signing algorithm: {0:?}")]
    UnsupportedAlgorithm(Algorithm),

    #[error("Identity token header has no key id")]
    MissingKeyId,

    #[error("No provider key matches key id {0}")]
    UnknownSigningKey(String),

    #[error("Failed to fetch provider keys: {0}")]
    KeyFetch(#[from] reqwest::Error),

    #[error("Identity token carries no email")]
    MissingEmail,

    #[error("Identity token email is not verified")]
    UnverifiedEmail,
}

/// Verifies third-party identity assertions
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, assertion: &str) -> Result<FederatedIdentity, FederationError>;
}

/// Federation configuration
#[derive(Debug, Clone)]
pub struct FederationConfig {
    /// OAuth client id the ID token must be issued for
    pub client_id: String,
    /// JWKS endpoint publishing the provider's signing keys
    pub certs_url: String,
}

impl FederationConfig {
    /// Create a new FederationConfig from environment variables
    ///
    /// # Environment Variables
    /// - `GOOGLE_CLIENT_ID`: Expected audience (required)
    /// - `GOOGLE_CERTS_URL`: JWKS endpoint (default: Google's v3 certs)
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("GOOGLE_CLIENT_ID")
            .ok()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("GOOGLE_CLIENT_ID environment variable not set"))?;

        let certs_url =
            std::env::var("GOOGLE_CERTS_URL").unwrap_or_else(|_| DEFAULT_CERTS_URL.to_string());

        Ok(FederationConfig {
            client_id,
            certs_url,
        })
    }
}

/// Claims of a Google ID token we care about; `aud`, `iss` and `exp` are
/// checked by the validation itself.
#[derive(Debug, Deserialize)]
struct GoogleClaims {
    sub: String,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
}

/// Google ID token verifier
#[derive(Clone)]
pub struct GoogleIdentityVerifier {
    client: reqwest::Client,
    certs_url: String,
    validation: Validation,
}

impl GoogleIdentityVerifier {
    pub fn new(config: &FederationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[config.client_id.as_str()]);
        validation.set_issuer(&GOOGLE_ISSUERS);

        Ok(Self {
            client,
            certs_url: config.certs_url.clone(),
            validation,
        })
    }

    async fn fetch_keys(&self) -> Result<JwkSet, FederationError> {
        info!("Fetching identity provider keys from {}", self.certs_url);

        let keys = self
            .client
            .get(&self.certs_url)
            .send()
            .await?
            .error_for_status()?
            .json::<JwkSet>()
            .await?;

        Ok(keys)
    }
}

#[async_trait]
impl IdentityVerifier for GoogleIdentityVerifier {
    async fn verify(&self, assertion: &str) -> Result<FederatedIdentity, FederationError> {
        // Reject obviously bad tokens before going to the network
        let header = decode_header(assertion)?;
        if header.alg != Algorithm::RS256 {
            return Err(FederationError::UnsupportedAlgorithm(header.alg));
        }
        let kid = header.kid.ok_or(FederationError::MissingKeyId)?;

        let keys = self.fetch_keys().await?;
        let jwk = keys
            .find(&kid)
            .ok_or_else(|| FederationError::UnknownSigningKey(kid.clone()))?;
        let key = DecodingKey::from_jwk(jwk)?;

        let token_data = decode::<GoogleClaims>(assertion, &key, &self.validation)?;
        identity_from_claims(token_data.claims)
    }
}

fn identity_from_claims(claims: GoogleClaims) -> Result<FederatedIdentity, FederationError> {
    let email = claims
        .email
        .filter(|email| !email.trim().is_empty())
        .ok_or(FederationError::MissingEmail)?;

    if claims.email_verified == Some(false) {
        return Err(FederationError::UnverifiedEmail);
    }

    Ok(FederatedIdentity {
        subject: claims.sub,
        email,
        display_name: claims
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::get};
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;
    use serial_test::serial;
    use std::time::{SystemTime, UNIX_EPOCH};

    const TEST_KEY_PEM: &str = include_str!("../testdata/federation_test_key.pem");
    const TEST_JWKS: &str = include_str!("../testdata/federation_test_jwks.json");
    const CLIENT_ID: &str = "ticketing-web.apps.googleusercontent.com";

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn sign(claims: serde_json::Value, kid: &str) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        let key = EncodingKey::from_rsa_pem(TEST_KEY_PEM.as_bytes()).unwrap();
        encode(&header, &claims, &key).unwrap()
    }

    fn google_claims(aud: &str, exp: u64) -> serde_json::Value {
        json!({
            "iss": "https://accounts.google.com",
            "aud": aud,
            "sub": "110248495921238986420",
            "email": "carol@example.com",
            "email_verified": true,
            "name": "Carol Danvers",
            "iat": exp.saturating_sub(3600),
            "exp": exp,
        })
    }

    /// Serve the test key set on an ephemeral local port
    async fn serve_jwks() -> String {
        let jwks: serde_json::Value = serde_json::from_str(TEST_JWKS).unwrap();
        let app = Router::new().route(
            "/certs",
            get(move || {
                let jwks = jwks.clone();
                async move { Json(jwks) }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{}/certs", addr)
    }

    async fn verifier() -> GoogleIdentityVerifier {
        GoogleIdentityVerifier::new(&FederationConfig {
            client_id: CLIENT_ID.to_string(),
            certs_url: serve_jwks().await,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_valid_token_yields_identity() {
        let verifier = verifier().await;
        let token = sign(google_claims(CLIENT_ID, now() + 600), "test-key");

        let identity = verifier.verify(&token).await.unwrap();
        assert_eq!(identity.subject, "110248495921238986420");
        assert_eq!(identity.email, "carol@example.com");
        assert_eq!(identity.display_name.as_deref(), Some("Carol Danvers"));
    }

    #[tokio::test]
    async fn test_wrong_audience_is_rejected() {
        let verifier = verifier().await;
        let token = sign(google_claims("someone-else", now() + 600), "test-key");

        let err = verifier.verify(&token).await.unwrap_err();
        assert!(matches!(err, FederationError::Token(_)));
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let verifier = verifier().await;
        let token = sign(google_claims(CLIENT_ID, now() - 600), "test-key");

        let err = verifier.verify(&token).await.unwrap_err();
        assert!(matches!(err, FederationError::Token(_)));
    }

    #[tokio::test]
    async fn test_wrong_issuer_is_rejected() {
        let verifier = verifier().await;
        let mut claims = google_claims(CLIENT_ID, now() + 600);
        claims["iss"] = json!("https://evil.example.com");
        let token = sign(claims, "test-key");

        assert!(verifier.verify(&token).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_key_id_is_rejected() {
        let verifier = verifier().await;
        let token = sign(google_claims(CLIENT_ID, now() + 600), "rotated-away");

        let err = verifier.verify(&token).await.unwrap_err();
        assert!(matches!(err, FederationError::UnknownSigningKey(kid) if kid == "rotated-away"));
    }

    #[tokio::test]
    async fn test_malformed_tokens_fail_before_fetching_keys() {
        let verifier = GoogleIdentityVerifier::new(&FederationConfig {
            client_id: CLIENT_ID.to_string(),
            certs_url: "http://127.0.0.1:9/unreachable".to_string(),
        })
        .unwrap();

        let err = verifier.verify("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, FederationError::Token(_)));

        // {"alg":"RS256","typ":"JWT"} with no kid
        let no_kid = "eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9.e30.c2ln";
        let err = verifier.verify(no_kid).await.unwrap_err();
        assert!(matches!(err, FederationError::MissingKeyId));

        let hs256 = encode(
            &Header::new(Algorithm::HS256),
            &google_claims(CLIENT_ID, now() + 600),
            &EncodingKey::from_secret(b"shared"),
        )
        .unwrap();
        let err = verifier.verify(&hs256).await.unwrap_err();
        assert!(matches!(
            err,
            FederationError::UnsupportedAlgorithm(Algorithm::HS256)
        ));
    }

    #[test]
    fn test_identity_from_claims_requires_verified_email() {
        let missing = GoogleClaims {
            sub: "1".to_string(),
            email: None,
            email_verified: None,
            name: None,
        };
        assert!(matches!(
            identity_from_claims(missing),
            Err(FederationError::MissingEmail)
        ));

        let unverified = GoogleClaims {
            sub: "1".to_string(),
            email: Some("dave@example.com".to_string()),
            email_verified: Some(false),
            name: None,
        };
        assert!(matches!(
            identity_from_claims(unverified),
            Err(FederationError::UnverifiedEmail)
        ));
    }

    #[test]
    fn test_identity_from_claims_drops_blank_name() {
        let claims = GoogleClaims {
            sub: "1".to_string(),
            email: Some("erin@example.com".to_string()),
            email_verified: Some(true),
            name: Some("   ".to_string()),
        };

        let identity = identity_from_claims(claims).unwrap();
        assert_eq!(identity.display_name, None);
    }

    #[test]
    #[serial]
    fn test_federation_config_from_env() {
        unsafe {
            std::env::set_var("GOOGLE_CLIENT_ID", CLIENT_ID);
            std::env::remove_var("GOOGLE_CERTS_URL");
        }

        let config = FederationConfig::from_env().unwrap();
        assert_eq!(config.client_id, CLIENT_ID);
        assert_eq!(config.certs_url, DEFAULT_CERTS_URL);

        unsafe {
            std::env::remove_var("GOOGLE_CLIENT_ID");
        }
        assert!(FederationConfig::from_env().is_err());
    }
}
