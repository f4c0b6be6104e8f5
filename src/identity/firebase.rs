//! Firebase Auth gateway.
//!
//! Talks to the Identity Toolkit REST API via `reqwest`.  Sign-in state
//! lives in this process only: the gateway remembers the last identity
//! it issued, publishes changes on a `watch` channel, and keeps the
//! user's id token in a [`SharedIdToken`] so the Firestore store can
//! authenticate document calls with it.
//!
//! Error contract: any non-2xx response carries
//! `{"error": {"message": "CODE"}}`; the code is mapped to a
//! [`MarketError::Credential`] whose message is surfaced to the user
//! verbatim (with a readable fallback for unknown codes).

use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::gateway::{Identity, IdentityGateway, SharedIdToken};
use crate::config::FirebaseConfig;
use crate::errors::MarketError;

/// Identity Toolkit REST base URL.
const IDENTITY_TOOLKIT_BASE: &str = "https://identitytoolkit.googleapis.com/v1";

// -- Identity Toolkit request/response types ----------------------------------

#[derive(Debug, Serialize)]
struct PasswordAuthRequest<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(rename = "returnSecureToken")]
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
struct IdpAuthRequest<'a> {
    #[serde(rename = "postBody")]
    post_body: String,
    #[serde(rename = "requestUri")]
    request_uri: &'a str,
    #[serde(rename = "returnSecureToken")]
    return_secure_token: bool,
    #[serde(rename = "returnIdpCredential")]
    return_idp_credential: bool,
}

#[derive(Debug, Serialize)]
struct UpdateAccountRequest<'a> {
    #[serde(rename = "idToken")]
    id_token: &'a str,
    #[serde(rename = "displayName")]
    display_name: &'a str,
    #[serde(rename = "returnSecureToken")]
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
struct UpdatePasswordRequest<'a> {
    #[serde(rename = "idToken")]
    id_token: &'a str,
    password: &'a str,
    #[serde(rename = "returnSecureToken")]
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(rename = "localId")]
    local_id: String,
    #[serde(rename = "idToken")]
    id_token: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(rename = "displayName", default)]
    display_name: Option<String>,
    #[serde(rename = "photoUrl", default)]
    photo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthErrorDetail {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthErrorResponse {
    error: Option<AuthErrorDetail>,
}

/// Map an Identity Toolkit error code to a credential error.
///
/// Known codes get a readable message; anything else is passed through
/// verbatim so the caller still sees what the provider said.
fn credential_error(code: &str) -> MarketError {
    let message = match code {
        "EMAIL_EXISTS" => "An account with this email already exists",
        "EMAIL_NOT_FOUND" => "No account found for this email",
        "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => "Incorrect email or password",
        "WEAK_PASSWORD" | "WEAK_PASSWORD : Password should be at least 6 characters" => {
            "Password should be at least 6 characters"
        }
        "USER_DISABLED" => "This account has been disabled",
        "TOO_MANY_ATTEMPTS_TRY_LATER" => "Too many attempts, try again later",
        "FEDERATED_USER_ID_ALREADY_LINKED" => "This provider account is already linked",
        other => other,
    };
    MarketError::Credential {
        message: message.to_string(),
    }
}

/// Decode an error response body into a credential error.
fn map_auth_error(context: &str, status: StatusCode, body: &str) -> MarketError {
    if let Ok(parsed) = serde_json::from_str::<AuthErrorResponse>(body) {
        if let Some(detail) = parsed.error {
            let code = detail.message.unwrap_or_default();
            warn!("Identity provider rejected {context}: {code}");
            return credential_error(&code);
        }
    }
    warn!("Identity provider {context} failed: HTTP {status}");
    MarketError::Credential {
        message: format!("Sign-in service error (HTTP {status})"),
    }
}

/// Gateway backed by the Firebase Auth REST API.
pub struct FirebaseAuthGateway {
    client: reqwest::Client,
    api_key: String,
    current: RwLock<Option<Identity>>,
    changes: watch::Sender<Option<Identity>>,
    id_token: SharedIdToken,
}

impl FirebaseAuthGateway {
    /// Create a new gateway for the configured Firebase project.
    pub fn new(config: &FirebaseConfig, id_token: SharedIdToken) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;

        let (changes, _) = watch::channel(None);

        info!("Firebase auth gateway initialized");
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            current: RwLock::new(None),
            changes,
            id_token,
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{IDENTITY_TOOLKIT_BASE}/accounts:{action}?key={}",
            self.api_key
        )
    }

    /// Record a successful authentication and notify subscribers.
    fn adopt(&self, resp: AuthResponse, display_name_override: Option<&str>) -> Identity {
        let identity = Identity {
            id: resp.local_id,
            display_name: display_name_override
                .map(str::to_string)
                .or(resp.display_name),
            email: resp.email,
            avatar_url: resp.photo_url,
        };
        self.id_token.set(resp.id_token);
        *self.current.write().expect("identity lock poisoned") = Some(identity.clone());
        // Subscribers may come and go; a send to zero receivers is fine.
        let _ = self.changes.send(Some(identity.clone()));
        identity
    }

    async fn post_auth(
        &self,
        context: &str,
        action: &str,
        body: &impl Serialize,
    ) -> Result<AuthResponse, MarketError> {
        let resp = self
            .client
            .post(self.endpoint(action))
            .json(body)
            .send()
            .await
            .map_err(|e| MarketError::Credential {
                message: format!("Could not reach the sign-in service: {e}"),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(map_auth_error(context, status, &body));
        }

        resp.json::<AuthResponse>()
            .await
            .map_err(|e| anyhow::anyhow!("Malformed auth response: {e}").into())
    }
}

impl IdentityGateway for FirebaseAuthGateway {
    fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Identity, MarketError>> + Send + '_>> {
        let email = email.to_string();
        let password = password.to_string();
        let display_name = display_name.to_string();
        Box::pin(async move {
            let created = self
                .post_auth(
                    "sign-up",
                    "signUp",
                    &PasswordAuthRequest {
                        email: &email,
                        password: &password,
                        return_secure_token: true,
                    },
                )
                .await?;

            // Attach the display name to the new account.  A failure
            // here leaves a usable account, so it only degrades the
            // denormalized name rather than failing the sign-up.
            let update = UpdateAccountRequest {
                id_token: &created.id_token,
                display_name: &display_name,
                return_secure_token: false,
            };
            if let Err(e) = self.post_auth("profile-update", "update", &update).await {
                warn!("Could not set display name after sign-up: {e}");
            }

            debug!("Account created for {email}");
            Ok(self.adopt(created, Some(&display_name)))
        })
    }

    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Identity, MarketError>> + Send + '_>> {
        let email = email.to_string();
        let password = password.to_string();
        Box::pin(async move {
            let resp = self
                .post_auth(
                    "sign-in",
                    "signInWithPassword",
                    &PasswordAuthRequest {
                        email: &email,
                        password: &password,
                        return_secure_token: true,
                    },
                )
                .await?;
            debug!("Signed in {email}");
            Ok(self.adopt(resp, None))
        })
    }

    fn sign_in_federated(
        &self,
        provider_token: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Identity, MarketError>> + Send + '_>> {
        let provider_token = provider_token.to_string();
        Box::pin(async move {
            let resp = self
                .post_auth(
                    "federated sign-in",
                    "signInWithIdp",
                    &IdpAuthRequest {
                        post_body: format!(
                            "access_token={provider_token}&providerId=google.com"
                        ),
                        request_uri: "http://localhost",
                        return_secure_token: true,
                        return_idp_credential: true,
                    },
                )
                .await?;
            debug!("Federated sign-in complete");
            Ok(self.adopt(resp, None))
        })
    }

    fn update_password(
        &self,
        new_password: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), MarketError>> + Send + '_>> {
        let new_password = new_password.to_string();
        Box::pin(async move {
            let id_token = self.id_token.get().ok_or(MarketError::SessionRequired)?;
            let resp = self
                .post_auth(
                    "password-update",
                    "update",
                    &UpdatePasswordRequest {
                        id_token: &id_token,
                        password: &new_password,
                        return_secure_token: true,
                    },
                )
                .await?;
            // A password change rotates the id token; adopt the fresh
            // one so document calls keep authenticating.
            self.id_token.set(resp.id_token);
            info!("Password updated");
            Ok(())
        })
    }

    fn sign_out(&self) -> Pin<Box<dyn Future<Output = Result<(), MarketError>> + Send + '_>> {
        Box::pin(async move {
            self.id_token.clear();
            *self.current.write().expect("identity lock poisoned") = None;
            let _ = self.changes.send(None);
            info!("Signed out");
            Ok(())
        })
    }

    fn current(&self) -> Option<Identity> {
        self.current.read().expect("identity lock poisoned").clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_response_parsing() {
        let body = r#"{
            "localId": "uid-123",
            "idToken": "token-abc",
            "email": "ada@futa.edu.ng",
            "displayName": "Ada",
            "photoUrl": "https://img.example/ada.png"
        }"#;
        let resp: AuthResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.local_id, "uid-123");
        assert_eq!(resp.id_token, "token-abc");
        assert_eq!(resp.display_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_auth_response_minimal_fields() {
        // signUp without a profile returns no displayName/photoUrl.
        let body = r#"{"localId": "u", "idToken": "t"}"#;
        let resp: AuthResponse = serde_json::from_str(body).unwrap();
        assert!(resp.display_name.is_none());
        assert!(resp.email.is_none());
    }

    #[test]
    fn test_known_error_codes_get_readable_messages() {
        let err = credential_error("EMAIL_EXISTS");
        assert_eq!(err.code(), "CredentialError");
        assert_eq!(err.to_string(), "An account with this email already exists");

        let err = credential_error("INVALID_LOGIN_CREDENTIALS");
        assert_eq!(err.to_string(), "Incorrect email or password");
    }

    #[test]
    fn test_unknown_error_code_passes_through_verbatim() {
        let err = credential_error("OPERATION_NOT_ALLOWED");
        assert_eq!(err.to_string(), "OPERATION_NOT_ALLOWED");
    }

    #[test]
    fn test_map_auth_error_extracts_code() {
        let body = r#"{"error": {"message": "EMAIL_NOT_FOUND", "code": 400}}"#;
        let err = map_auth_error("sign-in", StatusCode::BAD_REQUEST, body);
        assert_eq!(err.to_string(), "No account found for this email");
    }

    #[test]
    fn test_map_auth_error_unparseable_body() {
        let err = map_auth_error("sign-in", StatusCode::BAD_GATEWAY, "<html>oops</html>");
        assert_eq!(err.code(), "CredentialError");
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn test_update_password_request_shape() {
        let request = UpdatePasswordRequest {
            id_token: "tok",
            password: "hunter22",
            return_secure_token: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["idToken"], "tok");
        assert_eq!(json["password"], "hunter22");
        assert_eq!(json["returnSecureToken"], true);
    }

    #[tokio::test]
    async fn test_update_password_requires_session() {
        let config = crate::config::FirebaseConfig {
            api_key: "key".to_string(),
            project_id: "demo".to_string(),
        };
        let gateway = FirebaseAuthGateway::new(&config, SharedIdToken::new()).unwrap();
        let err = gateway.update_password("hunter22").await.unwrap_err();
        assert!(matches!(err, MarketError::SessionRequired));
    }

    #[test]
    fn test_shared_token_lifecycle() {
        let cell = SharedIdToken::new();
        assert!(cell.get().is_none());
        cell.set("tok".to_string());
        assert_eq!(cell.get().as_deref(), Some("tok"));
        cell.clear();
        assert!(cell.get().is_none());
    }
}
