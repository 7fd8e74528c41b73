use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::http_client::{Core, RequestHeaders, Response};
use super::{ClientConfig, KeycloakError, RequestContext};

/// The scope requested when the client has offline access.
pub const OFFLINE_SCOPE: &str = "offline_access";

/// OAuth2 grants this client knows how to request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    #[default]
    Password,
    ClientCredentials,
    RefreshToken,
}

/// The form posted to the token endpoint. Built fresh for every grant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccessGrantRequest {
    pub grant_type: GrantType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Only sent for public clients; confidential clients authenticate
    /// with HTTP Basic instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl AccessGrantRequest {
    /// The grant used to obtain an admin token for the given configuration.
    ///
    /// Service accounts use `client_credentials`; every other mode logs in
    /// with the configured admin account via `password`.
    pub fn for_admin(config: &ClientConfig) -> Self {
        let mut grant = if config.is_confidential() && config.is_service_account() {
            Self {
                grant_type: GrantType::ClientCredentials,
                ..Self::default()
            }
        } else {
            Self {
                grant_type: GrantType::Password,
                username: Some(config.admin_account().to_string()),
                password: Some(config.admin_pass().to_string()),
                ..Self::default()
            }
        };

        if config.offline_access {
            grant.scope = Some(OFFLINE_SCOPE.to_string());
        }
        grant
    }

    /// Trades a previously issued refresh token for a new token pair.
    pub fn refresh(refresh_token: impl Into<String>) -> Self {
        Self {
            grant_type: GrantType::RefreshToken,
            refresh_token: Some(refresh_token.into()),
            ..Self::default()
        }
    }
}

/// An OIDC token as issued by Keycloak's token endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcToken {
    pub access_token: String,
    pub expires_in: u64,
    pub refresh_expires_in: u64,
    pub refresh_token: String,
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(rename = "not-before-policy")]
    pub not_before_policy: i64,
    pub session_state: String,
    pub scope: String,
}

/// Path of the OIDC token endpoint for a realm.
pub(crate) fn token_path(realm: &str) -> String {
    format!("realms/{realm}/protocol/openid-connect/token")
}

/// Posts `grant` to the token endpoint.
///
/// Confidential clients identify themselves with HTTP Basic; public clients
/// carry their `client_id` in the form.
pub(crate) async fn request_token(
    core: &Core,
    ctx: &RequestContext,
    grant: &AccessGrantRequest,
) -> Result<(OidcToken, Response), KeycloakError> {
    let config = &core.config;
    let mut headers = RequestHeaders::form();
    let mut grant = grant.clone();

    // We'll need to identify our client to Keycloak. How we do so depends
    // on whether we have a secret to present.
    if config.is_confidential() {
        let credentials = format!("{}:{}", config.client_id(), config.client_secret());
        headers.authorization = Some(format!("Basic {}", STANDARD.encode(credentials)));
    } else if grant.client_id.is_none() {
        grant.client_id = Some(config.client_id().to_string());
    }

    debug!(
        realm = %config.realm,
        client_id = %config.client_id(),
        grant_type = ?grant.grant_type,
        offline = grant.scope.is_some(),
        "requesting OIDC token"
    );

    // Always built without admin handling: this is how admin tokens are obtained.
    let request = core.build_request(
        Method::POST,
        &token_path(&config.realm),
        Some(&grant),
        &headers,
    )?;

    // Fields Keycloak leaves out of its reply simply stay at their defaults.
    let mut token = OidcToken::default();
    let response = core.execute_json(ctx, request, &mut token).await?;
    Ok((token, response))
}

/// Obtains a fresh admin token. Nothing is cached: every call is one
/// round trip to the token endpoint.
pub(crate) async fn obtain_admin_token(core: &Core) -> Result<OidcToken, KeycloakError> {
    let grant = AccessGrantRequest::for_admin(&core.config);
    let (token, _) = request_token(core, &RequestContext::background(), &grant).await?;
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::MockServer;
    use serde_json::json;

    fn form(grant: &AccessGrantRequest) -> String {
        serde_urlencoded::to_string(grant).unwrap()
    }

    #[test]
    fn service_account_uses_client_credentials() {
        let config = ClientConfig::service_account("https://sso/", "demo", false, "svc", "s");
        let grant = AccessGrantRequest::for_admin(&config);

        assert_eq!(grant.grant_type, GrantType::ClientCredentials);
        assert!(grant.username.is_none());
        assert!(grant.password.is_none());
        assert_eq!(form(&grant), "grant_type=client_credentials");
    }

    #[test]
    fn confidential_admin_uses_password_grant() {
        let config = ClientConfig::confidential_admin(
            "https://sso/",
            "demo",
            false,
            "admin-cli",
            "s",
            "admin",
            "hunter2",
        );
        let grant = AccessGrantRequest::for_admin(&config);

        assert_eq!(grant.grant_type, GrantType::Password);
        assert_eq!(grant.username.as_deref(), Some("admin"));
        assert_eq!(grant.password.as_deref(), Some("hunter2"));
        assert_eq!(form(&grant), "grant_type=password&username=admin&password=hunter2");
    }

    #[test]
    fn public_admin_uses_password_grant() {
        let config =
            ClientConfig::public_admin("https://sso/", "demo", false, "admin-cli", "root", "pw");
        let grant = AccessGrantRequest::for_admin(&config);

        assert_eq!(grant.grant_type, GrantType::Password);
        assert_eq!(grant.username.as_deref(), Some("root"));
        assert_eq!(grant.password.as_deref(), Some("pw"));
    }

    #[test]
    fn offline_access_adds_scope_for_every_grant_type() {
        let service = ClientConfig::service_account("https://sso/", "demo", true, "svc", "s");
        let admin = ClientConfig::public_admin("https://sso/", "demo", true, "cli", "root", "pw");

        for config in [service, admin] {
            let grant = AccessGrantRequest::for_admin(&config);
            assert_eq!(grant.scope.as_deref(), Some(OFFLINE_SCOPE));
            assert!(form(&grant).contains("scope=offline_access"));
        }
    }

    #[test]
    fn scope_absent_without_offline_access() {
        let config = ClientConfig::service_account("https://sso/", "demo", false, "svc", "s");
        let grant = AccessGrantRequest::for_admin(&config);
        assert!(grant.scope.is_none());
        assert!(!form(&grant).contains("scope"));
    }

    #[test]
    fn token_deserializes_keycloak_fields() {
        let token: OidcToken = serde_json::from_value(json!({
            "access_token": "abc",
            "expires_in": 300,
            "refresh_expires_in": 1800,
            "refresh_token": "def",
            "token_type": "Bearer",
            "not-before-policy": 0,
            "session_state": "xyz",
            "scope": "profile email"
        }))
        .unwrap();

        assert_eq!(token.access_token, "abc");
        assert_eq!(token.expires_in, 300);
        assert_eq!(token.token_type, "Bearer");
        assert!(token.id_token.is_none());
    }

    #[tokio::test]
    async fn confidential_client_authenticates_with_basic() {
        let server = MockServer::start();
        // base64("svc:s3cret")
        let mock = server.mock(|when, then| {
            when.method("POST")
                .path("/realms/demo/protocol/openid-connect/token")
                .header("authorization", "Basic c3ZjOnMzY3JldA==")
                .header("content-type", "application/x-www-form-urlencoded");
            then.status(200).json_body(json!({ "access_token": "tok" }));
        });

        let config =
            ClientConfig::service_account(server.base_url(), "demo", false, "svc", "s3cret");
        let core = Core::new(config, None).unwrap();

        let token = obtain_admin_token(&core).await.unwrap();
        assert_eq!(token.access_token, "tok");
        mock.assert();
    }

    #[tokio::test]
    async fn token_endpoint_rejection_propagates() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method("POST")
                .path("/realms/demo/protocol/openid-connect/token");
            then.status(401).json_body(json!({
                "error": "invalid_grant",
                "error_description": "Invalid user credentials"
            }));
        });

        let config =
            ClientConfig::public_admin(server.base_url(), "demo", false, "cli", "root", "bad");
        let core = Core::new(config, None).unwrap();

        let err = obtain_admin_token(&core).await.unwrap_err();
        assert_eq!(err.as_upstream().unwrap().message, "Invalid user credentials");
    }
}
