use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::keycloak::http_client::{Core, RequestHeaders};
use crate::keycloak::oauth_client;
use crate::keycloak::{AccessGrantRequest, KeycloakError, OidcToken, RequestContext};

/// Claims returned by the OIDC userinfo endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Any mapper-provided claims beyond the standard ones.
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

/// Realm-scoped OIDC endpoints: token acquisition and userinfo.
#[derive(Debug, Clone)]
pub struct AuthenticationService {
    core: Arc<Core>,
}

impl AuthenticationService {
    pub(crate) fn new(core: Arc<Core>) -> Self {
        Self { core }
    }

    /// Exchanges `grant` for a token at the realm's token endpoint.
    pub async fn get_oidc_token(
        &self,
        ctx: &RequestContext,
        grant: &AccessGrantRequest,
    ) -> Result<OidcToken, KeycloakError> {
        let (token, _) = oauth_client::request_token(&self.core, ctx, grant).await?;
        Ok(token)
    }

    /// Looks up the claims of the user owning `access_token`.
    pub async fn get_user_info(
        &self,
        ctx: &RequestContext,
        access_token: &str,
    ) -> Result<UserInfo, KeycloakError> {
        let path = format!(
            "realms/{}/protocol/openid-connect/userinfo",
            self.core.config.realm
        );
        let request = self
            .core
            .new_request::<()>(
                Method::GET,
                &path,
                None,
                &RequestHeaders::bearer(access_token),
                false,
            )
            .await?;

        let mut info = UserInfo::default();
        self.core.execute_json(ctx, request, &mut info).await?;
        Ok(info)
    }
}
