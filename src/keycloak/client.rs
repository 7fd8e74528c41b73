use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use url::Url;

use super::http_client::{Core, RequestHeaders, Response};
use super::{ClientConfig, KeycloakError, OidcToken, RequestContext};
use crate::api::{AdminUserService, AuthenticationService};

/// Manages communication with Keycloak.
///
/// Cloning is cheap; clones share configuration and transport. Each
/// service holds its own handle on the same shared state.
#[derive(Debug, Clone)]
pub struct Client {
    core: Arc<Core>,
    pub authentication: AuthenticationService,
    pub admin_user: AdminUserService,
}

impl Client {
    /// Creates a client. Without an explicit `http` client, a process-wide
    /// default transport is used.
    pub fn new(config: ClientConfig, http: Option<reqwest::Client>) -> Result<Self, KeycloakError> {
        let core = Arc::new(Core::new(config, http)?);
        Ok(Self {
            authentication: AuthenticationService::new(Arc::clone(&core)),
            admin_user: AdminUserService::new(Arc::clone(&core)),
            core,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.core.config
    }

    pub fn base_url(&self) -> &Url {
        &self.core.base_url
    }

    pub fn realm(&self) -> &str {
        &self.core.config.realm
    }

    pub fn client_id(&self) -> &str {
        self.core.config.client_id()
    }

    pub fn client_secret(&self) -> &str {
        self.core.config.client_secret()
    }

    pub fn admin_account(&self) -> &str {
        self.core.config.admin_account()
    }

    pub fn admin_pass(&self) -> &str {
        self.core.config.admin_pass()
    }

    /// The last admin token fetched, or an empty token if none was yet.
    pub fn admin_oidc(&self) -> OidcToken {
        self.core.admin_oidc()
    }

    /// Builds a request for `path`, relative to the base URL.
    ///
    /// With `is_admin_request`, a fresh admin token is fetched first and
    /// sent as `Authorization: Bearer`, replacing any authorization hint.
    pub async fn new_request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        headers: &RequestHeaders,
        is_admin_request: bool,
    ) -> Result<reqwest::Request, KeycloakError> {
        self.core
            .new_request(method, path, body, headers, is_admin_request)
            .await
    }

    /// Sends a request and discards any success body.
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        request: reqwest::Request,
    ) -> Result<Response, KeycloakError> {
        self.core.execute(ctx, request).await
    }

    /// Sends a request and decodes the JSON success body into `target`.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        request: reqwest::Request,
        target: &mut T,
    ) -> Result<Response, KeycloakError> {
        self.core.execute_json(ctx, request, target).await
    }

    /// Sends a request and copies the raw success body into `sink`.
    pub async fn execute_into<W: Write + ?Sized>(
        &self,
        ctx: &RequestContext,
        request: reqwest::Request,
        sink: &mut W,
    ) -> Result<Response, KeycloakError> {
        self.core.execute_into(ctx, request, sink).await
    }
}
