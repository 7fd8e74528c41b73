use reqwest::header::LOCATION;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::keycloak::http_client::{path_segment, Core, RequestHeaders};
use crate::keycloak::{KeycloakError, RequestContext, Response};

/// A Keycloak user as exposed by the admin API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRepresentation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_timestamp: Option<i64>,
}

/// Filters for listing users. Unset fields are left out of the query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
}

/// User administration under `admin/realms/{realm}/users`.
/// Every call runs with a freshly acquired admin token.
#[derive(Debug, Clone)]
pub struct AdminUserService {
    core: Arc<Core>,
}

impl AdminUserService {
    pub(crate) fn new(core: Arc<Core>) -> Self {
        Self { core }
    }

    fn users_path(&self) -> String {
        format!("admin/realms/{}/users", self.core.config.realm)
    }

    fn user_path(&self, id: &str) -> Result<String, KeycloakError> {
        Ok(format!("{}/{}", self.users_path(), path_segment(id)?))
    }

    pub async fn get_users(
        &self,
        ctx: &RequestContext,
        query: &UserQuery,
    ) -> Result<Vec<UserRepresentation>, KeycloakError> {
        let query = serde_urlencoded::to_string(query)?;
        let path = if query.is_empty() {
            self.users_path()
        } else {
            format!("{}?{query}", self.users_path())
        };

        let request = self
            .core
            .new_request::<()>(Method::GET, &path, None, &RequestHeaders::default(), true)
            .await?;
        let mut users = Vec::new();
        self.core.execute_json(ctx, request, &mut users).await?;
        Ok(users)
    }

    pub async fn get_user(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<UserRepresentation, KeycloakError> {
        let path = self.user_path(id)?;
        let request = self
            .core
            .new_request::<()>(Method::GET, &path, None, &RequestHeaders::default(), true)
            .await?;
        let mut user = UserRepresentation::default();
        self.core.execute_json(ctx, request, &mut user).await?;
        Ok(user)
    }

    /// Creates a user and returns its id, taken from the `Location` header
    /// when Keycloak sends one.
    pub async fn create_user(
        &self,
        ctx: &RequestContext,
        user: &UserRepresentation,
    ) -> Result<Option<String>, KeycloakError> {
        let request = self
            .core
            .new_request(Method::POST, &self.users_path(), Some(user), &RequestHeaders::default(), true)
            .await?;
        let response = self.core.execute(ctx, request).await?;

        let id = response
            .headers()
            .get(LOCATION)
            .and_then(|location| location.to_str().ok())
            .and_then(|location| location.trim_end_matches('/').rsplit('/').next())
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        Ok(id)
    }

    pub async fn update_user(
        &self,
        ctx: &RequestContext,
        id: &str,
        user: &UserRepresentation,
    ) -> Result<Response, KeycloakError> {
        let path = self.user_path(id)?;
        let request = self
            .core
            .new_request(Method::PUT, &path, Some(user), &RequestHeaders::default(), true)
            .await?;
        self.core.execute(ctx, request).await
    }

    pub async fn delete_user(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<Response, KeycloakError> {
        let path = self.user_path(id)?;
        let request = self
            .core
            .new_request::<()>(Method::DELETE, &path, None, &RequestHeaders::default(), true)
            .await?;
        self.core.execute(ctx, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keycloak::{Client, ClientConfig};
    use httpmock::MockServer;
    use serde_json::json;

    fn client_for(server: &MockServer) -> Client {
        token_mock(server);
        let config = ClientConfig::service_account(server.base_url(), "demo", false, "svc", "s");
        Client::new(config, None).unwrap()
    }

    fn token_mock(server: &MockServer) -> httpmock::Mock<'_> {
        server.mock(|when, then| {
            when.method("POST")
                .path("/realms/demo/protocol/openid-connect/token");
            then.status(200).json_body(json!({ "access_token": "admin-token" }));
        })
    }

    #[tokio::test]
    async fn lists_users_with_query_and_admin_token() {
        let server = MockServer::start();
        let client = client_for(&server);
        let mock = server.mock(|when, then| {
            when.method("GET")
                .path("/admin/realms/demo/users")
                .query_param("search", "ali")
                .query_param("max", "10")
                .header("authorization", "Bearer admin-token");
            then.status(200).json_body(json!([
                { "id": "1", "username": "alice", "enabled": true },
                { "id": "2", "username": "alicia" }
            ]));
        });

        let query = UserQuery {
            search: Some("ali".to_string()),
            max: Some(10),
            ..UserQuery::default()
        };
        let users = client
            .admin_user
            .get_users(&RequestContext::background(), &query)
            .await
            .unwrap();

        assert_eq!(users.len(), 2);
        assert_eq!(users[0].username, "alice");
        assert_eq!(users[0].enabled, Some(true));
        mock.assert();
    }

    #[tokio::test]
    async fn creates_user_and_reads_id_from_location() {
        let server = MockServer::start();
        let client = client_for(&server);
        let location = format!("{}/admin/realms/demo/users/9f2c", server.base_url());
        let mock = server.mock(|when, then| {
            when.method("POST")
                .path("/admin/realms/demo/users")
                .header("content-type", "application/json")
                .header("authorization", "Bearer admin-token");
            then.status(201).header("location", location.as_str());
        });

        let user = UserRepresentation {
            username: "bob".to_string(),
            first_name: Some("<Bob>".to_string()),
            enabled: Some(true),
            ..UserRepresentation::default()
        };
        let id = client
            .admin_user
            .create_user(&RequestContext::background(), &user)
            .await
            .unwrap();

        assert_eq!(id.as_deref(), Some("9f2c"));
        mock.assert();
    }

    #[tokio::test]
    async fn missing_user_is_upstream_error() {
        let server = MockServer::start();
        let client = client_for(&server);
        server.mock(|when, then| {
            when.method("GET").path("/admin/realms/demo/users/nope");
            then.status(404).json_body(json!({ "error": "User not found" }));
        });

        let err = client
            .admin_user
            .get_user(&RequestContext::background(), "nope")
            .await
            .unwrap_err();

        let upstream = err.as_upstream().unwrap();
        assert_eq!(upstream.response.status().as_u16(), 404);
        assert_eq!(upstream.message, "");
    }

    #[tokio::test]
    async fn updates_and_deletes_user() {
        let server = MockServer::start();
        let client = client_for(&server);
        let update = server.mock(|when, then| {
            when.method("PUT").path("/admin/realms/demo/users/42");
            then.status(204);
        });
        let delete = server.mock(|when, then| {
            when.method("DELETE").path("/admin/realms/demo/users/42");
            then.status(204);
        });

        let ctx = RequestContext::background();
        let user = UserRepresentation {
            username: "carol".to_string(),
            ..UserRepresentation::default()
        };
        let updated = client.admin_user.update_user(&ctx, "42", &user).await.unwrap();
        let deleted = client.admin_user.delete_user(&ctx, "42").await.unwrap();

        assert_eq!(updated.status().as_u16(), 204);
        assert_eq!(deleted.status().as_u16(), 204);
        update.assert();
        delete.assert();
    }

    #[tokio::test]
    async fn id_cannot_escape_the_users_collection() {
        let server = MockServer::start();
        let token = token_mock(&server);
        let config = ClientConfig::service_account(server.base_url(), "demo", false, "svc", "s");
        let client = Client::new(config, None).unwrap();
        let clients = server.mock(|when, then| {
            when.method("DELETE").path("/admin/realms/demo/clients/abc");
            then.status(204);
        });

        let ctx = RequestContext::background();
        let err = client
            .admin_user
            .delete_user(&ctx, "../clients/abc")
            .await
            .unwrap_err();
        assert!(matches!(err, KeycloakError::InvalidPathSegment(ref id) if id == "../clients/abc"));

        let user = UserRepresentation::default();
        assert!(client.admin_user.get_user(&ctx, "..").await.is_err());
        assert!(client.admin_user.update_user(&ctx, "a/b", &user).await.is_err());

        // Nothing was sent, not even a token request.
        assert_eq!(clients.calls(), 0);
        assert_eq!(token.calls(), 0);
    }
}
