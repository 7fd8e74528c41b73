//! An authenticated client for Keycloak's REST API.
//!
//! Every call goes through the same pipeline: a request is built relative
//! to the configured base URL (optionally with a freshly acquired admin
//! bearer token), dispatched under a [`RequestContext`], and reduced to
//! either a decoded value or a [`KeycloakError`].
//!
//! ```no_run
//! use keycloak::{Client, ClientConfig, RequestContext};
//! use keycloak::api::UserQuery;
//!
//! # async fn run() -> Result<(), keycloak::KeycloakError> {
//! let config = ClientConfig::service_account(
//!     "https://sso.example.com/",
//!     "demo",
//!     false,
//!     "provisioner",
//!     "s3cret",
//! );
//! let client = Client::new(config, None)?;
//! let users = client
//!     .admin_user
//!     .get_users(&RequestContext::background(), &UserQuery::default())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod keycloak;

pub use keycloak::{
    AccessGrantRequest, Client, ClientConfig, Credentials, ErrorResponse, GrantType,
    KeycloakError, OidcToken, RequestContext, RequestHeaders, Response,
};
