mod client;
mod config;
mod context;
mod error;
pub(crate) mod http_client;
pub mod jwt;
pub(crate) mod oauth_client;

pub use client::Client;
pub use config::{ClientConfig, Credentials};
pub use context::RequestContext;
pub use error::{ErrorResponse, KeycloakError};
pub use http_client::{RequestHeaders, Response, FORM_ENCODED};
pub use jwt::TokenClaims;
pub use oauth_client::{AccessGrantRequest, GrantType, OidcToken, OFFLINE_SCOPE};
