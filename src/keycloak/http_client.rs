use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::{OnceLock, PoisonError, RwLock};
use tracing::{debug, warn};
use url::Url;

use super::{oauth_client, ClientConfig, KeycloakError, OidcToken, RequestContext};
use crate::keycloak::error::ErrorResponse;

/// Content type for form-encoded bodies, as used by the token endpoint.
pub const FORM_ENCODED: &str = "application/x-www-form-urlencoded";

const JSON: &str = "application/json";

/// Transport shared by every client constructed without its own.
static DEFAULT_TRANSPORT: OnceLock<reqwest::Client> = OnceLock::new();

fn default_transport() -> reqwest::Client {
    DEFAULT_TRANSPORT
        .get_or_init(reqwest::Client::new)
        .clone()
}

/// Header hints for a request. An explicit content type always wins over
/// the JSON default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    pub authorization: Option<String>,
    pub content_type: Option<String>,
}

impl RequestHeaders {
    pub fn form() -> Self {
        Self {
            content_type: Some(FORM_ENCODED.to_string()),
            ..Self::default()
        }
    }

    pub fn bearer(access_token: &str) -> Self {
        Self {
            authorization: Some(format!("Bearer {access_token}")),
            ..Self::default()
        }
    }

    pub fn with_authorization(mut self, authorization: impl Into<String>) -> Self {
        self.authorization = Some(authorization.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// A successful Keycloak response.
///
/// The body has already been consumed by the time this is handed back;
/// status, headers and final URL remain available.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    url: Url,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, url: Url) -> Self {
        Self {
            status,
            headers,
            url,
        }
    }

    fn from_reqwest(response: &reqwest::Response) -> Self {
        Self::new(
            response.status(),
            response.headers().clone(),
            response.url().clone(),
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// Only `error_description` is of interest within an error body.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_description: String,
}

/// The state every service shares: configuration, transport, and the
/// snapshot of the last admin token fetched.
#[derive(Debug)]
pub(crate) struct Core {
    pub(crate) config: ClientConfig,
    pub(crate) base_url: Url,
    http: reqwest::Client,
    admin_oidc: RwLock<OidcToken>,
}

impl Core {
    pub(crate) fn new(
        config: ClientConfig,
        http: Option<reqwest::Client>,
    ) -> Result<Self, KeycloakError> {
        // Relative resolution drops the last path segment unless the base ends in `/`.
        let mut raw = config.base_url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base_url = Url::parse(&raw).map_err(|source| KeycloakError::InvalidBaseUrl {
            url: config.base_url.clone(),
            source,
        })?;

        Ok(Self {
            config,
            base_url,
            http: http.unwrap_or_else(default_transport),
            admin_oidc: RwLock::new(OidcToken::default()),
        })
    }

    pub(crate) fn admin_oidc(&self) -> OidcToken {
        self.admin_oidc
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn store_admin_oidc(&self, token: OidcToken) {
        *self
            .admin_oidc
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    /// Builds a request without any admin token handling.
    ///
    /// The token endpoint is always reached through here, so acquiring an
    /// admin token never needs another admin token.
    pub(crate) fn build_request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        headers: &RequestHeaders,
    ) -> Result<reqwest::Request, KeycloakError> {
        // First, we'll need to resolve our path against the base URL.
        // Anything `join` can't make sense of stops us right here.
        let url = self
            .base_url
            .join(path)
            .map_err(|source| KeycloakError::UrlResolution {
                path: path.to_string(),
                source,
            })?;

        let mut request = self.http.request(method.clone(), url.clone());

        // Our body is encoded according to the content type we were given.
        // The token endpoint wants a form; everything else speaks JSON.
        let is_form = headers.content_type.as_deref() == Some(FORM_ENCODED);
        match body {
            Some(body) if is_form => {
                request = request.body(serde_urlencoded::to_string(body)?);
            }
            Some(body) => {
                // Some payloads legitimately carry `<`, `>` and `&`.
                // serde_json leaves them untouched, which is what we want.
                let encoded = serde_json::to_vec(body).map_err(KeycloakError::JsonEncoding)?;
                request = request.body(encoded);
            }
            None => {}
        }

        // An explicit content type always wins. Otherwise, if we're sending
        // a body at all, it's JSON.
        let content_type = match (&headers.content_type, body) {
            (Some(content_type), _) => Some(content_type.as_str()),
            (None, Some(_)) => Some(JSON),
            (None, None) => None,
        };
        if let Some(content_type) = content_type {
            request = request.header(CONTENT_TYPE, header_value("Content-Type", content_type)?);
        }
        // Whatever authorization the caller handed us goes along verbatim.
        if let Some(authorization) = &headers.authorization {
            request = request.header(AUTHORIZATION, header_value("Authorization", authorization)?);
        }

        debug!(%method, %url, content_type, "built keycloak request");
        request.build().map_err(KeycloakError::RequestBuild)
    }

    /// Builds a request, attaching a freshly acquired admin bearer token
    /// when `is_admin_request` is set. The token overrides any
    /// authorization hint.
    pub(crate) async fn new_request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        headers: &RequestHeaders,
        is_admin_request: bool,
    ) -> Result<reqwest::Request, KeycloakError> {
        let mut request = self.build_request(method, path, body, headers)?;

        // Admin requests need a bearer token of their own.
        // We fetch a fresh one every time; nothing is cached between calls.
        if is_admin_request {
            let token = oauth_client::obtain_admin_token(self).await?;
            let bearer = header_value("Authorization", &format!("Bearer {}", token.access_token))?;
            // This replaces any authorization hint set above.
            request.headers_mut().insert(AUTHORIZATION, bearer);
            self.store_admin_oidc(token);
        }

        Ok(request)
    }

    /// Sends the request and classifies the outcome. Any status of 300 or
    /// above becomes [`KeycloakError::Upstream`].
    async fn dispatch(
        &self,
        ctx: &RequestContext,
        request: reqwest::Request,
    ) -> Result<reqwest::Response, KeycloakError> {
        let method = request.method().clone();
        debug!(%method, url = %request.url(), "dispatching keycloak request");

        // We race the request against our context. If the context is
        // already done, we never send anything at all.
        let response = match ctx.run(self.http.execute(request)).await? {
            Ok(response) => response,
            // If the context finished while we were failing, its reason is
            // more useful than whatever the transport saw.
            Err(err) => return Err(ctx.err().unwrap_or(KeycloakError::Transport(err))),
        };

        // Anything at or above 300 is an error, regardless of the specific code.
        if response.status().as_u16() < 300 {
            return Ok(response);
        }

        // Let's see if Keycloak told us why. Reading or parsing the body is
        // best-effort: if either fails, we simply end up with no message.
        let wrapper = Response::from_reqwest(&response);
        let body = match ctx.run(response.bytes()).await {
            Ok(Ok(body)) => body,
            _ => Bytes::new(),
        };
        let message = serde_json::from_slice::<ErrorBody>(&body)
            .map(|parsed| parsed.error_description)
            .unwrap_or_default();

        warn!(
            %method,
            url = %wrapper.url(),
            status = wrapper.status().as_u16(),
            message = %message,
            "keycloak rejected request"
        );
        Err(KeycloakError::Upstream(Box::new(ErrorResponse {
            method,
            response: wrapper,
            body,
            message,
        })))
    }

    /// Executes the request, discarding any success body.
    pub(crate) async fn execute(
        &self,
        ctx: &RequestContext,
        request: reqwest::Request,
    ) -> Result<Response, KeycloakError> {
        let response = self.dispatch(ctx, request).await?;
        Ok(Response::from_reqwest(&response))
    }

    /// Executes the request and decodes a JSON success body into `target`.
    ///
    /// An empty body leaves `target` untouched and is not an error.
    pub(crate) async fn execute_json<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        request: reqwest::Request,
        target: &mut T,
    ) -> Result<Response, KeycloakError> {
        let response = self.dispatch(ctx, request).await?;
        let wrapper = Response::from_reqwest(&response);
        let body = ctx.run(response.bytes()).await??;

        // We only read the first JSON value within the body, and ignore
        // anything trailing after it.
        // An empty body yields no value at all: that's fine, and we leave
        // the target as-is.
        let mut values = serde_json::Deserializer::from_slice(&body).into_iter::<T>();
        match values.next() {
            None => Ok(wrapper),
            Some(Ok(decoded)) => {
                *target = decoded;
                Ok(wrapper)
            }
            // We still hand back the response so callers can inspect it.
            Some(Err(source)) => Err(KeycloakError::Decode {
                response: Box::new(wrapper),
                source,
            }),
        }
    }

    /// Executes the request and streams the raw success body into `sink`.
    pub(crate) async fn execute_into<W: Write + ?Sized>(
        &self,
        ctx: &RequestContext,
        request: reqwest::Request,
        sink: &mut W,
    ) -> Result<Response, KeycloakError> {
        let mut response = self.dispatch(ctx, request).await?;
        let wrapper = Response::from_reqwest(&response);

        // Raw bytes are copied verbatim, chunk by chunk, with no decoding.
        while let Some(chunk) = ctx.run(response.chunk()).await?? {
            sink.write_all(&chunk)?;
        }
        sink.flush()?;

        Ok(wrapper)
    }
}

/// Checks that `segment` stays a single path segment once joined.
///
/// Ids end up inside paths requested with an admin token, so they must
/// never be able to step outside the resource they name.
pub(crate) fn path_segment(segment: &str) -> Result<&str, KeycloakError> {
    // `%` is included as `%2e%2e` resolves just like `..`, and `\` is a
    // separator for http(s) URLs.
    let escapes = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\', '?', '#', '%']);
    if escapes {
        return Err(KeycloakError::InvalidPathSegment(segment.to_string()));
    }
    Ok(segment)
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue, KeycloakError> {
    HeaderValue::from_str(value).map_err(|source| KeycloakError::InvalidHeader { name, source })
}
