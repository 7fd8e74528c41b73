use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Deserialize;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{KeycloakError, OidcToken};

/// The handful of access token claims worth looking at client-side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TokenClaims {
    pub sub: String,
    pub exp: u64,
    pub iat: u64,
    pub iss: String,
    /// The client the token was issued to.
    pub azp: String,
    pub preferred_username: Option<String>,
    pub scope: Option<String>,
}

impl TokenClaims {
    pub fn is_expired(&self) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        now >= self.exp
    }
}

/// Reads the claims out of a JWT without verifying its signature.
///
/// Keycloak validates its own tokens; this is only for displaying who a
/// token belongs to and when it runs out.
pub fn decode_claims(token: &str) -> Result<TokenClaims, KeycloakError> {
    // header.payload.signature
    let mut components = token.split('.');
    let (Some(_), Some(payload), Some(_), None) = (
        components.next(),
        components.next(),
        components.next(),
        components.next(),
    ) else {
        return Err(KeycloakError::InvalidToken(
            "expected three dot-separated components".to_string(),
        ));
    };

    let decoded = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|err| KeycloakError::InvalidToken(format!("payload is not base64url: {err}")))?;
    serde_json::from_slice(&decoded)
        .map_err(|err| KeycloakError::InvalidToken(format!("payload is not JSON claims: {err}")))
}

impl OidcToken {
    /// Claims of the access token. See [`decode_claims`].
    pub fn claims(&self) -> Result<TokenClaims, KeycloakError> {
        decode_claims(&self.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn jwt_with(payload: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{payload}.c2lnbmF0dXJl")
    }

    #[test]
    fn decodes_payload_claims() {
        let token = jwt_with(json!({
            "sub": "f3a1",
            "exp": 4_102_444_800u64,
            "azp": "admin-cli",
            "preferred_username": "admin"
        }));

        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.sub, "f3a1");
        assert_eq!(claims.azp, "admin-cli");
        assert_eq!(claims.preferred_username.as_deref(), Some("admin"));
        assert!(!claims.is_expired());
    }

    #[test]
    fn past_expiry_is_expired() {
        let token = jwt_with(json!({ "sub": "f3a1", "exp": 1 }));
        assert!(decode_claims(&token).unwrap().is_expired());
    }

    #[test]
    fn rejects_wrong_component_count() {
        assert!(matches!(
            decode_claims("only.two"),
            Err(KeycloakError::InvalidToken(_))
        ));
        assert!(matches!(
            decode_claims("a.b.c.d"),
            Err(KeycloakError::InvalidToken(_))
        ));
    }

    #[test]
    fn rejects_non_json_payload() {
        let token = format!("e30.{}.sig", URL_SAFE_NO_PAD.encode("not json"));
        assert!(matches!(
            decode_claims(&token),
            Err(KeycloakError::InvalidToken(_))
        ));
    }

    #[test]
    fn oidc_token_exposes_claims() {
        let token = OidcToken {
            access_token: jwt_with(json!({ "sub": "svc-account" })),
            ..OidcToken::default()
        };
        assert_eq!(token.claims().unwrap().sub, "svc-account");
    }
}
