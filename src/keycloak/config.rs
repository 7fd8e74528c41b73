use serde::{Deserialize, Serialize};

/// How this client authenticates when it needs elevated privileges.
///
/// Each variant corresponds to one way of constructing a client, and
/// determines which OAuth2 grant is used for admin requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Credentials {
    /// A confidential client with service accounts enabled.
    /// Tokens are obtained via the `client_credentials` grant.
    ServiceAccount {
        client_id: String,
        client_secret: String,
    },
    /// An admin user authenticating through a confidential client.
    ConfidentialAdmin {
        client_id: String,
        client_secret: String,
        admin_account: String,
        admin_pass: String,
    },
    /// An admin user authenticating through a public client (no secret).
    PublicAdmin {
        client_id: String,
        admin_account: String,
        admin_pass: String,
    },
}

/// Identity provider coordinates and privilege mode, fixed for the
/// lifetime of a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the Keycloak server, e.g. `https://sso.example.com/`.
    pub base_url: String,
    /// Realm every resource path is scoped to.
    pub realm: String,
    /// Whether grant requests ask for the `offline_access` scope.
    /// Requires the `offline_access` role.
    #[serde(default)]
    pub offline_access: bool,
    pub credentials: Credentials,
}

impl ClientConfig {
    /// Targets service accounts with elevated privileges.
    pub fn service_account(
        base_url: impl Into<String>,
        realm: impl Into<String>,
        offline_access: bool,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            realm: realm.into(),
            offline_access,
            credentials: Credentials::ServiceAccount {
                client_id: client_id.into(),
                client_secret: client_secret.into(),
            },
        }
    }

    /// Targets users with elevated privileges who authenticate against
    /// a confidential client.
    pub fn confidential_admin(
        base_url: impl Into<String>,
        realm: impl Into<String>,
        offline_access: bool,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        admin_account: impl Into<String>,
        admin_pass: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            realm: realm.into(),
            offline_access,
            credentials: Credentials::ConfidentialAdmin {
                client_id: client_id.into(),
                client_secret: client_secret.into(),
                admin_account: admin_account.into(),
                admin_pass: admin_pass.into(),
            },
        }
    }

    /// Targets users with elevated privileges who authenticate against
    /// a public client.
    pub fn public_admin(
        base_url: impl Into<String>,
        realm: impl Into<String>,
        offline_access: bool,
        client_id: impl Into<String>,
        admin_account: impl Into<String>,
        admin_pass: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            realm: realm.into(),
            offline_access,
            credentials: Credentials::PublicAdmin {
                client_id: client_id.into(),
                admin_account: admin_account.into(),
                admin_pass: admin_pass.into(),
            },
        }
    }

    pub fn is_service_account(&self) -> bool {
        matches!(self.credentials, Credentials::ServiceAccount { .. })
    }

    /// Confidential clients hold a secret and authenticate themselves
    /// to the token endpoint.
    pub fn is_confidential(&self) -> bool {
        !matches!(self.credentials, Credentials::PublicAdmin { .. })
    }

    pub fn client_id(&self) -> &str {
        match &self.credentials {
            Credentials::ServiceAccount { client_id, .. }
            | Credentials::ConfidentialAdmin { client_id, .. }
            | Credentials::PublicAdmin { client_id, .. } => client_id,
        }
    }

    /// Empty for public clients.
    pub fn client_secret(&self) -> &str {
        match &self.credentials {
            Credentials::ServiceAccount { client_secret, .. }
            | Credentials::ConfidentialAdmin { client_secret, .. } => client_secret,
            Credentials::PublicAdmin { .. } => "",
        }
    }

    /// Empty for service accounts.
    pub fn admin_account(&self) -> &str {
        match &self.credentials {
            Credentials::ConfidentialAdmin { admin_account, .. }
            | Credentials::PublicAdmin { admin_account, .. } => admin_account,
            Credentials::ServiceAccount { .. } => "",
        }
    }

    /// Empty for service accounts.
    pub fn admin_pass(&self) -> &str {
        match &self.credentials {
            Credentials::ConfidentialAdmin { admin_pass, .. }
            | Credentials::PublicAdmin { admin_pass, .. } => admin_pass,
            Credentials::ServiceAccount { .. } => "",
        }
    }
}
