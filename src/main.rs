use clap::{Parser, Subcommand};
use keycloak::api::UserQuery;
use keycloak::{Client, ClientConfig, KeycloakError, RequestContext};
use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Keycloak(#[from] KeycloakError),

    #[error("failed to read input: {0}")]
    Prompt(#[from] io::Error),

    #[error("no credentials: pass --client-secret for a service account or --admin-user")]
    MissingCredentials,

    #[error("failed to render output: {0}")]
    Render(#[from] serde_json::Error),
}

/// Small administration tool on top of the Keycloak REST API.
#[derive(Debug, Parser)]
#[command(name = "keycloakctl", version, about)]
struct Cli {
    /// Base URL of the Keycloak server.
    #[arg(long, env = "KEYCLOAK_URL")]
    url: String,

    /// Realm to operate on.
    #[arg(long, env = "KEYCLOAK_REALM", default_value = "master")]
    realm: String,

    #[arg(long, env = "KEYCLOAK_CLIENT_ID", default_value = "admin-cli")]
    client_id: String,

    /// Makes the client confidential. Without an admin user this selects
    /// service account mode.
    #[arg(long, env = "KEYCLOAK_CLIENT_SECRET")]
    client_secret: Option<String>,

    #[arg(long, env = "KEYCLOAK_ADMIN_USER")]
    admin_user: Option<String>,

    /// Prompted for when an admin user is given without one.
    #[arg(long, env = "KEYCLOAK_ADMIN_PASSWORD", hide_env_values = true)]
    admin_password: Option<String>,

    /// Request the offline_access scope.
    #[arg(long, env = "KEYCLOAK_OFFLINE_ACCESS")]
    offline_access: bool,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Obtain an admin token and show who it belongs to.
    Token,
    /// List users, optionally filtered.
    Users {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        max: Option<u32>,
    },
    /// Show a single user.
    User { id: String },
    /// Delete a user.
    DeleteUser { id: String },
}

impl Cli {
    fn client_config(&self) -> Result<ClientConfig, CliError> {
        let config = match (&self.client_secret, &self.admin_user) {
            (Some(secret), None) => ClientConfig::service_account(
                &self.url,
                &self.realm,
                self.offline_access,
                &self.client_id,
                secret,
            ),
            (Some(secret), Some(admin)) => ClientConfig::confidential_admin(
                &self.url,
                &self.realm,
                self.offline_access,
                &self.client_id,
                secret,
                admin,
                self.admin_password()?,
            ),
            (None, Some(admin)) => ClientConfig::public_admin(
                &self.url,
                &self.realm,
                self.offline_access,
                &self.client_id,
                admin,
                self.admin_password()?,
            ),
            (None, None) => return Err(CliError::MissingCredentials),
        };
        Ok(config)
    }

    fn admin_password(&self) -> io::Result<String> {
        match &self.admin_password {
            Some(password) => Ok(password.clone()),
            None => interactive_prompt("the admin password"),
        }
    }
}

/// Quick and dirty function to read input from the user.
fn interactive_prompt(prompt_type: &str) -> io::Result<String> {
    let mut response = String::new();
    print!("Please enter {prompt_type}: ");
    io::stdout().flush()?;
    io::stdin().read_line(&mut response)?;

    Ok(response.trim_end_matches(['\r', '\n']).to_string())
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let client = Client::new(cli.client_config()?, None)?;
    let ctx = RequestContext::background().with_timeout(Duration::from_secs(cli.timeout));

    match cli.command {
        Command::Token => {
            let grant = keycloak::AccessGrantRequest::for_admin(client.config());
            let token = client.authentication.get_oidc_token(&ctx, &grant).await?;
            let claims = token.claims()?;
            println!("subject:    {}", claims.sub);
            println!("client:     {}", claims.azp);
            if let Some(username) = claims.preferred_username {
                println!("username:   {username}");
            }
            println!("expires in: {}s", token.expires_in);
        }
        Command::Users { search, max } => {
            let query = UserQuery {
                search,
                max,
                ..UserQuery::default()
            };
            let users = client.admin_user.get_users(&ctx, &query).await?;
            for user in users {
                println!(
                    "{}\t{}\t{}",
                    user.id.unwrap_or_default(),
                    user.username,
                    user.email.unwrap_or_default()
                );
            }
        }
        Command::User { id } => {
            let user = client.admin_user.get_user(&ctx, &id).await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        Command::DeleteUser { id } => {
            client.admin_user.delete_user(&ctx, &id).await?;
            println!("deleted {id}");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
