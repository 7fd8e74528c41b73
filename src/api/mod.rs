mod admin_user;
mod authentication;

pub use admin_user::{AdminUserService, UserQuery, UserRepresentation};
pub use authentication::{AuthenticationService, UserInfo};
