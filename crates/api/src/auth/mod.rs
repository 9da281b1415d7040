//! Authentication and authorization

pub mod identity;
pub mod middleware;
pub mod password;
pub mod permissions;
pub mod tokens;

pub use identity::{ActiveUser, Identity};
pub use middleware::{
    authenticate, check_activated, check_authenticated, require_activated_user,
    require_authenticated_user, require_permission, AuthState,
};
pub use password::{hash_password, verify_password, PasswordError};
pub use permissions::{PermissionService, Permissions, MOVIES_READ, MOVIES_WRITE};
pub use tokens::{Scope, Token, TokenService, ACTIVATION_TTL, AUTHENTICATION_TTL, TOKEN_LENGTH};
