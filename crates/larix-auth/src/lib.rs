//! # larix-auth: Authentication and Authorization for larix
//!
//! Guards (session, token, JWT) backed by user providers, password hashing
//! and validation, gates with policies, database-backed RBAC and the route
//! middleware that ties them to the HTTP kernel.

pub mod config;
pub mod error;
pub mod gate;
pub mod guards;
pub mod hashing;
pub mod manager;
pub mod middleware;
pub mod passwords;
pub mod providers;
pub mod rbac;
pub mod user;

// Error handling
pub use error::AuthError;

// Users and where they come from
pub use providers::{credentials, Credentials, DatabaseUserProvider, InMemoryUserProvider, UserProvider};
pub use user::{Authenticatable, GenericUser};

// Guards and configuration
pub use config::{AuthConfig, GuardConfig, ProviderConfig};
pub use guards::{
    Guard, JwtBlacklist, JwtClaims, JwtGuard, JwtGuardConfig, SessionGuard, TokenGuard,
    TokenGuardConfig,
};
pub use manager::AuthManager;

// Passwords
pub use hashing::{Algorithm, Argon2Hasher, BcryptHasher, HashManager, PasswordHasher};
pub use passwords::{PasswordGenerator, PasswordValidator};

// Authorization
pub use gate::{Gate, Policy, UserGate};
pub use rbac::{HasRoles, Permission, RbacManager, Role};

pub use middleware::{
    register_middleware, AuthGuardName, AuthUser, Authenticate, Authorize, RedirectIfAuthenticated,
};

/// Authentication result type alias
pub type AuthResult<T> = Result<T, AuthError>;

/// Authentication system version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
