//! # stratomcp-auth
//!
//! OAuth 2.0 protected-resource authorization for the stratomcp runtime:
//! bearer validation by locally-verified JWT (JWKS) or RFC 7662
//! introspection, auth-context extraction, token→session binding,
//! protected-resource metadata (RFC 9728), background token refresh
//! coordinated through the distributed lock, and an optional dynamic
//! client registration proxy (RFC 7591).
//!
//! The runtime's HTTP layer calls [`bearer::extract_bearer`] and
//! [`bearer::BearerValidator::validate`] in its pre-handler and attaches
//! the resulting [`AuthContext`] to the request; everything else here is
//! wiring around that pair.

pub mod bearer;
pub mod config;
pub mod context;
pub mod dcr;
pub mod error;
pub mod introspection;
pub mod jwks;
pub mod metadata;
pub mod refresh;
pub mod validator;

pub use bearer::{extract_bearer, BearerValidator};
pub use config::{AuthorizationConfig, IntrospectionAuth, TokenRefreshConfig, ValidationStrategy};
pub use context::{context_from_claims, is_expired, AuthContext};
pub use dcr::DcrProxy;
pub use error::{AuthError, AuthResult};
pub use introspection::IntrospectionClient;
pub use jwks::JwksClient;
pub use metadata::{www_authenticate_challenge, ProtectedResourceMetadata, METADATA_PATH};
pub use refresh::TokenRefreshService;
pub use validator::JwtValidator;
