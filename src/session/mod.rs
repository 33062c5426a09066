// Session layer
// Credential storage, wire-level authentication, single-flight renewal,
// and terminal-view failure handling

mod failure;
mod refresh;
mod service;
mod store;
mod types;

pub use failure::{SessionFailureHandler, View};
pub use refresh::RefreshCoordinator;
pub use service::AuthService;
pub use store::TokenStore;
pub use types::{
    extract_access, extract_error_message, extract_refresh, CredentialPair, LoginPayload, Role,
    Session, UserIdentity,
};
