//! Authentication state and the persisted credential.
//!
//! [`SessionManager`] is the only holder of the bearer token. Every
//! authenticated call goes through [`SessionManager::authorized_request`],
//! which turns a 401 into a single forced logout.

mod manager;
mod token_store;

pub use manager::{
    AuthError, RegisterError, SessionManager, SessionState, SESSION_EXPIRED_MESSAGE,
};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore, TokenStoreError};
