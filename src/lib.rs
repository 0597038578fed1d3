#![doc = include_str!("../README.md")]

pub mod error;
#[cfg(feature = "client")]
pub mod api;
pub mod interceptor;
#[cfg(feature = "client")]
pub mod session;
pub mod store;
pub mod token;
pub mod types;

// Re-exports for convenient access
pub use error::{Error, Notice};
#[cfg(feature = "client")]
pub use api::{ApiClient, ApiConfig};
pub use interceptor::{BearerAuth, Registration};
#[cfg(feature = "client")]
pub use session::{Session, SessionManager};
#[cfg(feature = "file-store")]
pub use store::FileStore;
pub use store::{KeyValueStore, MemoryStore, TokenStore};
pub use token::{DecodedClaims, decode_claims};
pub use types::{
    BearerToken, Credentials, LoginResponse, RegisterResponse, RegisterUser, TokenId, UserId,
    UserRecord,
};
