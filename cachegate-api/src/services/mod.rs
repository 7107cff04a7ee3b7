//! Domain services behind the HTTP routes.

pub mod cache_index;
pub mod credential_broker;
pub mod upload_coordinator;

pub use cache_index::{CacheHit, CacheIndex};
pub use credential_broker::{session_name, CredentialBroker, IssuedCredentials};
pub use upload_coordinator::{SessionIdSource, SessionProgress, UploadCoordinator, UploadSession};
