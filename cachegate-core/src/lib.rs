//! cachegate core types
//!
//! Value types shared by the gateway and its storage adapters: cache entry
//! addressing, session policies, backend results and the error taxonomy.

pub mod clock;
pub mod error;
pub mod object_key;
pub mod policy;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AuthError, BackendError, ConfigError, UploadError};
pub use object_key::ObjectKey;
pub use policy::{object_arn, object_uri, ObjectAccess, Policy, Statement, POLICY_VERSION};
pub use types::{CacheEntry, CacheId, CompletedPart, ObjectHead, TemporaryCredentials};
