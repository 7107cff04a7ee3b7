//! cachegate storage adapters
//!
//! Backend traits for object storage and credential federation, their AWS
//! implementations, in-memory doubles, and the keyed state stores the gateway
//! keeps its sessions and acceptance cache in.

mod convert;
pub mod mock;
pub mod s3;
pub mod state;
pub mod sts;
pub mod traits;

pub use mock::{
    AssumeRoleCall, CompletedUpload, MemoryObjectStore, MockFederation, StoreCall, StoreOp,
    UploadedPart,
};
pub use s3::S3ObjectStore;
pub use state::{MemoryStore, StateStore};
pub use sts::StsFederation;
pub use traits::{BackendResult, Federation, ObjectStore};

use aws_config::{BehaviorVersion, SdkConfig};

/// Load the AWS SDK configuration from the default provider chain.
pub async fn load_sdk_config() -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest()).load().await
}
