//! Data models for the CMDB entity graph.
//!
//! Assets own their credentials and tag links; cloud accounts own their
//! access keys. Tags are shared between assets.

pub mod asset;
pub mod cloud;
pub mod credential;
pub mod tag;

pub use asset::{
    Asset, AssetDetails, AssetFilter, AssetInput, AssetType, CloudDetails, DatabaseDetails,
    DatabasePort, HardwareDetails, License, NetworkInterface, ServerDetails, SoftwareDetails,
    SystemDetails, TagFilter,
};
pub use cloud::{AccessKey, AccessKeyInput, CloudAccount, CloudAccountInput};
pub use credential::{Credential, CredentialInput, CredentialKind};
pub use tag::{Tag, TagInput};
