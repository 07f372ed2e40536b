//! # push-types
//!
//! Shared data types for the fedipush Web Push bridge.
//!
//! This crate provides the foundational types used across all fedipush crates:
//! - [`SubscriptionId`], [`DeviceToken`], [`InstanceOrigin`] - Identity types
//! - [`SubscriptionRecord`], [`KeyMaterial`] - Persisted subscription state
//! - [`PushMetadata`], [`NotificationDetail`], [`PushMessage`] - Notification flow
//! - [`PushRegistration`] - Body sent to an instance to register the bridge
//! - [`TypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod messages;
mod subscription;

pub use error::TypesError;
pub use ids::{DeviceToken, InstanceOrigin, SubscriptionId};
pub use messages::{
    data_keys, Alerts, NotificationDetail, PushMessage, PushMetadata, PushRegistration,
    RegistrationData, RegistrationKeys, RegistrationSubscription, StatusDetail,
};
pub use subscription::{KeyMaterial, SubscriptionRecord, AUTH_SECRET_SIZE};
