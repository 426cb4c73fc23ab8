#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod service_profile;
pub mod traffic_split;

pub use self::{
    service_profile::{ServiceProfile, ServiceProfileSpec, WeightedDst},
    traffic_split::{TrafficSplit, TrafficSplitBackend, TrafficSplitSpec},
};
pub use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
pub use kube::{
    api::{Api, ObjectMeta, PostParams, ResourceExt},
    Client, Error,
};

/// Marks a ServiceProfile that must never be modified by the adaptor.
///
/// Only the presence of the annotation matters; its value is ignored.
pub const SKIP_ANNOTATION: &str = "smi.linkerd.io/skip";

/// Records the TrafficSplit a ServiceProfile was last updated for.
///
/// Profiles are located by their derived name, so the adaptor does not write
/// this annotation. Existing values are preserved.
pub const UPDATED_FOR_ANNOTATION: &str = "smi.linkerd.io/updated-for";
