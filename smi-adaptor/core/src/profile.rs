//! Derives ServiceProfiles from TrafficSplits and decides when an existing
//! profile already matches.

use crate::fqdn;
use ahash::AHashMap as HashMap;
use linkerd_smi_adaptor_k8s_api::{
    ObjectMeta, Quantity, ResourceExt, ServiceProfile, ServiceProfileSpec, TrafficSplit,
    WeightedDst, SKIP_ANNOTATION,
};

/// Builds the ServiceProfile that a TrafficSplit calls for.
///
/// Backends keep their order and their weights are copied verbatim.
pub fn desired(split: &TrafficSplit, namespace: &str, cluster_domain: &str) -> ServiceProfile {
    let dst_overrides = split
        .spec
        .backends
        .iter()
        .map(|backend| WeightedDst {
            authority: fqdn(&backend.service, namespace, cluster_domain),
            weight: backend.weight.clone(),
        })
        .collect();

    ServiceProfile {
        metadata: ObjectMeta {
            name: Some(fqdn(&split.spec.service, namespace, cluster_domain)),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: ServiceProfileSpec {
            dst_overrides: Some(dst_overrides),
            ..Default::default()
        },
    }
}

/// Returns true if the profile opts out of being managed.
pub fn is_skipped(profile: &ServiceProfile) -> bool {
    profile.annotations().contains_key(SKIP_ANNOTATION)
}

/// Returns true if the profile has any destination overrides.
pub fn has_overrides(profile: &ServiceProfile) -> bool {
    profile
        .spec
        .dst_overrides
        .as_ref()
        .is_some_and(|dsts| !dsts.is_empty())
}

/// Compares two profiles for convergence.
///
/// Profiles are equivalent when they have the same name and namespace and
/// their overrides hold the same authority/weight pairs, in any order.
/// Weights are compared as exact strings.
pub fn is_equivalent(a: &ServiceProfile, b: &ServiceProfile) -> bool {
    if a.metadata.name != b.metadata.name || a.metadata.namespace != b.metadata.namespace {
        return false;
    }

    let a = a.spec.dst_overrides.as_deref().unwrap_or_default();
    let b = b.spec.dst_overrides.as_deref().unwrap_or_default();
    if a.len() != b.len() {
        return false;
    }

    let a_weights = weights(a);
    let b_weights = weights(b);
    a_weights.len() == b_weights.len()
        && a_weights
            .iter()
            .all(|(authority, weight)| b_weights.get(authority) == Some(weight))
}

fn weights(dsts: &[WeightedDst]) -> HashMap<&str, &Quantity> {
    dsts.iter()
        .map(|dst| (dst.authority.as_str(), &dst.weight))
        .collect()
}
