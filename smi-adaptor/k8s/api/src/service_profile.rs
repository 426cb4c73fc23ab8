use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Describes routes, retries, and destination overrides for a single
/// authority.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "linkerd.io",
    version = "v1alpha2",
    kind = "ServiceProfile",
    shortname = "sp",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceProfileSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routes: Option<Vec<RouteSpec>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_budget: Option<RetryBudget>,

    /// Weighted authorities that replace the profile's own authority as the
    /// destination of outbound traffic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_overrides: Option<Vec<WeightedDst>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opaque_ports: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct WeightedDst {
    pub authority: String,
    pub weight: Quantity,
}

/// A named route.
///
/// Request and response match trees are carried through untouched.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    pub name: String,

    pub condition: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_classes: Option<Vec<serde_json::Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_retryable: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetryBudget {
    pub retry_ratio: f32,
    pub min_retries_per_second: u32,
    pub ttl: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_routes_and_overrides() {
        let spec: ServiceProfileSpec = serde_yaml::from_str(
            r#"
routes:
  - name: GET /books
    condition:
      method: GET
      pathRegex: /books
    isRetryable: true
retryBudget:
  retryRatio: 0.2
  minRetriesPerSecond: 10
  ttl: 10s
dstOverrides:
  - authority: books-v1.default.svc.cluster.local
    weight: 500m
  - authority: books-v2.default.svc.cluster.local
    weight: 500m
"#,
        )
        .expect("profile must parse");

        let routes = spec.routes.as_deref().expect("routes must be set");
        assert_eq!(routes[0].name, "GET /books");
        assert_eq!(routes[0].condition["pathRegex"], "/books");
        assert_eq!(routes[0].is_retryable, Some(true));

        let dsts = spec.dst_overrides.as_deref().expect("overrides must be set");
        assert_eq!(
            dsts[1],
            WeightedDst {
                authority: "books-v2.default.svc.cluster.local".to_string(),
                weight: Quantity("500m".to_string()),
            }
        );
    }

    #[test]
    fn omits_cleared_overrides() {
        let spec = ServiceProfileSpec {
            dst_overrides: None,
            ..Default::default()
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }
}
