use linkerd_smi_adaptor_k8s_api::{ResourceExt, TrafficSplit};
use std::{fmt, str::FromStr};

/// Identifies a TrafficSplit along with the root service it applied to when
/// the key was produced.
///
/// Encoded as `<namespace>/<name>/<service>`. The service is carried in the
/// key so that the profile it owned can be found after the split is deleted.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SplitKey {
    pub namespace: String,
    pub name: String,
    pub service: String,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid key {0:?}: expected <namespace>/<name>/<service>")]
pub struct InvalidKey(pub String);

// === impl SplitKey ===

impl SplitKey {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            service: service.into(),
        }
    }

    /// Builds the key for a TrafficSplit, if it is namespaced.
    pub fn from_split(split: &TrafficSplit) -> Option<Self> {
        let namespace = split.namespace()?;
        Some(Self::new(
            namespace,
            split.name_any(),
            split.spec.service.clone(),
        ))
    }
}

impl fmt::Display for SplitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.name, self.service)
    }
}

impl FromStr for SplitKey {
    type Err = InvalidKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(ns), Some(name), Some(svc), None)
                if !ns.is_empty() && !name.is_empty() && !svc.is_empty() =>
            {
                Ok(Self::new(ns, name, svc))
            }
            _ => Err(InvalidKey(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkerd_smi_adaptor_k8s_api::{ObjectMeta, TrafficSplitSpec};

    #[test]
    fn parses_display_form() {
        let key = SplitKey::new("bookapp", "books-split", "books");
        assert_eq!(key.to_string(), "bookapp/books-split/books");
        assert_eq!("bookapp/books-split/books".parse::<SplitKey>(), Ok(key));
    }

    #[test]
    fn rejects_malformed() {
        for s in [
            "",
            "bookapp",
            "bookapp/books-split",
            "bookapp/books-split/books/extra",
            "bookapp//books",
            "/books-split/books",
            "bookapp/books-split/",
        ] {
            assert_eq!(
                s.parse::<SplitKey>(),
                Err(InvalidKey(s.to_string())),
                "{s:?} must not parse"
            );
        }
    }

    #[test]
    fn from_split() {
        let split = TrafficSplit {
            metadata: ObjectMeta {
                namespace: Some("bookapp".to_string()),
                name: Some("books-split".to_string()),
                ..Default::default()
            },
            spec: TrafficSplitSpec {
                service: "books".to_string(),
                backends: vec![],
            },
        };
        assert_eq!(
            SplitKey::from_split(&split),
            Some(SplitKey::new("bookapp", "books-split", "books"))
        );

        let cluster_scoped = TrafficSplit {
            metadata: ObjectMeta {
                name: Some("books-split".to_string()),
                ..Default::default()
            },
            ..split
        };
        assert_eq!(SplitKey::from_split(&cluster_scoped), None);
    }
}
