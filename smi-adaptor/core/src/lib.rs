#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod key;
pub mod profile;

pub use self::key::{InvalidKey, SplitKey};

pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

/// Expands a service name into its fully-qualified cluster DNS name.
pub fn fqdn(service: &str, namespace: &str, cluster_domain: &str) -> String {
    format!("{service}.{namespace}.svc.{cluster_domain}")
}

#[cfg(test)]
mod tests {
    #[test]
    fn fqdn() {
        assert_eq!(
            super::fqdn("books", "bookapp", "cluster.local"),
            "books.bookapp.svc.cluster.local"
        );
        assert_eq!(
            super::fqdn("books", "bookapp", "example.org"),
            "books.bookapp.svc.example.org"
        );
    }
}
