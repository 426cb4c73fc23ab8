use crate::Error;
use anyhow::{Context, Result};
use kube::runtime::reflector::{ObjectRef, Store};
use linkerd_smi_adaptor_core::{fqdn, profile, SplitKey};
use linkerd_smi_adaptor_k8s_api::{
    Api, Client, PostParams, ResourceExt, ServiceProfile, TrafficSplit,
};
use std::{future::Future, sync::Arc};
use tokio::time;
use tracing::{debug, info};

const FIELD_MANAGER: &str = "smi-adaptor";

/// Reads and writes ServiceProfiles.
///
/// Not-found reads are reported as `Ok(None)`; every error is treated as
/// transient by the caller.
#[async_trait::async_trait]
pub trait ProfileClient: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ServiceProfile>>;

    async fn create(&self, namespace: &str, profile: &ServiceProfile) -> Result<()>;

    async fn replace(&self, namespace: &str, profile: &ServiceProfile) -> Result<()>;
}

/// A [`ProfileClient`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeProfiles {
    client: Client,
    timeout: time::Duration,
    params: PostParams,
}

/// Converges the ServiceProfile for a single TrafficSplit key.
pub struct Reconciler<C> {
    splits: Store<TrafficSplit>,
    profiles: C,
    cluster_domain: String,
}

/// The result of a successful reconciliation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// A new ServiceProfile was created for the split.
    Created,
    /// An existing ServiceProfile's overrides were replaced.
    Updated,
    /// The ServiceProfile already matched the split.
    InSync,
    /// The ServiceProfile carries the skip annotation and was left alone.
    Skipped,
    /// The split is gone and its ServiceProfile's overrides were removed.
    Cleared,
    /// The split is gone and there was nothing to clear.
    AlreadyClean,
}

// === impl KubeProfiles ===

impl KubeProfiles {
    pub fn new(client: Client, timeout: time::Duration) -> Self {
        Self {
            client,
            timeout,
            params: PostParams {
                field_manager: Some(FIELD_MANAGER.to_string()),
                ..Default::default()
            },
        }
    }

    fn api(&self, namespace: &str) -> Api<ServiceProfile> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn with_timeout<T>(
        &self,
        fut: impl Future<Output = Result<T, kube::Error>>,
    ) -> Result<T, Error> {
        time::timeout(self.timeout, fut)
            .await
            .map_err(|_| Error::Timeout(self.timeout))?
            .map_err(Into::into)
    }
}

#[async_trait::async_trait]
impl ProfileClient for KubeProfiles {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ServiceProfile>> {
        let profile = self
            .with_timeout(self.api(namespace).get_opt(name))
            .await
            .with_context(|| format!("failed to get ServiceProfile {namespace}/{name}"))?;
        Ok(profile)
    }

    async fn create(&self, namespace: &str, profile: &ServiceProfile) -> Result<()> {
        self.with_timeout(self.api(namespace).create(&self.params, profile))
            .await
            .with_context(|| {
                format!(
                    "failed to create ServiceProfile {namespace}/{}",
                    profile.name_any()
                )
            })?;
        Ok(())
    }

    async fn replace(&self, namespace: &str, profile: &ServiceProfile) -> Result<()> {
        let name = profile.name_any();
        self.with_timeout(self.api(namespace).replace(&name, &self.params, profile))
            .await
            .with_context(|| format!("failed to update ServiceProfile {namespace}/{name}"))?;
        Ok(())
    }
}

// === impl Reconciler ===

impl<C: ProfileClient> Reconciler<C> {
    pub fn new(splits: Store<TrafficSplit>, profiles: C, cluster_domain: impl Into<String>) -> Self {
        Self {
            splits,
            profiles,
            cluster_domain: cluster_domain.into(),
        }
    }

    pub async fn reconcile(&self, key: &SplitKey) -> Result<Outcome> {
        let split = self
            .splits
            .get(&ObjectRef::new(&key.name).within(&key.namespace));
        match split {
            Some(split) if split.spec.service == key.service => {
                self.converge(&key.namespace, &split).await
            }
            Some(split) => {
                debug!(
                    service = %split.spec.service,
                    "TrafficSplit no longer targets {}",
                    key.service
                );
                self.release(key).await
            }
            None => self.release(key).await,
        }
    }

    /// Handles a key whose split no longer claims the key's root service.
    ///
    /// If another live split in the namespace targets the same root service,
    /// the profile is converged to that split instead of being cleared.
    async fn release(&self, key: &SplitKey) -> Result<Outcome> {
        match self.claimant(key) {
            Some(split) => {
                debug!(
                    split = %split.name_any(),
                    "ServiceProfile is still claimed by another TrafficSplit"
                );
                self.converge(&key.namespace, &split).await
            }
            None => self.clean_up(key).await,
        }
    }

    /// Finds a live split, other than the key's own, that targets the key's
    /// root service. Ties are broken by name.
    fn claimant(&self, key: &SplitKey) -> Option<Arc<TrafficSplit>> {
        self.splits
            .state()
            .into_iter()
            .filter(|split| {
                split.spec.service == key.service
                    && split.name_any() != key.name
                    && split.namespace().as_deref() == Some(key.namespace.as_str())
            })
            .min_by_key(|split| split.name_any())
    }

    /// Creates or updates the split's ServiceProfile so that its overrides
    /// match the split's backends.
    async fn converge(&self, namespace: &str, split: &TrafficSplit) -> Result<Outcome> {
        let desired = profile::desired(split, namespace, &self.cluster_domain);
        let name = desired.name_any();

        let Some(mut profile) = self.profiles.get(namespace, &name).await? else {
            self.profiles.create(namespace, &desired).await?;
            info!(%namespace, %name, "Created ServiceProfile");
            return Ok(Outcome::Created);
        };

        if profile::is_skipped(&profile) {
            info!(%namespace, %name, "ServiceProfile is marked to be skipped");
            return Ok(Outcome::Skipped);
        }

        if profile::is_equivalent(&profile, &desired) {
            debug!(%namespace, %name, "ServiceProfile already in sync");
            return Ok(Outcome::InSync);
        }

        profile.spec.dst_overrides = desired.spec.dst_overrides;
        self.profiles.replace(namespace, &profile).await?;
        info!(%namespace, %name, "Updated ServiceProfile");
        Ok(Outcome::Updated)
    }

    /// Removes the overrides from the ServiceProfile of a split that no longer
    /// exists. The profile itself is never deleted.
    async fn clean_up(&self, key: &SplitKey) -> Result<Outcome> {
        let namespace = &key.namespace;
        let name = fqdn(&key.service, namespace, &self.cluster_domain);

        let Some(mut profile) = self.profiles.get(namespace, &name).await? else {
            debug!(%namespace, %name, "No ServiceProfile to clean up");
            return Ok(Outcome::AlreadyClean);
        };

        if profile::is_skipped(&profile) {
            info!(%namespace, %name, "ServiceProfile is marked to be skipped");
            return Ok(Outcome::Skipped);
        }

        if !profile::has_overrides(&profile) {
            debug!(%namespace, %name, "ServiceProfile has no overrides");
            return Ok(Outcome::AlreadyClean);
        }

        profile.spec.dst_overrides = None;
        self.profiles.replace(namespace, &profile).await?;
        info!(%namespace, %name, "Cleared ServiceProfile overrides");
        Ok(Outcome::Cleared)
    }
}

// === impl Outcome ===

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::InSync => "in_sync",
            Self::Skipped => "skipped",
            Self::Cleared => "cleared",
            Self::AlreadyClean => "already_clean",
        }
    }
}
