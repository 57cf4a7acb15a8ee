//! Goop kubehub: the Kubernetes-backed [`ResourceStore`], DaemonSet rendering
//! for child workloads and the CRD manifest.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use async_trait::async_trait;
use goop_core::{ChildWorkload, Goop, ObjectKey, WorkloadDescriptor};
use goop_store::{ResourceStore, StoreError, StoreResult};
use k8s_openapi::api::apps::v1::DaemonSet;
use kube::{
    api::{Api, PostParams},
    Client, CustomResourceExt,
};
use metrics::counter;
use tracing::debug;

mod daemonset;

pub use daemonset::{daemonset_for, DEFAULT_PAUSE_IMAGE};

/// Default kube client from kubeconfig or in-cluster environment.
pub async fn client() -> Result<Client> {
    Client::try_default().await.context("building kube client (kubeconfig or in-cluster)")
}

/// CRD manifest for `Goop` as YAML.
pub fn crd_yaml() -> Result<String> {
    serde_yaml::to_string(&Goop::crd()).context("rendering Goop CRD")
}

fn store_error(kind: &'static str, key: &ObjectKey, err: kube::Error) -> StoreError {
    let mapped = match err {
        kube::Error::Api(ae) => match ae.code {
            404 => StoreError::not_found(kind, key),
            409 if ae.reason == "AlreadyExists" => StoreError::AlreadyExists { kind, key: key.to_string() },
            409 => StoreError::conflict(key, ae.message),
            429 | 500..=599 => StoreError::Transient(format!("{} ({})", ae.message, ae.code)),
            code => StoreError::Api { code, message: ae.message },
        },
        other => StoreError::Transient(other.to_string()),
    };
    counter!("goop_store_errors_total", 1u64, "kind" => mapped.kind());
    mapped
}

/// [`ResourceStore`] over the Kubernetes API: `Goop` objects plus DaemonSets
/// as child workloads.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    pause_image: String,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client, pause_image: DEFAULT_PAUSE_IMAGE.to_string() }
    }

    pub fn with_pause_image(mut self, image: impl Into<String>) -> Self {
        self.pause_image = image.into();
        self
    }

    fn goops(&self, ns: &str) -> Api<Goop> { Api::namespaced(self.client.clone(), ns) }
    fn daemonsets(&self, ns: &str) -> Api<DaemonSet> { Api::namespaced(self.client.clone(), ns) }
}

fn key_of(goop: &Goop) -> StoreResult<ObjectKey> {
    goop.key().map_err(|e| StoreError::Api { code: 422, message: e.to_string() })
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get(&self, key: &ObjectKey) -> StoreResult<Goop> {
        self.goops(&key.namespace).get(&key.name).await.map_err(|e| store_error("Goop", key, e))
    }

    async fn update(&self, goop: &Goop) -> StoreResult<Goop> {
        let key = key_of(goop)?;
        debug!(%key, "replacing goop metadata/spec");
        self.goops(&key.namespace)
            .replace(&key.name, &PostParams::default(), goop)
            .await
            .map_err(|e| store_error("Goop", &key, e))
    }

    async fn update_status(&self, goop: &Goop) -> StoreResult<Goop> {
        let key = key_of(goop)?;
        let body = serde_json::to_vec(goop)
            .map_err(|e| StoreError::Api { code: 400, message: format!("encoding goop status: {e}") })?;
        debug!(%key, "replacing goop status");
        self.goops(&key.namespace)
            .replace_status(&key.name, &PostParams::default(), body)
            .await
            .map_err(|e| store_error("Goop", &key, e))
    }

    async fn get_workload(&self, key: &ObjectKey) -> StoreResult<ChildWorkload> {
        let ds = self
            .daemonsets(&key.namespace)
            .get(&key.name)
            .await
            .map_err(|e| store_error("DaemonSet", key, e))?;
        Ok(observed_rollout(&ds))
    }

    async fn create_workload(&self, desc: &WorkloadDescriptor) -> StoreResult<()> {
        let ds = daemonset_for(desc, &self.pause_image);
        debug!(namespace = %desc.key.namespace, name = %desc.key.name, pause = %self.pause_image, "posting daemonset");
        self.daemonsets(&desc.key.namespace)
            .create(&PostParams::default(), &ds)
            .await
            .map_err(|e| store_error("DaemonSet", &desc.key, e))?;
        Ok(())
    }
}

/// Rollout counts of a DaemonSet. Status published for an older generation
/// (or not at all) is reported as unobserved.
pub fn observed_rollout(ds: &DaemonSet) -> ChildWorkload {
    let Some(st) = ds.status.as_ref() else {
        return ChildWorkload::default();
    };
    let observed = match (st.observed_generation, ds.metadata.generation) {
        (Some(seen), Some(current)) => seen >= current,
        (Some(_), None) => true,
        (None, _) => false,
    };
    ChildWorkload {
        desired: st.desired_number_scheduled,
        ready: st.number_ready,
        available: st.number_available.unwrap_or(0),
        observed,
    }
}
