//! Child workload descriptor for a `Goop`.

use std::collections::BTreeMap;

use goop_core::{Goop, WorkloadDescriptor};
use kube::Resource;

use crate::{ControllerConfig, Error, Result};

/// Tag of an image reference, if it names one. Registry ports
/// (`host:5000/busybox`) and digests are not tags.
pub fn image_tag(image: &str) -> Option<&str> {
    let name = image.split('@').next().unwrap_or(image);
    let last = name.rsplit('/').next().unwrap_or(name);
    last.split_once(':').map(|(_, tag)| tag).filter(|t| !t.is_empty())
}

/// Recommended labels shared by the workload, its selector and its pods.
pub fn labels_for(name: &str, image: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), "Goop".to_string()),
        ("app.kubernetes.io/instance".to_string(), name.to_string()),
        ("app.kubernetes.io/part-of".to_string(), "goop-operator".to_string()),
        ("app.kubernetes.io/created-by".to_string(), "controller-manager".to_string()),
    ]);
    if let Some(tag) = image_tag(image) {
        labels.insert("app.kubernetes.io/version".to_string(), tag.to_string());
    }
    labels
}

pub fn descriptor_for(goop: &Goop, config: &ControllerConfig) -> Result<WorkloadDescriptor> {
    let key = goop.key()?;
    let image = goop
        .spec
        .image
        .clone()
        .filter(|s| !s.is_empty())
        .or_else(|| config.image.clone())
        .ok_or_else(|| Error::Config("no job image: set spec.image or GOOP_IMAGE".into()))?;
    let command = if goop.spec.command.is_empty() { config.job_command.clone() } else { goop.spec.command.clone() };
    let owner = goop
        .controller_owner_ref(&())
        .ok_or_else(|| Error::Precondition(format!("goop {key} has no uid; cannot own a workload")))?;
    Ok(WorkloadDescriptor {
        labels: labels_for(&key.name, &image),
        key,
        image,
        command,
        job_count: goop.spec.job_count,
        owner: Some(owner),
    })
}
