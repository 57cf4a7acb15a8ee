//! DaemonSet rendering: the job runs as an init container on every node, a
//! pause container keeps the pod scheduled afterwards.

use std::collections::BTreeMap;

use goop_core::WorkloadDescriptor;
use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec, DaemonSetUpdateStrategy};
use k8s_openapi::api::core::v1::{
    Capabilities, Container, PodSecurityContext, PodSpec, PodTemplateSpec, ResourceRequirements,
    SeccompProfile, SecurityContext,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

pub const DEFAULT_PAUSE_IMAGE: &str = "registry.k8s.io/pause:3.9";

const JOB_CONTAINER: &str = "goop-job";
const RUN_AS_USER: i64 = 1001;

fn resources(cpu_limit: &str, cpu_request: &str) -> ResourceRequirements {
    let q = |s: &str| Quantity(s.to_string());
    ResourceRequirements {
        limits: Some(BTreeMap::from([("cpu".to_string(), q(cpu_limit)), ("memory".to_string(), q("128Mi"))])),
        requests: Some(BTreeMap::from([("cpu".to_string(), q(cpu_request)), ("memory".to_string(), q("64Mi"))])),
        ..Default::default()
    }
}

fn restricted() -> SecurityContext {
    SecurityContext {
        run_as_non_root: Some(true),
        run_as_user: Some(RUN_AS_USER),
        allow_privilege_escalation: Some(false),
        capabilities: Some(Capabilities { drop: Some(vec!["ALL".to_string()]), ..Default::default() }),
        ..Default::default()
    }
}

pub fn daemonset_for(desc: &WorkloadDescriptor, pause_image: &str) -> DaemonSet {
    let job = Container {
        name: JOB_CONTAINER.to_string(),
        image: Some(desc.image.clone()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        command: Some(desc.command.clone()),
        resources: Some(resources("100m", "10m")),
        security_context: Some(restricted()),
        ..Default::default()
    };
    let pause = Container {
        name: "pause".to_string(),
        image: Some(pause_image.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        resources: Some(resources("50m", "10m")),
        security_context: Some(restricted()),
        ..Default::default()
    };
    DaemonSet {
        metadata: ObjectMeta {
            name: Some(desc.key.name.clone()),
            namespace: Some(desc.key.namespace.clone()),
            labels: Some(desc.labels.clone()),
            owner_references: desc.owner.clone().map(|o| vec![o]),
            ..Default::default()
        },
        spec: Some(DaemonSetSpec {
            update_strategy: Some(DaemonSetUpdateStrategy { type_: Some("OnDelete".to_string()), ..Default::default() }),
            selector: LabelSelector { match_labels: Some(desc.labels.clone()), ..Default::default() },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta { labels: Some(desc.labels.clone()), ..Default::default() }),
                spec: Some(PodSpec {
                    security_context: Some(PodSecurityContext {
                        run_as_non_root: Some(true),
                        seccomp_profile: Some(SeccompProfile { type_: "RuntimeDefault".to_string(), ..Default::default() }),
                        ..Default::default()
                    }),
                    init_containers: Some(vec![job]),
                    containers: vec![pause],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}
