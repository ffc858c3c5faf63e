//! # Postman Module
//!
//! Postman runtime executing `POSTMAN` conformance tests on behalf of the
//! core service.

use super::common::{
    container, deployment, deployment_ready, dynamic, env, metadata, selector_labels, service,
};
use crate::compose::ResolvedSpec;
use crate::constants::POSTMAN_HTTP_PORT;
use crate::crd::Microcks;
use crate::store::kinds;
use crate::workflow::{FnProducer, Module, ModuleWorkflow};
use kube::api::DynamicObject;
use kube::ResourceExt;

const COMPONENT: &str = "postman";

#[must_use]
pub fn postman_name(instance: &str) -> String {
    format!("{instance}-postman-runtime")
}

pub fn workflow() -> ModuleWorkflow {
    ModuleWorkflow::new(Module::Postman)
        .producer(FnProducer::new(
            "postman-deployment",
            kinds::deployment,
            postman_name,
            postman_deployment,
        ))
        .producer(FnProducer::new(
            "postman-service",
            kinds::service,
            postman_name,
            postman_service,
        ))
        .ready_when("postman-deployment", deployment_ready)
}

fn postman_deployment(
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> anyhow::Result<Option<DynamicObject>> {
    let instance = primary.name_any();
    let postman = resolved.postman();
    let name = postman_name(&instance);
    dynamic(&deployment(
        metadata(resolved, primary, &name, COMPONENT),
        selector_labels(&instance, COMPONENT),
        postman.replicas.unwrap_or(1),
        container(
            "postman-runtime",
            postman.image.clone().unwrap_or_default().reference(),
            &[("http", POSTMAN_HTTP_PORT)],
            vec![env("LOG_LEVEL", "info")],
            postman.resources.clone(),
        ),
        Vec::new(),
        false,
    ))
}

fn postman_service(
    resolved: &ResolvedSpec,
    primary: &Microcks,
) -> anyhow::Result<Option<DynamicObject>> {
    let instance = primary.name_any();
    let name = postman_name(&instance);
    dynamic(&service(
        metadata(resolved, primary, &name, COMPONENT),
        selector_labels(&instance, COMPONENT),
        &[("http", POSTMAN_HTTP_PORT)],
    ))
}
