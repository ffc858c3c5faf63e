use super::{ManagedResourceProducer, Module, ModuleResult};
use crate::compose::ResolvedSpec;
use crate::crd::Microcks;
use crate::observability::metrics;
use crate::store::ResourceStore;
use kube::api::DynamicObject;
use kube::ResourceExt;
use tracing::{debug, info_span, warn, Instrument};

/// Readiness check evaluated against one producer's actual object
#[derive(Debug, Clone, Copy)]
pub struct ReadyPostcondition {
    pub producer_id: &'static str,
    pub check: fn(&DynamicObject) -> bool,
}

pub struct ModuleWorkflow {
    pub module: Module,
    pub producers: Vec<Box<dyn ManagedResourceProducer>>,
    pub install_precondition: Option<fn(&ResolvedSpec) -> bool>,
    pub ready_postcondition: Option<ReadyPostcondition>,
}

impl std::fmt::Debug for ModuleWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleWorkflow")
            .field("module", &self.module)
            .field(
                "producers",
                &self.producers.iter().map(|p| p.id()).collect::<Vec<_>>(),
            )
            .field("install_precondition", &self.install_precondition.is_some())
            .field("ready_postcondition", &self.ready_postcondition)
            .finish()
    }
}

impl ModuleWorkflow {
    #[must_use]
    pub fn new(module: Module) -> Self {
        Self {
            module,
            producers: Vec::new(),
            install_precondition: None,
            ready_postcondition: None,
        }
    }

    #[must_use]
    pub fn producer(mut self, producer: impl ManagedResourceProducer + 'static) -> Self {
        self.producers.push(Box::new(producer));
        self
    }

    #[must_use]
    pub fn installed_when(mut self, precondition: fn(&ResolvedSpec) -> bool) -> Self {
        self.install_precondition = Some(precondition);
        self
    }

    #[must_use]
    pub fn ready_when(
        mut self,
        producer_id: &'static str,
        check: fn(&DynamicObject) -> bool,
    ) -> Self {
        self.ready_postcondition = Some(ReadyPostcondition { producer_id, check });
        self
    }

    #[must_use]
    pub fn is_installed(&self, resolved: &ResolvedSpec) -> bool {
        self.install_precondition
            .map_or(true, |precondition| precondition(resolved))
    }

    /// Converge every producer of the module and evaluate its readiness
    pub async fn reconcile(
        &self,
        store: &dyn ResourceStore,
        resolved: &ResolvedSpec,
        primary: &Microcks,
    ) -> ModuleResult {
        let span = info_span!(
            "workflow.module",
            module = self.module.as_str(),
            resource.name = %primary.name_any()
        );
        self.run(store, resolved, primary).instrument(span).await
    }

    async fn run(
        &self,
        store: &dyn ResourceStore,
        resolved: &ResolvedSpec,
        primary: &Microcks,
    ) -> ModuleResult {
        if !self.is_installed(resolved) {
            debug!("Module {} not installed, skipping", self.module);
            return ModuleResult::not_installed(self.module);
        }

        let namespace = primary.namespace().unwrap_or_default();
        let mut result = ModuleResult {
            installed: true,
            ..ModuleResult::not_installed(self.module)
        };

        for producer in &self.producers {
            let kind = producer.api_resource();
            let actual = if producer.reads_actual() {
                match store
                    .get(&kind, &producer.secondary_name(primary), &namespace)
                    .await
                {
                    Ok(actual) => actual,
                    Err(e) => {
                        warn!("Producer {} cannot read its current object: {}", producer.id(), e);
                        result.errored.insert(producer.id().to_string(), e.to_string());
                        continue;
                    }
                }
            } else {
                None
            };

            let desired = match producer.desired(resolved, primary, actual.as_ref()) {
                Ok(Some(desired)) => desired,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Producer {} failed to build its object: {:#}", producer.id(), e);
                    result
                        .errored
                        .insert(producer.id().to_string(), format!("{e:#}"));
                    continue;
                }
            };

            match store
                .create_or_update(&kind, &desired, producer.update_policy())
                .await
            {
                Ok(applied) => {
                    metrics::increment_resource_applies(&kind.kind, applied.change.as_str());
                    result.produced_ok.insert(producer.id().to_string());
                }
                Err(e) => {
                    warn!(
                        "Failed to converge {} {}/{}: {}",
                        kind.kind,
                        namespace,
                        producer.secondary_name(primary),
                        e
                    );
                    result.errored.insert(producer.id().to_string(), e.to_string());
                }
            }
        }

        let postcondition_holds = match &self.ready_postcondition {
            None => true,
            Some(postcondition) => {
                let holds = self
                    .evaluate_postcondition(store, primary, &namespace, postcondition)
                    .await;
                if !holds {
                    result
                        .not_ready
                        .insert(postcondition.producer_id.to_string());
                }
                holds
            }
        };

        result.ready = result.errored.is_empty() && postcondition_holds;
        metrics::set_module_ready(
            self.module.as_str(),
            &namespace,
            &primary.name_any(),
            result.ready,
        );
        result
    }

    async fn evaluate_postcondition(
        &self,
        store: &dyn ResourceStore,
        primary: &Microcks,
        namespace: &str,
        postcondition: &ReadyPostcondition,
    ) -> bool {
        let Some(producer) = self
            .producers
            .iter()
            .find(|p| p.id() == postcondition.producer_id)
        else {
            warn!(
                "Module {} names unknown postcondition producer {}",
                self.module, postcondition.producer_id
            );
            return false;
        };

        let name = producer.secondary_name(primary);
        match store.get(&producer.api_resource(), &name, namespace).await {
            Ok(Some(actual)) => (postcondition.check)(&actual),
            Ok(None) => false,
            Err(e) => {
                warn!("Failed to read {} for readiness: {}", name, e);
                false
            }
        }
    }
}
