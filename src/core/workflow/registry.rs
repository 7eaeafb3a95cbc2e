use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::workflows::{DetectSourcesWorkflow, HandleRequestWorkflow, ValidateSiloWorkflow};
use super::{Workflow, WorkflowError, WorkflowKind};

/// Workflow implementations by kind. Built once at startup and handed to the
/// engine; never mutated afterwards.
#[derive(Clone)]
pub struct Registry {
    workflows: HashMap<WorkflowKind, Arc<dyn Workflow>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Every workflow the worker ships with.
    pub fn standard() -> Self {
        Self::builder()
            .register(ValidateSiloWorkflow)
            .register(DetectSourcesWorkflow)
            .register(HandleRequestWorkflow)
            .build()
    }

    pub fn get(&self, kind: WorkflowKind) -> Result<Arc<dyn Workflow>, WorkflowError> {
        self.workflows
            .get(&kind)
            .cloned()
            .ok_or(WorkflowError::Unregistered(kind))
    }

    pub fn kinds(&self) -> Vec<WorkflowKind> {
        let mut kinds: Vec<WorkflowKind> = self.workflows.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    workflows: HashMap<WorkflowKind, Arc<dyn Workflow>>,
}

impl RegistryBuilder {
    pub fn register<W: Workflow + 'static>(mut self, workflow: W) -> Self {
        let kind = workflow.kind();
        if self.workflows.insert(kind, Arc::new(workflow)).is_some() {
            warn!("Workflow {} registered twice, keeping the last one", kind);
        }
        self
    }

    pub fn build(self) -> Registry {
        let registry = Registry {
            workflows: self.workflows,
        };
        info!(
            "Registered workflows: {}",
            registry
                .kinds()
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        registry
    }
}
