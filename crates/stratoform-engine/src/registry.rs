//! Resource type registry
//!
//! One [`ResourceTypeDescriptor`] per resource type, assembled once at
//! process start. Schema validation happens here; a malformed descriptor
//! aborts registry construction instead of failing at apply time. The
//! built registry is immutable and shared across operations.

use crate::error::{EngineError, Result};
use crate::handler::LifecycleHandler;
use crate::import::ImportSpec;
use crate::reconcile::SubResourceReconciler;
use serde_json::{json, Value as Json};
use std::collections::BTreeMap;
use std::sync::Arc;
use stratoform_core::{AttributeMap, ChangeSet, Diagnostics, FieldKind, Schema, Timeouts};

/// Optional cross-field diff hook; may mark additional fields as changed
/// or emit validation diagnostics.
pub type CustomDiff =
    Arc<dyn Fn(&AttributeMap, &AttributeMap, &mut ChangeSet) -> Diagnostics + Send + Sync>;

/// Everything the engine knows about one resource type.
pub struct ResourceTypeDescriptor {
    pub name: String,
    pub schema: Schema,
    pub timeouts: Timeouts,
    pub handler: Arc<dyn LifecycleHandler>,
    pub reconcilers: Vec<Arc<dyn SubResourceReconciler>>,
    pub importer: Option<ImportSpec>,
    pub custom_diff: Option<CustomDiff>,
}

impl ResourceTypeDescriptor {
    pub fn new(
        name: impl Into<String>,
        schema: Schema,
        handler: Arc<dyn LifecycleHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            schema,
            timeouts: Timeouts::default(),
            handler,
            reconcilers: Vec::new(),
            importer: None,
            custom_diff: None,
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_reconciler(mut self, reconciler: Arc<dyn SubResourceReconciler>) -> Self {
        self.reconcilers.push(reconciler);
        self
    }

    pub fn with_importer(mut self, importer: ImportSpec) -> Self {
        self.importer = Some(importer);
        self
    }

    pub fn with_custom_diff(mut self, custom_diff: CustomDiff) -> Self {
        self.custom_diff = Some(custom_diff);
        self
    }

    /// JSON schema description exported to the host.
    pub fn describe(&self) -> Json {
        let mut fields = BTreeMap::new();
        for (name, spec) in self.schema.iter() {
            fields.insert(
                name.clone(),
                json!({
                    "kind": kind_name(&spec.kind),
                    "required": spec.required,
                    "optional": spec.optional,
                    "computed": spec.computed,
                    "force_new": spec.force_new,
                    "sensitive": spec.sensitive,
                    "description": spec.description,
                }),
            );
        }
        json!({
            "name": self.name,
            "fields": fields,
            "importable": self.importer.is_some(),
        })
    }
}

fn kind_name(kind: &FieldKind) -> String {
    format!("{:?}", kind)
}

/// Immutable mapping from type name to descriptor.
pub struct ProviderRegistry {
    types: BTreeMap<String, Arc<ResourceTypeDescriptor>>,
}

impl ProviderRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            descriptors: Vec::new(),
        }
    }

    pub fn descriptor(&self, type_name: &str) -> Result<Arc<ResourceTypeDescriptor>> {
        self.types
            .get(type_name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownType(type_name.to_string()))
    }

    pub fn type_names(&self) -> impl Iterator<Item = &String> {
        self.types.keys()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Schema descriptions for every registered type.
    pub fn describe(&self) -> Json {
        Json::Array(self.types.values().map(|d| d.describe()).collect())
    }
}

pub struct RegistryBuilder {
    descriptors: Vec<ResourceTypeDescriptor>,
}

impl RegistryBuilder {
    pub fn register(mut self, descriptor: ResourceTypeDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Validate every descriptor and freeze the registry.
    pub fn build(self) -> Result<ProviderRegistry> {
        let mut types = BTreeMap::new();
        for descriptor in self.descriptors {
            descriptor.schema.check(&descriptor.name)?;
            if descriptor.importer.is_some() && descriptor.schema.get("id").is_none() {
                return Err(EngineError::ImporterWithoutId(descriptor.name));
            }
            let name = descriptor.name.clone();
            if types.insert(name.clone(), Arc::new(descriptor)).is_some() {
                return Err(EngineError::DuplicateType(name));
            }
        }
        tracing::debug!(types = types.len(), "provider registry built");
        Ok(ProviderRegistry { types })
    }
}
