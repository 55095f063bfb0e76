//! Operation dispatch
//!
//! The host-facing entry point. For each `(resource type, verb, prior,
//! desired)` tuple this module owns the uniform lifecycle obligations:
//! coercion, change-set computation, force-new refusal, reconciler
//! invocation, read-after-write merge, and the diagnostics policy of the
//! error taxonomy. Handlers only drive their own remote API.

use crate::context::OperationContext;
use crate::error::EngineError;
use crate::instance::ResourceInstance;
use crate::reconcile::run_reconciler;
use crate::registry::{ProviderRegistry, ResourceTypeDescriptor};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Arc;
use stratoform_client::ClientFactory;
use stratoform_core::{
    coerce, coerce_loose, diff, AttributeMap, Diagnostic, Diagnostics, ErrorKind, OperationVerb,
    Schema, Timeouts,
};
use tokio_util::sync::CancellationToken;

/// One operation the host asks the engine to perform.
pub struct OperationRequest {
    pub type_name: String,
    pub verb: OperationVerb,
    /// Desired attributes (Create/Update); ignored for Read/Delete
    pub desired: Json,
    /// Last persisted state (Read/Update/Delete)
    pub prior: Option<Json>,
    /// Remote id of the prior state when the schema does not carry one
    pub prior_id: Option<String>,
    /// Composite identifier for Import
    pub import_id: Option<String>,
    /// Per-operation timeout override
    pub timeouts: Option<Timeouts>,
    /// Engine-only scratch persisted by the host
    pub private: HashMap<String, String>,
    pub cancel: CancellationToken,
}

impl OperationRequest {
    fn bare(type_name: impl Into<String>, verb: OperationVerb) -> Self {
        Self {
            type_name: type_name.into(),
            verb,
            desired: Json::Null,
            prior: None,
            prior_id: None,
            import_id: None,
            timeouts: None,
            private: HashMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn create(type_name: impl Into<String>, desired: Json) -> Self {
        Self {
            desired,
            ..Self::bare(type_name, OperationVerb::Create)
        }
    }

    pub fn read(type_name: impl Into<String>, prior: Json) -> Self {
        Self {
            prior: Some(prior),
            ..Self::bare(type_name, OperationVerb::Read)
        }
    }

    pub fn update(type_name: impl Into<String>, prior: Json, desired: Json) -> Self {
        Self {
            desired,
            prior: Some(prior),
            ..Self::bare(type_name, OperationVerb::Update)
        }
    }

    pub fn delete(type_name: impl Into<String>, prior: Json) -> Self {
        Self {
            prior: Some(prior),
            ..Self::bare(type_name, OperationVerb::Delete)
        }
    }

    pub fn import(type_name: impl Into<String>, import_id: impl Into<String>) -> Self {
        Self {
            import_id: Some(import_id.into()),
            ..Self::bare(type_name, OperationVerb::Import)
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }
}

/// The `(new state, diagnostics)` pair handed back to the host.
#[derive(Debug)]
pub struct OperationOutcome {
    pub id: String,
    pub attributes: Json,
    pub private: HashMap<String, String>,
    pub diagnostics: Diagnostics,
}

impl OperationOutcome {
    pub fn is_success(&self) -> bool {
        !self.diagnostics.has_errors()
    }

    fn failed(diag: Diagnostic) -> Self {
        Self {
            id: String::new(),
            attributes: Json::Object(Default::default()),
            private: HashMap::new(),
            diagnostics: Diagnostics::from(diag),
        }
    }
}

/// The reconciliation engine. Cheap to clone; the registry is shared and
/// immutable.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<ProviderRegistry>,
}

impl Engine {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Execute one operation with a factory scoped to this invocation.
    pub async fn execute(
        &self,
        factory: Arc<ClientFactory>,
        request: OperationRequest,
    ) -> OperationOutcome {
        let descriptor = match self.registry.descriptor(&request.type_name) {
            Ok(descriptor) => descriptor,
            Err(EngineError::UnknownType(name)) => {
                return OperationOutcome::failed(Diagnostic::error(format!(
                    "Unknown resource type `{}`",
                    name
                )));
            }
            Err(other) => {
                return OperationOutcome::failed(Diagnostic::error(other.to_string()));
            }
        };

        tracing::debug!(
            resource = %request.type_name,
            verb = %request.verb,
            "dispatching operation"
        );

        match request.verb {
            OperationVerb::Create => self.run_create(factory, &descriptor, request).await,
            OperationVerb::Read => self.run_read(factory, &descriptor, request).await,
            OperationVerb::Update => self.run_update(factory, &descriptor, request).await,
            OperationVerb::Delete => self.run_delete(factory, &descriptor, request).await,
            OperationVerb::Import => self.run_import(factory, &descriptor, request).await,
        }
    }

    async fn run_create(
        &self,
        factory: Arc<ClientFactory>,
        descriptor: &ResourceTypeDescriptor,
        request: OperationRequest,
    ) -> OperationOutcome {
        let (attrs, diags) = coerce(&descriptor.schema, &request.desired);
        if diags.has_errors() {
            return OperationOutcome {
                id: String::new(),
                attributes: attrs.to_json(),
                private: request.private,
                diagnostics: diags,
            };
        }

        let mut instance = ResourceInstance::new(&descriptor.name).with_attributes(attrs);
        instance.timeouts = request.timeouts.unwrap_or(descriptor.timeouts);
        instance.private = request.private;

        let mut ctx = OperationContext::new(
            factory,
            OperationVerb::Create,
            instance,
            None,
            request.cancel,
        );
        let mut diagnostics = diags;

        if let Err(err) = descriptor.handler.create(&mut ctx).await {
            diagnostics.push(
                err.to_diagnostic(format!("Failed creating {}", descriptor.name)),
            );
            // A partially created resource still returns its id so the host
            // can track it; the next plan reads and reconciles.
            if ctx.desired.exists() {
                diagnostics.push(dangling(&descriptor.name, &ctx.desired.id));
            }
            return finish(ctx, diagnostics);
        }

        if let Err(diag) = self.post_mutation(descriptor, &mut ctx).await {
            diagnostics.push(diag);
            diagnostics.push(dangling(&descriptor.name, &ctx.desired.id));
            return finish(ctx, diagnostics);
        }

        finish(ctx, diagnostics)
    }

    async fn run_read(
        &self,
        factory: Arc<ClientFactory>,
        descriptor: &ResourceTypeDescriptor,
        request: OperationRequest,
    ) -> OperationOutcome {
        let raw_prior = request.prior.clone().unwrap_or(Json::Null);
        let (mut attrs, _) = coerce(&descriptor.schema, &raw_prior);
        hydrate_computed(&descriptor.schema, &mut attrs, &raw_prior);

        let id = resolve_id(&request, &attrs);
        let mut instance = ResourceInstance::new(&descriptor.name)
            .with_attributes(attrs)
            .with_id(id);
        instance.timeouts = request.timeouts.unwrap_or(descriptor.timeouts);
        instance.private = request.private;

        let mut ctx = OperationContext::new(
            factory,
            OperationVerb::Read,
            instance,
            None,
            request.cancel,
        );

        if !ctx.desired.exists() {
            // Nothing to refresh; the host already knows it is absent
            return finish(ctx, Diagnostics::new());
        }

        match descriptor.handler.read(&mut ctx).await {
            Ok(()) => finish(ctx, Diagnostics::new()),
            Err(err) if err.is_gone() => {
                tracing::debug!(resource = %descriptor.name, "remote object gone on read");
                ctx.desired.clear_id();
                finish(ctx, Diagnostics::new())
            }
            Err(err) => {
                let diag = err.to_diagnostic(format!("Failed reading {}", descriptor.name));
                finish(ctx, Diagnostics::from(diag))
            }
        }
    }

    async fn run_update(
        &self,
        factory: Arc<ClientFactory>,
        descriptor: &ResourceTypeDescriptor,
        request: OperationRequest,
    ) -> OperationOutcome {
        let raw_prior = request.prior.clone().unwrap_or(Json::Null);
        let (mut prior_attrs, _) = coerce(&descriptor.schema, &raw_prior);
        hydrate_computed(&descriptor.schema, &mut prior_attrs, &raw_prior);

        let (desired_attrs, diags) = coerce(&descriptor.schema, &request.desired);
        if diags.has_errors() {
            return OperationOutcome {
                id: resolve_id(&request, &prior_attrs),
                attributes: prior_attrs.to_json(),
                private: request.private,
                diagnostics: diags,
            };
        }
        let mut diagnostics = diags;

        let mut change_set = diff(&descriptor.schema, &prior_attrs, &desired_attrs);
        if let Some(custom_diff) = &descriptor.custom_diff {
            diagnostics.extend(custom_diff(&prior_attrs, &desired_attrs, &mut change_set));
            if diagnostics.has_errors() {
                return OperationOutcome {
                    id: resolve_id(&request, &prior_attrs),
                    attributes: prior_attrs.to_json(),
                    private: request.private,
                    diagnostics,
                };
            }
        }

        // Force-new invariance: refuse before any API call. The host is
        // expected to sequence Delete+Create instead.
        if change_set.requires_replace {
            let field = first_force_new_field(&descriptor.schema, &change_set);
            let mut diag = Diagnostic::error(format!(
                "Update of {} requires replacement",
                descriptor.name
            ))
            .with_detail(
                "a field marked force-new changed; this change can only be applied by \
                 destroying and re-creating the resource",
            );
            if let Some(field) = field {
                diag = diag.with_field(field);
            }
            diagnostics.push(diag);
            return OperationOutcome {
                id: resolve_id(&request, &prior_attrs),
                attributes: prior_attrs.to_json(),
                private: request.private,
                diagnostics,
            };
        }

        let id = resolve_id(&request, &prior_attrs);
        let mut desired_instance = ResourceInstance::new(&descriptor.name)
            .with_attributes(desired_attrs)
            .with_id(id.clone());
        desired_instance.timeouts = request.timeouts.unwrap_or(descriptor.timeouts);
        desired_instance.private = request.private.clone();

        let mut prior_instance = ResourceInstance::new(&descriptor.name)
            .with_attributes(prior_attrs.clone())
            .with_id(id);
        prior_instance.timeouts = desired_instance.timeouts;

        let mut ctx = OperationContext::new(
            factory,
            OperationVerb::Update,
            desired_instance,
            Some(prior_instance),
            request.cancel,
        );
        ctx.change_set = Some(change_set.clone());

        // An empty change set still runs reconcilers; sub-resource-only
        // drift needs no primary patch.
        if !change_set.is_empty() {
            if let Err(err) = descriptor.handler.update(&mut ctx).await {
                diagnostics.push(
                    err.to_diagnostic(format!("Failed updating {}", descriptor.name)),
                );
                return OperationOutcome {
                    id: ctx.desired.id.clone(),
                    attributes: prior_attrs.to_json(),
                    private: ctx.desired.private,
                    diagnostics: collect(ctx.warnings, diagnostics),
                };
            }
        }

        if let Err(diag) = self.post_mutation(descriptor, &mut ctx).await {
            diagnostics.push(diag);
            return OperationOutcome {
                id: ctx.desired.id.clone(),
                attributes: prior_attrs.to_json(),
                private: ctx.desired.private,
                diagnostics: collect(ctx.warnings, diagnostics),
            };
        }

        finish(ctx, diagnostics)
    }

    async fn run_delete(
        &self,
        factory: Arc<ClientFactory>,
        descriptor: &ResourceTypeDescriptor,
        request: OperationRequest,
    ) -> OperationOutcome {
        let raw_prior = request.prior.clone().unwrap_or(Json::Null);
        let (mut attrs, _) = coerce(&descriptor.schema, &raw_prior);
        hydrate_computed(&descriptor.schema, &mut attrs, &raw_prior);

        let id = resolve_id(&request, &attrs);
        let mut instance = ResourceInstance::new(&descriptor.name)
            .with_attributes(attrs)
            .with_id(id);
        instance.timeouts = request.timeouts.unwrap_or(descriptor.timeouts);
        instance.private = request.private;

        let mut ctx = OperationContext::new(
            factory,
            OperationVerb::Delete,
            instance,
            None,
            request.cancel,
        );

        if !ctx.desired.exists() {
            return finish(ctx, Diagnostics::new());
        }

        let retry = ctx.retry().clone();
        let mut attempt = 0u32;
        loop {
            if let Err(err) = ctx.check_cancelled() {
                let diag = err.to_diagnostic(format!("Cancelled deleting {}", descriptor.name));
                return finish(ctx, Diagnostics::from(diag));
            }
            match descriptor.handler.delete(&mut ctx).await {
                // Gone means already deleted
                Ok(()) => break,
                Err(err) if err.is_gone() => break,
                // Conflict while deleting means still-transitioning; retry
                // within the backoff budget
                Err(err)
                    if err.kind == ErrorKind::Conflict && attempt + 1 < retry.max_attempts =>
                {
                    let delay = retry.delay_for_attempt(attempt);
                    tracing::debug!(
                        resource = %descriptor.name,
                        attempt = attempt + 1,
                        "delete conflicted; still transitioning"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    let diag =
                        err.to_diagnostic(format!("Failed deleting {}", descriptor.name));
                    return finish(ctx, Diagnostics::from(diag));
                }
            }
        }

        ctx.desired.clear_id();
        finish(ctx, Diagnostics::new())
    }

    async fn run_import(
        &self,
        factory: Arc<ClientFactory>,
        descriptor: &ResourceTypeDescriptor,
        request: OperationRequest,
    ) -> OperationOutcome {
        let importer = match &descriptor.importer {
            Some(importer) => importer.clone(),
            None => {
                return OperationOutcome::failed(Diagnostic::error(format!(
                    "Resource type `{}` does not support import",
                    descriptor.name
                )));
            }
        };
        let given = request.import_id.clone().unwrap_or_default();
        let pairs = match importer.parse(&given) {
            Ok(pairs) => pairs,
            Err(diag) => return OperationOutcome::failed(diag),
        };

        // Seed every schema slot, then overlay the parsed segments.
        let (mut attrs, _) = coerce(&descriptor.schema, &Json::Object(Default::default()));
        for (field, segment) in pairs {
            attrs.set(field, segment);
        }

        let mut diagnostics = Diagnostics::new();
        let sensitive = descriptor.schema.sensitive_fields();
        if !sensitive.is_empty() {
            // Sensitive material is never encoded in an id
            diagnostics.push(
                Diagnostic::warning(format!(
                    "Imported {} has sensitive fields with unknown values",
                    descriptor.name
                ))
                .with_detail(format!(
                    "the following fields stay unset until re-supplied: {}",
                    sensitive.join(", ")
                )),
            );
        }

        let id = attrs.get_str("id").unwrap_or_default().to_string();
        let mut instance = ResourceInstance::new(&descriptor.name)
            .with_attributes(attrs)
            .with_id(id);
        instance.timeouts = request.timeouts.unwrap_or(descriptor.timeouts);
        instance.private = request.private;

        let mut ctx = OperationContext::new(
            factory,
            OperationVerb::Import,
            instance,
            None,
            request.cancel,
        );

        if let Err(err) = descriptor.handler.import(&mut ctx, &given).await {
            diagnostics.push(
                err.to_diagnostic(format!("Failed importing {}", descriptor.name)),
            );
            return finish(ctx, diagnostics);
        }

        match descriptor.handler.read(&mut ctx).await {
            Ok(()) => {
                // A path-indexed importer may carry no `id` segment; adopt
                // the one Read projected into the attributes.
                if !ctx.desired.exists() {
                    if let Some(id) = ctx.desired.attributes.get_str("id") {
                        let id = id.to_string();
                        ctx.desired.set_id(id);
                    }
                }
                if !ctx.desired.exists() {
                    diagnostics.push(import_missing(&descriptor.name, &given));
                }
                finish(ctx, diagnostics)
            }
            Err(err) if err.is_gone() => {
                diagnostics.push(import_missing(&descriptor.name, &given));
                finish(ctx, diagnostics)
            }
            Err(err) => {
                diagnostics.push(
                    err.to_diagnostic(format!("Failed reading imported {}", descriptor.name)),
                );
                finish(ctx, diagnostics)
            }
        }
    }

    /// Shared post-mutation tail: cancellation check, reconcilers, then
    /// Read to fold computed fields and remote projections back in.
    async fn post_mutation(
        &self,
        descriptor: &ResourceTypeDescriptor,
        ctx: &mut OperationContext,
    ) -> Result<(), Diagnostic> {
        if let Err(err) = ctx.check_cancelled() {
            return Err(err.to_diagnostic(format!("Cancelled applying {}", descriptor.name)));
        }

        for reconciler in &descriptor.reconcilers {
            if let Err(err) = run_reconciler(reconciler.as_ref(), ctx).await {
                return Err(err.to_diagnostic(format!(
                    "Failed reconciling {} of {}",
                    reconciler.name(),
                    descriptor.name
                )));
            }
        }

        if let Err(err) = ctx.check_cancelled() {
            return Err(err.to_diagnostic(format!("Cancelled applying {}", descriptor.name)));
        }

        // Read rather than trusting the local projection; replacement may
        // or may not carry sub-resource state, only the remote knows.
        descriptor
            .handler
            .read(ctx)
            .await
            .map_err(|err| err.to_diagnostic(format!("Failed reading {}", descriptor.name)))
    }
}

fn finish(ctx: OperationContext, diagnostics: Diagnostics) -> OperationOutcome {
    OperationOutcome {
        id: ctx.desired.id.clone(),
        attributes: ctx.desired.attributes.to_json(),
        private: ctx.desired.private,
        diagnostics: collect(ctx.warnings, diagnostics),
    }
}

fn collect(warnings: Diagnostics, diagnostics: Diagnostics) -> Diagnostics {
    let mut all = warnings;
    all.extend(diagnostics);
    all
}

fn dangling(type_name: &str, id: &str) -> Diagnostic {
    Diagnostic::warning(format!("Resource {} `{}` may be left dangling", type_name, id))
        .with_detail(
            "the remote object was created but a later step failed; \
             the next plan will read it and reconcile any divergence",
        )
}

fn import_missing(type_name: &str, given: &str) -> Diagnostic {
    Diagnostic::error(format!(
        "Cannot import {}: `{}` does not exist remotely",
        type_name, given
    ))
}

fn resolve_id(request: &OperationRequest, attrs: &AttributeMap) -> String {
    request
        .prior_id
        .clone()
        .filter(|id| !id.is_empty())
        .or_else(|| attrs.get_str("id").map(str::to_string))
        .unwrap_or_default()
}

fn first_force_new_field(schema: &Schema, change_set: &stratoform_core::ChangeSet) -> Option<String> {
    change_set
        .changed_fields()
        .into_iter()
        .find(|field| schema.get(field).map(|s| s.force_new).unwrap_or(false))
        .map(str::to_string)
}

fn hydrate_computed(schema: &Schema, attrs: &mut AttributeMap, raw: &Json) {
    let obj = match raw {
        Json::Object(obj) => obj,
        _ => return,
    };
    for (name, spec) in schema.iter() {
        if !spec.computed {
            continue;
        }
        if let Some(value) = obj.get(name.as_str()).filter(|v| !v.is_null()) {
            if let Some(coerced) = coerce_loose(&spec.kind, value) {
                attrs.set(name.clone(), coerced);
            }
        }
    }
}
