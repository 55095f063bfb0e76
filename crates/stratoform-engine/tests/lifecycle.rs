//! Engine lifecycle tests against an in-memory remote.
//!
//! The fake handler records every remote mutation so the tests can assert
//! not just final state but that the engine issued the minimal set of
//! calls.

use async_trait::async_trait;
use serde_json::{json, Value as Json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use stratoform_client::{ApiError, ClientFactory, Credentials, EndpointResolver};
use stratoform_core::{AttrValue, AttributeMap, ErrorKind, FieldKind, FieldSpec, Schema};
use stratoform_engine::{
    Engine, ImportSpec, LifecycleHandler, OperationContext, OperationRequest, ProviderRegistry,
    ReconcileItem, ResourceTypeDescriptor, SubResourceReconciler,
};

const TYPE: &str = "stratus_test_group";

#[derive(Default)]
struct FakeRemote {
    objects: Mutex<HashMap<String, Json>>,
    mutations: Mutex<Vec<String>>,
    next_id: AtomicU32,
    /// Fail create after the remote assigned an id
    fail_after_create: bool,
}

impl FakeRemote {
    fn mutation_count(&self) -> usize {
        self.mutations.lock().unwrap().len()
    }

    fn mutations(&self) -> Vec<String> {
        self.mutations.lock().unwrap().clone()
    }

    fn record(&self, what: impl Into<String>) {
        self.mutations.lock().unwrap().push(what.into());
    }

    fn object(&self, id: &str) -> Option<Json> {
        self.objects.lock().unwrap().get(id).cloned()
    }

    fn seed(&self, id: &str, object: Json) {
        self.objects.lock().unwrap().insert(id.to_string(), object);
    }
}

struct FakeHandler {
    remote: Arc<FakeRemote>,
}

#[async_trait]
impl LifecycleHandler for FakeHandler {
    async fn create(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let n = self.remote.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("ID-{}", n);
        let object = json!({
            "name": ctx.desired.attributes.get_str("name").unwrap_or_default(),
            "type": ctx.desired.attributes.get_str("type").unwrap_or_default(),
            "tags": ctx.desired.attributes.to_json().get("tags").cloned().unwrap_or(json!({})),
        });
        self.remote.seed(&id, object);
        self.remote.record(format!("create {}", id));
        ctx.desired.set_id(&id);

        if self.remote.fail_after_create {
            return Err(ApiError::new(
                ErrorKind::Transient,
                "post-create configuration failed",
            ));
        }
        Ok(())
    }

    async fn read(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let id = ctx.desired.id.clone();
        let object = self
            .remote
            .object(&id)
            .ok_or_else(|| ApiError::new(ErrorKind::Gone, "no such group"))?;

        let attrs = &mut ctx.desired.attributes;
        attrs.set("name", object["name"].as_str().unwrap_or_default());
        if let Some(t) = object["type"].as_str().filter(|t| !t.is_empty()) {
            attrs.set("type", t);
        }
        let mut tags = std::collections::BTreeMap::new();
        if let Some(map) = object["tags"].as_object() {
            for (k, v) in map {
                tags.insert(
                    k.clone(),
                    AttrValue::String(v.as_str().unwrap_or_default().to_string()),
                );
            }
        }
        attrs.set("tags", AttrValue::Map(tags));
        attrs.set("id", id);
        Ok(())
    }

    async fn update(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let id = ctx.desired.id.clone();
        // Minimal patch: only primary fields named by the change set; tags
        // belong to the reconciler
        let change_set = ctx.change_set.as_ref().expect("update without change set");
        if !change_set.touches("name") {
            return Ok(());
        }
        let mut objects = self.remote.objects.lock().unwrap();
        let object = objects
            .get_mut(&id)
            .ok_or_else(|| ApiError::new(ErrorKind::Gone, "no such group"))?;
        object["name"] = json!(ctx.desired.attributes.get_str("name").unwrap_or_default());
        drop(objects);
        self.remote.record(format!("update {}", id));
        Ok(())
    }

    async fn delete(&self, ctx: &mut OperationContext) -> Result<(), ApiError> {
        let id = ctx.desired.id.clone();
        let removed = self.remote.objects.lock().unwrap().remove(&id);
        if removed.is_none() {
            return Err(ApiError::new(ErrorKind::Gone, "no such group"));
        }
        self.remote.record(format!("delete {}", id));
        Ok(())
    }
}

/// Tag reconciler over the `tags` map attribute, with its own API path on
/// the fake remote.
struct TagReconciler {
    remote: Arc<FakeRemote>,
}

#[async_trait]
impl SubResourceReconciler for TagReconciler {
    fn name(&self) -> &str {
        "tags"
    }

    fn items(&self, attrs: &AttributeMap) -> Vec<ReconcileItem> {
        match attrs.get_present("tags") {
            Some(AttrValue::Map(map)) => map
                .iter()
                .map(|(k, v)| ReconcileItem::new(k.clone(), v.to_json()))
                .collect(),
            _ => Vec::new(),
        }
    }

    async fn current(&self, ctx: &OperationContext) -> Result<Vec<ReconcileItem>, ApiError> {
        let object = self
            .remote
            .object(&ctx.desired.id)
            .ok_or_else(|| ApiError::new(ErrorKind::Gone, "no such group"))?;
        Ok(object["tags"]
            .as_object()
            .map(|map| {
                map.iter()
                    .map(|(k, v)| ReconcileItem::new(k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn apply(
        &self,
        ctx: &OperationContext,
        to_add: &[ReconcileItem],
        to_remove: &[ReconcileItem],
    ) -> Result<(), ApiError> {
        self.remote.record(format!(
            "tags {} add={:?} remove={:?}",
            ctx.desired.id,
            to_add.iter().map(|i| i.key.clone()).collect::<Vec<_>>(),
            to_remove.iter().map(|i| i.key.clone()).collect::<Vec<_>>(),
        ));
        let mut objects = self.remote.objects.lock().unwrap();
        let object = objects
            .get_mut(&ctx.desired.id)
            .ok_or_else(|| ApiError::new(ErrorKind::Gone, "no such group"))?;
        let tags = object["tags"].as_object_mut().unwrap();
        // Adds before removes
        for item in to_add {
            tags.insert(item.key.clone(), item.value.clone());
        }
        for item in to_remove {
            if tags.get(&item.key) == Some(&item.value) {
                tags.remove(&item.key);
            }
        }
        Ok(())
    }
}

fn schema() -> Schema {
    Schema::new()
        .field("name", FieldSpec::string().required())
        .field("type", FieldSpec::string().optional().force_new())
        .field("region", FieldSpec::string().optional())
        .field("tags", FieldSpec::map(FieldKind::String).optional())
        .field("id", FieldSpec::string().computed())
}

fn engine_with(remote: Arc<FakeRemote>) -> Engine {
    let registry = ProviderRegistry::builder()
        .register(
            ResourceTypeDescriptor::new(
                TYPE,
                schema(),
                Arc::new(FakeHandler {
                    remote: Arc::clone(&remote),
                }),
            )
            .with_reconciler(Arc::new(TagReconciler { remote }))
            .with_importer(ImportSpec::simple()),
        )
        .build()
        .unwrap();
    Engine::new(Arc::new(registry))
}

fn factory() -> Arc<ClientFactory> {
    Arc::new(ClientFactory::new(
        EndpointResolver::new("stratus.example"),
        Credentials::bearer("tok"),
        "eu-1",
    ))
}

// ── Simple CRUD round trip ──────────────────────────────────────

#[tokio::test]
async fn create_then_read_then_delete() {
    let remote = Arc::new(FakeRemote::default());
    let engine = engine_with(Arc::clone(&remote));

    let created = engine
        .execute(factory(), OperationRequest::create(TYPE, json!({"name": "g1"})))
        .await;
    assert!(created.is_success(), "diags: {:?}", created.diagnostics);
    assert_eq!(created.id, "ID-1");
    assert_eq!(created.attributes["name"], "g1");
    assert_eq!(created.attributes["id"], "ID-1");

    let read = engine
        .execute(factory(), OperationRequest::read(TYPE, created.attributes.clone()))
        .await;
    assert!(read.is_success());
    assert_eq!(read.id, "ID-1");
    assert_eq!(read.attributes["name"], "g1");

    let deleted = engine
        .execute(factory(), OperationRequest::delete(TYPE, read.attributes.clone()))
        .await;
    assert!(deleted.is_success());
    assert!(deleted.id.is_empty());

    // Read-after-delete is empty and error-free
    let after = engine
        .execute(factory(), OperationRequest::read(TYPE, read.attributes))
        .await;
    assert!(after.is_success());
    assert!(after.id.is_empty());
    assert!(after.diagnostics.is_empty());
}

// ── Idempotent apply ────────────────────────────────────────────

#[tokio::test]
async fn unchanged_update_issues_no_mutations() {
    let remote = Arc::new(FakeRemote::default());
    let engine = engine_with(Arc::clone(&remote));

    let created = engine
        .execute(
            factory(),
            OperationRequest::create(TYPE, json!({"name": "g1", "tags": {"a": "1"}})),
        )
        .await;
    assert!(created.is_success());
    let mutations_after_create = remote.mutation_count();

    let updated = engine
        .execute(
            factory(),
            OperationRequest::update(
                TYPE,
                created.attributes.clone(),
                json!({"name": "g1", "tags": {"a": "1"}}),
            ),
        )
        .await;
    assert!(updated.is_success());
    assert_eq!(
        remote.mutation_count(),
        mutations_after_create,
        "unchanged desired state must not mutate the remote: {:?}",
        remote.mutations()
    );
}

// ── Force-new invariance ────────────────────────────────────────

#[tokio::test]
async fn force_new_change_is_rejected_without_api_call() {
    let remote = Arc::new(FakeRemote::default());
    let engine = engine_with(Arc::clone(&remote));
    remote.seed("X", json!({"name": "g1", "type": "a", "tags": {}}));

    let outcome = engine
        .execute(
            factory(),
            OperationRequest::update(
                TYPE,
                json!({"name": "g1", "type": "a", "id": "X"}),
                json!({"name": "g1", "type": "b"}),
            ),
        )
        .await;

    assert!(!outcome.is_success());
    let err = outcome.diagnostics.errors().next().unwrap();
    assert_eq!(err.field_path.as_deref(), Some("type"));
    assert_eq!(remote.mutation_count(), 0, "no API call may be issued");
    // Prior attributes are preserved, not the rejected desired state
    assert_eq!(outcome.attributes["type"], "a");
}

// ── Partial create keeps the id ─────────────────────────────────

#[tokio::test]
async fn failed_create_after_id_warns_dangling() {
    let remote = Arc::new(FakeRemote {
        fail_after_create: true,
        ..Default::default()
    });
    let engine = engine_with(Arc::clone(&remote));

    let outcome = engine
        .execute(factory(), OperationRequest::create(TYPE, json!({"name": "g1"})))
        .await;

    assert!(!outcome.is_success());
    assert_eq!(outcome.id, "ID-1", "partial id must be returned");
    let warning = outcome
        .diagnostics
        .iter()
        .find(|d| !d.is_error())
        .expect("dangling warning");
    assert!(warning.summary.contains("dangling"));
    assert!(warning.summary.contains("ID-1"));
}

// ── Gone on read ────────────────────────────────────────────────

#[tokio::test]
async fn gone_on_read_clears_id_without_error() {
    let remote = Arc::new(FakeRemote::default());
    let engine = engine_with(remote);

    let outcome = engine
        .execute(
            factory(),
            OperationRequest::read(TYPE, json!({"name": "g1", "id": "X"})),
        )
        .await;
    assert!(outcome.is_success());
    assert!(outcome.id.is_empty());
    assert!(outcome.diagnostics.is_empty());
}

// ── Tag reconciliation ──────────────────────────────────────────

#[tokio::test]
async fn tag_delta_applied_exactly_once() {
    let remote = Arc::new(FakeRemote::default());
    let engine = engine_with(Arc::clone(&remote));
    remote.seed("X", json!({"name": "g1", "tags": {"a": "1", "b": "2"}}));

    let outcome = engine
        .execute(
            factory(),
            OperationRequest::update(
                TYPE,
                json!({"name": "g1", "id": "X", "tags": {"a": "1", "b": "2"}}),
                json!({"name": "g1", "tags": {"b": "2", "c": "3"}}),
            ),
        )
        .await;
    assert!(outcome.is_success(), "diags: {:?}", outcome.diagnostics);

    let tag_calls: Vec<String> = remote
        .mutations()
        .into_iter()
        .filter(|m| m.starts_with("tags"))
        .collect();
    assert_eq!(tag_calls.len(), 1, "apply is called exactly once");
    assert!(tag_calls[0].contains(r#"add=["c"]"#));
    assert!(tag_calls[0].contains(r#"remove=["a"]"#));

    assert_eq!(outcome.attributes["tags"], json!({"b": "2", "c": "3"}));
}

// ── Import ──────────────────────────────────────────────────────

#[tokio::test]
async fn import_round_trip_matches_create() {
    let remote = Arc::new(FakeRemote::default());
    let engine = engine_with(Arc::clone(&remote));

    let created = engine
        .execute(
            factory(),
            OperationRequest::create(TYPE, json!({"name": "g1", "tags": {"a": "1"}})),
        )
        .await;
    assert!(created.is_success());

    let imported = engine
        .execute(factory(), OperationRequest::import(TYPE, created.id.clone()))
        .await;
    assert!(imported.is_success(), "diags: {:?}", imported.diagnostics);
    assert_eq!(imported.id, created.id);
    assert_eq!(imported.attributes["name"], created.attributes["name"]);
    assert_eq!(imported.attributes["tags"], created.attributes["tags"]);
}

#[tokio::test]
async fn import_of_missing_object_errors() {
    let remote = Arc::new(FakeRemote::default());
    let engine = engine_with(remote);

    let outcome = engine
        .execute(factory(), OperationRequest::import(TYPE, "ID-404"))
        .await;
    assert!(!outcome.is_success());
    let err = outcome.diagnostics.errors().next().unwrap();
    assert!(err.summary.contains("does not exist"));
}

// ── Delete tolerance ────────────────────────────────────────────

#[tokio::test]
async fn delete_of_already_gone_object_succeeds() {
    let remote = Arc::new(FakeRemote::default());
    let engine = engine_with(remote);

    let outcome = engine
        .execute(
            factory(),
            OperationRequest::delete(TYPE, json!({"name": "g1", "id": "X"})),
        )
        .await;
    assert!(outcome.is_success());
    assert!(outcome.id.is_empty());
}

// ── Cancellation ────────────────────────────────────────────────

#[tokio::test]
async fn cancelled_context_aborts_before_reconcilers() {
    let remote = Arc::new(FakeRemote::default());
    let engine = engine_with(Arc::clone(&remote));

    let cancel = tokio_util::sync::CancellationToken::new();
    cancel.cancel();
    let outcome = engine
        .execute(
            factory(),
            OperationRequest::create(TYPE, json!({"name": "g1"})).with_cancel(cancel),
        )
        .await;
    assert!(!outcome.is_success());
    // The primary create ran before the first cancellation checkpoint, so
    // the partial id is surfaced for the host to track.
    assert_eq!(outcome.id, "ID-1");
}
