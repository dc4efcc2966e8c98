//! Example handlers: a small tasks API.
//!
//! Shows the full invocation flow end to end: routing with path parameters,
//! validation of body and query input, request-scoped logging, and the
//! document store collaborator.
//!
//! **These handlers are for documentation and testing.** They run against
//! any [`DocumentStore`], including the in-memory one.
//!
//! | method | path | handler |
//! |---|---|---|
//! | `GET` | `/tasks` | [`list_tasks`] |
//! | `POST` | `/tasks` | [`create_task`] |
//! | `GET` | `/tasks/:id` | [`get_task`] |
//! | `PATCH` | `/tasks/:id` | [`update_task`] |
//! | `DELETE` | `/tasks/:id` | [`delete_task`] |

use std::sync::{Arc, LazyLock};

use serde_json::{json, Map, Value};

use crate::document::{DocumentStore, DocumentTarget};
use crate::error::{ApiError, Result};
use crate::request::RequestContext;
use crate::response::Response;
use crate::router::{Params, RouteError, Router};
use crate::validation::{Schema, Validator};

/// Collection holding tasks.
pub const TASKS_COLLECTION: &str = "tasks";

const OWNER_KEY: &str = "ownerId";
const TASK_FIELDS: [&str; 5] = ["title", "description", "priority", "done", "tags"];

static CREATE_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::parse([
        ("title", "required|string|min:3|max:200"),
        ("description", "string|max:2000"),
        ("priority", "in:low,medium,high"),
        ("done", "boolean"),
        ("tags", "array|max:10"),
    ])
    .expect("task create schema is valid")
});

static UPDATE_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::parse([
        ("title", "string|min:3|max:200"),
        ("description", "string|max:2000"),
        ("priority", "in:low,medium,high"),
        ("done", "boolean"),
        ("tags", "array|max:10"),
    ])
    .expect("task update schema is valid")
});

static LIST_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::parse([("status", "in:open,done"), ("limit", "regex:^[1-9][0-9]{0,2}$")])
        .expect("task list schema is valid")
});

fn tags_are_strings(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Array(items)) => items.iter().all(Value::is_string),
        _ => true,
    }
}

fn body_of(ctx: &RequestContext) -> Value {
    ctx.body.clone().unwrap_or(Value::Null)
}

fn target(id: &str) -> DocumentTarget {
    DocumentTarget::collection(TASKS_COLLECTION).document(id)
}

/// Unowned tasks are shared; owned ones are visible to their owner only.
fn visible_to(task: &Value, user_id: Option<&str>) -> bool {
    match task.get(OWNER_KEY).and_then(Value::as_str) {
        Some(owner) => user_id == Some(owner),
        None => true,
    }
}

/// Fetches a task and checks the caller may touch it.
fn load_owned(store: &dyn DocumentStore, ctx: &RequestContext, id: &str) -> Result<Value> {
    let task = store.get(&target(id))?;
    if !visible_to(&task, ctx.user_id.as_deref()) {
        ctx.log().warn(format_args!("access to task {id} denied"));
        return Err(ApiError::forbidden("You do not have access to this task").into());
    }
    Ok(task)
}

/// `GET /tasks`: lists the caller's tasks and unowned ones, optionally
/// filtered by `status` and capped by `limit`.
pub fn list_tasks(store: &dyn DocumentStore, ctx: &mut RequestContext) -> Result<Response> {
    // 1. Validate query input
    LIST_SCHEMA.validate(&ctx.query_json())?;

    // 2. Fetch and filter
    let user_id = ctx.user_id.as_deref();
    let wanted_done = ctx.query_param("status").map(|s| s == "done");
    let limit = ctx
        .query_param("limit")
        .and_then(|l| l.parse::<usize>().ok())
        .unwrap_or(usize::MAX);

    let tasks: Vec<Value> = store
        .list(&DocumentTarget::collection(TASKS_COLLECTION))?
        .into_iter()
        .filter(|task| visible_to(task, user_id))
        .filter(|task| match wanted_done {
            Some(done) => task.get("done").and_then(Value::as_bool).unwrap_or(false) == done,
            None => true,
        })
        .take(limit)
        .collect();

    ctx.log().debug(format_args!("listing {} tasks", tasks.len()));
    Ok(Response::success(json!({ "total": tasks.len(), "tasks": tasks })))
}

/// `POST /tasks`: validates the body and creates a task owned by the caller.
pub fn create_task(store: &dyn DocumentStore, ctx: &mut RequestContext) -> Result<Response> {
    // 1. Validate body
    let body = body_of(ctx);
    let mut validator = Validator::new(&body);
    validator.schema(&CREATE_SCHEMA).custom("tags", tags_are_strings);
    validator.finish()?;

    // 2. Build the document from known fields only
    let mut doc: Map<String, Value> = TASK_FIELDS
        .iter()
        .filter_map(|field| body.get(*field).map(|v| (field.to_string(), v.clone())))
        .collect();
    doc.entry("priority").or_insert_with(|| json!("medium"));
    doc.entry("done").or_insert(Value::Bool(false));
    doc.entry("tags").or_insert_with(|| json!([]));
    if let Some(user) = &ctx.user_id {
        doc.insert(OWNER_KEY.to_string(), Value::String(user.clone()));
    }

    // 3. Store
    let task = store.create(&DocumentTarget::collection(TASKS_COLLECTION), Value::Object(doc))?;
    ctx.log().info(format_args!("task created"));
    Ok(Response::created(task))
}

/// `GET /tasks/:id`
pub fn get_task(store: &dyn DocumentStore, ctx: &mut RequestContext, params: &Params) -> Result<Response> {
    let id = params.require("id")?;
    let task = load_owned(store, ctx, id)?;
    Ok(Response::success(task))
}

/// `PATCH /tasks/:id`: updates the given fields of a task.
pub fn update_task(
    store: &dyn DocumentStore,
    ctx: &mut RequestContext,
    params: &Params,
) -> Result<Response> {
    let id = params.require("id")?;

    // 1. Validate body; at least one known field must be present
    let body = body_of(ctx);
    UPDATE_SCHEMA.validate(&body)?;
    let patch: Map<String, Value> = TASK_FIELDS
        .iter()
        .filter_map(|field| body.get(*field).map(|v| (field.to_string(), v.clone())))
        .collect();
    if patch.is_empty() {
        return Err(ApiError::bad_request("No updatable fields supplied").into());
    }

    // 2. Check ownership, then apply
    load_owned(store, ctx, id)?;
    let task = store.update(&target(id), Value::Object(patch))?;
    Ok(Response::success(task))
}

/// `DELETE /tasks/:id`
pub fn delete_task(
    store: &dyn DocumentStore,
    ctx: &mut RequestContext,
    params: &Params,
) -> Result<Response> {
    let id = params.require("id")?;
    load_owned(store, ctx, id)?;
    store.delete(&target(id))?;
    ctx.log().info(format_args!("task {id} deleted"));
    Ok(Response::empty())
}

/// Builds a router serving the tasks API from `store`.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use invocation_core::document::{DocumentStoreConfig, MemoryDocumentStore};
/// use invocation_core::web::example_handler::tasks_router;
/// use invocation_core::RequestContext;
/// use serde_json::json;
///
/// let router = tasks_router(Arc::new(MemoryDocumentStore::new(DocumentStoreConfig::default()))).unwrap();
///
/// let mut create = RequestContext::new("POST", "/tasks").with_json_body(json!({ "title": "Write docs" }));
/// assert_eq!(router.dispatch(&mut create).unwrap().status, 201);
///
/// let mut invalid = RequestContext::new("POST", "/tasks").with_json_body(json!({ "title": "x" }));
/// assert_eq!(router.dispatch(&mut invalid).unwrap_err().status(), 400);
/// ```
pub fn tasks_router(store: Arc<dyn DocumentStore>) -> std::result::Result<Router, RouteError> {
    let mut router = Router::new();

    let s = Arc::clone(&store);
    router.get("/tasks", move |ctx: &mut RequestContext, _: &Params| list_tasks(s.as_ref(), ctx))?;

    let s = Arc::clone(&store);
    router.post("/tasks", move |ctx: &mut RequestContext, _: &Params| create_task(s.as_ref(), ctx))?;

    let s = Arc::clone(&store);
    router.get("/tasks/:id", move |ctx: &mut RequestContext, params: &Params| {
        get_task(s.as_ref(), ctx, params)
    })?;

    let s = Arc::clone(&store);
    router.patch("/tasks/:id", move |ctx: &mut RequestContext, params: &Params| {
        update_task(s.as_ref(), ctx, params)
    })?;

    let s = store;
    router.delete("/tasks/:id", move |ctx: &mut RequestContext, params: &Params| {
        delete_task(s.as_ref(), ctx, params)
    })?;

    Ok(router)
}
