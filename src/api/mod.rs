//! REST surface.
//!
//! Each endpoint deserializes into a typed parameter struct, resolves its
//! entity references at the required access level, and only then runs the
//! handler body. Two route layouts launch runs, the dedicated `/utm`
//! resource and the folder-nested variant; they are functionally identical
//! and share one implementation.

pub mod auth;

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::dispatch::Dispatcher;
use crate::error::ApiError;
use crate::jobs::{self, JobSort, ListOptions};
use crate::markers;
use crate::store::access::{resolve_file, resolve_folder, resolve_user};
use crate::store::{AccessLevel, EntityId, Item, Job, Store, User};

use self::auth::{CurrentUser, SessionStore, attach_identity, require_admin, require_user};

/// Shared state for the REST routes.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn Store>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub sessions: SessionStore,
    /// Docker image submitted runs execute in.
    pub image: String,
}

/// The gateway's REST server.
pub struct UtmApi;

impl UtmApi {
    /// Build the axum router.
    pub fn router(state: ApiState) -> Router {
        Router::new()
            .route("/utm/demo", get(get_demo_data).put(set_demo_data))
            .route("/utm/example", get(list_examples))
            .route("/utm/{id}/examples_folder", put(set_examples_folder))
            .route("/utm/validate", post(validate))
            .route("/utm/job", get(list_jobs))
            .route("/utm", post(run))
            .route("/folder/{id}/utm", post(run_nested))
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                attach_identity,
            ))
            // No identity resolution needed (added after the layer).
            .route("/health", get(health_check))
            .with_state(state)
    }

    /// Start the server on the given address.
    pub async fn start(
        state: ApiState,
        addr: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let router = Self::router(state);

        tracing::info!("UTM gateway listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}

// -- Parameter structs --

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DemoDataParams {
    folder_id: Uuid,
    params_id: Uuid,
    #[serde(default = "default_true")]
    enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
struct EnabledParam {
    #[serde(default = "default_true")]
    enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunParams {
    folder_id: Uuid,
    params_id: Uuid,
    output_folder_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NestedRunParams {
    params_id: Uuid,
    output_folder_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListJobsParams {
    user_id: Option<Uuid>,
    limit: Option<usize>,
    offset: Option<usize>,
    sort: Option<String>,
    /// 1 for ascending, -1 for descending (the default).
    sortdir: Option<i32>,
}

// -- Handlers --

async fn health_check() -> &'static str {
    "ok"
}

async fn get_demo_data(State(state): State<ApiState>) -> Json<markers::DemoData> {
    Json(markers::get_demo_data(state.store.as_ref()).await)
}

async fn set_demo_data(
    State(state): State<ApiState>,
    Extension(current): Extension<CurrentUser>,
    Json(params): Json<DemoDataParams>,
) -> Result<Json<bool>, ApiError> {
    let caller = require_admin(&current)?;
    let store = state.store.as_ref();

    let folder =
        resolve_folder(store, params.folder_id, Some(caller), AccessLevel::Admin).await?;
    let params_file =
        resolve_file(store, params.params_id, Some(caller), AccessLevel::Admin).await?;

    let enabled = markers::set_demo_data(store, &folder, &params_file, params.enabled).await?;
    Ok(Json(enabled))
}

async fn list_examples(State(state): State<ApiState>) -> Json<Vec<Item>> {
    Json(markers::list_examples(state.store.as_ref()).await)
}

async fn set_examples_folder(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Extension(current): Extension<CurrentUser>,
    Json(params): Json<EnabledParam>,
) -> Result<Json<bool>, ApiError> {
    let caller = require_admin(&current)?;
    let store = state.store.as_ref();

    let folder = resolve_folder(store, id, Some(caller), AccessLevel::Admin).await?;
    let enabled = markers::set_examples_folder(store, &folder, params.enabled).await?;
    Ok(Json(enabled))
}

/// Check that a run request's references resolve and are accessible.
///
/// The content checks (which files the source folder must contain, which
/// columns the params table needs) were never pinned down for the
/// algorithm, so this deliberately stops after reference validation rather
/// than guessing at rules.
/// TODO: add the file/column checks once the algorithm's input contract is
/// written down.
async fn validate(
    State(state): State<ApiState>,
    Extension(current): Extension<CurrentUser>,
    Json(params): Json<RunParams>,
) -> Result<StatusCode, ApiError> {
    let caller = require_user(&current)?;
    let store = state.store.as_ref();

    resolve_folder(store, params.folder_id, Some(caller), AccessLevel::Read).await?;
    resolve_file(store, params.params_id, Some(caller), AccessLevel::Read).await?;
    resolve_folder(store, params.output_folder_id, Some(caller), AccessLevel::Read).await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn list_jobs(
    State(state): State<ApiState>,
    Extension(current): Extension<CurrentUser>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<Vec<Job>>, ApiError> {
    let caller = require_user(&current)?;
    let store = state.store.as_ref();

    let target = match params.user_id {
        Some(id) => resolve_user(store, id).await?,
        None => caller.clone(),
    };

    let sort = match params.sort.as_deref() {
        Some(s) => JobSort::parse(s)?,
        None => JobSort::Created,
    };
    let opts = ListOptions {
        limit: params.limit.unwrap_or(jobs::DEFAULT_JOB_LIMIT),
        offset: params.offset.unwrap_or(0),
        sort,
        descending: params.sortdir.unwrap_or(-1) < 0,
    };

    Ok(Json(jobs::list(store, &target, caller, opts).await))
}

async fn run(
    State(state): State<ApiState>,
    Extension(current): Extension<CurrentUser>,
    Json(params): Json<RunParams>,
) -> Result<Json<Job>, ApiError> {
    let caller = require_user(&current)?.clone();
    submit_run(
        &state,
        &caller,
        params.folder_id,
        params.params_id,
        params.output_folder_id,
    )
    .await
}

async fn run_nested(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Extension(current): Extension<CurrentUser>,
    Json(params): Json<NestedRunParams>,
) -> Result<Json<Job>, ApiError> {
    let caller = require_user(&current)?.clone();
    submit_run(&state, &caller, id, params.params_id, params.output_folder_id).await
}

/// Shared body of the two run layouts: read access on the source folder and
/// params file, write access on the output folder, then one dispatch.
async fn submit_run(
    state: &ApiState,
    caller: &User,
    folder_id: EntityId,
    params_id: EntityId,
    output_folder_id: EntityId,
) -> Result<Json<Job>, ApiError> {
    let store = state.store.as_ref();

    let folder = resolve_folder(store, folder_id, Some(caller), AccessLevel::Read).await?;
    let params_file = resolve_file(store, params_id, Some(caller), AccessLevel::Read).await?;
    let output_folder =
        resolve_folder(store, output_folder_id, Some(caller), AccessLevel::Write).await?;

    let job = jobs::submit(
        store,
        state.dispatcher.as_ref(),
        &state.image,
        &folder,
        &params_file,
        &output_folder,
        caller,
    )
    .await?;
    Ok(Json(job))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::store::{Acl, FileEntity, Folder, MemStore};
    use crate::testing::StubDispatcher;

    use super::*;

    struct TestEnv {
        state: ApiState,
        store: Arc<MemStore>,
        admin: User,
        admin_token: String,
        user_token: String,
        user: User,
    }

    async fn test_env() -> TestEnv {
        let store = Arc::new(MemStore::new());
        let sessions = SessionStore::new();

        let admin = User {
            id: Uuid::new_v4(),
            login: "admin".to_string(),
            admin: true,
        };
        let user = User {
            id: Uuid::new_v4(),
            login: "alice".to_string(),
            admin: false,
        };
        store.upsert_user(admin.clone()).await;
        store.upsert_user(user.clone()).await;

        let admin_token = sessions.create_token(admin.id).await;
        let user_token = sessions.create_token(user.id).await;

        let dispatcher = Arc::new(StubDispatcher::new(store.clone()));
        let state = ApiState {
            store: store.clone(),
            dispatcher,
            sessions,
            image: "samuelgerber/utm".to_string(),
        };

        TestEnv {
            state,
            store,
            admin,
            admin_token,
            user_token,
            user,
        }
    }

    async fn seed_run_entities(env: &TestEnv, owner: &User) -> (Folder, FileEntity, Folder) {
        let src = Folder {
            id: Uuid::new_v4(),
            name: "scans".to_string(),
            markers: HashMap::new(),
            acl: Acl::private_to(owner.id),
        };
        let out = Folder {
            id: Uuid::new_v4(),
            name: "results".to_string(),
            markers: HashMap::new(),
            acl: Acl::private_to(owner.id),
        };
        let params = FileEntity {
            id: Uuid::new_v4(),
            item_id: None,
            name: "params.csv".to_string(),
            markers: HashMap::new(),
            acl: Acl::private_to(owner.id),
            content: Vec::new(),
        };
        env.store.upsert_folder(src.clone()).await;
        env.store.upsert_folder(out.clone()).await;
        env.store.upsert_file(params.clone()).await;
        (src, params, out)
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        builder
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_requires_no_auth() {
        let env = test_env().await;
        let router = UtmApi::router(env.state);

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn demo_data_empty_returns_nulls() {
        let env = test_env().await;
        let router = UtmApi::router(env.state);

        let req = Request::builder()
            .uri("/utm/demo")
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["folder"], serde_json::Value::Null);
        assert_eq!(json["paramsFile"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn set_demo_data_rejects_non_admin() {
        let env = test_env().await;
        let user = env.user.clone();
        let (src, params, _out) = seed_run_entities(&env, &user).await;
        let router = UtmApi::router(env.state.clone());

        let body = serde_json::json!({
            "folderId": src.id,
            "paramsId": params.id,
        });

        // Anonymous caller: 401.
        let resp = router
            .clone()
            .oneshot(json_request("PUT", "/utm/demo", None, body.clone()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        // Logged in but not an administrator: 403.
        let resp = router
            .oneshot(json_request(
                "PUT",
                "/utm/demo",
                Some(&env.user_token),
                body,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn demo_data_set_then_get() {
        let env = test_env().await;
        let admin = env.admin.clone();
        let (src, params, _out) = seed_run_entities(&env, &admin).await;
        let router = UtmApi::router(env.state.clone());

        let body = serde_json::json!({
            "folderId": src.id,
            "paramsId": params.id,
            "enabled": true,
        });
        let resp = router
            .clone()
            .oneshot(json_request("PUT", "/utm/demo", Some(&env.admin_token), body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, serde_json::json!(true));

        let req = Request::builder()
            .uri("/utm/demo")
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["folder"]["id"], serde_json::json!(src.id));
        assert_eq!(json["paramsFile"]["id"], serde_json::json!(params.id));
    }

    #[tokio::test]
    async fn examples_folder_set_then_list() {
        let env = test_env().await;
        let folder = Folder {
            id: Uuid::new_v4(),
            name: "examples".to_string(),
            markers: HashMap::new(),
            acl: Acl::default(),
        };
        env.store.upsert_folder(folder.clone()).await;
        env.store
            .upsert_item(Item {
                id: Uuid::new_v4(),
                folder_id: folder.id,
                name: "shot1.png".to_string(),
            })
            .await;
        let router = UtmApi::router(env.state.clone());

        let resp = router
            .clone()
            .oneshot(json_request(
                "PUT",
                &format!("/utm/{}/examples_folder", folder.id),
                Some(&env.admin_token),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let req = Request::builder()
            .uri("/utm/example")
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        let json = body_json(resp).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["name"], "shot1.png");
    }

    #[tokio::test]
    async fn validate_checks_references_only() {
        let env = test_env().await;
        let user = env.user.clone();
        let (src, params, out) = seed_run_entities(&env, &user).await;
        let router = UtmApi::router(env.state.clone());

        let body = serde_json::json!({
            "folderId": src.id,
            "paramsId": params.id,
            "outputFolderId": out.id,
        });
        let resp = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/utm/validate",
                Some(&env.user_token),
                body,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        // A dangling reference is still a 404.
        let body = serde_json::json!({
            "folderId": Uuid::new_v4(),
            "paramsId": params.id,
            "outputFolderId": out.id,
        });
        let resp = router
            .oneshot(json_request(
                "POST",
                "/utm/validate",
                Some(&env.user_token),
                body,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn run_submits_and_attaches_ids() {
        let env = test_env().await;
        let user = env.user.clone();
        let (src, params, out) = seed_run_entities(&env, &user).await;
        let router = UtmApi::router(env.state.clone());

        let body = serde_json::json!({
            "folderId": src.id,
            "paramsId": params.id,
            "outputFolderId": out.id,
        });
        let resp = router
            .oneshot(json_request("POST", "/utm", Some(&env.user_token), body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["utmFolderId"], serde_json::json!(src.id));
        assert_eq!(json["utmOutputFolderId"], serde_json::json!(out.id));
        assert_eq!(json["title"], "UTM: scans");
        assert_eq!(json["status"], "queued");
    }

    #[tokio::test]
    async fn nested_run_matches_legacy_route() {
        let env = test_env().await;
        let user = env.user.clone();
        let (src, params, out) = seed_run_entities(&env, &user).await;
        let router = UtmApi::router(env.state.clone());

        let body = serde_json::json!({
            "paramsId": params.id,
            "outputFolderId": out.id,
        });
        let resp = router
            .oneshot(json_request(
                "POST",
                &format!("/folder/{}/utm", src.id),
                Some(&env.user_token),
                body,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["utmFolderId"], serde_json::json!(src.id));
    }

    #[tokio::test]
    async fn run_with_unreadable_folder_writes_nothing() {
        let env = test_env().await;
        let stranger = User {
            id: Uuid::new_v4(),
            login: "mallory".to_string(),
            admin: false,
        };
        env.store.upsert_user(stranger.clone()).await;
        let stranger_token = env.state.sessions.create_token(stranger.id).await;

        // Entities owned by alice; mallory has no grants.
        let user = env.user.clone();
        let (src, params, out) = seed_run_entities(&env, &user).await;
        let router = UtmApi::router(env.state.clone());

        let body = serde_json::json!({
            "folderId": src.id,
            "paramsId": params.id,
            "outputFolderId": out.id,
        });
        let resp = router
            .oneshot(json_request("POST", "/utm", Some(&stranger_token), body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        // No job record was created anywhere.
        assert!(env.store.jobs_by_user(stranger.id).await.is_empty());
        assert!(env.store.jobs_by_user(user.id).await.is_empty());
    }

    #[tokio::test]
    async fn run_requires_write_on_output_folder() {
        let env = test_env().await;
        let user = env.user.clone();
        let (src, params, _out) = seed_run_entities(&env, &user).await;

        // Output folder is readable but not writable by alice.
        let mut acl = Acl::public_owned_by(Uuid::new_v4());
        acl.grants.insert(user.id, AccessLevel::Read);
        let readonly_out = Folder {
            id: Uuid::new_v4(),
            name: "locked".to_string(),
            markers: HashMap::new(),
            acl,
        };
        env.store.upsert_folder(readonly_out.clone()).await;
        let router = UtmApi::router(env.state.clone());

        let body = serde_json::json!({
            "folderId": src.id,
            "paramsId": params.id,
            "outputFolderId": readonly_out.id,
        });
        let resp = router
            .oneshot(json_request("POST", "/utm", Some(&env.user_token), body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn list_jobs_requires_login() {
        let env = test_env().await;
        let router = UtmApi::router(env.state);

        let req = Request::builder()
            .uri("/utm/job")
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn list_jobs_rejects_stale_token() {
        let env = test_env().await;
        env.state.sessions.revoke(&env.user_token).await;
        let router = UtmApi::router(env.state.clone());

        let req = Request::builder()
            .uri("/utm/job")
            .header("Authorization", format!("Bearer {}", env.user_token))
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn list_jobs_unknown_target_user_is_not_found() {
        let env = test_env().await;
        let router = UtmApi::router(env.state.clone());

        let req = Request::builder()
            .uri(format!("/utm/job?userId={}", Uuid::new_v4()))
            .header("Authorization", format!("Bearer {}", env.user_token))
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_jobs_rejects_unknown_sort_field() {
        let env = test_env().await;
        let router = UtmApi::router(env.state.clone());

        let req = Request::builder()
            .uri("/utm/job?sort=karma")
            .header("Authorization", format!("Bearer {}", env.user_token))
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_jobs_returns_own_jobs_after_run() {
        let env = test_env().await;
        let user = env.user.clone();
        let (src, params, out) = seed_run_entities(&env, &user).await;
        let router = UtmApi::router(env.state.clone());

        let body = serde_json::json!({
            "folderId": src.id,
            "paramsId": params.id,
            "outputFolderId": out.id,
        });
        let resp = router
            .clone()
            .oneshot(json_request("POST", "/utm", Some(&env.user_token), body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let req = Request::builder()
            .uri("/utm/job")
            .header("Authorization", format!("Bearer {}", env.user_token))
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        let jobs = json.as_array().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0]["utmFolderId"], serde_json::json!(src.id));
    }
}
