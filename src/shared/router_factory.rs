//! Generic REST router built over the [`Crud`] trait.
//!
//! Each domain gets the standard five routes (list, get, create, update,
//! delete) plus optional bulk and CSV-export routes from a single call to
//! [`crud_router`]. Domains that replace a standard route with a custom
//! handler disable it via [`CrudRoutes`] flags and merge their own.

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::auth::{authorize_mutation, require_staff, AuthUser};
use crate::shared::crud::Crud;
use crate::shared::error::{ApiError, ApiResult};
use crate::shared::response::{ApiResponse, BulkResponse, ListResponse};
use crate::shared::state::AppState;
use crate::shared::utils::{CommonParams, Page};

const EXPORT_LIMIT: i64 = 10_000;

/// Which routes the factory should register for an entity.
#[derive(Debug, Clone, Copy)]
pub struct CrudRoutes {
    pub list: bool,
    pub get: bool,
    pub create: bool,
    pub update: bool,
    pub delete: bool,
    pub bulk: bool,
    pub export: bool,
}

impl Default for CrudRoutes {
    fn default() -> Self {
        Self {
            list: true,
            get: true,
            create: true,
            update: true,
            delete: true,
            bulk: false,
            export: false,
        }
    }
}

impl CrudRoutes {
    pub fn all() -> Self {
        Self {
            bulk: true,
            export: true,
            ..Self::default()
        }
    }

    pub fn without_create(mut self) -> Self {
        self.create = false;
        self
    }

    pub fn without_get(mut self) -> Self {
        self.get = false;
        self
    }

    pub fn without_update(mut self) -> Self {
        self.update = false;
        self
    }

    pub fn without_delete(mut self) -> Self {
        self.delete = false;
        self
    }

    pub fn without_list(mut self) -> Self {
        self.list = false;
        self
    }
}

/// Identified patch in a bulk update batch.
#[derive(Debug, Deserialize)]
pub struct BulkItem<U> {
    pub id: i32,
    #[serde(flatten)]
    pub patch: U,
}

#[derive(Debug, Deserialize)]
pub struct BulkIds {
    pub ids: Vec<i32>,
}

pub fn crud_router<T>(routes: CrudRoutes) -> Router<Arc<AppState>>
where
    T: Crud + Serialize + Send + Sync + 'static,
    T::Create: DeserializeOwned + Send + 'static,
    T::Update: DeserializeOwned + Send + 'static,
    T::Filter: DeserializeOwned + Default + Send + 'static,
{
    let mut router = Router::new();
    if routes.list {
        router = router.route("/", get(list_items::<T>));
    }
    if routes.create {
        router = router.route("/", post(create_item::<T>));
    }
    if routes.get {
        router = router.route("/:id", get(get_item::<T>));
    }
    if routes.update {
        router = router.route("/:id", put(update_item::<T>));
    }
    if routes.delete {
        router = router.route("/:id", delete(delete_item::<T>));
    }
    if routes.bulk {
        router = router
            .route("/bulk", post(bulk_create::<T>))
            .route("/bulk", put(bulk_update::<T>))
            .route("/bulk", delete(bulk_delete::<T>));
    }
    if routes.export {
        router = router.route("/export/csv", get(export_csv::<T>));
    }
    router
}

async fn list_items<T>(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(params): Query<CommonParams>,
    Query(filter): Query<T::Filter>,
) -> ApiResult<Json<ListResponse<T>>>
where
    T: Crud + Serialize,
    T::Filter: DeserializeOwned + Default,
{
    let mut conn = state.db()?;
    let page = params.page();
    let items = T::list(
        &mut conn,
        &filter,
        params.search_term(),
        params.sort(),
        page,
    )?;
    let total = T::count(&mut conn, &filter, params.search_term())?;
    Ok(Json(ListResponse::new(items, total, page.skip, page.limit)))
}

async fn get_item<T>(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<T>>>
where
    T: Crud + Serialize,
{
    let mut conn = state.db()?;
    let row = T::find_or_fail(&mut conn, id)?;
    Ok(Json(ApiResponse::data(row)))
}

async fn create_item<T>(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<T::Create>,
) -> ApiResult<Json<ApiResponse<T>>>
where
    T: Crud + Serialize,
{
    if T::STAFF_ONLY {
        require_staff(&user)?;
    }
    let mut conn = state.db()?;
    let row = T::insert(&mut conn, payload, user.id())?;
    Ok(Json(ApiResponse::created(row, T::NAME)))
}

async fn update_item<T>(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(patch): Json<T::Update>,
) -> ApiResult<Json<ApiResponse<T>>>
where
    T: Crud + Serialize,
{
    if T::STAFF_ONLY {
        require_staff(&user)?;
    }
    let mut conn = state.db()?;
    let existing = T::find_or_fail(&mut conn, id)?;
    authorize_mutation(&user, &existing)?;
    let row = T::apply_update(&mut conn, id, patch)?;
    Ok(Json(ApiResponse::updated(row, T::NAME)))
}

async fn delete_item<T>(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>>
where
    T: Crud + Serialize,
{
    if T::STAFF_ONLY {
        require_staff(&user)?;
    }
    let mut conn = state.db()?;
    let existing = T::find_or_fail(&mut conn, id)?;
    authorize_mutation(&user, &existing)?;
    T::delete_or_deactivate(&mut conn, id)?;
    let action = if T::SOFT_DELETE {
        "deactivated"
    } else {
        "deleted"
    };
    Ok(Json(ApiResponse::message(format!(
        "{} {action} successfully",
        T::NAME
    ))))
}

/// Bulk batches are attempted item by item; a failed item is logged and
/// counted, never rolled back with the rest of the batch.
async fn bulk_create<T>(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payloads): Json<Vec<T::Create>>,
) -> ApiResult<Json<BulkResponse>>
where
    T: Crud + Serialize,
{
    require_staff(&user)?;
    let mut conn = state.db()?;
    let mut succeeded = 0;
    let mut failed = 0;
    for payload in payloads {
        match T::insert(&mut conn, payload, user.id()) {
            Ok(_) => succeeded += 1,
            Err(err) => {
                warn!(entity = T::NAME, %err, "bulk create item failed");
                failed += 1;
            }
        }
    }
    Ok(Json(BulkResponse::new("Created", T::NAME, succeeded, failed)))
}

async fn bulk_update<T>(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(items): Json<Vec<BulkItem<T::Update>>>,
) -> ApiResult<Json<BulkResponse>>
where
    T: Crud + Serialize,
{
    require_staff(&user)?;
    let mut conn = state.db()?;
    let mut succeeded = 0;
    let mut failed = 0;
    for item in items {
        let outcome = T::find_or_fail(&mut conn, item.id)
            .and_then(|row| authorize_mutation(&user, &row))
            .and_then(|_| T::apply_update(&mut conn, item.id, item.patch));
        match outcome {
            Ok(_) => succeeded += 1,
            Err(err) => {
                warn!(entity = T::NAME, id = item.id, %err, "bulk update item failed");
                failed += 1;
            }
        }
    }
    Ok(Json(BulkResponse::new("Updated", T::NAME, succeeded, failed)))
}

async fn bulk_delete<T>(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(body): Json<BulkIds>,
) -> ApiResult<Json<BulkResponse>>
where
    T: Crud + Serialize,
{
    require_staff(&user)?;
    let mut conn = state.db()?;
    let mut succeeded = 0;
    let mut failed = 0;
    for id in body.ids {
        let outcome = T::find_or_fail(&mut conn, id)
            .and_then(|row| authorize_mutation(&user, &row))
            .and_then(|_| T::delete_or_deactivate(&mut conn, id));
        match outcome {
            Ok(_) => succeeded += 1,
            Err(err) => {
                warn!(entity = T::NAME, id, %err, "bulk delete item failed");
                failed += 1;
            }
        }
    }
    Ok(Json(BulkResponse::new("Deleted", T::NAME, succeeded, failed)))
}

async fn export_csv<T>(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(params): Query<CommonParams>,
    Query(filter): Query<T::Filter>,
) -> ApiResult<Response>
where
    T: Crud + Serialize,
    T::Filter: DeserializeOwned + Default,
{
    require_staff(&user)?;
    let mut conn = state.db()?;
    let rows = T::list(
        &mut conn,
        &filter,
        params.search_term(),
        params.sort(),
        Page {
            skip: 0,
            limit: EXPORT_LIMIT,
        },
    )?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in &rows {
        writer.serialize(row).map_err(|_| ApiError::Internal)?;
    }
    let bytes = writer.into_inner().map_err(|_| ApiError::Internal)?;

    let filename = format!(
        "attachment; filename=\"{}_export.csv\"",
        T::NAME.to_lowercase()
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, filename),
        ],
        bytes,
    )
        .into_response())
}
