//! Department handlers
//!
//! HTTP surface of the department hierarchy

use axum::{
    extract::{Query, State},
    response::Json,
    Extension,
};
use serde::{Deserialize, Serialize};

use crate::entity::department::{Department, DepartmentNode};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::CurrentUser;
use crate::routes::ApiResponse;
use crate::state::AppState;
use crate::store::TransactionalStore;

/// Add department request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDepartmentRequest {
    pub name: String,
    pub parent_id: Option<i64>,
}

/// Update department request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDepartmentRequest {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
}

/// Move department request; a missing `parentId` makes the department a root
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveDepartmentRequest {
    pub id: i64,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct RebuildResponse {
    pub corrected: usize,
}

/// Check if user may change departments
fn require_manage(user: &CurrentUser) -> AppResult<()> {
    if user.can_manage_departments() {
        Ok(())
    } else {
        tracing::warn!("User {} denied department change", user.username);
        Err(AppError::Forbidden)
    }
}

/// GET /api/department/query
pub async fn get_departments<S: TransactionalStore + 'static>(
    State(state): State<AppState<S>>,
) -> AppResult<Json<ApiResponse<Vec<Department>>>> {
    let depts = state.departments.get_all().await?;
    Ok(Json(ApiResponse::success(depts)))
}

/// GET /api/department/tree
pub async fn get_tree<S: TransactionalStore + 'static>(
    State(state): State<AppState<S>>,
) -> AppResult<Json<ApiResponse<Vec<DepartmentNode>>>> {
    let forest = state.departments.get_tree().await?;
    Ok(Json(ApiResponse::success(forest)))
}

/// GET /api/department/info?id=
pub async fn get_department<S: TransactionalStore + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<Department>>> {
    let dept = state.departments.get_by_id(query.id).await?;
    Ok(Json(ApiResponse::success(dept)))
}

/// GET /api/department/by-name?name=
pub async fn get_department_by_name<S: TransactionalStore + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<NameQuery>,
) -> AppResult<Json<ApiResponse<Department>>> {
    let dept = state.departments.get_by_name(&query.name).await?;
    Ok(Json(ApiResponse::success(dept)))
}

/// GET /api/department/children?id=
pub async fn get_children<S: TransactionalStore + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<Vec<Department>>>> {
    let children = state.departments.get_children(query.id).await?;
    Ok(Json(ApiResponse::success(children)))
}

/// GET /api/department/subtree?id=
pub async fn get_subtree<S: TransactionalStore + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<DepartmentNode>>> {
    let node = state.departments.get_subtree(query.id).await?;
    Ok(Json(ApiResponse::success(node)))
}

/// GET /api/department/ancestors?id=
pub async fn get_ancestors<S: TransactionalStore + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<Vec<Department>>>> {
    let chain = state.departments.get_ancestors(query.id).await?;
    Ok(Json(ApiResponse::success(chain)))
}

/// POST /api/department/add
pub async fn add_department<S: TransactionalStore + 'static>(
    State(state): State<AppState<S>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<AddDepartmentRequest>,
) -> AppResult<Json<ApiResponse<Department>>> {
    require_manage(&user)?;
    let dept = state.departments.create(&req.name, req.parent_id).await?;
    Ok(Json(ApiResponse::success(dept)))
}

/// POST /api/department/update
pub async fn update_department<S: TransactionalStore + 'static>(
    State(state): State<AppState<S>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<UpdateDepartmentRequest>,
) -> AppResult<Json<ApiResponse<Department>>> {
    require_manage(&user)?;
    let dept = state
        .departments
        .update(req.id, &req.name, req.parent_id)
        .await?;
    Ok(Json(ApiResponse::success(dept)))
}

/// POST /api/department/move
pub async fn move_department<S: TransactionalStore + 'static>(
    State(state): State<AppState<S>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<MoveDepartmentRequest>,
) -> AppResult<Json<ApiResponse<Department>>> {
    require_manage(&user)?;
    let dept = state.departments.move_to(req.id, req.parent_id).await?;
    Ok(Json(ApiResponse::success(dept)))
}

/// POST /api/department/delete?id=
pub async fn delete_department<S: TransactionalStore + 'static>(
    State(state): State<AppState<S>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<()>>> {
    require_manage(&user)?;
    state.departments.delete(query.id).await?;
    Ok(Json(ApiResponse::success_msg("success")))
}

/// POST /api/department/rebuild
pub async fn rebuild_paths<S: TransactionalStore + 'static>(
    State(state): State<AppState<S>>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<RebuildResponse>>> {
    require_manage(&user)?;
    let corrected = state.departments.rebuild_paths().await?;
    Ok(Json(ApiResponse::success(RebuildResponse { corrected })))
}
