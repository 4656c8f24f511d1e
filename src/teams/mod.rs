use axum::extract::{Path, State};
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::{require_staff, AuthUser};
use crate::shared::crud::{or_unchanged, search_pattern, Crud, Resource};
use crate::shared::error::{ApiError, ApiResult};
use crate::shared::response::ApiResponse;
use crate::shared::router_factory::{crud_router, CrudRoutes};
use crate::shared::schema::{team_members, teams, users};
use crate::shared::state::AppState;
use crate::shared::utils::{Page, SortDir};

#[derive(Debug, Clone, Queryable, Serialize)]
pub struct Team {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub team_lead_id: Option<i32>,
    pub email: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Resource for Team {
    const NAME: &'static str = "Team";

    fn id(&self) -> i32 {
        self.id
    }

    fn activity_flag(&self) -> Option<bool> {
        Some(self.is_active)
    }
}

#[derive(Debug, Deserialize)]
pub struct TeamCreate {
    pub name: String,
    pub description: Option<String>,
    pub team_lead_id: Option<i32>,
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize, AsChangeset)]
#[diesel(table_name = teams)]
pub struct TeamPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub team_lead_id: Option<i32>,
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TeamFilter {
    pub is_active: Option<bool>,
}

impl Crud for Team {
    type Create = TeamCreate;
    type Update = TeamPatch;
    type Filter = TeamFilter;

    const SOFT_DELETE: bool = true;
    const STAFF_ONLY: bool = true;

    fn find(conn: &mut PgConnection, id: i32) -> ApiResult<Option<Self>> {
        Ok(teams::table.find(id).first(conn).optional()?)
    }

    fn list(
        conn: &mut PgConnection,
        filter: &Self::Filter,
        search: Option<&str>,
        sort: Option<(&str, SortDir)>,
        page: Page,
    ) -> ApiResult<Vec<Self>> {
        use teams::dsl;
        let mut q = dsl::teams.into_boxed();
        if let Some(active) = filter.is_active {
            q = q.filter(dsl::is_active.eq(active));
        }
        if let Some(term) = search {
            q = q.filter(dsl::name.ilike(search_pattern(term)));
        }
        let q = match sort {
            Some(("name", SortDir::Desc)) => q.order(dsl::name.desc()),
            Some(("created_at", SortDir::Asc)) => q.order(dsl::created_at.asc()),
            Some(("created_at", SortDir::Desc)) => q.order(dsl::created_at.desc()),
            _ => q.order(dsl::name.asc()),
        };
        Ok(q.offset(page.skip).limit(page.limit).load(conn)?)
    }

    fn count(
        conn: &mut PgConnection,
        filter: &Self::Filter,
        search: Option<&str>,
    ) -> ApiResult<i64> {
        use teams::dsl;
        let mut q = dsl::teams.into_boxed();
        if let Some(active) = filter.is_active {
            q = q.filter(dsl::is_active.eq(active));
        }
        if let Some(term) = search {
            q = q.filter(dsl::name.ilike(search_pattern(term)));
        }
        Ok(q.count().get_result(conn)?)
    }

    fn insert(conn: &mut PgConnection, new: Self::Create, _actor: i32) -> ApiResult<Self> {
        use teams::dsl;
        Ok(diesel::insert_into(dsl::teams)
            .values((
                dsl::name.eq(new.name),
                dsl::description.eq(new.description),
                dsl::team_lead_id.eq(new.team_lead_id),
                dsl::email.eq(new.email),
                dsl::is_active.eq(true),
                dsl::created_at.eq(Utc::now()),
            ))
            .get_result(conn)?)
    }

    fn apply_update(conn: &mut PgConnection, id: i32, patch: Self::Update) -> ApiResult<Self> {
        let result = diesel::update(teams::table.find(id))
            .set(&patch)
            .get_result(conn);
        or_unchanged::<Self>(result, conn, id)
    }

    fn remove(conn: &mut PgConnection, id: i32) -> ApiResult<()> {
        let n = diesel::delete(teams::table.find(id)).execute(conn)?;
        if n == 0 {
            return Err(ApiError::not_found(Self::NAME));
        }
        Ok(())
    }

    fn delete_or_deactivate(conn: &mut PgConnection, id: i32) -> ApiResult<()> {
        use teams::dsl;
        let n = diesel::update(dsl::teams.find(id))
            .set(dsl::is_active.eq(false))
            .execute(conn)?;
        if n == 0 {
            return Err(ApiError::not_found(Self::NAME));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Members

#[derive(Debug, Queryable, Serialize)]
pub struct TeamMember {
    pub id: i32,
    pub team_id: i32,
    pub user_id: i32,
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MemberView {
    #[serde(flatten)]
    pub member: TeamMember,
    pub username: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MemberAdd {
    pub user_id: i32,
    pub role: Option<String>,
}

async fn list_members(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<Vec<MemberView>>>> {
    use team_members::dsl;
    let mut conn = state.db()?;
    Team::find_or_fail(&mut conn, id)?;
    let members: Vec<TeamMember> = dsl::team_members
        .filter(dsl::team_id.eq(id))
        .order(dsl::joined_at.asc())
        .load(&mut conn)?;

    let ids: Vec<i32> = members.iter().map(|m| m.user_id).collect();
    let details: Vec<(i32, String, String)> = users::table
        .filter(users::id.eq_any(ids))
        .select((users::id, users::username, users::email))
        .load(&mut conn)?;

    let views = members
        .into_iter()
        .map(|member| {
            let info = details.iter().find(|(id, _, _)| *id == member.user_id);
            MemberView {
                username: info.map(|(_, name, _)| name.clone()),
                email: info.map(|(_, _, email)| email.clone()),
                member,
            }
        })
        .collect();
    Ok(Json(ApiResponse::data(views)))
}

async fn add_member(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<MemberAdd>,
) -> ApiResult<Json<ApiResponse<TeamMember>>> {
    require_staff(&user)?;
    use team_members::dsl;
    let mut conn = state.db()?;
    Team::find_or_fail(&mut conn, id)?;

    let user_exists: i64 = users::table
        .filter(users::id.eq(payload.user_id))
        .count()
        .get_result(&mut conn)?;
    if user_exists == 0 {
        return Err(ApiError::not_found("User"));
    }

    let already: i64 = dsl::team_members
        .filter(dsl::team_id.eq(id))
        .filter(dsl::user_id.eq(payload.user_id))
        .count()
        .get_result(&mut conn)?;
    if already > 0 {
        return Err(ApiError::bad_request("User is already a team member"));
    }

    let member: TeamMember = diesel::insert_into(dsl::team_members)
        .values((
            dsl::team_id.eq(id),
            dsl::user_id.eq(payload.user_id),
            dsl::role.eq(payload.role.unwrap_or_else(|| "member".to_string())),
            dsl::joined_at.eq(Utc::now()),
        ))
        .get_result(&mut conn)?;
    Ok(Json(ApiResponse::created(member, "Team member")))
}

async fn remove_member(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((id, member_user_id)): Path<(i32, i32)>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    require_staff(&user)?;
    use team_members::dsl;
    let mut conn = state.db()?;
    let n = diesel::delete(
        dsl::team_members
            .filter(dsl::team_id.eq(id))
            .filter(dsl::user_id.eq(member_user_id)),
    )
    .execute(&mut conn)?;
    if n == 0 {
        return Err(ApiError::not_found("Team member"));
    }
    Ok(Json(ApiResponse::message("Team member removed successfully")))
}

// ---------------------------------------------------------------------------

pub fn configure_team_routes() -> Router<Arc<AppState>> {
    crud_router::<Team>(CrudRoutes::default())
        .route("/:id/members", get(list_members).post(add_member))
        .route("/:id/members/:member_user_id", delete(remove_member))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_mutations_are_staff_gated_and_soft_deleting() {
        assert!(Team::STAFF_ONLY);
        assert!(Team::SOFT_DELETE);
    }
}
