use axum::extract::{Path, State};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::auth::{authorize_mutation, require_staff, AuthUser};
use crate::shared::crud::{or_unchanged, search_pattern, Crud, Resource};
use crate::shared::error::{ApiError, ApiResult};
use crate::shared::response::ApiResponse;
use crate::shared::router_factory::{crud_router, CrudRoutes};
use crate::shared::schema::{
    automation_rules, custom_field_values, custom_fields, sla_policies, ticket_comments,
    ticket_dependencies, ticket_sequences, ticket_tags, ticket_templates, tickets, time_entries,
    users,
};
use crate::shared::state::AppState;
use crate::shared::utils::{Page, SortDir};

#[derive(Debug, Clone, Queryable, Serialize)]
pub struct Ticket {
    pub id: i32,
    pub ticket_number: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub category: Option<String>,
    pub submitter_id: i32,
    pub assigned_to: Option<i32>,
    pub team_id: Option<i32>,
    pub asset_id: Option<i32>,
    pub company_id: Option<i32>,
    pub sla_policy_id: Option<i32>,
    pub sla_due_date: Option<DateTime<Utc>>,
    pub first_response_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
    pub time_spent_minutes: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Resource for Ticket {
    const NAME: &'static str = "Ticket";

    fn id(&self) -> i32 {
        self.id
    }

    fn owner_id(&self) -> Option<i32> {
        Some(self.submitter_id)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tickets)]
struct NewTicket {
    ticket_number: String,
    title: String,
    description: String,
    status: String,
    priority: String,
    category: Option<String>,
    submitter_id: i32,
    assigned_to: Option<i32>,
    team_id: Option<i32>,
    asset_id: Option<i32>,
    company_id: Option<i32>,
    sla_due_date: Option<DateTime<Utc>>,
    time_spent_minutes: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct TicketCreate {
    pub title: String,
    pub description: String,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub assigned_to: Option<i32>,
    pub team_id: Option<i32>,
    pub asset_id: Option<i32>,
    pub company_id: Option<i32>,
}

/// Partial update; fields absent from the payload are never written.
/// Stamp fields are server-managed and not deserialized.
#[derive(Debug, Default, Deserialize, AsChangeset)]
#[diesel(table_name = tickets)]
pub struct TicketPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub assigned_to: Option<i32>,
    pub team_id: Option<i32>,
    pub asset_id: Option<i32>,
    pub company_id: Option<i32>,
    pub resolution: Option<String>,
    #[serde(skip_deserializing)]
    pub sla_due_date: Option<DateTime<Utc>>,
    #[serde(skip_deserializing)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_deserializing)]
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TicketFilter {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub submitter_id: Option<i32>,
    pub assigned_to: Option<i32>,
    pub team_id: Option<i32>,
    pub company_id: Option<i32>,
}

impl Ticket {
    fn filtered(
        filter: &TicketFilter,
        search: Option<&str>,
    ) -> tickets::BoxedQuery<'static, diesel::pg::Pg> {
        use tickets::dsl;
        let mut q = dsl::tickets.into_boxed();
        if let Some(status) = &filter.status {
            q = q.filter(dsl::status.eq(status.clone()));
        }
        if let Some(priority) = &filter.priority {
            q = q.filter(dsl::priority.eq(priority.clone()));
        }
        if let Some(category) = &filter.category {
            q = q.filter(dsl::category.eq(category.clone()));
        }
        if let Some(id) = filter.submitter_id {
            q = q.filter(dsl::submitter_id.eq(id));
        }
        if let Some(id) = filter.assigned_to {
            q = q.filter(dsl::assigned_to.eq(id));
        }
        if let Some(id) = filter.team_id {
            q = q.filter(dsl::team_id.eq(id));
        }
        if let Some(id) = filter.company_id {
            q = q.filter(dsl::company_id.eq(id));
        }
        if let Some(term) = search {
            let pattern = search_pattern(term);
            q = q.filter(
                dsl::title
                    .ilike(pattern.clone())
                    .or(dsl::description.ilike(pattern.clone()))
                    .or(dsl::ticket_number.ilike(pattern)),
            );
        }
        q
    }
}

impl Crud for Ticket {
    type Create = TicketCreate;
    type Update = TicketPatch;
    type Filter = TicketFilter;

    fn find(conn: &mut PgConnection, id: i32) -> ApiResult<Option<Self>> {
        Ok(tickets::table.find(id).first(conn).optional()?)
    }

    fn list(
        conn: &mut PgConnection,
        filter: &Self::Filter,
        search: Option<&str>,
        sort: Option<(&str, SortDir)>,
        page: Page,
    ) -> ApiResult<Vec<Self>> {
        use tickets::dsl;
        let q = Self::filtered(filter, search);
        let q = match sort {
            Some(("priority", SortDir::Asc)) => q.order(dsl::priority.asc()),
            Some(("priority", SortDir::Desc)) => q.order(dsl::priority.desc()),
            Some(("status", SortDir::Asc)) => q.order(dsl::status.asc()),
            Some(("status", SortDir::Desc)) => q.order(dsl::status.desc()),
            Some(("updated_at", SortDir::Asc)) => q.order(dsl::updated_at.asc()),
            Some(("updated_at", SortDir::Desc)) => q.order(dsl::updated_at.desc()),
            Some(("created_at", SortDir::Asc)) => q.order(dsl::created_at.asc()),
            _ => q.order(dsl::created_at.desc()),
        };
        Ok(q.offset(page.skip).limit(page.limit).load(conn)?)
    }

    fn count(
        conn: &mut PgConnection,
        filter: &Self::Filter,
        search: Option<&str>,
    ) -> ApiResult<i64> {
        Ok(Self::filtered(filter, search).count().get_result(conn)?)
    }

    fn insert(conn: &mut PgConnection, new: Self::Create, actor: i32) -> ApiResult<Self> {
        let now = Utc::now();
        let priority = new.priority.unwrap_or_else(|| "medium".to_string());
        let row = NewTicket {
            ticket_number: next_ticket_number(conn)?,
            title: new.title,
            description: new.description,
            status: "new".to_string(),
            priority: priority.clone(),
            category: new.category,
            submitter_id: actor,
            assigned_to: new.assigned_to,
            team_id: new.team_id,
            asset_id: new.asset_id,
            company_id: new.company_id,
            sla_due_date: Some(now + Duration::hours(sla_hours(&priority))),
            time_spent_minutes: 0,
            created_at: now,
            updated_at: now,
        };
        let ticket: Ticket = diesel::insert_into(tickets::table)
            .values(&row)
            .get_result(conn)?;
        info!(ticket_id = ticket.id, number = %ticket.ticket_number, "ticket created");
        Ok(ticket)
    }

    fn apply_update(conn: &mut PgConnection, id: i32, patch: Self::Update) -> ApiResult<Self> {
        let result = diesel::update(tickets::table.find(id))
            .set((&patch, tickets::updated_at.eq(Utc::now())))
            .get_result(conn);
        or_unchanged::<Self>(result, conn, id)
    }

    fn remove(conn: &mut PgConnection, id: i32) -> ApiResult<()> {
        let n = diesel::delete(tickets::table.find(id)).execute(conn)?;
        if n == 0 {
            return Err(ApiError::not_found(Self::NAME));
        }
        Ok(())
    }
}

/// Resolution deadline in hours for a priority.
pub fn sla_hours(priority: &str) -> i64 {
    match priority {
        "critical" => 4,
        "high" => 8,
        "low" => 72,
        _ => 24,
    }
}

/// Next `YYYYMMDD-NNNN` ticket number. The per-day counter lives in its own
/// row and is bumped with an upsert, so concurrent creates each get a
/// distinct sequence value.
pub fn next_ticket_number(conn: &mut PgConnection) -> ApiResult<String> {
    use ticket_sequences::dsl;
    let today = Utc::now().date_naive();
    let seq: i32 = diesel::insert_into(dsl::ticket_sequences)
        .values((dsl::day.eq(today), dsl::next_seq.eq(1)))
        .on_conflict(dsl::day)
        .do_update()
        .set(dsl::next_seq.eq(dsl::next_seq + 1))
        .returning(dsl::next_seq)
        .get_result(conn)?;
    Ok(format_ticket_number(today, seq))
}

fn format_ticket_number(day: chrono::NaiveDate, seq: i32) -> String {
    format!("{}-{:04}", day.format("%Y%m%d"), seq)
}

/// Stamp resolution/closure timestamps exactly once, and recompute the SLA
/// deadline when the priority changes.
fn prepare_patch(patch: &mut TicketPatch, existing: &Ticket, now: DateTime<Utc>) {
    if let Some(priority) = &patch.priority {
        if *priority != existing.priority {
            patch.sla_due_date = Some(existing.created_at + Duration::hours(sla_hours(priority)));
        }
    }
    if let Some(status) = &patch.status {
        if status == "resolved" && existing.resolved_at.is_none() {
            patch.resolved_at = Some(now);
        }
        if status == "closed" && existing.closed_at.is_none() {
            patch.closed_at = Some(now);
        }
    }
}

async fn update_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(mut patch): Json<TicketPatch>,
) -> ApiResult<Json<ApiResponse<Ticket>>> {
    let mut conn = state.db()?;
    let existing = Ticket::find_or_fail(&mut conn, id)?;
    authorize_mutation(&user, &existing)?;
    prepare_patch(&mut patch, &existing, Utc::now());
    let ticket = Ticket::apply_update(&mut conn, id, patch)?;
    Ok(Json(ApiResponse::updated(ticket, "Ticket")))
}

// ---------------------------------------------------------------------------
// Stats

async fn stats_overview(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    use tickets::dsl;
    let mut conn = state.db()?;

    let total: i64 = dsl::tickets.count().get_result(&mut conn)?;
    let by_status: Vec<(String, i64)> = dsl::tickets
        .group_by(dsl::status)
        .select((dsl::status, diesel::dsl::count_star()))
        .load(&mut conn)?;
    let by_priority: Vec<(String, i64)> = dsl::tickets
        .group_by(dsl::priority)
        .select((dsl::priority, diesel::dsl::count_star()))
        .load(&mut conn)?;
    let unassigned: i64 = dsl::tickets
        .filter(dsl::assigned_to.is_null())
        .filter(dsl::status.ne_all(vec!["resolved", "closed"]))
        .count()
        .get_result(&mut conn)?;
    let overdue: i64 = dsl::tickets
        .filter(dsl::sla_due_date.lt(Utc::now()))
        .filter(dsl::status.ne_all(vec!["resolved", "closed"]))
        .count()
        .get_result(&mut conn)?;
    let mine: i64 = dsl::tickets
        .filter(dsl::assigned_to.eq(user.id()))
        .filter(dsl::status.ne_all(vec!["resolved", "closed"]))
        .count()
        .get_result(&mut conn)?;

    Ok(Json(serde_json::json!({
        "total": total,
        "by_status": by_status.into_iter().collect::<HashMap<_, _>>(),
        "by_priority": by_priority.into_iter().collect::<HashMap<_, _>>(),
        "unassigned": unassigned,
        "overdue": overdue,
        "assigned_to_me": mine,
    })))
}

// ---------------------------------------------------------------------------
// Comments

#[derive(Debug, Queryable, Serialize)]
pub struct TicketComment {
    pub id: i32,
    pub ticket_id: i32,
    pub user_id: i32,
    pub body: String,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: TicketComment,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommentCreate {
    pub body: String,
    #[serde(default)]
    pub is_internal: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = ticket_comments)]
struct NewComment {
    ticket_id: i32,
    user_id: i32,
    body: String,
    is_internal: bool,
    created_at: DateTime<Utc>,
}

/// Attach usernames to a batch of comments with one extra lookup.
pub fn with_usernames(
    conn: &mut PgConnection,
    comments: Vec<TicketComment>,
) -> ApiResult<Vec<CommentView>> {
    let ids: Vec<i32> = comments.iter().map(|c| c.user_id).collect();
    let names: HashMap<i32, String> = users::table
        .filter(users::id.eq_any(ids))
        .select((users::id, users::username))
        .load::<(i32, String)>(conn)?
        .into_iter()
        .collect();
    Ok(comments
        .into_iter()
        .map(|comment| {
            let username = names.get(&comment.user_id).cloned();
            CommentView { comment, username }
        })
        .collect())
}

async fn list_comments(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<Vec<CommentView>>>> {
    use ticket_comments::dsl;
    let mut conn = state.db()?;
    Ticket::find_or_fail(&mut conn, id)?;
    let mut q = dsl::ticket_comments
        .filter(dsl::ticket_id.eq(id))
        .into_boxed();
    if !user.is_staff() {
        q = q.filter(dsl::is_internal.eq(false));
    }
    let comments: Vec<TicketComment> = q.order(dsl::created_at.asc()).load(&mut conn)?;
    Ok(Json(ApiResponse::data(with_usernames(&mut conn, comments)?)))
}

/// The first public staff reply sets the response clock.
fn marks_first_response(ticket: &Ticket, author_is_staff: bool, is_internal: bool) -> bool {
    !is_internal && author_is_staff && ticket.first_response_at.is_none()
}

/// Shared by the staff route and the portal. The comment row and the
/// `first_response_at` stamp commit together or not at all.
pub fn add_comment_row(
    conn: &mut PgConnection,
    ticket: &Ticket,
    user: &AuthUser,
    body: String,
    is_internal: bool,
) -> ApiResult<TicketComment> {
    conn.transaction(|conn| -> ApiResult<TicketComment> {
        let comment: TicketComment = diesel::insert_into(ticket_comments::table)
            .values(&NewComment {
                ticket_id: ticket.id,
                user_id: user.id(),
                body,
                is_internal,
                created_at: Utc::now(),
            })
            .get_result(conn)?;

        if marks_first_response(ticket, user.is_staff(), is_internal) {
            diesel::update(tickets::table.find(ticket.id))
                .set(tickets::first_response_at.eq(Some(comment.created_at)))
                .execute(conn)?;
        }
        Ok(comment)
    })
}

async fn add_comment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<CommentCreate>,
) -> ApiResult<Json<ApiResponse<TicketComment>>> {
    let mut conn = state.db()?;
    let ticket = Ticket::find_or_fail(&mut conn, id)?;
    // only staff may leave internal notes
    let is_internal = payload.is_internal && user.is_staff();
    let comment = add_comment_row(&mut conn, &ticket, &user, payload.body, is_internal)?;
    Ok(Json(ApiResponse::created(comment, "Comment")))
}

// ---------------------------------------------------------------------------
// Time entries

#[derive(Debug, Clone, Queryable, Serialize)]
pub struct TimeEntry {
    pub id: i32,
    pub ticket_id: i32,
    pub user_id: i32,
    pub minutes: i32,
    pub description: Option<String>,
    pub billable: bool,
    pub created_at: DateTime<Utc>,
}

impl Resource for TimeEntry {
    const NAME: &'static str = "Time entry";

    fn id(&self) -> i32 {
        self.id
    }

    fn owner_id(&self) -> Option<i32> {
        Some(self.user_id)
    }
}

#[derive(Debug, Deserialize)]
pub struct TimeEntryCreate {
    pub minutes: i32,
    pub description: Option<String>,
    #[serde(default)]
    pub billable: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = time_entries)]
struct NewTimeEntry {
    ticket_id: i32,
    user_id: i32,
    minutes: i32,
    description: Option<String>,
    billable: bool,
    created_at: DateTime<Utc>,
}

fn adjust_time_spent(conn: &mut PgConnection, ticket_id: i32, delta: i32) -> ApiResult<()> {
    use tickets::dsl;
    diesel::update(dsl::tickets.find(ticket_id))
        .set(dsl::time_spent_minutes.eq(dsl::time_spent_minutes + delta))
        .execute(conn)?;
    Ok(())
}

async fn list_time_entries(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<Vec<TimeEntry>>>> {
    use time_entries::dsl;
    let mut conn = state.db()?;
    Ticket::find_or_fail(&mut conn, id)?;
    let entries: Vec<TimeEntry> = dsl::time_entries
        .filter(dsl::ticket_id.eq(id))
        .order(dsl::created_at.desc())
        .load(&mut conn)?;
    Ok(Json(ApiResponse::data(entries)))
}

async fn add_time_entry(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<TimeEntryCreate>,
) -> ApiResult<Json<ApiResponse<TimeEntry>>> {
    require_staff(&user)?;
    if payload.minutes <= 0 {
        return Err(ApiError::bad_request("Minutes must be positive"));
    }
    let mut conn = state.db()?;
    Ticket::find_or_fail(&mut conn, id)?;
    // the entry and the rolled-up ticket total commit together
    let entry = conn.transaction(|conn| -> ApiResult<TimeEntry> {
        let entry: TimeEntry = diesel::insert_into(time_entries::table)
            .values(&NewTimeEntry {
                ticket_id: id,
                user_id: user.id(),
                minutes: payload.minutes,
                description: payload.description,
                billable: payload.billable,
                created_at: Utc::now(),
            })
            .get_result(conn)?;
        adjust_time_spent(conn, id, entry.minutes)?;
        Ok(entry)
    })?;
    Ok(Json(ApiResponse::created(entry, "Time entry")))
}

#[derive(Debug, Deserialize, AsChangeset)]
#[diesel(table_name = time_entries)]
pub struct TimeEntryPatch {
    pub minutes: Option<i32>,
    pub description: Option<String>,
    pub billable: Option<bool>,
}

async fn update_time_entry(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(entry_id): Path<i32>,
    Json(patch): Json<TimeEntryPatch>,
) -> ApiResult<Json<ApiResponse<TimeEntry>>> {
    use time_entries::dsl;
    let mut conn = state.db()?;
    let existing: TimeEntry = dsl::time_entries
        .find(entry_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Time entry"))?;
    authorize_mutation(&user, &existing)?;
    if let Some(minutes) = patch.minutes {
        if minutes <= 0 {
            return Err(ApiError::bad_request("Minutes must be positive"));
        }
    }
    let updated = conn.transaction(|conn| -> ApiResult<TimeEntry> {
        let updated: TimeEntry = match diesel::update(dsl::time_entries.find(entry_id))
            .set(&patch)
            .get_result(conn)
        {
            Ok(row) => row,
            Err(diesel::result::Error::QueryBuilderError(_)) => existing.clone(),
            Err(err) => return Err(err.into()),
        };
        let delta = updated.minutes - existing.minutes;
        if delta != 0 {
            adjust_time_spent(conn, existing.ticket_id, delta)?;
        }
        Ok(updated)
    })?;
    Ok(Json(ApiResponse::updated(updated, "Time entry")))
}

async fn delete_time_entry(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(entry_id): Path<i32>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    use time_entries::dsl;
    let mut conn = state.db()?;
    let existing: TimeEntry = dsl::time_entries
        .find(entry_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Time entry"))?;
    authorize_mutation(&user, &existing)?;
    conn.transaction(|conn| -> ApiResult<()> {
        diesel::delete(dsl::time_entries.find(entry_id)).execute(conn)?;
        adjust_time_spent(conn, existing.ticket_id, -existing.minutes)
    })?;
    Ok(Json(ApiResponse::message("Time entry deleted successfully")))
}

// ---------------------------------------------------------------------------
// Templates

#[derive(Debug, Queryable, Serialize)]
pub struct TicketTemplate {
    pub id: i32,
    pub name: String,
    pub category: Option<String>,
    pub title_template: String,
    pub description_template: String,
    pub default_priority: String,
    pub created_by: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct TemplateCreate {
    pub name: String,
    pub category: Option<String>,
    pub title_template: String,
    pub description_template: String,
    pub default_priority: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = ticket_templates)]
struct NewTemplate {
    name: String,
    category: Option<String>,
    title_template: String,
    description_template: String,
    default_priority: String,
    created_by: Option<i32>,
    created_at: DateTime<Utc>,
}

async fn list_templates(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> ApiResult<Json<ApiResponse<Vec<TicketTemplate>>>> {
    use ticket_templates::dsl;
    let mut conn = state.db()?;
    let templates: Vec<TicketTemplate> =
        dsl::ticket_templates.order(dsl::name.asc()).load(&mut conn)?;
    Ok(Json(ApiResponse::data(templates)))
}

async fn create_template(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<TemplateCreate>,
) -> ApiResult<Json<ApiResponse<TicketTemplate>>> {
    require_staff(&user)?;
    let mut conn = state.db()?;
    let template: TicketTemplate = diesel::insert_into(ticket_templates::table)
        .values(&NewTemplate {
            name: payload.name,
            category: payload.category,
            title_template: payload.title_template,
            description_template: payload.description_template,
            default_priority: payload
                .default_priority
                .unwrap_or_else(|| "medium".to_string()),
            created_by: Some(user.id()),
            created_at: Utc::now(),
        })
        .get_result(&mut conn)?;
    Ok(Json(ApiResponse::created(template, "Template")))
}

async fn delete_template(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(template_id): Path<i32>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    require_staff(&user)?;
    let mut conn = state.db()?;
    let n = diesel::delete(ticket_templates::table.find(template_id)).execute(&mut conn)?;
    if n == 0 {
        return Err(ApiError::not_found("Template"));
    }
    Ok(Json(ApiResponse::message("Template deleted successfully")))
}

async fn create_from_template(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(template_id): Path<i32>,
) -> ApiResult<Json<ApiResponse<Ticket>>> {
    let mut conn = state.db()?;
    let template: TicketTemplate = ticket_templates::table
        .find(template_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Template"))?;
    let ticket = Ticket::insert(
        &mut conn,
        TicketCreate {
            title: template.title_template,
            description: template.description_template,
            priority: Some(template.default_priority),
            category: template.category,
            assigned_to: None,
            team_id: None,
            asset_id: None,
            company_id: None,
        },
        user.id(),
    )?;
    Ok(Json(ApiResponse::created(ticket, "Ticket")))
}

// ---------------------------------------------------------------------------
// Tags

#[derive(Debug, Queryable, Serialize)]
pub struct TicketTag {
    pub id: i32,
    pub ticket_id: i32,
    pub tag_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct TagCreate {
    pub tag_name: String,
}

async fn list_tags(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<Vec<TicketTag>>>> {
    use ticket_tags::dsl;
    let mut conn = state.db()?;
    let tags: Vec<TicketTag> = dsl::ticket_tags
        .filter(dsl::ticket_id.eq(id))
        .order(dsl::tag_name.asc())
        .load(&mut conn)?;
    Ok(Json(ApiResponse::data(tags)))
}

async fn add_tag(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<TagCreate>,
) -> ApiResult<Json<ApiResponse<TicketTag>>> {
    use ticket_tags::dsl;
    let mut conn = state.db()?;
    Ticket::find_or_fail(&mut conn, id)?;
    let tag_name = payload.tag_name.trim().to_lowercase();
    if tag_name.is_empty() {
        return Err(ApiError::bad_request("Tag name must not be empty"));
    }
    let exists: i64 = dsl::ticket_tags
        .filter(dsl::ticket_id.eq(id))
        .filter(dsl::tag_name.eq(&tag_name))
        .count()
        .get_result(&mut conn)?;
    if exists > 0 {
        return Err(ApiError::bad_request("Tag already exists on this ticket"));
    }
    let tag: TicketTag = diesel::insert_into(dsl::ticket_tags)
        .values((
            dsl::ticket_id.eq(id),
            dsl::tag_name.eq(tag_name),
            dsl::created_at.eq(Utc::now()),
        ))
        .get_result(&mut conn)?;
    Ok(Json(ApiResponse::created(tag, "Tag")))
}

async fn remove_tag(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path((id, tag_id)): Path<(i32, i32)>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    use ticket_tags::dsl;
    let mut conn = state.db()?;
    let n = diesel::delete(
        dsl::ticket_tags
            .filter(dsl::id.eq(tag_id))
            .filter(dsl::ticket_id.eq(id)),
    )
    .execute(&mut conn)?;
    if n == 0 {
        return Err(ApiError::not_found("Tag"));
    }
    Ok(Json(ApiResponse::message("Tag removed successfully")))
}

// ---------------------------------------------------------------------------
// Dependencies

#[derive(Debug, Queryable, Serialize)]
pub struct TicketDependency {
    pub id: i32,
    pub ticket_id: i32,
    pub depends_on_ticket_id: i32,
    pub dependency_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct DependencyCreate {
    pub depends_on_ticket_id: i32,
    pub dependency_type: Option<String>,
}

async fn list_dependencies(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<Vec<TicketDependency>>>> {
    use ticket_dependencies::dsl;
    let mut conn = state.db()?;
    let deps: Vec<TicketDependency> = dsl::ticket_dependencies
        .filter(dsl::ticket_id.eq(id))
        .load(&mut conn)?;
    Ok(Json(ApiResponse::data(deps)))
}

async fn add_dependency(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<DependencyCreate>,
) -> ApiResult<Json<ApiResponse<TicketDependency>>> {
    use ticket_dependencies::dsl;
    if payload.depends_on_ticket_id == id {
        return Err(ApiError::bad_request("A ticket cannot depend on itself"));
    }
    let mut conn = state.db()?;
    Ticket::find_or_fail(&mut conn, id)?;
    Ticket::find_or_fail(&mut conn, payload.depends_on_ticket_id)?;
    let exists: i64 = dsl::ticket_dependencies
        .filter(dsl::ticket_id.eq(id))
        .filter(dsl::depends_on_ticket_id.eq(payload.depends_on_ticket_id))
        .count()
        .get_result(&mut conn)?;
    if exists > 0 {
        return Err(ApiError::bad_request("Dependency already exists"));
    }
    let dependency: TicketDependency = diesel::insert_into(dsl::ticket_dependencies)
        .values((
            dsl::ticket_id.eq(id),
            dsl::depends_on_ticket_id.eq(payload.depends_on_ticket_id),
            dsl::dependency_type
                .eq(payload.dependency_type.unwrap_or_else(|| "blocks".to_string())),
            dsl::created_at.eq(Utc::now()),
        ))
        .get_result(&mut conn)?;
    Ok(Json(ApiResponse::created(dependency, "Dependency")))
}

async fn remove_dependency(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(dep_id): Path<i32>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    let mut conn = state.db()?;
    let n = diesel::delete(ticket_dependencies::table.find(dep_id)).execute(&mut conn)?;
    if n == 0 {
        return Err(ApiError::not_found("Dependency"));
    }
    Ok(Json(ApiResponse::message("Dependency removed successfully")))
}

// ---------------------------------------------------------------------------
// Custom fields

#[derive(Debug, Queryable, Serialize)]
pub struct CustomField {
    pub id: i32,
    pub name: String,
    pub field_type: String,
    pub options: Option<String>,
    pub is_required: bool,
    pub applies_to: String,
    pub position: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CustomFieldCreate {
    pub name: String,
    pub field_type: String,
    pub options: Option<String>,
    #[serde(default)]
    pub is_required: bool,
    pub applies_to: Option<String>,
    #[serde(default)]
    pub position: i32,
}

#[derive(Debug, Deserialize, AsChangeset)]
#[diesel(table_name = custom_fields)]
pub struct CustomFieldPatch {
    pub name: Option<String>,
    pub field_type: Option<String>,
    pub options: Option<String>,
    pub is_required: Option<bool>,
    pub position: Option<i32>,
    pub is_active: Option<bool>,
}

async fn list_custom_fields(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> ApiResult<Json<ApiResponse<Vec<CustomField>>>> {
    use custom_fields::dsl;
    let mut conn = state.db()?;
    let fields: Vec<CustomField> = dsl::custom_fields
        .filter(dsl::is_active.eq(true))
        .order(dsl::position.asc())
        .load(&mut conn)?;
    Ok(Json(ApiResponse::data(fields)))
}

async fn create_custom_field(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<CustomFieldCreate>,
) -> ApiResult<Json<ApiResponse<CustomField>>> {
    require_staff(&user)?;
    use custom_fields::dsl;
    let mut conn = state.db()?;
    let field: CustomField = diesel::insert_into(dsl::custom_fields)
        .values((
            dsl::name.eq(payload.name),
            dsl::field_type.eq(payload.field_type),
            dsl::options.eq(payload.options),
            dsl::is_required.eq(payload.is_required),
            dsl::applies_to.eq(payload.applies_to.unwrap_or_else(|| "ticket".to_string())),
            dsl::position.eq(payload.position),
            dsl::is_active.eq(true),
            dsl::created_at.eq(Utc::now()),
        ))
        .get_result(&mut conn)?;
    Ok(Json(ApiResponse::created(field, "Custom field")))
}

async fn update_custom_field(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(field_id): Path<i32>,
    Json(patch): Json<CustomFieldPatch>,
) -> ApiResult<Json<ApiResponse<CustomField>>> {
    require_staff(&user)?;
    let mut conn = state.db()?;
    let field: CustomField = match diesel::update(custom_fields::table.find(field_id))
        .set(&patch)
        .get_result(&mut conn)
    {
        Ok(row) => row,
        Err(diesel::result::Error::QueryBuilderError(_)) => custom_fields::table
            .find(field_id)
            .first(&mut conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found("Custom field"))?,
        Err(diesel::result::Error::NotFound) => return Err(ApiError::not_found("Custom field")),
        Err(err) => return Err(err.into()),
    };
    Ok(Json(ApiResponse::updated(field, "Custom field")))
}

async fn deactivate_custom_field(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(field_id): Path<i32>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    require_staff(&user)?;
    use custom_fields::dsl;
    let mut conn = state.db()?;
    let n = diesel::update(dsl::custom_fields.find(field_id))
        .set(dsl::is_active.eq(false))
        .execute(&mut conn)?;
    if n == 0 {
        return Err(ApiError::not_found("Custom field"));
    }
    Ok(Json(ApiResponse::message(
        "Custom field deactivated successfully",
    )))
}

#[derive(Debug, Queryable, Serialize)]
pub struct CustomFieldValue {
    pub id: i32,
    pub custom_field_id: i32,
    pub ticket_id: Option<i32>,
    pub value: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct FieldValueSet {
    pub custom_field_id: i32,
    pub value: Option<String>,
}

async fn list_field_values(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<Vec<CustomFieldValue>>>> {
    use custom_field_values::dsl;
    let mut conn = state.db()?;
    let values: Vec<CustomFieldValue> = dsl::custom_field_values
        .filter(dsl::ticket_id.eq(id))
        .load(&mut conn)?;
    Ok(Json(ApiResponse::data(values)))
}

async fn set_field_value(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<FieldValueSet>,
) -> ApiResult<Json<ApiResponse<CustomFieldValue>>> {
    use custom_field_values::dsl;
    let mut conn = state.db()?;
    let ticket = Ticket::find_or_fail(&mut conn, id)?;
    authorize_mutation(&user, &ticket)?;

    let field: CustomField = custom_fields::table
        .find(payload.custom_field_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Custom field"))?;
    if !field.is_active {
        return Err(ApiError::bad_request("Custom field is inactive"));
    }

    let existing: Option<CustomFieldValue> = dsl::custom_field_values
        .filter(dsl::ticket_id.eq(id))
        .filter(dsl::custom_field_id.eq(payload.custom_field_id))
        .first(&mut conn)
        .optional()?;

    let value: CustomFieldValue = match existing {
        Some(row) => diesel::update(dsl::custom_field_values.find(row.id))
            .set(dsl::value.eq(payload.value))
            .get_result(&mut conn)?,
        None => diesel::insert_into(dsl::custom_field_values)
            .values((
                dsl::custom_field_id.eq(payload.custom_field_id),
                dsl::ticket_id.eq(Some(id)),
                dsl::value.eq(payload.value),
                dsl::created_at.eq(Utc::now()),
            ))
            .get_result(&mut conn)?,
    };
    Ok(Json(ApiResponse::updated(value, "Custom field value")))
}

// ---------------------------------------------------------------------------
// SLA policies & automation rules

#[derive(Debug, Queryable, Serialize)]
pub struct SlaPolicy {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub priority: String,
    pub response_time_hours: i32,
    pub resolution_time_hours: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

async fn list_sla_policies(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> ApiResult<Json<ApiResponse<Vec<SlaPolicy>>>> {
    use sla_policies::dsl;
    let mut conn = state.db()?;
    let policies: Vec<SlaPolicy> = dsl::sla_policies
        .filter(dsl::is_active.eq(true))
        .order(dsl::priority.asc())
        .load(&mut conn)?;
    Ok(Json(ApiResponse::data(policies)))
}

#[derive(Debug, Queryable, Serialize)]
pub struct AutomationRule {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub trigger_type: String,
    pub conditions: String,
    pub actions: String,
    pub is_active: bool,
    pub priority: i32,
    pub created_by: Option<i32>,
    pub created_at: DateTime<Utc>,
}

async fn list_automation_rules(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<ApiResponse<Vec<AutomationRule>>>> {
    require_staff(&user)?;
    use automation_rules::dsl;
    let mut conn = state.db()?;
    let rules: Vec<AutomationRule> = dsl::automation_rules
        .order((dsl::priority.asc(), dsl::name.asc()))
        .load(&mut conn)?;
    Ok(Json(ApiResponse::data(rules)))
}

// ---------------------------------------------------------------------------

pub fn configure_ticket_routes() -> Router<Arc<AppState>> {
    crud_router::<Ticket>(CrudRoutes::all().without_update())
        .route("/:id", put(update_ticket))
        .route("/stats/overview", get(stats_overview))
        .route("/:id/comments", get(list_comments).post(add_comment))
        .route(
            "/:id/time-entries",
            get(list_time_entries).post(add_time_entry),
        )
        .route(
            "/time-entries/:entry_id",
            put(update_time_entry).delete(delete_time_entry),
        )
        .route("/templates", get(list_templates).post(create_template))
        .route("/templates/:template_id", delete(delete_template))
        .route(
            "/templates/:template_id/create-ticket",
            post(create_from_template),
        )
        .route("/:id/tags", get(list_tags).post(add_tag))
        .route("/:id/tags/:tag_id", delete(remove_tag))
        .route(
            "/:id/dependencies",
            get(list_dependencies).post(add_dependency),
        )
        .route("/dependencies/:dep_id", delete(remove_dependency))
        .route(
            "/custom-fields",
            get(list_custom_fields).post(create_custom_field),
        )
        .route(
            "/custom-fields/:field_id",
            put(update_custom_field).delete(deactivate_custom_field),
        )
        .route(
            "/:id/custom-field-values",
            get(list_field_values).put(set_field_value),
        )
        .route("/sla-policies", get(list_sla_policies))
        .route("/automation-rules", get(list_automation_rules))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ticket(status: &str, priority: &str) -> Ticket {
        let now = Utc::now();
        Ticket {
            id: 1,
            ticket_number: "20260823-0001".to_string(),
            title: "Printer down".to_string(),
            description: "3rd floor".to_string(),
            status: status.to_string(),
            priority: priority.to_string(),
            category: None,
            submitter_id: 7,
            assigned_to: None,
            team_id: None,
            asset_id: None,
            company_id: None,
            sla_policy_id: None,
            sla_due_date: Some(now + Duration::hours(24)),
            first_response_at: None,
            resolution: None,
            time_spent_minutes: 0,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            closed_at: None,
        }
    }

    #[test]
    fn ticket_number_format() {
        let day = NaiveDate::from_ymd_opt(2026, 1, 19).unwrap();
        assert_eq!(format_ticket_number(day, 3), "20260119-0003");
        assert_eq!(format_ticket_number(day, 12345), "20260119-12345");
    }

    #[test]
    fn sla_hours_by_priority() {
        assert_eq!(sla_hours("critical"), 4);
        assert_eq!(sla_hours("high"), 8);
        assert_eq!(sla_hours("medium"), 24);
        assert_eq!(sla_hours("low"), 72);
        assert_eq!(sla_hours("unheard-of"), 24);
    }

    #[test]
    fn resolving_stamps_resolved_at_once() {
        let now = Utc::now();
        let existing = ticket("in_progress", "medium");
        let mut patch = TicketPatch {
            status: Some("resolved".to_string()),
            ..Default::default()
        };
        prepare_patch(&mut patch, &existing, now);
        assert_eq!(patch.resolved_at, Some(now));

        // already stamped: a second resolve does not move the timestamp
        let mut already = ticket("resolved", "medium");
        already.resolved_at = Some(now - Duration::hours(1));
        let mut patch = TicketPatch {
            status: Some("resolved".to_string()),
            ..Default::default()
        };
        prepare_patch(&mut patch, &already, now);
        assert_eq!(patch.resolved_at, None);
    }

    #[test]
    fn closing_stamps_closed_at() {
        let now = Utc::now();
        let mut existing = ticket("resolved", "medium");
        existing.resolved_at = Some(now - Duration::hours(2));
        let mut patch = TicketPatch {
            status: Some("closed".to_string()),
            ..Default::default()
        };
        prepare_patch(&mut patch, &existing, now);
        assert_eq!(patch.closed_at, Some(now));
        assert_eq!(patch.resolved_at, None);
    }

    #[test]
    fn priority_change_recomputes_sla_deadline() {
        let now = Utc::now();
        let existing = ticket("new", "medium");
        let mut patch = TicketPatch {
            priority: Some("critical".to_string()),
            ..Default::default()
        };
        prepare_patch(&mut patch, &existing, now);
        assert_eq!(
            patch.sla_due_date,
            Some(existing.created_at + Duration::hours(4))
        );
    }

    #[test]
    fn unchanged_priority_keeps_sla_deadline() {
        let now = Utc::now();
        let existing = ticket("new", "high");
        let mut patch = TicketPatch {
            priority: Some("high".to_string()),
            ..Default::default()
        };
        prepare_patch(&mut patch, &existing, now);
        assert_eq!(patch.sla_due_date, None);
    }

    #[test]
    fn first_public_staff_reply_sets_the_response_clock() {
        let mut t = ticket("new", "medium");
        assert!(marks_first_response(&t, true, false));
        // internal notes and customer replies do not count
        assert!(!marks_first_response(&t, true, true));
        assert!(!marks_first_response(&t, false, false));

        t.first_response_at = Some(Utc::now());
        assert!(!marks_first_response(&t, true, false));
    }
}
