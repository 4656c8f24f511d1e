//! Reporting surface: dashboard counters, date-range statistics, the
//! recent-activity feed, and saved/scheduled report definitions.

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::{Double, Nullable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::{authorize_mutation, require_staff, AuthUser};
use crate::shared::crud::Resource;
use crate::shared::error::{ApiError, ApiResult};
use crate::shared::response::ApiResponse;
use crate::shared::schema::{
    alerts, knowledge_articles, monitored_services, reports, satisfaction_ratings,
    scheduled_reports, tickets,
};
use crate::shared::state::AppState;
use crate::shared::utils::resolve_date_range;

/// Fleet health: each down service costs 20 points, each degraded one 5.
fn health_score(down: i64, warning: i64) -> i64 {
    (100 - down * 20 - warning * 5).clamp(0, 100)
}

fn percentage(part: i64, whole: i64) -> Option<f64> {
    if whole == 0 {
        None
    } else {
        Some(part as f64 * 100.0 / whole as f64)
    }
}

// ---------------------------------------------------------------------------
// Dashboard

async fn dashboard(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    let mut conn = state.db()?;

    let total_tickets: i64 = tickets::table.count().get_result(&mut conn)?;
    let open_tickets: i64 = tickets::table
        .filter(tickets::status.ne_all(vec!["resolved", "closed"]))
        .count()
        .get_result(&mut conn)?;
    let articles: i64 = knowledge_articles::table
        .filter(knowledge_articles::is_published.eq(true))
        .count()
        .get_result(&mut conn)?;
    let services: i64 = monitored_services::table.count().get_result(&mut conn)?;
    let services_down: i64 = monitored_services::table
        .filter(monitored_services::status.eq("down"))
        .count()
        .get_result(&mut conn)?;
    let services_warning: i64 = monitored_services::table
        .filter(monitored_services::status.eq("warning"))
        .count()
        .get_result(&mut conn)?;
    let active_alerts: i64 = alerts::table
        .filter(alerts::status.eq("active"))
        .count()
        .get_result(&mut conn)?;

    Ok(Json(serde_json::json!({
        "tickets": { "total": total_tickets, "open": open_tickets },
        "knowledge": { "published_articles": articles },
        "monitoring": {
            "services": services,
            "down": services_down,
            "warning": services_warning,
            "active_alerts": active_alerts,
            "health_score": health_score(services_down, services_warning),
        },
    })))
}

// ---------------------------------------------------------------------------
// Date-range statistics

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

async fn range_stats(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    use tickets::dsl;
    let mut conn = state.db()?;
    let (start, end) = resolve_date_range(query.start_date, query.end_date)?;

    let created: i64 = dsl::tickets
        .filter(dsl::created_at.between(start, end))
        .count()
        .get_result(&mut conn)?;
    let resolved: i64 = dsl::tickets
        .filter(dsl::resolved_at.between(start, end))
        .count()
        .get_result(&mut conn)?;

    let avg_resolution_hours: Option<f64> = dsl::tickets
        .filter(dsl::resolved_at.between(start, end))
        .select(sql::<Nullable<Double>>(
            "avg(extract(epoch from (resolved_at - created_at)) / 3600.0)",
        ))
        .first(&mut conn)?;
    let avg_first_response_hours: Option<f64> = dsl::tickets
        .filter(dsl::created_at.between(start, end))
        .filter(dsl::first_response_at.is_not_null())
        .select(sql::<Nullable<Double>>(
            "avg(extract(epoch from (first_response_at - created_at)) / 3600.0)",
        ))
        .first(&mut conn)?;

    // met the deadline = resolved no later than the SLA due date
    let sla_measured: i64 = dsl::tickets
        .filter(dsl::resolved_at.between(start, end))
        .filter(dsl::sla_due_date.is_not_null())
        .count()
        .get_result(&mut conn)?;
    let sla_met: i64 = dsl::tickets
        .filter(dsl::resolved_at.between(start, end))
        .filter(dsl::sla_due_date.is_not_null())
        .filter(sql::<diesel::sql_types::Bool>("resolved_at <= sla_due_date"))
        .count()
        .get_result(&mut conn)?;

    let csat: Option<f64> = satisfaction_ratings::table
        .filter(satisfaction_ratings::created_at.between(start, end))
        .select(sql::<Nullable<Double>>("avg(rating)::float8"))
        .first(&mut conn)?;

    Ok(Json(serde_json::json!({
        "start_date": start,
        "end_date": end,
        "tickets_created": created,
        "tickets_resolved": resolved,
        "avg_resolution_hours": avg_resolution_hours,
        "avg_first_response_hours": avg_first_response_hours,
        "sla_compliance_pct": percentage(sla_met, sla_measured),
        "csat_average": csat,
    })))
}

// ---------------------------------------------------------------------------
// Recent activity

#[derive(Debug, Serialize)]
struct ActivityEntry {
    kind: &'static str,
    id: i32,
    title: String,
    detail: String,
    timestamp: DateTime<Utc>,
}

async fn recent_activity(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> ApiResult<Json<ApiResponse<Vec<serde_json::Value>>>> {
    let mut conn = state.db()?;

    let recent_tickets: Vec<(i32, String, String, DateTime<Utc>)> = tickets::table
        .order(tickets::created_at.desc())
        .limit(10)
        .select((
            tickets::id,
            tickets::title,
            tickets::ticket_number,
            tickets::created_at,
        ))
        .load(&mut conn)?;
    let recent_alerts: Vec<(i32, String, String, DateTime<Utc>)> = alerts::table
        .order(alerts::created_at.desc())
        .limit(10)
        .select((alerts::id, alerts::title, alerts::severity, alerts::created_at))
        .load(&mut conn)?;

    let mut feed: Vec<ActivityEntry> = recent_tickets
        .into_iter()
        .map(|(id, title, number, timestamp)| ActivityEntry {
            kind: "ticket",
            id,
            title,
            detail: number,
            timestamp,
        })
        .chain(
            recent_alerts
                .into_iter()
                .map(|(id, title, severity, timestamp)| ActivityEntry {
                    kind: "alert",
                    id,
                    title,
                    detail: severity,
                    timestamp,
                }),
        )
        .collect();
    feed.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    feed.truncate(20);

    let feed = feed
        .into_iter()
        .map(|entry| serde_json::to_value(entry).unwrap_or_default())
        .collect();
    Ok(Json(ApiResponse::data(feed)))
}

// ---------------------------------------------------------------------------
// Saved reports

#[derive(Debug, Queryable, Serialize)]
pub struct Report {
    pub id: i32,
    pub name: String,
    pub report_type: String,
    pub description: Option<String>,
    pub config: String,
    pub created_by: Option<i32>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

impl Resource for Report {
    const NAME: &'static str = "Report";

    fn id(&self) -> i32 {
        self.id
    }

    fn owner_id(&self) -> Option<i32> {
        self.created_by
    }
}

#[derive(Debug, Deserialize)]
pub struct ReportCreate {
    pub name: String,
    pub report_type: String,
    pub description: Option<String>,
    pub config: String,
    #[serde(default)]
    pub is_public: bool,
}

fn find_report(conn: &mut PgConnection, id: i32) -> ApiResult<Report> {
    reports::table
        .find(id)
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Report"))
}

async fn list_reports(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<ApiResponse<Vec<Report>>>> {
    use reports::dsl;
    let mut conn = state.db()?;
    let mut q = dsl::reports.into_boxed();
    if !user.is_admin() {
        q = q.filter(dsl::is_public.eq(true).or(dsl::created_by.eq(user.id())));
    }
    let rows: Vec<Report> = q.order(dsl::created_at.desc()).load(&mut conn)?;
    Ok(Json(ApiResponse::data(rows)))
}

async fn create_report(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<ReportCreate>,
) -> ApiResult<Json<ApiResponse<Report>>> {
    use reports::dsl;
    let mut conn = state.db()?;
    let report: Report = diesel::insert_into(dsl::reports)
        .values((
            dsl::name.eq(payload.name),
            dsl::report_type.eq(payload.report_type),
            dsl::description.eq(payload.description),
            dsl::config.eq(payload.config),
            dsl::created_by.eq(Some(user.id())),
            dsl::is_public.eq(payload.is_public),
            dsl::created_at.eq(Utc::now()),
        ))
        .get_result(&mut conn)?;
    Ok(Json(ApiResponse::created(report, "Report")))
}

async fn get_report(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<Report>>> {
    let mut conn = state.db()?;
    let report = find_report(&mut conn, id)?;
    if !report.is_public {
        authorize_mutation(&user, &report)?;
    }
    Ok(Json(ApiResponse::data(report)))
}

async fn delete_report(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    let mut conn = state.db()?;
    let report = find_report(&mut conn, id)?;
    authorize_mutation(&user, &report)?;
    diesel::delete(reports::table.find(id)).execute(&mut conn)?;
    Ok(Json(ApiResponse::message("Report deleted successfully")))
}

// ---------------------------------------------------------------------------
// Scheduled reports (plain rows; no background scheduler runs them)

#[derive(Debug, Queryable, Serialize)]
pub struct ScheduledReport {
    pub id: i32,
    pub report_id: i32,
    pub frequency: String,
    pub recipients: String,
    pub next_run: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleCreate {
    pub report_id: i32,
    pub frequency: String,
    pub recipients: String,
    pub next_run: DateTime<Utc>,
}

async fn list_schedules(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<ApiResponse<Vec<ScheduledReport>>>> {
    require_staff(&user)?;
    use scheduled_reports::dsl;
    let mut conn = state.db()?;
    let rows: Vec<ScheduledReport> =
        dsl::scheduled_reports.order(dsl::next_run.asc()).load(&mut conn)?;
    Ok(Json(ApiResponse::data(rows)))
}

async fn create_schedule(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<ScheduleCreate>,
) -> ApiResult<Json<ApiResponse<ScheduledReport>>> {
    require_staff(&user)?;
    use scheduled_reports::dsl;
    let mut conn = state.db()?;
    find_report(&mut conn, payload.report_id)?;
    if payload.next_run <= Utc::now() {
        return Err(ApiError::bad_request("Next run must be in the future"));
    }
    let schedule: ScheduledReport = diesel::insert_into(dsl::scheduled_reports)
        .values((
            dsl::report_id.eq(payload.report_id),
            dsl::frequency.eq(payload.frequency),
            dsl::recipients.eq(payload.recipients),
            dsl::next_run.eq(payload.next_run),
            dsl::is_active.eq(true),
            dsl::created_at.eq(Utc::now()),
        ))
        .get_result(&mut conn)?;
    Ok(Json(ApiResponse::created(schedule, "Scheduled report")))
}

async fn delete_schedule(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    require_staff(&user)?;
    let mut conn = state.db()?;
    let n = diesel::delete(scheduled_reports::table.find(id)).execute(&mut conn)?;
    if n == 0 {
        return Err(ApiError::not_found("Scheduled report"));
    }
    Ok(Json(ApiResponse::message("Scheduled report deleted successfully")))
}

// ---------------------------------------------------------------------------

pub fn configure_analytics_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/stats", get(range_stats))
        .route("/activity", get(recent_activity))
        .route("/reports", get(list_reports).post(create_report))
        .route("/reports/:id", get(get_report).delete(delete_report))
        .route(
            "/scheduled-reports",
            get(list_schedules).post(create_schedule),
        )
        .route("/scheduled-reports/:id", delete(delete_schedule))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_score_penalizes_outages() {
        assert_eq!(health_score(0, 0), 100);
        assert_eq!(health_score(1, 0), 80);
        assert_eq!(health_score(0, 2), 90);
        assert_eq!(health_score(2, 3), 45);
    }

    #[test]
    fn health_score_never_goes_negative() {
        assert_eq!(health_score(10, 0), 0);
        assert_eq!(health_score(4, 20), 0);
    }

    #[test]
    fn percentage_guards_division_by_zero() {
        assert_eq!(percentage(5, 0), None);
        assert_eq!(percentage(3, 4), Some(75.0));
        assert_eq!(percentage(0, 7), Some(0.0));
    }
}
