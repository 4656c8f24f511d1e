use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::{authorize_mutation, AuthUser};
use crate::shared::crud::{or_unchanged, search_pattern, Crud, Resource};
use crate::shared::error::{ApiError, ApiResult};
use crate::shared::response::ApiResponse;
use crate::shared::router_factory::{crud_router, CrudRoutes};
use crate::shared::schema::appointments;
use crate::shared::state::AppState;
use crate::shared::utils::{Page, SortDir};

const WORK_DAY_START_HOUR: u32 = 9;
const WORK_DAY_END_HOUR: u32 = 17;

#[derive(Debug, Clone, Queryable, Serialize)]
pub struct Appointment {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub ticket_id: Option<i32>,
    pub customer_id: i32,
    pub technician_id: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: Option<String>,
    pub status: String,
    pub meeting_link: Option<String>,
    pub reminder_sent: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resource for Appointment {
    const NAME: &'static str = "Appointment";

    fn id(&self) -> i32 {
        self.id
    }

    fn owner_id(&self) -> Option<i32> {
        Some(self.customer_id)
    }
}

#[derive(Debug, Deserialize)]
pub struct AppointmentCreate {
    pub title: String,
    pub description: Option<String>,
    pub ticket_id: Option<i32>,
    pub customer_id: Option<i32>,
    pub technician_id: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: Option<String>,
    pub meeting_link: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, AsChangeset)]
#[diesel(table_name = appointments)]
pub struct AppointmentPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub technician_id: Option<i32>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub status: Option<String>,
    pub meeting_link: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AppointmentFilter {
    pub technician_id: Option<i32>,
    pub customer_id: Option<i32>,
    pub status: Option<String>,
    pub ticket_id: Option<i32>,
}

/// Two half-open intervals collide when each starts before the other ends.
fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && a_end > b_start
}

/// 400 when the technician already has a non-cancelled appointment in the
/// window. `exclude` skips the appointment being rescheduled.
fn check_conflicts(
    conn: &mut PgConnection,
    technician_id: i32,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude: Option<i32>,
) -> ApiResult<()> {
    use appointments::dsl;
    if start >= end {
        return Err(ApiError::bad_request("Start time must be before end time"));
    }
    let mut q = dsl::appointments
        .filter(dsl::technician_id.eq(technician_id))
        .filter(dsl::status.ne("cancelled"))
        .filter(dsl::start_time.lt(end))
        .filter(dsl::end_time.gt(start))
        .into_boxed();
    if let Some(id) = exclude {
        q = q.filter(dsl::id.ne(id));
    }
    let conflicts: i64 = q.count().get_result(conn)?;
    if conflicts > 0 {
        return Err(ApiError::bad_request(
            "Technician already has an appointment in this window",
        ));
    }
    Ok(())
}

impl Appointment {
    fn filtered(
        filter: &AppointmentFilter,
        search: Option<&str>,
    ) -> appointments::BoxedQuery<'static, diesel::pg::Pg> {
        use appointments::dsl;
        let mut q = dsl::appointments.into_boxed();
        if let Some(id) = filter.technician_id {
            q = q.filter(dsl::technician_id.eq(id));
        }
        if let Some(id) = filter.customer_id {
            q = q.filter(dsl::customer_id.eq(id));
        }
        if let Some(status) = &filter.status {
            q = q.filter(dsl::status.eq(status.clone()));
        }
        if let Some(id) = filter.ticket_id {
            q = q.filter(dsl::ticket_id.eq(id));
        }
        if let Some(term) = search {
            let pattern = search_pattern(term);
            q = q.filter(dsl::title.ilike(pattern.clone()).or(dsl::location.ilike(pattern)));
        }
        q
    }
}

impl Crud for Appointment {
    type Create = AppointmentCreate;
    type Update = AppointmentPatch;
    type Filter = AppointmentFilter;

    const SOFT_DELETE: bool = true;

    fn find(conn: &mut PgConnection, id: i32) -> ApiResult<Option<Self>> {
        Ok(appointments::table.find(id).first(conn).optional()?)
    }

    fn list(
        conn: &mut PgConnection,
        filter: &Self::Filter,
        search: Option<&str>,
        sort: Option<(&str, SortDir)>,
        page: Page,
    ) -> ApiResult<Vec<Self>> {
        use appointments::dsl;
        let q = Self::filtered(filter, search);
        let q = match sort {
            Some(("start_time", SortDir::Desc)) => q.order(dsl::start_time.desc()),
            Some(("created_at", SortDir::Asc)) => q.order(dsl::created_at.asc()),
            Some(("created_at", SortDir::Desc)) => q.order(dsl::created_at.desc()),
            _ => q.order(dsl::start_time.asc()),
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
        use appointments::dsl;
        check_conflicts(conn, new.technician_id, new.start_time, new.end_time, None)?;
        let now = Utc::now();
        Ok(diesel::insert_into(dsl::appointments)
            .values((
                dsl::title.eq(new.title),
                dsl::description.eq(new.description),
                dsl::ticket_id.eq(new.ticket_id),
                dsl::customer_id.eq(new.customer_id.unwrap_or(actor)),
                dsl::technician_id.eq(new.technician_id),
                dsl::start_time.eq(new.start_time),
                dsl::end_time.eq(new.end_time),
                dsl::location.eq(new.location),
                dsl::status.eq("scheduled"),
                dsl::meeting_link.eq(new.meeting_link),
                dsl::reminder_sent.eq(false),
                dsl::notes.eq(new.notes),
                dsl::created_at.eq(now),
                dsl::updated_at.eq(now),
            ))
            .get_result(conn)?)
    }

    fn apply_update(conn: &mut PgConnection, id: i32, patch: Self::Update) -> ApiResult<Self> {
        let result = diesel::update(appointments::table.find(id))
            .set((&patch, appointments::updated_at.eq(Utc::now())))
            .get_result(conn);
        or_unchanged::<Self>(result, conn, id)
    }

    fn remove(conn: &mut PgConnection, id: i32) -> ApiResult<()> {
        let n = diesel::delete(appointments::table.find(id)).execute(conn)?;
        if n == 0 {
            return Err(ApiError::not_found(Self::NAME));
        }
        Ok(())
    }

    /// Appointments are cancelled rather than erased.
    fn delete_or_deactivate(conn: &mut PgConnection, id: i32) -> ApiResult<()> {
        use appointments::dsl;
        let n = diesel::update(dsl::appointments.find(id))
            .set((dsl::status.eq("cancelled"), dsl::updated_at.eq(Utc::now())))
            .execute(conn)?;
        if n == 0 {
            return Err(ApiError::not_found(Self::NAME));
        }
        Ok(())
    }
}

async fn reschedule_appointment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(patch): Json<AppointmentPatch>,
) -> ApiResult<Json<ApiResponse<Appointment>>> {
    let mut conn = state.db()?;
    let existing = Appointment::find_or_fail(&mut conn, id)?;
    authorize_mutation(&user, &existing)?;

    let technician = patch.technician_id.unwrap_or(existing.technician_id);
    let start = patch.start_time.unwrap_or(existing.start_time);
    let end = patch.end_time.unwrap_or(existing.end_time);
    let window_changed = patch.technician_id.is_some()
        || patch.start_time.is_some()
        || patch.end_time.is_some();
    if window_changed {
        check_conflicts(&mut conn, technician, start, end, Some(id))?;
    }

    let appointment = Appointment::apply_update(&mut conn, id, patch)?;
    Ok(Json(ApiResponse::updated(appointment, "Appointment")))
}

// ---------------------------------------------------------------------------
// Availability

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct BusySlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub title: String,
}

async fn technician_availability(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(technician_id): Path<i32>,
    Query(query): Query<AvailabilityQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    use appointments::dsl;
    let mut conn = state.db()?;

    let day_start = Utc
        .from_utc_datetime(&query.date.and_hms_opt(WORK_DAY_START_HOUR, 0, 0).ok_or(
            ApiError::bad_request("Invalid date"),
        )?);
    let day_end = Utc
        .from_utc_datetime(&query.date.and_hms_opt(WORK_DAY_END_HOUR, 0, 0).ok_or(
            ApiError::bad_request("Invalid date"),
        )?);

    let busy: Vec<BusySlot> = dsl::appointments
        .filter(dsl::technician_id.eq(technician_id))
        .filter(dsl::status.ne("cancelled"))
        .filter(dsl::start_time.lt(day_end))
        .filter(dsl::end_time.gt(day_start))
        .order(dsl::start_time.asc())
        .select((dsl::start_time, dsl::end_time, dsl::title))
        .load::<(DateTime<Utc>, DateTime<Utc>, String)>(&mut conn)?
        .into_iter()
        .map(|(start_time, end_time, title)| BusySlot {
            start_time,
            end_time,
            title,
        })
        .collect();

    Ok(Json(serde_json::json!({
        "technician_id": technician_id,
        "date": query.date,
        "working_hours": { "start": day_start, "end": day_end },
        "busy": busy,
    })))
}

// ---------------------------------------------------------------------------

pub fn configure_appointment_routes() -> Router<Arc<AppState>> {
    crud_router::<Appointment>(CrudRoutes::default().without_update())
        .route("/:id", put(reschedule_appointment))
        .route(
            "/availability/:technician_id",
            get(technician_availability),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 24, hour, 0, 0).unwrap()
    }

    #[test]
    fn overlapping_windows_collide() {
        assert!(overlaps(at(9), at(11), at(10), at(12)));
        assert!(overlaps(at(10), at(12), at(9), at(11)));
        // containment counts as overlap
        assert!(overlaps(at(9), at(17), at(10), at(11)));
    }

    #[test]
    fn touching_windows_do_not_collide() {
        assert!(!overlaps(at(9), at(10), at(10), at(11)));
        assert!(!overlaps(at(10), at(11), at(9), at(10)));
    }

    #[test]
    fn disjoint_windows_do_not_collide() {
        assert!(!overlaps(at(9), at(10), at(14), at(15)));
    }

    #[test]
    fn overlap_matches_the_query_predicate() {
        // the SQL filter is start < new_end && end > new_start; the pure
        // helper must agree with it
        let new = (at(10), at(12));
        let existing = (at(11), at(13));
        let sql_says = existing.0 < new.1 && existing.1 > new.0;
        assert_eq!(overlaps(existing.0, existing.1, new.0, new.1), sql_says);
    }

    #[test]
    fn working_day_bounds() {
        assert_eq!(WORK_DAY_START_HOUR, 9);
        assert_eq!(WORK_DAY_END_HOUR, 17);
    }
}
