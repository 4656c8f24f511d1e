//! Customer-facing surface. Callers with the `user` role only ever see
//! their own tickets, never internal notes.

use axum::extract::{Multipart, Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::shared::crud::Crud;
use crate::shared::error::{ApiError, ApiResult};
use crate::shared::response::ApiResponse;
use crate::shared::schema::{attachments, mentions, satisfaction_ratings, ticket_comments, tickets};
use crate::shared::state::AppState;
use crate::tickets::{add_comment_row, with_usernames, CommentView, Ticket, TicketComment, TicketCreate};

/// Staff see everything; everyone else only their own tickets.
fn ensure_can_view(user: &AuthUser, ticket: &Ticket) -> ApiResult<()> {
    if user.is_staff() || ticket.submitter_id == user.id() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Not authorized to view this ticket"))
    }
}

fn valid_rating(rating: i32) -> bool {
    (1..=5).contains(&rating)
}

// ---------------------------------------------------------------------------
// My tickets

async fn my_tickets(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<ApiResponse<Vec<Ticket>>>> {
    use tickets::dsl;
    let mut conn = state.db()?;
    let mine: Vec<Ticket> = dsl::tickets
        .filter(dsl::submitter_id.eq(user.id()))
        .order(dsl::created_at.desc())
        .load(&mut conn)?;
    Ok(Json(ApiResponse::data(mine)))
}

#[derive(Debug, Serialize)]
pub struct PortalTicketDetail {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub comments: Vec<CommentView>,
    pub attachments: Vec<Attachment>,
}

async fn ticket_detail(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<PortalTicketDetail>>> {
    use ticket_comments::dsl;
    let mut conn = state.db()?;
    let ticket = Ticket::find_or_fail(&mut conn, id)?;
    ensure_can_view(&user, &ticket)?;

    // internal notes stay inside the service desk
    let comments: Vec<TicketComment> = dsl::ticket_comments
        .filter(dsl::ticket_id.eq(id))
        .filter(dsl::is_internal.eq(false))
        .order(dsl::created_at.asc())
        .load(&mut conn)?;
    let comments = with_usernames(&mut conn, comments)?;

    let files: Vec<Attachment> = attachments::table
        .filter(attachments::ticket_id.eq(id))
        .order(attachments::created_at.asc())
        .load(&mut conn)?;

    Ok(Json(ApiResponse::data(PortalTicketDetail {
        ticket,
        comments,
        attachments: files,
    })))
}

#[derive(Debug, Deserialize)]
pub struct PortalTicketCreate {
    pub title: String,
    pub description: String,
    pub priority: Option<String>,
    pub category: Option<String>,
}

async fn submit_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<PortalTicketCreate>,
) -> ApiResult<Json<ApiResponse<Ticket>>> {
    let mut conn = state.db()?;
    let ticket = Ticket::insert(
        &mut conn,
        TicketCreate {
            title: payload.title,
            description: payload.description,
            priority: payload.priority,
            category: payload.category,
            assigned_to: None,
            team_id: None,
            asset_id: None,
            company_id: None,
        },
        user.id(),
    )?;
    Ok(Json(ApiResponse::created(ticket, "Ticket")))
}

#[derive(Debug, Deserialize)]
pub struct PortalComment {
    pub body: String,
}

async fn add_portal_comment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<PortalComment>,
) -> ApiResult<Json<ApiResponse<TicketComment>>> {
    let mut conn = state.db()?;
    let ticket = Ticket::find_or_fail(&mut conn, id)?;
    ensure_can_view(&user, &ticket)?;
    // portal comments are always public
    let comment = add_comment_row(&mut conn, &ticket, &user, payload.body, false)?;
    Ok(Json(ApiResponse::created(comment, "Comment")))
}

// ---------------------------------------------------------------------------
// Satisfaction ratings

#[derive(Debug, Queryable, Serialize)]
pub struct SatisfactionRating {
    pub id: i32,
    pub ticket_id: i32,
    pub rating: i32,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RatingCreate {
    pub rating: i32,
    pub feedback: Option<String>,
}

async fn rate_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<RatingCreate>,
) -> ApiResult<Json<ApiResponse<SatisfactionRating>>> {
    use satisfaction_ratings::dsl;
    let mut conn = state.db()?;
    let ticket = Ticket::find_or_fail(&mut conn, id)?;

    if ticket.submitter_id != user.id() {
        return Err(ApiError::forbidden("Only the submitter may rate a ticket"));
    }
    if !matches!(ticket.status.as_str(), "resolved" | "closed") {
        return Err(ApiError::bad_request(
            "Only resolved or closed tickets can be rated",
        ));
    }
    if !valid_rating(payload.rating) {
        return Err(ApiError::bad_request("Rating must be between 1 and 5"));
    }
    let already: i64 = dsl::satisfaction_ratings
        .filter(dsl::ticket_id.eq(id))
        .count()
        .get_result(&mut conn)?;
    if already > 0 {
        return Err(ApiError::bad_request("Ticket has already been rated"));
    }

    let rating: SatisfactionRating = diesel::insert_into(dsl::satisfaction_ratings)
        .values((
            dsl::ticket_id.eq(id),
            dsl::rating.eq(payload.rating),
            dsl::feedback.eq(payload.feedback),
            dsl::created_at.eq(Utc::now()),
        ))
        .get_result(&mut conn)?;
    Ok(Json(ApiResponse::created(rating, "Rating")))
}

// ---------------------------------------------------------------------------
// Attachments

#[derive(Debug, Queryable, Serialize)]
pub struct Attachment {
    pub id: i32,
    pub filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: Option<String>,
    pub ticket_id: Option<i32>,
    pub comment_id: Option<i32>,
    pub uploaded_by: i32,
    pub created_at: DateTime<Utc>,
}

async fn upload_attachment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    mut multipart: Multipart,
) -> ApiResult<Json<ApiResponse<Attachment>>> {
    use attachments::dsl;
    let mut conn = state.db()?;
    let ticket = Ticket::find_or_fail(&mut conn, id)?;
    ensure_can_view(&user, &ticket)?;

    let field = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::bad_request("Malformed multipart payload"))?
        .ok_or_else(|| ApiError::bad_request("Missing file field"))?;

    let original_name = field
        .file_name()
        .map(str::to_string)
        .unwrap_or_else(|| "upload.bin".to_string());
    let mime_type = field.content_type().map(str::to_string);
    let bytes = field
        .bytes()
        .await
        .map_err(|_| ApiError::bad_request("Failed to read uploaded file"))?;
    if bytes.is_empty() {
        return Err(ApiError::bad_request("Uploaded file is empty"));
    }

    // stored under a generated name so uploads can never collide or traverse
    let extension = std::path::Path::new(&original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    let stored_name = format!("{}{}", Uuid::new_v4(), extension);
    let storage_dir = std::path::Path::new(&state.config.storage_path);
    tokio::fs::create_dir_all(storage_dir)
        .await
        .map_err(|_| ApiError::Internal)?;
    let stored_path = storage_dir.join(&stored_name);
    tokio::fs::write(&stored_path, &bytes)
        .await
        .map_err(|_| ApiError::Internal)?;

    let attachment: Attachment = diesel::insert_into(dsl::attachments)
        .values((
            dsl::filename.eq(original_name),
            dsl::file_path.eq(stored_path.to_string_lossy().to_string()),
            dsl::file_size.eq(bytes.len() as i64),
            dsl::mime_type.eq(mime_type),
            dsl::ticket_id.eq(Some(id)),
            dsl::uploaded_by.eq(user.id()),
            dsl::created_at.eq(Utc::now()),
        ))
        .get_result(&mut conn)?;

    info!(ticket_id = id, attachment_id = attachment.id, "attachment uploaded");
    Ok(Json(ApiResponse::created(attachment, "Attachment")))
}

async fn attachment_metadata(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(attachment_id): Path<i32>,
) -> ApiResult<Json<ApiResponse<Attachment>>> {
    let mut conn = state.db()?;
    let attachment: Attachment = attachments::table
        .find(attachment_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Attachment"))?;
    if let Some(ticket_id) = attachment.ticket_id {
        let ticket = Ticket::find_or_fail(&mut conn, ticket_id)?;
        ensure_can_view(&user, &ticket)?;
    }
    Ok(Json(ApiResponse::data(attachment)))
}

// ---------------------------------------------------------------------------
// Mentions

#[derive(Debug, Queryable, Serialize)]
pub struct Mention {
    pub id: i32,
    pub user_id: i32,
    pub comment_id: i32,
    pub ticket_id: i32,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

async fn my_mentions(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<ApiResponse<Vec<Mention>>>> {
    use mentions::dsl;
    let mut conn = state.db()?;
    let rows: Vec<Mention> = dsl::mentions
        .filter(dsl::user_id.eq(user.id()))
        .order(dsl::created_at.desc())
        .load(&mut conn)?;
    Ok(Json(ApiResponse::data(rows)))
}

async fn mark_mention_read(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(mention_id): Path<i32>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    use mentions::dsl;
    let mut conn = state.db()?;
    let n = diesel::update(
        dsl::mentions
            .filter(dsl::id.eq(mention_id))
            .filter(dsl::user_id.eq(user.id())),
    )
    .set(dsl::is_read.eq(true))
    .execute(&mut conn)?;
    if n == 0 {
        return Err(ApiError::not_found("Mention"));
    }
    Ok(Json(ApiResponse::message("Mention marked as read")))
}

// ---------------------------------------------------------------------------

pub fn configure_portal_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/my-tickets", get(my_tickets))
        .route("/tickets", post(submit_ticket))
        .route("/tickets/:id", get(ticket_detail))
        .route("/tickets/:id/comments", post(add_portal_comment))
        .route("/tickets/:id/satisfaction", post(rate_ticket))
        .route("/tickets/:id/attachments", post(upload_attachment))
        .route("/attachments/:attachment_id", get(attachment_metadata))
        .route("/mentions", get(my_mentions))
        .route("/mentions/:mention_id/read", put(mark_mention_read))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_bounds() {
        assert!(valid_rating(1));
        assert!(valid_rating(5));
        assert!(!valid_rating(0));
        assert!(!valid_rating(6));
        assert!(!valid_rating(-2));
    }
}
