use axum::extract::{Path, State};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::{authorize_mutation, require_staff, AuthUser};
use crate::shared::crud::Resource;
use crate::shared::error::{ApiError, ApiResult};
use crate::shared::response::ApiResponse;
use crate::shared::schema::{board_cards, board_columns, boards, tickets};
use crate::shared::state::AppState;

const DEFAULT_COLUMNS: [(&str, &str); 5] = [
    ("Backlog", "#95A5A6"),
    ("To Do", "#3498DB"),
    ("In Progress", "#F39C12"),
    ("Testing", "#9B59B6"),
    ("Done", "#27AE60"),
];

#[derive(Debug, Clone, Queryable, Serialize)]
pub struct Board {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub team_id: Option<i32>,
    pub created_by: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Resource for Board {
    const NAME: &'static str = "Board";

    fn id(&self) -> i32 {
        self.id
    }

    fn owner_id(&self) -> Option<i32> {
        Some(self.created_by)
    }

    fn activity_flag(&self) -> Option<bool> {
        Some(self.is_active)
    }
}

#[derive(Debug, Queryable, Serialize)]
pub struct BoardColumn {
    pub id: i32,
    pub board_id: i32,
    pub name: String,
    pub position: i32,
    pub wip_limit: Option<i32>,
    pub color: Option<String>,
}

#[derive(Debug, Queryable, Serialize)]
pub struct BoardCard {
    pub id: i32,
    pub column_id: i32,
    pub ticket_id: i32,
    pub position: i32,
}

fn find_board(conn: &mut PgConnection, id: i32) -> ApiResult<Board> {
    boards::table
        .find(id)
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Board"))
}

fn find_column(conn: &mut PgConnection, id: i32) -> ApiResult<BoardColumn> {
    board_columns::table
        .find(id)
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Column"))
}

fn find_card(conn: &mut PgConnection, id: i32) -> ApiResult<BoardCard> {
    board_cards::table
        .find(id)
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Card"))
}

// ---------------------------------------------------------------------------
// Boards

#[derive(Debug, Deserialize)]
pub struct BoardCreate {
    pub name: String,
    pub description: Option<String>,
    pub team_id: Option<i32>,
}

#[derive(Debug, Deserialize, AsChangeset)]
#[diesel(table_name = boards)]
pub struct BoardPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub team_id: Option<i32>,
}

async fn list_boards(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> ApiResult<Json<ApiResponse<Vec<Board>>>> {
    use boards::dsl;
    let mut conn = state.db()?;
    let rows: Vec<Board> = dsl::boards
        .filter(dsl::is_active.eq(true))
        .order(dsl::name.asc())
        .load(&mut conn)?;
    Ok(Json(ApiResponse::data(rows)))
}

async fn create_board(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<BoardCreate>,
) -> ApiResult<Json<ApiResponse<Board>>> {
    require_staff(&user)?;
    use boards::dsl;
    let mut conn = state.db()?;
    let board: Board = conn.transaction(|conn| -> ApiResult<Board> {
        let board: Board = diesel::insert_into(dsl::boards)
            .values((
                dsl::name.eq(&payload.name),
                dsl::description.eq(&payload.description),
                dsl::team_id.eq(payload.team_id),
                dsl::created_by.eq(user.id()),
                dsl::is_active.eq(true),
                dsl::created_at.eq(Utc::now()),
            ))
            .get_result(conn)?;
        for (position, (name, color)) in DEFAULT_COLUMNS.iter().enumerate() {
            diesel::insert_into(board_columns::table)
                .values((
                    board_columns::board_id.eq(board.id),
                    board_columns::name.eq(*name),
                    board_columns::position.eq(position as i32),
                    board_columns::color.eq(Some((*color).to_string())),
                ))
                .execute(conn)?;
        }
        Ok(board)
    })?;
    Ok(Json(ApiResponse::created(board, "Board")))
}

#[derive(Debug, Serialize)]
pub struct ColumnView {
    #[serde(flatten)]
    pub column: BoardColumn,
    pub cards: Vec<CardView>,
}

#[derive(Debug, Serialize)]
pub struct CardView {
    pub id: i32,
    pub column_id: i32,
    pub ticket_id: i32,
    pub position: i32,
    pub ticket_number: String,
    pub title: String,
    pub status: String,
    pub priority: String,
}

#[derive(Debug, Serialize)]
pub struct BoardDetail {
    #[serde(flatten)]
    pub board: Board,
    pub columns: Vec<ColumnView>,
}

async fn get_board(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<BoardDetail>>> {
    let mut conn = state.db()?;
    let board = find_board(&mut conn, id)?;

    let columns: Vec<BoardColumn> = board_columns::table
        .filter(board_columns::board_id.eq(id))
        .order(board_columns::position.asc())
        .load(&mut conn)?;

    let column_ids: Vec<i32> = columns.iter().map(|c| c.id).collect();
    type CardRow = (i32, i32, i32, i32, String, String, String, String);
    let cards: Vec<CardRow> = board_cards::table
        .inner_join(tickets::table)
        .filter(board_cards::column_id.eq_any(column_ids))
        .order(board_cards::position.asc())
        .select((
            board_cards::id,
            board_cards::column_id,
            board_cards::ticket_id,
            board_cards::position,
            tickets::ticket_number,
            tickets::title,
            tickets::status,
            tickets::priority,
        ))
        .load(&mut conn)?;

    let columns = columns
        .into_iter()
        .map(|column| {
            let cards = cards
                .iter()
                .filter(|c| c.1 == column.id)
                .map(|c| CardView {
                    id: c.0,
                    column_id: c.1,
                    ticket_id: c.2,
                    position: c.3,
                    ticket_number: c.4.clone(),
                    title: c.5.clone(),
                    status: c.6.clone(),
                    priority: c.7.clone(),
                })
                .collect();
            ColumnView { column, cards }
        })
        .collect();

    Ok(Json(ApiResponse::data(BoardDetail { board, columns })))
}

async fn update_board(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(patch): Json<BoardPatch>,
) -> ApiResult<Json<ApiResponse<Board>>> {
    let mut conn = state.db()?;
    let existing = find_board(&mut conn, id)?;
    authorize_mutation(&user, &existing)?;
    let board: Board = match diesel::update(boards::table.find(id))
        .set(&patch)
        .get_result(&mut conn)
    {
        Ok(row) => row,
        Err(diesel::result::Error::QueryBuilderError(_)) => existing,
        Err(err) => return Err(err.into()),
    };
    Ok(Json(ApiResponse::updated(board, "Board")))
}

async fn deactivate_board(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    use boards::dsl;
    let mut conn = state.db()?;
    let existing = find_board(&mut conn, id)?;
    authorize_mutation(&user, &existing)?;
    diesel::update(dsl::boards.find(id))
        .set(dsl::is_active.eq(false))
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::message("Board deactivated successfully")))
}

// ---------------------------------------------------------------------------
// Columns

#[derive(Debug, Deserialize)]
pub struct ColumnCreate {
    pub name: String,
    pub wip_limit: Option<i32>,
    pub color: Option<String>,
}

#[derive(Debug, Deserialize, AsChangeset)]
#[diesel(table_name = board_columns)]
pub struct ColumnPatch {
    pub name: Option<String>,
    pub wip_limit: Option<i32>,
    pub color: Option<String>,
}

async fn add_column(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<ColumnCreate>,
) -> ApiResult<Json<ApiResponse<BoardColumn>>> {
    require_staff(&user)?;
    use board_columns::dsl;
    let mut conn = state.db()?;
    find_board(&mut conn, id)?;
    let max_position: Option<i32> = dsl::board_columns
        .filter(dsl::board_id.eq(id))
        .select(diesel::dsl::max(dsl::position))
        .first(&mut conn)?;
    let column: BoardColumn = diesel::insert_into(dsl::board_columns)
        .values((
            dsl::board_id.eq(id),
            dsl::name.eq(payload.name),
            dsl::position.eq(max_position.map_or(0, |p| p + 1)),
            dsl::wip_limit.eq(payload.wip_limit),
            dsl::color.eq(payload.color),
        ))
        .get_result(&mut conn)?;
    Ok(Json(ApiResponse::created(column, "Column")))
}

async fn update_column(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(column_id): Path<i32>,
    Json(patch): Json<ColumnPatch>,
) -> ApiResult<Json<ApiResponse<BoardColumn>>> {
    require_staff(&user)?;
    let mut conn = state.db()?;
    let column: BoardColumn = match diesel::update(board_columns::table.find(column_id))
        .set(&patch)
        .get_result(&mut conn)
    {
        Ok(row) => row,
        Err(diesel::result::Error::QueryBuilderError(_)) => find_column(&mut conn, column_id)?,
        Err(diesel::result::Error::NotFound) => return Err(ApiError::not_found("Column")),
        Err(err) => return Err(err.into()),
    };
    Ok(Json(ApiResponse::updated(column, "Column")))
}

/// Deleting a column takes its cards with it.
async fn delete_column(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(column_id): Path<i32>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    require_staff(&user)?;
    let mut conn = state.db()?;
    find_column(&mut conn, column_id)?;
    conn.transaction(|conn| -> ApiResult<()> {
        diesel::delete(board_cards::table.filter(board_cards::column_id.eq(column_id)))
            .execute(conn)?;
        diesel::delete(board_columns::table.find(column_id)).execute(conn)?;
        Ok(())
    })?;
    Ok(Json(ApiResponse::message("Column deleted successfully")))
}

// ---------------------------------------------------------------------------
// Cards

#[derive(Debug, Deserialize)]
pub struct CardCreate {
    pub ticket_id: i32,
}

#[derive(Debug, Deserialize)]
pub struct CardMove {
    pub column_id: i32,
    pub position: i32,
}

async fn add_card(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(column_id): Path<i32>,
    Json(payload): Json<CardCreate>,
) -> ApiResult<Json<ApiResponse<BoardCard>>> {
    use board_cards::dsl;
    let mut conn = state.db()?;
    let column = find_column(&mut conn, column_id)?;

    let exists: i64 = tickets::table
        .filter(tickets::id.eq(payload.ticket_id))
        .count()
        .get_result(&mut conn)?;
    if exists == 0 {
        return Err(ApiError::not_found("Ticket"));
    }

    // a ticket appears at most once per board
    let board_column_ids: Vec<i32> = board_columns::table
        .filter(board_columns::board_id.eq(column.board_id))
        .select(board_columns::id)
        .load(&mut conn)?;
    let duplicate: i64 = dsl::board_cards
        .filter(dsl::ticket_id.eq(payload.ticket_id))
        .filter(dsl::column_id.eq_any(board_column_ids))
        .count()
        .get_result(&mut conn)?;
    if duplicate > 0 {
        return Err(ApiError::bad_request("Ticket is already on this board"));
    }

    let max_position: Option<i32> = dsl::board_cards
        .filter(dsl::column_id.eq(column_id))
        .select(diesel::dsl::max(dsl::position))
        .first(&mut conn)?;
    let card: BoardCard = diesel::insert_into(dsl::board_cards)
        .values((
            dsl::column_id.eq(column_id),
            dsl::ticket_id.eq(payload.ticket_id),
            dsl::position.eq(max_position.map_or(0, |p| p + 1)),
        ))
        .get_result(&mut conn)?;
    Ok(Json(ApiResponse::created(card, "Card")))
}

/// Clamp a requested slot into the target column's valid range.
fn clamp_position(requested: i32, occupants: i64) -> i32 {
    requested.clamp(0, occupants as i32)
}

/// Position of a remaining card after the slot at `vacated` empties.
/// Mirrors the close-the-gap update in `move_card` and `remove_card`.
fn close_gap(position: i32, vacated: i32) -> i32 {
    if position > vacated {
        position - 1
    } else {
        position
    }
}

/// Position of a sitting card after a slot opens at `target`. Mirrors the
/// open-a-slot update in `move_card`.
fn open_slot(position: i32, target: i32) -> i32 {
    if position >= target {
        position + 1
    } else {
        position
    }
}

/// Move a card, keeping both columns dense and zero-based: the vacated slot
/// closes in the source column and a slot opens at the target position.
async fn move_card(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(card_id): Path<i32>,
    Json(req): Json<CardMove>,
) -> ApiResult<Json<ApiResponse<BoardCard>>> {
    use board_cards::dsl;
    let mut conn = state.db()?;
    let card = find_card(&mut conn, card_id)?;
    let target = find_column(&mut conn, req.column_id)?;
    let source = find_column(&mut conn, card.column_id)?;
    if target.board_id != source.board_id {
        return Err(ApiError::bad_request("Cannot move a card across boards"));
    }

    let occupants: i64 = dsl::board_cards
        .filter(dsl::column_id.eq(target.id))
        .filter(dsl::id.ne(card_id))
        .count()
        .get_result(&mut conn)?;
    let position = clamp_position(req.position, occupants);

    let moved: BoardCard = conn.transaction(|conn| -> ApiResult<BoardCard> {
        // close the gap the card leaves behind
        diesel::update(
            dsl::board_cards
                .filter(dsl::column_id.eq(card.column_id))
                .filter(dsl::position.gt(card.position)),
        )
        .set(dsl::position.eq(dsl::position - 1))
        .execute(conn)?;

        // open a slot at the target position
        diesel::update(
            dsl::board_cards
                .filter(dsl::column_id.eq(target.id))
                .filter(dsl::id.ne(card_id))
                .filter(dsl::position.ge(position)),
        )
        .set(dsl::position.eq(dsl::position + 1))
        .execute(conn)?;

        Ok(diesel::update(dsl::board_cards.find(card_id))
            .set((dsl::column_id.eq(target.id), dsl::position.eq(position)))
            .get_result(conn)?)
    })?;
    Ok(Json(ApiResponse::updated(moved, "Card")))
}

async fn remove_card(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(card_id): Path<i32>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    use board_cards::dsl;
    let mut conn = state.db()?;
    let card = find_card(&mut conn, card_id)?;
    conn.transaction(|conn| -> ApiResult<()> {
        diesel::delete(dsl::board_cards.find(card_id)).execute(conn)?;
        diesel::update(
            dsl::board_cards
                .filter(dsl::column_id.eq(card.column_id))
                .filter(dsl::position.gt(card.position)),
        )
        .set(dsl::position.eq(dsl::position - 1))
        .execute(conn)?;
        Ok(())
    })?;
    Ok(Json(ApiResponse::message("Card removed successfully")))
}

// ---------------------------------------------------------------------------

pub fn configure_board_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_boards).post(create_board))
        .route(
            "/:id",
            get(get_board).put(update_board).delete(deactivate_board),
        )
        .route("/:id/columns", post(add_column))
        .route("/columns/:column_id", put(update_column).delete(delete_column))
        .route("/columns/:column_id/cards", post(add_card))
        .route("/cards/:card_id/move", put(move_card))
        .route("/cards/:card_id", delete(remove_card))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_columns_cover_the_flow() {
        let names: Vec<&str> = DEFAULT_COLUMNS.iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec!["Backlog", "To Do", "In Progress", "Testing", "Done"]
        );
    }

    #[test]
    fn position_is_clamped_to_the_column() {
        assert_eq!(clamp_position(-3, 4), 0);
        assert_eq!(clamp_position(2, 4), 2);
        // appending past the end lands on the last slot
        assert_eq!(clamp_position(99, 4), 4);
        // empty column only accepts slot zero
        assert_eq!(clamp_position(5, 0), 0);
    }

    fn move_between(
        source: &[i32],
        target: &[i32],
        moved_from: i32,
        requested: i32,
    ) -> (Vec<i32>, Vec<i32>) {
        let insert_at = clamp_position(requested, target.len() as i64);
        let source_after: Vec<i32> = source
            .iter()
            .filter(|&&p| p != moved_from)
            .map(|&p| close_gap(p, moved_from))
            .collect();
        let mut target_after: Vec<i32> =
            target.iter().map(|&p| open_slot(p, insert_at)).collect();
        target_after.push(insert_at);
        target_after.sort_unstable();
        (source_after, target_after)
    }

    #[test]
    fn moving_a_card_keeps_both_columns_dense() {
        // source column holds slots 0..=2, target holds 0..=3
        let (source, target) = move_between(&[0, 1, 2], &[0, 1, 2, 3], 1, 2);
        assert_eq!(source, vec![0, 1]);
        assert_eq!(target, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn moving_past_the_end_appends_without_leaving_a_hole() {
        let (source, target) = move_between(&[0, 1, 2], &[0, 1, 2, 3], 0, 99);
        assert_eq!(source, vec![0, 1]);
        assert_eq!(target, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn moving_into_an_empty_column_lands_on_slot_zero() {
        let (source, target) = move_between(&[0, 1], &[], 1, 5);
        assert_eq!(source, vec![0]);
        assert_eq!(target, vec![0]);
    }
}
