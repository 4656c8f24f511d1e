//! Generic data-access layer.
//!
//! Every row type the router factory serves implements [`Resource`] plus
//! [`Crud`]. Per-entity capabilities (ownership column, soft-delete flag)
//! are optional trait methods with defaults: an entity that has no
//! ownership column simply inherits `owner_id() -> None` and the ownership
//! gate is skipped for it.

use diesel::PgConnection;

use crate::shared::error::{ApiError, ApiResult};
use crate::shared::utils::{Page, SortDir};

/// A persisted row with an integer identity.
pub trait Resource: Sized {
    /// Human-readable entity name used in messages ("Ticket not found").
    const NAME: &'static str;

    fn id(&self) -> i32;

    /// Designated owner of the row, when the entity has an ownership field.
    fn owner_id(&self) -> Option<i32> {
        None
    }

    /// Soft-delete flag, when the entity has one.
    fn activity_flag(&self) -> Option<bool> {
        None
    }
}

/// Uniform persistence operations, implemented per entity against its
/// diesel table. `Update` types derive `AsChangeset` over `Option` fields,
/// so fields absent from a partial payload are never written ("exclude
/// unset" semantics). `list` and `count` must build the same predicate so
/// the reported total always matches the filtered set.
pub trait Crud: Resource {
    type Create;
    type Update;
    type Filter: Default;

    /// Whether deletion flips an activity flag instead of removing the row.
    const SOFT_DELETE: bool = false;

    /// Whether create, update, and delete require a staff caller.
    const STAFF_ONLY: bool = false;

    /// Absence is not an error here; use `find_or_fail` for the 404 path.
    fn find(conn: &mut PgConnection, id: i32) -> ApiResult<Option<Self>>;

    fn find_or_fail(conn: &mut PgConnection, id: i32) -> ApiResult<Self> {
        Self::find(conn, id)?.ok_or_else(|| ApiError::not_found(Self::NAME))
    }

    fn list(
        conn: &mut PgConnection,
        filter: &Self::Filter,
        search: Option<&str>,
        sort: Option<(&str, SortDir)>,
        page: Page,
    ) -> ApiResult<Vec<Self>>;

    /// Same predicate as `list`, independent of pagination.
    fn count(conn: &mut PgConnection, filter: &Self::Filter, search: Option<&str>)
        -> ApiResult<i64>;

    /// Persist a new row. `actor` is merged into the audit field when the
    /// entity has one, and ignored otherwise.
    fn insert(conn: &mut PgConnection, new: Self::Create, actor: i32) -> ApiResult<Self>;

    fn apply_update(conn: &mut PgConnection, id: i32, patch: Self::Update) -> ApiResult<Self>;

    fn remove(conn: &mut PgConnection, id: i32) -> ApiResult<()>;

    /// Soft delete when supported, hard delete otherwise.
    fn delete_or_deactivate(conn: &mut PgConnection, id: i32) -> ApiResult<()> {
        Self::remove(conn, id)
    }
}

/// Case-insensitive substring pattern for `ILIKE` search clauses.
pub fn search_pattern(term: &str) -> String {
    format!("%{}%", term.trim())
}

/// An all-`None` changeset makes diesel refuse to build the statement;
/// treat that as "nothing to do" and hand back the current row.
pub fn or_unchanged<T: Crud>(
    result: diesel::QueryResult<T>,
    conn: &mut PgConnection,
    id: i32,
) -> ApiResult<T> {
    match result {
        Ok(row) => Ok(row),
        Err(diesel::result::Error::QueryBuilderError(_)) => T::find_or_fail(conn, id),
        Err(diesel::result::Error::NotFound) => Err(ApiError::not_found(T::NAME)),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget;

    impl Resource for Widget {
        const NAME: &'static str = "Widget";
        fn id(&self) -> i32 {
            1
        }
    }

    #[test]
    fn capability_defaults_mean_absent() {
        let w = Widget;
        assert_eq!(w.owner_id(), None);
        assert_eq!(w.activity_flag(), None);
    }

    #[test]
    fn search_pattern_wraps_and_trims() {
        assert_eq!(search_pattern("  vpn "), "%vpn%");
    }
}
