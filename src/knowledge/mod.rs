use axum::extract::{Path, State};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::{authorize_mutation, require_staff, AuthUser};
use crate::shared::crud::{or_unchanged, search_pattern, Crud, Resource};
use crate::shared::error::{ApiError, ApiResult};
use crate::shared::response::ApiResponse;
use crate::shared::router_factory::{crud_router, CrudRoutes};
use crate::shared::schema::{
    article_comments, article_favorites, article_ticket_links, article_versions,
    article_workflow_steps, knowledge_articles, knowledge_categories,
};
use crate::shared::state::AppState;
use crate::shared::utils::{Page, SortDir};
use crate::tickets::Ticket;

#[derive(Debug, Clone, Queryable, Serialize)]
pub struct KnowledgeArticle {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub category_id: Option<i32>,
    pub author_id: i32,
    pub tags: Option<String>,
    pub itil_process: Option<String>,
    pub article_type: String,
    pub version: i32,
    pub is_published: bool,
    pub is_draft: bool,
    pub view_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resource for KnowledgeArticle {
    const NAME: &'static str = "Article";

    fn id(&self) -> i32 {
        self.id
    }

    fn owner_id(&self) -> Option<i32> {
        Some(self.author_id)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = knowledge_articles)]
struct NewArticle {
    title: String,
    content: String,
    summary: Option<String>,
    category_id: Option<i32>,
    author_id: i32,
    tags: Option<String>,
    itil_process: Option<String>,
    article_type: String,
    version: i32,
    is_published: bool,
    is_draft: bool,
    view_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ArticleCreate {
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub category_id: Option<i32>,
    pub tags: Option<String>,
    pub itil_process: Option<String>,
    pub article_type: Option<String>,
    #[serde(default)]
    pub is_draft: bool,
}

#[derive(Debug, Default, Deserialize, AsChangeset)]
#[diesel(table_name = knowledge_articles)]
pub struct ArticlePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub category_id: Option<i32>,
    pub tags: Option<String>,
    pub itil_process: Option<String>,
    pub article_type: Option<String>,
    pub is_draft: Option<bool>,
    #[serde(skip_deserializing)]
    pub version: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArticleFilter {
    pub category_id: Option<i32>,
    pub author_id: Option<i32>,
    pub is_published: Option<bool>,
    pub article_type: Option<String>,
    pub itil_process: Option<String>,
}

impl KnowledgeArticle {
    fn filtered(
        filter: &ArticleFilter,
        search: Option<&str>,
    ) -> knowledge_articles::BoxedQuery<'static, diesel::pg::Pg> {
        use knowledge_articles::dsl;
        let mut q = dsl::knowledge_articles.into_boxed();
        if let Some(id) = filter.category_id {
            q = q.filter(dsl::category_id.eq(id));
        }
        if let Some(id) = filter.author_id {
            q = q.filter(dsl::author_id.eq(id));
        }
        if let Some(published) = filter.is_published {
            q = q.filter(dsl::is_published.eq(published));
        }
        if let Some(kind) = &filter.article_type {
            q = q.filter(dsl::article_type.eq(kind.clone()));
        }
        if let Some(process) = &filter.itil_process {
            q = q.filter(dsl::itil_process.eq(process.clone()));
        }
        if let Some(term) = search {
            let pattern = search_pattern(term);
            q = q.filter(
                dsl::title
                    .ilike(pattern.clone())
                    .or(dsl::content.ilike(pattern.clone()))
                    .or(dsl::tags.ilike(pattern)),
            );
        }
        q
    }
}

impl Crud for KnowledgeArticle {
    type Create = ArticleCreate;
    type Update = ArticlePatch;
    type Filter = ArticleFilter;

    fn find(conn: &mut PgConnection, id: i32) -> ApiResult<Option<Self>> {
        Ok(knowledge_articles::table.find(id).first(conn).optional()?)
    }

    fn list(
        conn: &mut PgConnection,
        filter: &Self::Filter,
        search: Option<&str>,
        sort: Option<(&str, SortDir)>,
        page: Page,
    ) -> ApiResult<Vec<Self>> {
        use knowledge_articles::dsl;
        let q = Self::filtered(filter, search);
        let q = match sort {
            Some(("title", SortDir::Asc)) => q.order(dsl::title.asc()),
            Some(("title", SortDir::Desc)) => q.order(dsl::title.desc()),
            Some(("view_count", SortDir::Asc)) => q.order(dsl::view_count.asc()),
            Some(("view_count", SortDir::Desc)) => q.order(dsl::view_count.desc()),
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
        let article: KnowledgeArticle = diesel::insert_into(knowledge_articles::table)
            .values(&NewArticle {
                title: new.title,
                content: new.content,
                summary: new.summary,
                category_id: new.category_id,
                author_id: actor,
                tags: new.tags,
                itil_process: new.itil_process,
                article_type: new.article_type.unwrap_or_else(|| "howto".to_string()),
                version: 1,
                is_published: false,
                is_draft: new.is_draft,
                view_count: 0,
                created_at: now,
                updated_at: now,
            })
            .get_result(conn)?;
        Ok(article)
    }

    fn apply_update(conn: &mut PgConnection, id: i32, patch: Self::Update) -> ApiResult<Self> {
        let result = diesel::update(knowledge_articles::table.find(id))
            .set((&patch, knowledge_articles::updated_at.eq(Utc::now())))
            .get_result(conn);
        or_unchanged::<Self>(result, conn, id)
    }

    fn remove(conn: &mut PgConnection, id: i32) -> ApiResult<()> {
        let n = diesel::delete(knowledge_articles::table.find(id)).execute(conn)?;
        if n == 0 {
            return Err(ApiError::not_found(Self::NAME));
        }
        Ok(())
    }
}

fn find_article(conn: &mut PgConnection, id: i32) -> ApiResult<KnowledgeArticle> {
    KnowledgeArticle::find_or_fail(conn, id)
}

// ---------------------------------------------------------------------------
// Article detail & versioned updates

#[derive(Debug, Serialize)]
pub struct ArticleDetail {
    #[serde(flatten)]
    pub article: KnowledgeArticle,
    pub is_favorited: bool,
}

async fn get_article(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<ArticleDetail>>> {
    use knowledge_articles::dsl;
    let mut conn = state.db()?;
    // every read counts as a view
    let article: KnowledgeArticle = diesel::update(dsl::knowledge_articles.find(id))
        .set(dsl::view_count.eq(dsl::view_count + 1))
        .get_result(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Article"))?;

    let favorited: i64 = article_favorites::table
        .filter(article_favorites::article_id.eq(id))
        .filter(article_favorites::user_id.eq(user.id()))
        .count()
        .get_result(&mut conn)?;

    Ok(Json(ApiResponse::data(ArticleDetail {
        article,
        is_favorited: favorited > 0,
    })))
}

/// Whether a patch changes the article body and therefore opens a new
/// version.
fn bumps_version(patch: &ArticlePatch, existing: &KnowledgeArticle) -> bool {
    let title_changed = patch
        .title
        .as_ref()
        .is_some_and(|t| *t != existing.title);
    let content_changed = patch
        .content
        .as_ref()
        .is_some_and(|c| *c != existing.content);
    title_changed || content_changed
}

/// Stamp the next version number onto a body-changing patch. Returns
/// whether the outgoing contents must be snapshotted first.
fn prepare_versioned_patch(patch: &mut ArticlePatch, existing: &KnowledgeArticle) -> bool {
    if bumps_version(patch, existing) {
        patch.version = Some(existing.version + 1);
        true
    } else {
        false
    }
}

#[derive(Debug, Deserialize)]
pub struct ArticleUpdateRequest {
    #[serde(flatten)]
    pub patch: ArticlePatch,
    pub change_description: Option<String>,
}

async fn update_article(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(req): Json<ArticleUpdateRequest>,
) -> ApiResult<Json<ApiResponse<KnowledgeArticle>>> {
    let mut conn = state.db()?;
    let existing = find_article(&mut conn, id)?;
    authorize_mutation(&user, &existing)?;

    let mut patch = req.patch;
    let snapshot = prepare_versioned_patch(&mut patch, &existing);

    // the history row and the live update commit together or not at all
    let article = conn.transaction(|conn| -> ApiResult<KnowledgeArticle> {
        if snapshot {
            diesel::insert_into(article_versions::table)
                .values((
                    article_versions::article_id.eq(existing.id),
                    article_versions::version.eq(existing.version),
                    article_versions::title.eq(&existing.title),
                    article_versions::content.eq(&existing.content),
                    article_versions::changed_by.eq(user.id()),
                    article_versions::change_description.eq(req.change_description.clone()),
                    article_versions::created_at.eq(Utc::now()),
                ))
                .execute(conn)?;
        }
        KnowledgeArticle::apply_update(conn, id, patch)
    })?;
    Ok(Json(ApiResponse::updated(article, "Article")))
}

#[derive(Debug, Queryable, Serialize)]
pub struct ArticleVersion {
    pub id: i32,
    pub article_id: i32,
    pub version: i32,
    pub title: String,
    pub content: String,
    pub changed_by: i32,
    pub change_description: Option<String>,
    pub created_at: DateTime<Utc>,
}

async fn list_versions(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<Vec<ArticleVersion>>>> {
    use article_versions::dsl;
    let mut conn = state.db()?;
    find_article(&mut conn, id)?;
    let versions: Vec<ArticleVersion> = dsl::article_versions
        .filter(dsl::article_id.eq(id))
        .order(dsl::version.desc())
        .load(&mut conn)?;
    Ok(Json(ApiResponse::data(versions)))
}

async fn toggle_publish(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<KnowledgeArticle>>> {
    require_staff(&user)?;
    use knowledge_articles::dsl;
    let mut conn = state.db()?;
    let existing = find_article(&mut conn, id)?;
    let article: KnowledgeArticle = diesel::update(dsl::knowledge_articles.find(id))
        .set((
            dsl::is_published.eq(!existing.is_published),
            dsl::is_draft.eq(false),
            dsl::updated_at.eq(Utc::now()),
        ))
        .get_result(&mut conn)?;
    Ok(Json(ApiResponse::updated(article, "Article")))
}

// ---------------------------------------------------------------------------
// Categories

#[derive(Debug, Queryable, Serialize)]
pub struct KnowledgeCategory {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub parent_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryCreate {
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub parent_id: Option<i32>,
}

async fn list_categories(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> ApiResult<Json<ApiResponse<Vec<KnowledgeCategory>>>> {
    use knowledge_categories::dsl;
    let mut conn = state.db()?;
    let categories: Vec<KnowledgeCategory> =
        dsl::knowledge_categories.order(dsl::name.asc()).load(&mut conn)?;
    Ok(Json(ApiResponse::data(categories)))
}

async fn create_category(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<CategoryCreate>,
) -> ApiResult<Json<ApiResponse<KnowledgeCategory>>> {
    require_staff(&user)?;
    use knowledge_categories::dsl;
    let mut conn = state.db()?;
    let category: KnowledgeCategory = diesel::insert_into(dsl::knowledge_categories)
        .values((
            dsl::name.eq(payload.name),
            dsl::description.eq(payload.description),
            dsl::icon.eq(payload.icon),
            dsl::parent_id.eq(payload.parent_id),
            dsl::created_at.eq(Utc::now()),
        ))
        .get_result(&mut conn)?;
    Ok(Json(ApiResponse::created(category, "Category")))
}

async fn delete_category(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(category_id): Path<i32>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    require_staff(&user)?;
    let mut conn = state.db()?;
    let n = diesel::delete(knowledge_categories::table.find(category_id)).execute(&mut conn)?;
    if n == 0 {
        return Err(ApiError::not_found("Category"));
    }
    Ok(Json(ApiResponse::message("Category deleted successfully")))
}

// ---------------------------------------------------------------------------
// Favorites

async fn favorite_article(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    use article_favorites::dsl;
    let mut conn = state.db()?;
    find_article(&mut conn, id)?;
    let exists: i64 = dsl::article_favorites
        .filter(dsl::article_id.eq(id))
        .filter(dsl::user_id.eq(user.id()))
        .count()
        .get_result(&mut conn)?;
    if exists == 0 {
        diesel::insert_into(dsl::article_favorites)
            .values((
                dsl::article_id.eq(id),
                dsl::user_id.eq(user.id()),
                dsl::created_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;
    }
    Ok(Json(ApiResponse::message("Article favorited")))
}

async fn unfavorite_article(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    use article_favorites::dsl;
    let mut conn = state.db()?;
    diesel::delete(
        dsl::article_favorites
            .filter(dsl::article_id.eq(id))
            .filter(dsl::user_id.eq(user.id())),
    )
    .execute(&mut conn)?;
    Ok(Json(ApiResponse::message("Article unfavorited")))
}

// ---------------------------------------------------------------------------
// Comments (threaded)

#[derive(Debug, Queryable, Serialize)]
pub struct ArticleComment {
    pub id: i32,
    pub article_id: i32,
    pub user_id: i32,
    pub parent_comment_id: Option<i32>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ArticleCommentCreate {
    pub body: String,
    pub parent_comment_id: Option<i32>,
}

async fn list_article_comments(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<Vec<ArticleComment>>>> {
    use article_comments::dsl;
    let mut conn = state.db()?;
    find_article(&mut conn, id)?;
    let comments: Vec<ArticleComment> = dsl::article_comments
        .filter(dsl::article_id.eq(id))
        .order(dsl::created_at.asc())
        .load(&mut conn)?;
    Ok(Json(ApiResponse::data(comments)))
}

async fn add_article_comment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<ArticleCommentCreate>,
) -> ApiResult<Json<ApiResponse<ArticleComment>>> {
    use article_comments::dsl;
    let mut conn = state.db()?;
    find_article(&mut conn, id)?;
    if let Some(parent_id) = payload.parent_comment_id {
        let parent: Option<ArticleComment> = dsl::article_comments
            .find(parent_id)
            .first(&mut conn)
            .optional()?;
        match parent {
            Some(p) if p.article_id == id => {}
            _ => return Err(ApiError::bad_request("Parent comment not on this article")),
        }
    }
    let now = Utc::now();
    let comment: ArticleComment = diesel::insert_into(dsl::article_comments)
        .values((
            dsl::article_id.eq(id),
            dsl::user_id.eq(user.id()),
            dsl::parent_comment_id.eq(payload.parent_comment_id),
            dsl::body.eq(payload.body),
            dsl::created_at.eq(now),
            dsl::updated_at.eq(now),
        ))
        .get_result(&mut conn)?;
    Ok(Json(ApiResponse::created(comment, "Comment")))
}

// ---------------------------------------------------------------------------
// Workflow steps

#[derive(Debug, Queryable, Serialize)]
pub struct WorkflowStep {
    pub id: i32,
    pub article_id: i32,
    pub step_number: i32,
    pub title: String,
    pub description: Option<String>,
    pub code_snippet: Option<String>,
    pub code_language: Option<String>,
    pub success_outcome: Option<String>,
    pub failure_outcome: Option<String>,
    pub next_step_on_success: Option<i32>,
    pub next_step_on_failure: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct WorkflowStepCreate {
    pub step_number: i32,
    pub title: String,
    pub description: Option<String>,
    pub code_snippet: Option<String>,
    pub code_language: Option<String>,
    pub success_outcome: Option<String>,
    pub failure_outcome: Option<String>,
    pub next_step_on_success: Option<i32>,
    pub next_step_on_failure: Option<i32>,
}

async fn list_workflow_steps(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<Vec<WorkflowStep>>>> {
    use article_workflow_steps::dsl;
    let mut conn = state.db()?;
    find_article(&mut conn, id)?;
    let steps: Vec<WorkflowStep> = dsl::article_workflow_steps
        .filter(dsl::article_id.eq(id))
        .order(dsl::step_number.asc())
        .load(&mut conn)?;
    Ok(Json(ApiResponse::data(steps)))
}

async fn add_workflow_step(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<WorkflowStepCreate>,
) -> ApiResult<Json<ApiResponse<WorkflowStep>>> {
    require_staff(&user)?;
    use article_workflow_steps::dsl;
    let mut conn = state.db()?;
    find_article(&mut conn, id)?;
    let step: WorkflowStep = diesel::insert_into(dsl::article_workflow_steps)
        .values((
            dsl::article_id.eq(id),
            dsl::step_number.eq(payload.step_number),
            dsl::title.eq(payload.title),
            dsl::description.eq(payload.description),
            dsl::code_snippet.eq(payload.code_snippet),
            dsl::code_language.eq(payload.code_language),
            dsl::success_outcome.eq(payload.success_outcome),
            dsl::failure_outcome.eq(payload.failure_outcome),
            dsl::next_step_on_success.eq(payload.next_step_on_success),
            dsl::next_step_on_failure.eq(payload.next_step_on_failure),
        ))
        .get_result(&mut conn)?;
    Ok(Json(ApiResponse::created(step, "Workflow step")))
}

async fn delete_workflow_step(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((id, step_id)): Path<(i32, i32)>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    require_staff(&user)?;
    use article_workflow_steps::dsl;
    let mut conn = state.db()?;
    let n = diesel::delete(
        dsl::article_workflow_steps
            .filter(dsl::id.eq(step_id))
            .filter(dsl::article_id.eq(id)),
    )
    .execute(&mut conn)?;
    if n == 0 {
        return Err(ApiError::not_found("Workflow step"));
    }
    Ok(Json(ApiResponse::message("Workflow step deleted successfully")))
}

// ---------------------------------------------------------------------------
// Ticket links

#[derive(Debug, Queryable, Serialize)]
pub struct ArticleTicketLink {
    pub id: i32,
    pub article_id: i32,
    pub ticket_id: i32,
    pub link_type: String,
    pub created_by: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct TicketLinkCreate {
    pub ticket_id: i32,
    pub link_type: Option<String>,
}

async fn list_ticket_links(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<Vec<ArticleTicketLink>>>> {
    use article_ticket_links::dsl;
    let mut conn = state.db()?;
    let links: Vec<ArticleTicketLink> = dsl::article_ticket_links
        .filter(dsl::article_id.eq(id))
        .load(&mut conn)?;
    Ok(Json(ApiResponse::data(links)))
}

async fn link_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<TicketLinkCreate>,
) -> ApiResult<Json<ApiResponse<ArticleTicketLink>>> {
    use article_ticket_links::dsl;
    let mut conn = state.db()?;
    find_article(&mut conn, id)?;
    Ticket::find_or_fail(&mut conn, payload.ticket_id)?;
    let exists: i64 = dsl::article_ticket_links
        .filter(dsl::article_id.eq(id))
        .filter(dsl::ticket_id.eq(payload.ticket_id))
        .count()
        .get_result(&mut conn)?;
    if exists > 0 {
        return Err(ApiError::bad_request("Ticket is already linked"));
    }
    let link: ArticleTicketLink = diesel::insert_into(dsl::article_ticket_links)
        .values((
            dsl::article_id.eq(id),
            dsl::ticket_id.eq(payload.ticket_id),
            dsl::link_type.eq(payload.link_type.unwrap_or_else(|| "related".to_string())),
            dsl::created_by.eq(Some(user.id())),
            dsl::created_at.eq(Utc::now()),
        ))
        .get_result(&mut conn)?;
    Ok(Json(ApiResponse::created(link, "Ticket link")))
}

async fn unlink_ticket(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path((id, link_id)): Path<(i32, i32)>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    use article_ticket_links::dsl;
    let mut conn = state.db()?;
    let n = diesel::delete(
        dsl::article_ticket_links
            .filter(dsl::id.eq(link_id))
            .filter(dsl::article_id.eq(id)),
    )
    .execute(&mut conn)?;
    if n == 0 {
        return Err(ApiError::not_found("Ticket link"));
    }
    Ok(Json(ApiResponse::message("Ticket link removed successfully")))
}

// ---------------------------------------------------------------------------

pub fn configure_knowledge_routes() -> Router<Arc<AppState>> {
    crud_router::<KnowledgeArticle>(CrudRoutes::default().without_get().without_update())
        .route("/:id", get(get_article).put(update_article))
        .route("/:id/versions", get(list_versions))
        .route("/:id/publish", post(toggle_publish))
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/:category_id", delete(delete_category))
        .route(
            "/:id/favorite",
            post(favorite_article).delete(unfavorite_article),
        )
        .route(
            "/:id/comments",
            get(list_article_comments).post(add_article_comment),
        )
        .route(
            "/:id/workflow-steps",
            get(list_workflow_steps).post(add_workflow_step),
        )
        .route("/:id/workflow-steps/:step_id", delete(delete_workflow_step))
        .route(
            "/:id/ticket-links",
            get(list_ticket_links).post(link_ticket),
        )
        .route("/:id/ticket-links/:link_id", delete(unlink_ticket))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article() -> KnowledgeArticle {
        let now = Utc::now();
        KnowledgeArticle {
            id: 1,
            title: "Reset VPN".to_string(),
            content: "Step one".to_string(),
            summary: None,
            category_id: None,
            author_id: 5,
            tags: None,
            itil_process: None,
            article_type: "howto".to_string(),
            version: 3,
            is_published: true,
            is_draft: false,
            view_count: 12,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn content_change_opens_a_new_version() {
        let existing = article();
        let patch = ArticlePatch {
            content: Some("Step one, revised".to_string()),
            ..Default::default()
        };
        assert!(bumps_version(&patch, &existing));
    }

    #[test]
    fn metadata_change_keeps_the_version() {
        let existing = article();
        let patch = ArticlePatch {
            tags: Some("vpn,network".to_string()),
            category_id: Some(4),
            ..Default::default()
        };
        assert!(!bumps_version(&patch, &existing));
    }

    #[test]
    fn identical_body_keeps_the_version() {
        let existing = article();
        let patch = ArticlePatch {
            title: Some(existing.title.clone()),
            content: Some(existing.content.clone()),
            ..Default::default()
        };
        assert!(!bumps_version(&patch, &existing));
    }

    #[test]
    fn body_change_snapshots_once_and_bumps_to_the_next_version() {
        let existing = article();
        let mut patch = ArticlePatch {
            content: Some("Step one, revised".to_string()),
            ..Default::default()
        };
        assert!(prepare_versioned_patch(&mut patch, &existing));
        assert_eq!(patch.version, Some(existing.version + 1));

        let mut patch = ArticlePatch {
            tags: Some("vpn".to_string()),
            ..Default::default()
        };
        assert!(!prepare_versioned_patch(&mut patch, &existing));
        assert_eq!(patch.version, None);
    }
}
