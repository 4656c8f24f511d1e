use axum::extract::{Path, State};
use axum::routing::{get, put};
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
use crate::shared::schema::{assets, companies, company_contacts};
use crate::shared::state::AppState;
use crate::shared::utils::{Page, SortDir};

#[derive(Debug, Clone, Queryable, Serialize)]
pub struct Company {
    pub id: i32,
    pub name: String,
    pub domain: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub contract_start: Option<DateTime<Utc>>,
    pub contract_end: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Resource for Company {
    const NAME: &'static str = "Company";

    fn id(&self) -> i32 {
        self.id
    }

    fn activity_flag(&self) -> Option<bool> {
        Some(self.is_active)
    }
}

#[derive(Debug, Deserialize)]
pub struct CompanyCreate {
    pub name: String,
    pub domain: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub contract_start: Option<DateTime<Utc>>,
    pub contract_end: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, AsChangeset)]
#[diesel(table_name = companies)]
pub struct CompanyPatch {
    pub name: Option<String>,
    pub domain: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub contract_start: Option<DateTime<Utc>>,
    pub contract_end: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompanyFilter {
    pub is_active: Option<bool>,
    pub domain: Option<String>,
}

impl Company {
    fn filtered(
        filter: &CompanyFilter,
        search: Option<&str>,
    ) -> companies::BoxedQuery<'static, diesel::pg::Pg> {
        use companies::dsl;
        let mut q = dsl::companies.into_boxed();
        if let Some(active) = filter.is_active {
            q = q.filter(dsl::is_active.eq(active));
        }
        if let Some(domain) = &filter.domain {
            q = q.filter(dsl::domain.eq(domain.clone()));
        }
        if let Some(term) = search {
            let pattern = search_pattern(term);
            q = q.filter(dsl::name.ilike(pattern.clone()).or(dsl::email.ilike(pattern)));
        }
        q
    }
}

impl Crud for Company {
    type Create = CompanyCreate;
    type Update = CompanyPatch;
    type Filter = CompanyFilter;

    const SOFT_DELETE: bool = true;
    const STAFF_ONLY: bool = true;

    fn find(conn: &mut PgConnection, id: i32) -> ApiResult<Option<Self>> {
        Ok(companies::table.find(id).first(conn).optional()?)
    }

    fn list(
        conn: &mut PgConnection,
        filter: &Self::Filter,
        search: Option<&str>,
        sort: Option<(&str, SortDir)>,
        page: Page,
    ) -> ApiResult<Vec<Self>> {
        use companies::dsl;
        let q = Self::filtered(filter, search);
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
        Ok(Self::filtered(filter, search).count().get_result(conn)?)
    }

    fn insert(conn: &mut PgConnection, new: Self::Create, _actor: i32) -> ApiResult<Self> {
        use companies::dsl;
        Ok(diesel::insert_into(dsl::companies)
            .values((
                dsl::name.eq(new.name),
                dsl::domain.eq(new.domain),
                dsl::address.eq(new.address),
                dsl::phone.eq(new.phone),
                dsl::email.eq(new.email),
                dsl::website.eq(new.website),
                dsl::contract_start.eq(new.contract_start),
                dsl::contract_end.eq(new.contract_end),
                dsl::is_active.eq(true),
                dsl::notes.eq(new.notes),
                dsl::created_at.eq(Utc::now()),
            ))
            .get_result(conn)?)
    }

    fn apply_update(conn: &mut PgConnection, id: i32, patch: Self::Update) -> ApiResult<Self> {
        let result = diesel::update(companies::table.find(id))
            .set(&patch)
            .get_result(conn);
        or_unchanged::<Self>(result, conn, id)
    }

    fn remove(conn: &mut PgConnection, id: i32) -> ApiResult<()> {
        let n = diesel::delete(companies::table.find(id)).execute(conn)?;
        if n == 0 {
            return Err(ApiError::not_found(Self::NAME));
        }
        Ok(())
    }

    fn delete_or_deactivate(conn: &mut PgConnection, id: i32) -> ApiResult<()> {
        use companies::dsl;
        let n = diesel::update(dsl::companies.find(id))
            .set(dsl::is_active.eq(false))
            .execute(conn)?;
        if n == 0 {
            return Err(ApiError::not_found(Self::NAME));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Company detail

#[derive(Debug, Serialize)]
pub struct CompanyDetail {
    #[serde(flatten)]
    pub company: Company,
    pub contacts: Vec<CompanyContact>,
    pub assets: Vec<Asset>,
}

async fn get_company(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<CompanyDetail>>> {
    let mut conn = state.db()?;
    let company = Company::find_or_fail(&mut conn, id)?;
    let contacts = company_contacts::table
        .filter(company_contacts::company_id.eq(id))
        .order(company_contacts::name.asc())
        .load(&mut conn)?;
    let company_assets = assets::table
        .filter(assets::company_id.eq(id))
        .order(assets::asset_tag.asc())
        .load(&mut conn)?;
    Ok(Json(ApiResponse::data(CompanyDetail {
        company,
        contacts,
        assets: company_assets,
    })))
}

// ---------------------------------------------------------------------------
// Contacts

#[derive(Debug, Queryable, Serialize)]
pub struct CompanyContact {
    pub id: i32,
    pub company_id: i32,
    pub user_id: Option<i32>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub is_primary: bool,
}

#[derive(Debug, Deserialize)]
pub struct ContactCreate {
    pub user_id: Option<i32>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Deserialize, AsChangeset)]
#[diesel(table_name = company_contacts)]
pub struct ContactPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub is_primary: Option<bool>,
}

async fn list_contacts(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<Vec<CompanyContact>>>> {
    use company_contacts::dsl;
    let mut conn = state.db()?;
    Company::find_or_fail(&mut conn, id)?;
    let contacts: Vec<CompanyContact> = dsl::company_contacts
        .filter(dsl::company_id.eq(id))
        .order(dsl::name.asc())
        .load(&mut conn)?;
    Ok(Json(ApiResponse::data(contacts)))
}

async fn add_contact(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<ContactCreate>,
) -> ApiResult<Json<ApiResponse<CompanyContact>>> {
    require_staff(&user)?;
    use company_contacts::dsl;
    let mut conn = state.db()?;
    Company::find_or_fail(&mut conn, id)?;
    let contact: CompanyContact = diesel::insert_into(dsl::company_contacts)
        .values((
            dsl::company_id.eq(id),
            dsl::user_id.eq(payload.user_id),
            dsl::name.eq(payload.name),
            dsl::email.eq(payload.email),
            dsl::phone.eq(payload.phone),
            dsl::role.eq(payload.role),
            dsl::is_primary.eq(payload.is_primary),
        ))
        .get_result(&mut conn)?;
    Ok(Json(ApiResponse::created(contact, "Contact")))
}

async fn update_contact(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(contact_id): Path<i32>,
    Json(patch): Json<ContactPatch>,
) -> ApiResult<Json<ApiResponse<CompanyContact>>> {
    require_staff(&user)?;
    let mut conn = state.db()?;
    let contact: CompanyContact = match diesel::update(company_contacts::table.find(contact_id))
        .set(&patch)
        .get_result(&mut conn)
    {
        Ok(row) => row,
        Err(diesel::result::Error::QueryBuilderError(_)) => company_contacts::table
            .find(contact_id)
            .first(&mut conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found("Contact"))?,
        Err(diesel::result::Error::NotFound) => return Err(ApiError::not_found("Contact")),
        Err(err) => return Err(err.into()),
    };
    Ok(Json(ApiResponse::updated(contact, "Contact")))
}

async fn delete_contact(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(contact_id): Path<i32>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    require_staff(&user)?;
    let mut conn = state.db()?;
    let n = diesel::delete(company_contacts::table.find(contact_id)).execute(&mut conn)?;
    if n == 0 {
        return Err(ApiError::not_found("Contact"));
    }
    Ok(Json(ApiResponse::message("Contact deleted successfully")))
}

// ---------------------------------------------------------------------------
// Assets

#[derive(Debug, Clone, Queryable, Serialize)]
pub struct Asset {
    pub id: i32,
    pub asset_tag: String,
    pub name: String,
    pub asset_type: String,
    pub company_id: Option<i32>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub purchase_date: Option<DateTime<Utc>>,
    pub warranty_expiry: Option<DateTime<Utc>>,
    pub cost: Option<f64>,
    pub location: Option<String>,
    pub assigned_to: Option<i32>,
    pub status: String,
    pub notes: Option<String>,
    pub specifications: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resource for Asset {
    const NAME: &'static str = "Asset";

    fn id(&self) -> i32 {
        self.id
    }
}

#[derive(Debug, Deserialize)]
pub struct AssetCreate {
    pub asset_tag: String,
    pub name: String,
    pub asset_type: String,
    pub company_id: Option<i32>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub purchase_date: Option<DateTime<Utc>>,
    pub warranty_expiry: Option<DateTime<Utc>>,
    pub cost: Option<f64>,
    pub location: Option<String>,
    pub assigned_to: Option<i32>,
    pub status: Option<String>,
    pub notes: Option<String>,
    pub specifications: Option<String>,
}

#[derive(Debug, Default, Deserialize, AsChangeset)]
#[diesel(table_name = assets)]
pub struct AssetPatch {
    pub name: Option<String>,
    pub asset_type: Option<String>,
    pub company_id: Option<i32>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub purchase_date: Option<DateTime<Utc>>,
    pub warranty_expiry: Option<DateTime<Utc>>,
    pub cost: Option<f64>,
    pub location: Option<String>,
    pub assigned_to: Option<i32>,
    pub status: Option<String>,
    pub notes: Option<String>,
    pub specifications: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssetFilter {
    pub asset_type: Option<String>,
    pub status: Option<String>,
    pub company_id: Option<i32>,
    pub assigned_to: Option<i32>,
}

impl Asset {
    fn filtered(
        filter: &AssetFilter,
        search: Option<&str>,
    ) -> assets::BoxedQuery<'static, diesel::pg::Pg> {
        use assets::dsl;
        let mut q = dsl::assets.into_boxed();
        if let Some(kind) = &filter.asset_type {
            q = q.filter(dsl::asset_type.eq(kind.clone()));
        }
        if let Some(status) = &filter.status {
            q = q.filter(dsl::status.eq(status.clone()));
        }
        if let Some(id) = filter.company_id {
            q = q.filter(dsl::company_id.eq(id));
        }
        if let Some(id) = filter.assigned_to {
            q = q.filter(dsl::assigned_to.eq(id));
        }
        if let Some(term) = search {
            let pattern = search_pattern(term);
            q = q.filter(
                dsl::asset_tag
                    .ilike(pattern.clone())
                    .or(dsl::name.ilike(pattern.clone()))
                    .or(dsl::serial_number.ilike(pattern)),
            );
        }
        q
    }
}

impl Crud for Asset {
    type Create = AssetCreate;
    type Update = AssetPatch;
    type Filter = AssetFilter;

    const STAFF_ONLY: bool = true;

    fn find(conn: &mut PgConnection, id: i32) -> ApiResult<Option<Self>> {
        Ok(assets::table.find(id).first(conn).optional()?)
    }

    fn list(
        conn: &mut PgConnection,
        filter: &Self::Filter,
        search: Option<&str>,
        sort: Option<(&str, SortDir)>,
        page: Page,
    ) -> ApiResult<Vec<Self>> {
        use assets::dsl;
        let q = Self::filtered(filter, search);
        let q = match sort {
            Some(("name", SortDir::Asc)) => q.order(dsl::name.asc()),
            Some(("name", SortDir::Desc)) => q.order(dsl::name.desc()),
            Some(("created_at", SortDir::Asc)) => q.order(dsl::created_at.asc()),
            Some(("created_at", SortDir::Desc)) => q.order(dsl::created_at.desc()),
            _ => q.order(dsl::asset_tag.asc()),
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

    fn insert(conn: &mut PgConnection, new: Self::Create, _actor: i32) -> ApiResult<Self> {
        use assets::dsl;
        let duplicate: i64 = dsl::assets
            .filter(dsl::asset_tag.eq(&new.asset_tag))
            .count()
            .get_result(conn)?;
        if duplicate > 0 {
            return Err(ApiError::bad_request("Asset tag already exists"));
        }
        let now = Utc::now();
        Ok(diesel::insert_into(dsl::assets)
            .values((
                dsl::asset_tag.eq(new.asset_tag),
                dsl::name.eq(new.name),
                dsl::asset_type.eq(new.asset_type),
                dsl::company_id.eq(new.company_id),
                dsl::manufacturer.eq(new.manufacturer),
                dsl::model.eq(new.model),
                dsl::serial_number.eq(new.serial_number),
                dsl::purchase_date.eq(new.purchase_date),
                dsl::warranty_expiry.eq(new.warranty_expiry),
                dsl::cost.eq(new.cost),
                dsl::location.eq(new.location),
                dsl::assigned_to.eq(new.assigned_to),
                dsl::status.eq(new.status.unwrap_or_else(|| "active".to_string())),
                dsl::notes.eq(new.notes),
                dsl::specifications.eq(new.specifications),
                dsl::created_at.eq(now),
                dsl::updated_at.eq(now),
            ))
            .get_result(conn)?)
    }

    fn apply_update(conn: &mut PgConnection, id: i32, patch: Self::Update) -> ApiResult<Self> {
        let result = diesel::update(assets::table.find(id))
            .set((&patch, assets::updated_at.eq(Utc::now())))
            .get_result(conn);
        or_unchanged::<Self>(result, conn, id)
    }

    fn remove(conn: &mut PgConnection, id: i32) -> ApiResult<()> {
        let n = diesel::delete(assets::table.find(id)).execute(conn)?;
        if n == 0 {
            return Err(ApiError::not_found(Self::NAME));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------

pub fn configure_company_routes() -> Router<Arc<AppState>> {
    let asset_routes = crud_router::<Asset>(CrudRoutes {
        export: true,
        ..CrudRoutes::default()
    });

    crud_router::<Company>(CrudRoutes {
        get: false,
        export: true,
        ..CrudRoutes::default()
    })
    .route("/:id", get(get_company))
    .route("/:id/contacts", get(list_contacts).post(add_contact))
    .route(
        "/contacts/:contact_id",
        put(update_contact).delete(delete_contact),
    )
    .nest("/assets", asset_routes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn company_and_asset_mutations_are_staff_gated() {
        assert!(Company::STAFF_ONLY);
        assert!(Asset::STAFF_ONLY);
        assert!(Company::SOFT_DELETE);
        assert!(!Asset::SOFT_DELETE);
    }
}
