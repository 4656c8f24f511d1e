pub mod jwt;
pub mod password;

use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::shared::crud::Resource;
use crate::shared::error::{ApiError, ApiResult};
use crate::shared::schema::users;
use crate::shared::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Technician,
    User,
}

impl Role {
    pub fn parse(value: &str) -> Self {
        match value {
            "admin" => Self::Admin,
            "technician" => Self::Technician,
            _ => Self::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Technician => "technician",
            Self::User => "user",
        }
    }
}

#[derive(Debug, Clone, Queryable)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Resource for User {
    const NAME: &'static str = "User";

    fn id(&self) -> i32 {
        self.id
    }

    fn activity_flag(&self) -> Option<bool> {
        Some(self.is_active)
    }
}

impl User {
    pub fn role(&self) -> Role {
        Role::parse(&self.role)
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub role: String,
}

/// The authenticated caller, resolved from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl AuthUser {
    pub fn id(&self) -> i32 {
        self.0.id
    }

    pub fn role(&self) -> Role {
        self.0.role()
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Role::Admin
    }

    /// Admin or technician.
    pub fn is_staff(&self) -> bool {
        matches!(self.role(), Role::Admin | Role::Technician)
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("Invalid authorization header".to_string()))?;

        let claims = jwt::verify_token(token, &state.config.auth.jwt_secret)?;
        let user_id = claims.user_id()?;

        let mut conn = state.db()?;
        let user: User = users::table
            .filter(users::id.eq(user_id))
            .first(&mut conn)
            .optional()?
            .ok_or_else(|| ApiError::Unauthorized("Unknown user".to_string()))?;

        if !user.is_active {
            return Err(ApiError::Unauthorized("Account is disabled".to_string()));
        }

        Ok(AuthUser(user))
    }
}

/// Centralized ownership gate used by the router factory and by custom
/// mutation handlers. Admins pass; rows without an ownership field pass;
/// everyone else must own the row.
pub fn authorize_mutation<R: Resource>(actor: &AuthUser, row: &R) -> ApiResult<()> {
    if actor.is_admin() {
        return Ok(());
    }
    match row.owner_id() {
        None => Ok(()),
        Some(owner) if owner == actor.id() => Ok(()),
        Some(_) => Err(ApiError::forbidden(
            "Not authorized to modify this resource",
        )),
    }
}

pub fn require_staff(actor: &AuthUser) -> ApiResult<()> {
    if actor.is_staff() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Staff privileges required"))
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub user: UserSummary,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
struct NewUser {
    username: String,
    email: String,
    password_hash: String,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let mut conn = state.db()?;

    let user: Option<User> = users::table
        .filter(users::username.eq(&req.username))
        .first(&mut conn)
        .optional()?;

    let user = match user {
        Some(u) if password::verify_password(&req.password, &u.password_hash) => u,
        _ => {
            return Err(ApiError::Unauthorized(
                "Incorrect username or password".to_string(),
            ))
        }
    };

    let claims = jwt::Claims::new(user.id, &user.role, state.config.auth.token_expiry_minutes);
    let access_token = jwt::issue_token(&claims, &state.config.auth.jwt_secret)?;

    diesel::update(users::table.filter(users::id.eq(user.id)))
        .set(users::last_login.eq(Some(Utc::now())))
        .execute(&mut conn)?;

    info!(user_id = user.id, "login");

    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer",
        user: user.summary(),
    }))
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut conn = state.db()?;

    let username_taken: i64 = users::table
        .filter(users::username.eq(&req.username))
        .count()
        .get_result(&mut conn)?;
    if username_taken > 0 {
        return Err(ApiError::bad_request("Username already registered"));
    }

    let email_taken: i64 = users::table
        .filter(users::email.eq(&req.email))
        .count()
        .get_result(&mut conn)?;
    if email_taken > 0 {
        return Err(ApiError::bad_request("Email already registered"));
    }

    let new_user = NewUser {
        username: req.username,
        email: req.email,
        password_hash: password::hash_password(&req.password)?,
        role: Role::User.as_str().to_string(),
        is_active: true,
        created_at: Utc::now(),
    };

    let user: User = diesel::insert_into(users::table)
        .values(&new_user)
        .get_result(&mut conn)?;

    Ok(Json(serde_json::json!({
        "message": "User created successfully",
        "user_id": user.id,
    })))
}

async fn me(user: AuthUser) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "id": user.0.id,
        "username": user.0.username,
        "email": user.0.email,
        "role": user.0.role,
        "created_at": user.0.created_at,
        "last_login": user.0.last_login,
    }))
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/me", get(me))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_role(id: i32, role: &str) -> User {
        User {
            id,
            username: format!("user{id}"),
            email: format!("user{id}@example.com"),
            password_hash: String::new(),
            role: role.to_string(),
            is_active: true,
            last_login: None,
            created_at: Utc::now(),
        }
    }

    struct Owned(i32);

    impl Resource for Owned {
        const NAME: &'static str = "Owned";
        fn id(&self) -> i32 {
            1
        }
        fn owner_id(&self) -> Option<i32> {
            Some(self.0)
        }
    }

    struct Unowned;

    impl Resource for Unowned {
        const NAME: &'static str = "Unowned";
        fn id(&self) -> i32 {
            1
        }
    }

    #[test]
    fn admin_may_mutate_anything() {
        let admin = AuthUser(user_with_role(1, "admin"));
        assert!(authorize_mutation(&admin, &Owned(99)).is_ok());
    }

    #[test]
    fn non_owner_is_forbidden() {
        let tech = AuthUser(user_with_role(2, "technician"));
        let err = authorize_mutation(&tech, &Owned(99)).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[test]
    fn owner_may_mutate_own_row() {
        let user = AuthUser(user_with_role(3, "user"));
        assert!(authorize_mutation(&user, &Owned(3)).is_ok());
    }

    #[test]
    fn entities_without_owner_skip_the_check() {
        let user = AuthUser(user_with_role(4, "user"));
        assert!(authorize_mutation(&user, &Unowned).is_ok());
    }

    #[test]
    fn unknown_role_falls_back_to_user() {
        assert_eq!(Role::parse("superuser"), Role::User);
        let odd = AuthUser(user_with_role(5, "superuser"));
        assert!(!odd.is_staff());
    }
}
