use crate::shared::config::AppConfig;
use crate::shared::error::ApiResult;
use crate::shared::utils::DbPool;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::PgConnection;

pub type DbConn = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
}

impl AppState {
    pub fn db(&self) -> ApiResult<DbConn> {
        Ok(self.conn.get()?)
    }
}
