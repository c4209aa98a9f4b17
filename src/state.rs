use crate::db::DbPool;
use crate::marketplace::Marketplace;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub market: Arc<Marketplace>,
    /// Present when the Postgres projection is enabled
    pub pool: Option<DbPool>,
}
