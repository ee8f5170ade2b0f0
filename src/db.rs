use rocket_sync_db_pools::{database, diesel};

/// Pooled Postgres connection handle. Pool size and connection URL are
/// injected through Rocket's figment in `main` from the `DB_*`
/// environment variables.
#[database("fungo")]
pub struct SimDb(diesel::PgConnection);
