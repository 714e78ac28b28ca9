use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

pub type Database = Pool<Postgres>;

pub async fn create_database_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<Database, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::query("SELECT 1").fetch_one(&pool).await?;

    log::info!("connected to database (pool size {})", max_connections);
    Ok(pool)
}

pub async fn run_migrations(db: &Database) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(db).await?;
    log::info!("database migrations applied");
    Ok(())
}
