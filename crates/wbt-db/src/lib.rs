//! wbt-db
//!
//! Postgres access for the tariff sync pipeline: connection pool,
//! embedded migrations, the cross-process advisory lock, the
//! reconciliation engine, and the read-back query that feeds the
//! spreadsheet export.

pub mod lock;
pub mod reconcile;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

pub use lock::{try_acquire, AdvisoryLock, SYNC_LOCK_KEY};
pub use reconcile::{parse_decimal, reconcile, ReconcileReport};

pub const ENV_DB_URL: &str = "WBT_DATABASE_URL";

/// Connect to Postgres using WBT_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='warehouses'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus { ok, has_warehouse_tables: exists })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_warehouse_tables: bool,
}

/// One joined row of today's reconciled data, shaped for export.
#[derive(Debug, Clone, FromRow)]
pub struct ExportRow {
    pub warehouse_name: String,
    pub geo_name: Option<String>,
    pub box_delivery_base: Option<f64>,
    pub box_delivery_coef_expr: Option<f64>,
    pub box_delivery_liter: Option<f64>,
    pub box_delivery_marketplace_base: Option<f64>,
    pub box_delivery_marketplace_coef_expr: Option<f64>,
    pub box_delivery_marketplace_liter: Option<f64>,
    pub box_storage_base: Option<f64>,
    pub box_storage_coef_expr: Option<f64>,
    pub box_storage_liter: Option<f64>,
    pub dt_next_box: Option<String>,
    pub dt_till_max: Option<String>,
}

/// Fetch the three-table join for one day's partition, ordered by
/// warehouse name so export output is deterministic.
///
/// Left joins are deliberate: a warehouse row with no matching location
/// or tariff row still exports, with the gaps rendered as placeholder
/// cells downstream.
pub async fn fetch_day_rows(pool: &PgPool, day: NaiveDate) -> Result<Vec<ExportRow>> {
    let rows = sqlx::query_as::<_, ExportRow>(
        r#"
        select
          w.warehouse_name,
          l.geo_name,
          w.box_delivery_base,
          w.box_delivery_coef_expr,
          w.box_delivery_liter,
          w.box_delivery_marketplace_base,
          w.box_delivery_marketplace_coef_expr,
          w.box_delivery_marketplace_liter,
          w.box_storage_base,
          w.box_storage_coef_expr,
          w.box_storage_liter,
          t.dt_next_box,
          t.dt_till_max
        from warehouses w
        left join wh_location l on l.warehouse_name = w.warehouse_name
        left join wh_tariffs t
          on t.warehouse_name = w.warehouse_name and t.date = w.date
        where w.date = $1
        order by w.warehouse_name
        "#,
    )
    .bind(day)
    .fetch_all(pool)
    .await
    .context("fetch_day_rows failed")?;

    Ok(rows)
}
