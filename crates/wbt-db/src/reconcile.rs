//! Reconciliation engine: upsert one validated snapshot into the three
//! warehouse tables inside a single transaction, counting inserts vs
//! updates per table.
//!
//! Idempotence comes from the upsert pattern itself: an UPDATE scoped to
//! (warehouse_name, date) either hits today's row or proves there is
//! none, in which case the engine inserts it. Running the same snapshot
//! twice on the same day therefore yields zero inserts the second time.
//! Rows from prior days are never touched.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::PgPool;
use wbt_schema::TariffSnapshot;

/// Parse a feed tariff value into a nullable number.
///
/// The feed renders numbers with locale separators (`"1 234,5"`) and
/// uses `"-"` or an empty string for absent values. Whitespace (incl.
/// non-breaking thousands spaces) is stripped, comma decimal separators
/// become periods, and anything that still fails to parse becomes
/// `None` — never zero, never an error.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let normalized: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if normalized.is_empty() {
        return None;
    }
    normalized.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Per-table insert/update tallies for one reconciliation run.
///
/// Location tallies are reported separately from the warehouse ones;
/// gating decisions use [`ReconcileReport::total_changes`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub tariffs_inserted: i64,
    pub tariffs_updated: i64,
    pub warehouses_inserted: i64,
    pub warehouses_updated: i64,
    pub locations_inserted: i64,
    pub locations_updated: i64,
}

impl ReconcileReport {
    /// Zero means "no material change": nothing was written that was
    /// not already there, so the change-gated export can be skipped.
    pub fn total_changes(&self) -> i64 {
        self.tariffs_inserted
            + self.tariffs_updated
            + self.warehouses_inserted
            + self.warehouses_updated
            + self.locations_inserted
            + self.locations_updated
    }
}

/// Upsert `snapshot` into the three tables for the `day` partition.
///
/// All writes happen in one transaction: they commit together or not at
/// all, and no partial counts escape on failure. Warehouses are
/// processed in snapshot order.
pub async fn reconcile(
    pool: &PgPool,
    snapshot: &TariffSnapshot,
    day: NaiveDate,
) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();
    let mut tx = pool.begin().await.context("reconcile begin failed")?;

    for w in &snapshot.warehouses {
        // Tariff window (day-partitioned). A zero-row update means no
        // row exists for this warehouse *today*; rows from prior days
        // deliberately do not suppress the insert.
        let updated = sqlx::query(
            r#"
            update wh_tariffs
            set dt_next_box = $1, dt_till_max = $2
            where warehouse_name = $3 and date = $4
            "#,
        )
        .bind(&snapshot.dt_next_box)
        .bind(&snapshot.dt_till_max)
        .bind(&w.warehouse_name)
        .bind(day)
        .execute(&mut *tx)
        .await
        .context("wh_tariffs update failed")?
        .rows_affected();

        if updated == 0 {
            sqlx::query(
                r#"
                insert into wh_tariffs (warehouse_name, date, dt_next_box, dt_till_max)
                values ($1, $2, $3, $4)
                "#,
            )
            .bind(&w.warehouse_name)
            .bind(day)
            .bind(&snapshot.dt_next_box)
            .bind(&snapshot.dt_till_max)
            .execute(&mut *tx)
            .await
            .context("wh_tariffs insert failed")?;
            report.tariffs_inserted += 1;
        } else {
            report.tariffs_updated += updated as i64;
        }

        // Warehouse tariff values (day-partitioned), coerced to
        // nullable numbers at this boundary.
        let values: [Option<f64>; 9] = [
            parse_decimal(&w.box_delivery_base),
            parse_decimal(&w.box_delivery_coef_expr),
            parse_decimal(&w.box_delivery_liter),
            parse_decimal(&w.box_delivery_marketplace_base),
            parse_decimal(&w.box_delivery_marketplace_coef_expr),
            parse_decimal(&w.box_delivery_marketplace_liter),
            parse_decimal(&w.box_storage_base),
            parse_decimal(&w.box_storage_coef_expr),
            parse_decimal(&w.box_storage_liter),
        ];

        let updated = sqlx::query(
            r#"
            update warehouses
            set box_delivery_base = $1,
                box_delivery_coef_expr = $2,
                box_delivery_liter = $3,
                box_delivery_marketplace_base = $4,
                box_delivery_marketplace_coef_expr = $5,
                box_delivery_marketplace_liter = $6,
                box_storage_base = $7,
                box_storage_coef_expr = $8,
                box_storage_liter = $9
            where warehouse_name = $10 and date = $11
            "#,
        )
        .bind(values[0])
        .bind(values[1])
        .bind(values[2])
        .bind(values[3])
        .bind(values[4])
        .bind(values[5])
        .bind(values[6])
        .bind(values[7])
        .bind(values[8])
        .bind(&w.warehouse_name)
        .bind(day)
        .execute(&mut *tx)
        .await
        .context("warehouses update failed")?
        .rows_affected();

        if updated == 0 {
            sqlx::query(
                r#"
                insert into warehouses (
                  warehouse_name, date,
                  box_delivery_base, box_delivery_coef_expr, box_delivery_liter,
                  box_delivery_marketplace_base, box_delivery_marketplace_coef_expr,
                  box_delivery_marketplace_liter,
                  box_storage_base, box_storage_coef_expr, box_storage_liter
                ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(&w.warehouse_name)
            .bind(day)
            .bind(values[0])
            .bind(values[1])
            .bind(values[2])
            .bind(values[3])
            .bind(values[4])
            .bind(values[5])
            .bind(values[6])
            .bind(values[7])
            .bind(values[8])
            .execute(&mut *tx)
            .await
            .context("warehouses insert failed")?;
            report.warehouses_inserted += 1;
        } else {
            report.warehouses_updated += updated as i64;
        }

        // Location (not day-partitioned): always upserted in place.
        let updated = sqlx::query(
            "update wh_location set geo_name = $1 where warehouse_name = $2",
        )
        .bind(&w.geo_name)
        .bind(&w.warehouse_name)
        .execute(&mut *tx)
        .await
        .context("wh_location update failed")?
        .rows_affected();

        if updated == 0 {
            sqlx::query("insert into wh_location (warehouse_name, geo_name) values ($1, $2)")
                .bind(&w.warehouse_name)
                .bind(&w.geo_name)
                .execute(&mut *tx)
                .await
                .context("wh_location insert failed")?;
            report.locations_inserted += 1;
        } else {
            report.locations_updated += updated as i64;
        }
    }

    tx.commit().await.context("reconcile commit failed")?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_locale_formatted_number() {
        assert_eq!(parse_decimal("1 234,5"), Some(1234.5));
    }

    #[test]
    fn coerces_plain_and_negative_numbers() {
        assert_eq!(parse_decimal("48"), Some(48.0));
        assert_eq!(parse_decimal("0,14"), Some(0.14));
        assert_eq!(parse_decimal("-3,5"), Some(-3.5));
        assert_eq!(parse_decimal("0"), Some(0.0));
    }

    #[test]
    fn dash_and_empty_become_null() {
        assert_eq!(parse_decimal("-"), None);
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("   "), None);
    }

    #[test]
    fn garbage_becomes_null_never_panics() {
        assert_eq!(parse_decimal("abc"), None);
        assert_eq!(parse_decimal("12,34,56"), None);
        assert_eq!(parse_decimal("NaN"), None);
        assert_eq!(parse_decimal("inf"), None);
    }

    #[test]
    fn nbsp_thousands_separator_is_stripped() {
        assert_eq!(parse_decimal("1\u{a0}234,5"), Some(1234.5));
    }

    #[test]
    fn empty_report_signals_no_material_change() {
        let report = ReconcileReport::default();
        assert_eq!(report.total_changes(), 0);
    }
}
