//! wbt-export
//!
//! Export collaborator boundary. This crate shapes persisted rows into
//! the tabular form the spreadsheet destination expects and defines the
//! [`SheetExporter`] seam; the actual transport lives outside this
//! repository. The coordinator only decides *when* to export.

use anyhow::Result;
use chrono::NaiveDate;
use tracing::info;
use wbt_db::ExportRow;

/// Placeholder rendered for missing values.
pub const MISSING_CELL: &str = "-";

/// Spreadsheet sheet titles are length-limited upstream; stay under it.
const SHEET_TITLE_MAX: usize = 90;

/// Ordered header row, one column per exported field.
pub const EXPORT_HEADER: [&str; 13] = [
    "warehouseName",
    "geoName",
    "boxDeliveryBase",
    "boxDeliveryCoefExpr",
    "boxDeliveryLiter",
    "boxDeliveryMarketplaceBase",
    "boxDeliveryMarketplaceCoefExpr",
    "boxDeliveryMarketplaceLiter",
    "boxStorageBase",
    "boxStorageCoefExpr",
    "boxStorageLiter",
    "dtNextBox",
    "dtTillMax",
];

/// Sheet title for one day's export, e.g. `WB Tariffs 2026-08-31`.
pub fn sheet_title(day: NaiveDate) -> String {
    let title = format!("WB Tariffs {}", day.format("%Y-%m-%d"));
    if title.len() > SHEET_TITLE_MAX {
        title[..SHEET_TITLE_MAX].to_string()
    } else {
        title
    }
}

/// Shape persisted rows into header + data rows of display strings.
pub fn build_rows(rows: &[ExportRow]) -> Vec<Vec<String>> {
    let mut out: Vec<Vec<String>> = Vec::with_capacity(rows.len() + 1);
    out.push(EXPORT_HEADER.iter().map(|h| h.to_string()).collect());

    for r in rows {
        out.push(vec![
            r.warehouse_name.clone(),
            r.geo_name.clone().unwrap_or_default(),
            number_cell(r.box_delivery_base),
            number_cell(r.box_delivery_coef_expr),
            number_cell(r.box_delivery_liter),
            number_cell(r.box_delivery_marketplace_base),
            number_cell(r.box_delivery_marketplace_coef_expr),
            number_cell(r.box_delivery_marketplace_liter),
            number_cell(r.box_storage_base),
            number_cell(r.box_storage_coef_expr),
            number_cell(r.box_storage_liter),
            text_cell(r.dt_next_box.as_deref()),
            text_cell(r.dt_till_max.as_deref()),
        ]);
    }

    out
}

fn number_cell(v: Option<f64>) -> String {
    match v {
        Some(n) => n.to_string(),
        None => MISSING_CELL.to_string(),
    }
}

fn text_cell(v: Option<&str>) -> String {
    match v {
        Some(s) => s.to_string(),
        None => MISSING_CELL.to_string(),
    }
}

/// Spreadsheet destination contract.
///
/// Object-safe and `Send + Sync` so the coordinator can hold an
/// `Arc<dyn SheetExporter>` across scheduler callbacks. Returns the
/// number of rows written (header included) or an error the caller
/// logs without failing the run.
#[async_trait::async_trait]
pub trait SheetExporter: Send + Sync {
    fn exporter_name(&self) -> &'static str;

    async fn upload(&self, title: &str, rows: Vec<Vec<String>>) -> Result<usize>;
}

/// Stand-in destination that logs what would be uploaded.
///
/// Deployments wire a real spreadsheet client here; the pipeline itself
/// does not care which.
#[derive(Debug, Clone, Default)]
pub struct LogExporter;

#[async_trait::async_trait]
impl SheetExporter for LogExporter {
    fn exporter_name(&self) -> &'static str {
        "log"
    }

    async fn upload(&self, title: &str, rows: Vec<Vec<String>>) -> Result<usize> {
        info!(title, rows = rows.len(), "export destination not configured, logging only");
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str) -> ExportRow {
        ExportRow {
            warehouse_name: name.to_string(),
            geo_name: Some("ЦФО".to_string()),
            box_delivery_base: Some(48.0),
            box_delivery_coef_expr: Some(1160.0),
            box_delivery_liter: Some(11.2),
            box_delivery_marketplace_base: Some(40.0),
            box_delivery_marketplace_coef_expr: Some(125.0),
            box_delivery_marketplace_liter: Some(8.0),
            box_storage_base: Some(0.14),
            box_storage_coef_expr: Some(115.0),
            box_storage_liter: None,
            dt_next_box: Some("2026-09-01".to_string()),
            dt_till_max: None,
        }
    }

    #[test]
    fn header_row_comes_first_and_matches_column_count() {
        let rows = build_rows(&[row("Moscow_1")]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], "warehouseName");
        assert_eq!(rows[0].len(), EXPORT_HEADER.len());
        assert_eq!(rows[1].len(), EXPORT_HEADER.len());
    }

    #[test]
    fn missing_values_render_as_dash() {
        let rows = build_rows(&[row("Moscow_1")]);
        let data = &rows[1];
        assert_eq!(data[10], "-", "NULL storage liter");
        assert_eq!(data[12], "-", "NULL dt_till_max");
        assert_eq!(data[11], "2026-09-01");
    }

    #[test]
    fn numbers_render_as_display_strings() {
        let rows = build_rows(&[row("Moscow_1")]);
        let data = &rows[1];
        assert_eq!(data[2], "48");
        assert_eq!(data[4], "11.2");
        assert_eq!(data[8], "0.14");
    }

    #[test]
    fn sheet_title_is_dated_and_bounded() {
        let day = NaiveDate::from_ymd_opt(2026, 8, 31).unwrap();
        let title = sheet_title(day);
        assert_eq!(title, "WB Tariffs 2026-08-31");
        assert!(title.len() <= 90);
    }

    #[test]
    fn empty_input_still_produces_header() {
        let rows = build_rows(&[]);
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn log_exporter_reports_row_count() {
        let rows = build_rows(&[row("Moscow_1"), row("Kazan_2")]);
        let n = LogExporter.upload("WB Tariffs 2026-08-31", rows).await.unwrap();
        assert_eq!(n, 3);
    }
}
