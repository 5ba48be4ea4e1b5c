//! wbt-schema
//!
//! Payload types and validation for the warehouse box-tariff feed.
//!
//! This crate owns **only** the wire shape: the snapshot types, the
//! response-envelope unwrap, and the field-level validator. No HTTP, no
//! DB logic, and no numeric coercion belong here (coercion is a storage
//! concern and lives in wbt-db).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum number of payload characters kept in a [`ValidationError`]
/// preview. Enough to reproduce a failure without logging megabytes.
const PAYLOAD_PREVIEW_MAX: usize = 600;

/// The nine per-warehouse tariff fields, in feed order.
pub const TARIFF_FIELDS: [&str; 9] = [
    "boxDeliveryBase",
    "boxDeliveryCoefExpr",
    "boxDeliveryLiter",
    "boxDeliveryMarketplaceBase",
    "boxDeliveryMarketplaceCoefExpr",
    "boxDeliveryMarketplaceLiter",
    "boxStorageBase",
    "boxStorageCoefExpr",
    "boxStorageLiter",
];

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

/// One per-warehouse tariff record, exactly as the feed delivers it.
///
/// Tariff values stay as strings at this boundary: the feed renders them
/// with locale separators (`"1 234,5"`) or a bare `"-"`, and downstream
/// coercion decides what becomes a number and what becomes NULL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseTariff {
    pub warehouse_name: String,
    pub geo_name: String,
    pub box_delivery_base: String,
    pub box_delivery_coef_expr: String,
    pub box_delivery_liter: String,
    pub box_delivery_marketplace_base: String,
    pub box_delivery_marketplace_coef_expr: String,
    pub box_delivery_marketplace_liter: String,
    pub box_storage_base: String,
    pub box_storage_coef_expr: String,
    pub box_storage_liter: String,
}

/// One fetched-and-validated tariff payload for a given calendar date.
///
/// Ephemeral: produced once per fetch, consumed immediately by the
/// reconciliation engine, never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TariffSnapshot {
    pub dt_next_box: String,
    pub dt_till_max: String,
    pub warehouses: Vec<WarehouseTariff>,
}

// ---------------------------------------------------------------------------
// Validation error
// ---------------------------------------------------------------------------

/// A single field-level diagnostic, e.g. `warehouseList[3].warehouseName`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

/// Shape mismatch between the fetched payload and the expected tariff list.
///
/// Carries enough context to reproduce the failure offline: the request
/// URL, a truncated JSON preview of the offending payload, and one entry
/// per failed field. The whole snapshot is accepted or the whole call
/// fails; there is no partial acceptance.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub request_url: Option<String>,
    pub payload_preview: String,
    pub field_errors: Vec<FieldError>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tariff payload validation failed:")?;
        for fe in &self.field_errors {
            write!(f, " [{}: {}]", fe.path, fe.message)?;
        }
        if let Some(url) = &self.request_url {
            write!(f, " requestUrl={url}")?;
        }
        write!(f, " raw={}", self.payload_preview)
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Unwrap the `{"response": {"data": <payload>}}` envelope some gateway
/// deployments add. A payload without the envelope is returned as-is.
pub fn unwrap_envelope(raw: &Value) -> &Value {
    raw.get("response")
        .and_then(|r| r.get("data"))
        .unwrap_or(raw)
}

/// Validate a raw JSON payload into a [`TariffSnapshot`].
///
/// Accepts the enveloped and un-enveloped forms identically. Every
/// missing or mistyped field produces one [`FieldError`]; the result is
/// `Err` if any were recorded.
pub fn validate(raw: &Value, request_url: Option<&str>) -> Result<TariffSnapshot, ValidationError> {
    let payload = unwrap_envelope(raw);
    let mut errors: Vec<FieldError> = Vec::new();

    let dt_next_box = require_string(payload, "dtNextBox", "dtNextBox", &mut errors);
    let dt_till_max = require_string(payload, "dtTillMax", "dtTillMax", &mut errors);

    let mut warehouses: Vec<WarehouseTariff> = Vec::new();
    match payload.get("warehouseList") {
        Some(Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                if let Some(w) = validate_warehouse(item, i, &mut errors) {
                    warehouses.push(w);
                }
            }
        }
        Some(other) => errors.push(FieldError {
            path: "warehouseList".to_string(),
            message: format!("expected array, got {}", json_type_name(other)),
        }),
        None => errors.push(FieldError {
            path: "warehouseList".to_string(),
            message: "required field missing".to_string(),
        }),
    }

    // warehouseName must be unique within one snapshot.
    for (i, w) in warehouses.iter().enumerate() {
        if warehouses[..i].iter().any(|p| p.warehouse_name == w.warehouse_name) {
            errors.push(FieldError {
                path: format!("warehouseList[{i}].warehouseName"),
                message: format!("duplicate warehouse name '{}'", w.warehouse_name),
            });
        }
    }

    if !errors.is_empty() {
        return Err(ValidationError {
            request_url: request_url.map(str::to_string),
            payload_preview: payload_preview(raw),
            field_errors: errors,
        });
    }

    Ok(TariffSnapshot {
        // errors is empty here, so both lookups succeeded.
        dt_next_box: dt_next_box.unwrap_or_default(),
        dt_till_max: dt_till_max.unwrap_or_default(),
        warehouses,
    })
}

fn validate_warehouse(
    item: &Value,
    index: usize,
    errors: &mut Vec<FieldError>,
) -> Option<WarehouseTariff> {
    if !item.is_object() {
        errors.push(FieldError {
            path: format!("warehouseList[{index}]"),
            message: format!("expected object, got {}", json_type_name(item)),
        });
        return None;
    }

    let before = errors.len();
    let path = |field: &str| format!("warehouseList[{index}].{field}");

    let warehouse_name = require_string(item, "warehouseName", &path("warehouseName"), errors);
    if let Some(name) = &warehouse_name {
        if name.trim().is_empty() {
            errors.push(FieldError {
                path: path("warehouseName"),
                message: "must be non-empty".to_string(),
            });
        }
    }
    let geo_name = require_string(item, "geoName", &path("geoName"), errors);

    let mut tariffs: Vec<String> = Vec::with_capacity(TARIFF_FIELDS.len());
    for field in TARIFF_FIELDS {
        if let Some(v) = require_string(item, field, &path(field), errors) {
            tariffs.push(v);
        }
    }

    if errors.len() > before {
        return None;
    }

    let mut it = tariffs.into_iter();
    Some(WarehouseTariff {
        warehouse_name: warehouse_name?,
        geo_name: geo_name?,
        box_delivery_base: it.next()?,
        box_delivery_coef_expr: it.next()?,
        box_delivery_liter: it.next()?,
        box_delivery_marketplace_base: it.next()?,
        box_delivery_marketplace_coef_expr: it.next()?,
        box_delivery_marketplace_liter: it.next()?,
        box_storage_base: it.next()?,
        box_storage_coef_expr: it.next()?,
        box_storage_liter: it.next()?,
    })
}

fn require_string(
    obj: &Value,
    key: &str,
    path: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match obj.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            errors.push(FieldError {
                path: path.to_string(),
                message: format!("expected string, got {}", json_type_name(other)),
            });
            None
        }
        None => {
            errors.push(FieldError {
                path: path.to_string(),
                message: "required field missing".to_string(),
            });
            None
        }
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn payload_preview(raw: &Value) -> String {
    let s = raw.to_string();
    if s.len() <= PAYLOAD_PREVIEW_MAX {
        return s;
    }
    let mut cut = PAYLOAD_PREVIEW_MAX;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &s[..cut])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn warehouse_json(name: &str) -> Value {
        json!({
            "warehouseName": name,
            "geoName": "Центральный федеральный округ",
            "boxDeliveryBase": "48",
            "boxDeliveryCoefExpr": "160",
            "boxDeliveryLiter": "11,2",
            "boxDeliveryMarketplaceBase": "40",
            "boxDeliveryMarketplaceCoefExpr": "125",
            "boxDeliveryMarketplaceLiter": "8",
            "boxStorageBase": "0,14",
            "boxStorageCoefExpr": "115",
            "boxStorageLiter": "0,07",
        })
    }

    fn payload_json() -> Value {
        json!({
            "dtNextBox": "2026-09-01",
            "dtTillMax": "2026-12-31",
            "warehouseList": [warehouse_json("Moscow_1"), warehouse_json("Kazan_2")],
        })
    }

    #[test]
    fn accepts_valid_payload() {
        let snap = validate(&payload_json(), None).unwrap();
        assert_eq!(snap.dt_next_box, "2026-09-01");
        assert_eq!(snap.warehouses.len(), 2);
        assert_eq!(snap.warehouses[0].warehouse_name, "Moscow_1");
        assert_eq!(snap.warehouses[1].box_storage_liter, "0,07");
    }

    #[test]
    fn wrapped_envelope_accepted_identically_to_raw() {
        let raw = payload_json();
        let wrapped = json!({ "response": { "data": raw.clone() } });
        assert_eq!(validate(&raw, None).unwrap(), validate(&wrapped, None).unwrap());
    }

    #[test]
    fn missing_warehouse_list_is_rejected() {
        let payload = json!({ "dtNextBox": "a", "dtTillMax": "b" });
        let err = validate(&payload, Some("https://example.test/tariffs")).unwrap_err();
        assert!(err.field_errors.iter().any(|f| f.path == "warehouseList"));
        assert_eq!(err.request_url.as_deref(), Some("https://example.test/tariffs"));
    }

    #[test]
    fn missing_warehouse_name_is_rejected() {
        let mut payload = payload_json();
        payload["warehouseList"][1]
            .as_object_mut()
            .unwrap()
            .remove("warehouseName");
        let err = validate(&payload, None).unwrap_err();
        assert!(err
            .field_errors
            .iter()
            .any(|f| f.path == "warehouseList[1].warehouseName"));
    }

    #[test]
    fn empty_warehouse_name_is_rejected() {
        let mut payload = payload_json();
        payload["warehouseList"][0]["warehouseName"] = json!("  ");
        let err = validate(&payload, None).unwrap_err();
        assert!(err.field_errors[0].message.contains("non-empty"));
    }

    #[test]
    fn mistyped_tariff_field_is_rejected_with_path() {
        let mut payload = payload_json();
        payload["warehouseList"][0]["boxStorageBase"] = json!(0.14);
        let err = validate(&payload, None).unwrap_err();
        let fe = &err.field_errors[0];
        assert_eq!(fe.path, "warehouseList[0].boxStorageBase");
        assert!(fe.message.contains("expected string"));
    }

    #[test]
    fn duplicate_warehouse_name_is_rejected() {
        let payload = json!({
            "dtNextBox": "a",
            "dtTillMax": "b",
            "warehouseList": [warehouse_json("Moscow_1"), warehouse_json("Moscow_1")],
        });
        let err = validate(&payload, None).unwrap_err();
        assert!(err.field_errors[0].message.contains("duplicate"));
    }

    #[test]
    fn no_partial_acceptance_on_single_bad_entry() {
        let mut payload = payload_json();
        payload["warehouseList"][1]["geoName"] = json!(null);
        assert!(validate(&payload, None).is_err());
    }

    #[test]
    fn error_display_carries_preview_and_url() {
        let payload = json!({ "unexpected": true });
        let err = validate(&payload, Some("https://example.test/t")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("requestUrl=https://example.test/t"));
        assert!(msg.contains("unexpected"));
    }

    #[test]
    fn oversized_payload_preview_is_truncated() {
        let big = json!({ "filler": "x".repeat(5000) });
        let err = validate(&big, None).unwrap_err();
        assert!(err.payload_preview.len() < 700);
        assert!(err.payload_preview.ends_with('…'));
    }
}
