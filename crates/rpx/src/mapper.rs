//! 🔄 The Field Mapper: raw survey payload in, normalized record out.
//!
//! 🎬 COLD OPEN: INT. TRANSLATION BOOTH, 2:47 AM
//!
//! On the left screen: `{"GP": "87%", "QID9_TEXT": "Ruby Lee", ...}`.
//! On the right screen: a report frontend that wants `growthMindsetPercentile=87`.
//! In between: this module. Pure functions. No I/O. No feelings. Just tables.
//!
//! 🧠 Knowledge graph:
//! - [`RawSurveyResponse`]: the untyped `values` + `labels` maps pulled out of the
//!   survey platform's response body. Missing `result.values` is the ONLY
//!   structural error ([`MappingError::MissingPayload`]).
//! - [`map_response`]: total over the six variants. A missing individual field
//!   degrades to [`MISSING_FIELD_PLACEHOLDER`], never aborts the record.
//! - [`strip_percent`]: idempotent trailing-`%` removal.
//! - Schemas live in `mapper/schemas.rs` as static tables.

mod schemas;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, trace};

use crate::common::{Locale, ReportVariant, SurveyResponseRecord};
use schemas::{FieldKind, ProviderSpec, Source, schema_for};

/// 🕳️ What a field becomes when the survey never answered it.
pub const MISSING_FIELD_PLACEHOLDER: &str = "N/A";

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("💀 survey response body has no `result.values` object; there is nothing to map")]
    MissingPayload,
}

/// 📦 The survey platform's answer, reduced to two string-keyed maps.
#[derive(Debug, Clone, Default)]
pub struct RawSurveyResponse {
    pub values: Map<String, Value>,
    pub labels: Map<String, Value>,
}

impl RawSurveyResponse {
    /// 🔍 Digs `result.values` (required) and `result.labels` (optional) out of a
    /// response body.
    pub fn from_body(body: &Value) -> Result<Self, MappingError> {
        let result = body.get("result").ok_or(MappingError::MissingPayload)?;
        let values = result
            .get("values")
            .and_then(Value::as_object)
            .cloned()
            .ok_or(MappingError::MissingPayload)?;
        let labels = result
            .get("labels")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Ok(Self { values, labels })
    }

    fn read(&self, source: Source) -> Option<String> {
        let (map, key) = match source {
            Source::Value(key) => (&self.values, key),
            Source::Label(key) => (&self.labels, key),
        };
        map.get(key).and_then(value_to_string)
    }
}

/// ✂️ Removes trailing `%` signs (and whitespace). Running it twice changes
/// nothing the first run didn't. Running it on `"42"` returns `"42"`.
pub fn strip_percent(value: &str) -> String {
    value.trim().trim_end_matches('%').trim_end().to_string()
}

/// 🔧 Renders a JSON value the way the report frontend wants to see it.
/// Strings pass through, numbers print, arrays join with `,`, the rest is absent.
fn value_to_string(value: &Value) -> Option<String> {
    let rendered = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(value_to_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Null | Value::Object(_) => return None,
    };
    if rendered.is_empty() {
        None
    } else {
        Some(rendered)
    }
}

/// 📋 Splits a list-valued field into trimmed, non-empty entries.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// 🚩 Pure membership test over a normalized list. Case-insensitive.
pub fn list_contains(list: &[String], needle: &str) -> bool {
    list.iter().any(|entry| entry.eq_ignore_ascii_case(needle))
}

/// 🚀 Maps a fetched response body onto the variant's schema.
pub fn map_response(
    variant: ReportVariant,
    response_id: &str,
    body: &Value,
) -> Result<SurveyResponseRecord, MappingError> {
    let raw = RawSurveyResponse::from_body(body)?;
    Ok(map_raw(variant, response_id, &raw))
}

/// 🗺️ The total half of the mapper: any raw response, any variant, one record.
pub fn map_raw(
    variant: ReportVariant,
    response_id: &str,
    raw: &RawSurveyResponse,
) -> SurveyResponseRecord {
    let schema = schema_for(variant);
    let mut missing = Vec::new();

    let subject_name = raw.read(schema.subject_name).unwrap_or_else(|| {
        missing.push("subject_name");
        MISSING_FIELD_PLACEHOLDER.to_string()
    });
    let recorded_date = raw.read(schema.recorded_date).unwrap_or_else(|| {
        missing.push("recordedDate");
        MISSING_FIELD_PLACEHOLDER.to_string()
    });
    let email = raw.read(schema.email);

    let providers = match schema.providers {
        ProviderSpec::None => Vec::new(),
        ProviderSpec::Single(source) => raw.read(source).into_iter().collect(),
        ProviderSpec::Multi(source) => raw
            .read(source)
            .map(|names| split_list(&names))
            .unwrap_or_default(),
    };

    let locale = schema.language.map(|source| {
        raw.read(source)
            .map(|code| Locale::from_language_code(&code))
            .unwrap_or_default()
    });

    let mut params = Vec::with_capacity(schema.fields.len() + schema.flags.len());
    for field in schema.fields {
        let value = match raw.read(field.source) {
            Some(found) => match field.kind {
                FieldKind::Percentile => strip_percent(&found),
                FieldKind::Text | FieldKind::Score => found,
            },
            None => {
                missing.push(field.param);
                MISSING_FIELD_PLACEHOLDER.to_string()
            }
        };
        params.push((field.param, value));
    }
    for flag in schema.flags {
        let the_list = raw
            .read(flag.source)
            .map(|raw_list| split_list(&raw_list))
            .unwrap_or_default();
        params.push((flag.param, list_contains(&the_list, flag.needle).to_string()));
    }

    if !missing.is_empty() {
        // ⚠️ degraded, not dead. The report will show N/A where the data should be.
        debug!(
            "🕳️ {} response {} is missing {} field(s), placeholders inserted: {:?}",
            variant,
            response_id,
            missing.len(),
            missing
        );
    }
    trace!("🗺️ mapped {} response {} into {} params", variant, response_id, params.len());

    SurveyResponseRecord {
        variant,
        response_id: response_id.to_string(),
        subject_name,
        email,
        recorded_date,
        providers,
        locale,
        params,
    }
}
