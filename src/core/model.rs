// EnrolSift - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no platform
// dependencies.
//
// Records arrive from an external ingestion subsystem whose JSON is loosely
// typed: the same field may hold a string, a number, or a boolean, and date
// fields hold either epoch milliseconds or free-form strings. Everything is
// normalised at deserialisation time so the filter engine never has to guess.

use crate::util::constants::ABSENT_SENTINELS;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// =============================================================================
// Date values
// =============================================================================

/// A raw date as delivered by the record source.
///
/// Parsing into an instant happens in `core::date`; the raw form is kept so
/// that month extraction can take the `YYYY-MM-DD` fast path on strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DateValue {
    /// Milliseconds since the Unix epoch.
    EpochMillis(i64),

    /// Any textual representation (ISO date, RFC 3339, browser `Date` string...).
    Text(String),
}

impl From<&str> for DateValue {
    fn from(s: &str) -> Self {
        DateValue::Text(s.to_string())
    }
}

impl From<i64> for DateValue {
    fn from(ms: i64) -> Self {
        DateValue::EpochMillis(ms)
    }
}

// =============================================================================
// Record
// =============================================================================

/// One enrolment summary: a student in a course.
///
/// Field names follow the record source's JSON keys. Scalars are `None` when
/// the key is absent or `null`; sentinel placeholders such as `"-"` are kept
/// verbatim and interpreted by [`meaningful`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(default, deserialize_with = "scalar")]
    pub student_name: Option<String>,

    #[serde(default, deserialize_with = "scalar")]
    pub course_code: Option<String>,

    /// Alberta Student Number.
    #[serde(default, deserialize_with = "scalar")]
    pub asn: Option<String>,

    #[serde(default, deserialize_with = "scalar")]
    pub term: Option<String>,

    /// Provincial (PASI) status, e.g. "Completed", "Active".
    #[serde(default, deserialize_with = "scalar")]
    pub status: Option<String>,

    /// Grade. Commonly `"-"` or `"N/A"` when not yet awarded.
    #[serde(default, deserialize_with = "scalar")]
    pub value: Option<String>,

    #[serde(default, deserialize_with = "scalar")]
    pub work_items: Option<String>,

    #[serde(default, deserialize_with = "scalar")]
    pub approved: Option<String>,

    #[serde(default, deserialize_with = "scalar")]
    pub deleted: Option<String>,

    #[serde(default, deserialize_with = "scalar")]
    pub dual_enrolment: Option<String>,

    #[serde(default, deserialize_with = "scalar")]
    pub school_enrolment: Option<String>,

    #[serde(rename = "StudentType_Value", default, deserialize_with = "scalar")]
    pub student_type: Option<String>,

    #[serde(
        rename = "ActiveFutureArchived_Value",
        default,
        deserialize_with = "scalar"
    )]
    pub active_future_archived: Option<String>,

    #[serde(
        rename = "DiplomaMonthChoices_Value",
        default,
        deserialize_with = "scalar"
    )]
    pub diploma_month: Option<String>,

    #[serde(rename = "Status_Value", default, deserialize_with = "scalar")]
    pub status_value: Option<String>,

    #[serde(rename = "payment_status", default, deserialize_with = "scalar")]
    pub payment_status: Option<String>,

    #[serde(default, deserialize_with = "scalar")]
    pub pasi_term: Option<String>,

    #[serde(default, deserialize_with = "date")]
    pub start_date: Option<DateValue>,

    /// The only field consulted by the month facet.
    #[serde(default, deserialize_with = "date")]
    pub start_date_formatted: Option<DateValue>,

    #[serde(default, deserialize_with = "date")]
    pub assignment_date: Option<DateValue>,

    #[serde(default, deserialize_with = "date")]
    pub resuming_on_date: Option<DateValue>,

    #[serde(rename = "ScheduleEndDate", default, deserialize_with = "date")]
    pub schedule_end_date: Option<DateValue>,

    /// Named sub-course flags (e.g. `COM1255`, `INF2020`) attached by the
    /// provincial record system.
    #[serde(default)]
    pub pasi_records: Option<PasiRecords>,

    /// Additional provincial records for the same enrolment, in source order.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub multiple_records: Vec<SubRecord>,
}

impl Record {
    /// Look up a named sub-course flag.
    ///
    /// Returns the flag's textual form, or `None` when there is no
    /// `pasiRecords` map or the key is absent.
    pub fn sub_course_flag(&self, name: &str) -> Option<String> {
        self.pasi_records.as_ref().and_then(|p| p.flag(name))
    }

    /// Scalar fields consulted by free-text search, in a fixed order.
    pub fn searchable_fields(&self) -> impl Iterator<Item = &str> {
        [
            &self.student_name,
            &self.course_code,
            &self.asn,
            &self.status,
            &self.term,
            &self.pasi_term,
            &self.value,
            &self.work_items,
            &self.student_type,
            &self.status_value,
            &self.payment_status,
        ]
        .into_iter()
        .filter_map(|f| f.as_deref())
    }
}

/// A secondary provincial record attached to an enrolment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubRecord {
    #[serde(default, deserialize_with = "scalar")]
    pub term: Option<String>,

    #[serde(default, deserialize_with = "scalar")]
    pub status: Option<String>,

    #[serde(default, deserialize_with = "scalar")]
    pub exit_date: Option<String>,

    #[serde(default, deserialize_with = "scalar")]
    pub work_items: Option<String>,
}

impl SubRecord {
    /// The subset of searchable fields a sub-record carries.
    pub fn searchable_fields(&self) -> impl Iterator<Item = &str> {
        [&self.term, &self.status, &self.exit_date, &self.work_items]
            .into_iter()
            .filter_map(|f| f.as_deref())
    }
}

/// Map of named sub-course flags.
///
/// Values are stored raw: the source may use booleans, strings, or nested
/// summary objects for the same flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasiRecords(pub BTreeMap<String, Value>);

impl PasiRecords {
    /// Textual form of a flag, `None` if absent, `null`, or `false`.
    pub fn flag(&self, name: &str) -> Option<String> {
        match self.0.get(name)? {
            Value::Bool(false) => None,
            other => scalar_text(other),
        }
    }
}

// =============================================================================
// Presence helpers
// =============================================================================

/// Returns the value only if it is genuine data: present, not blank, and not
/// one of the source's placeholder sentinels.
pub fn meaningful(value: Option<&str>) -> Option<&str> {
    let v = value?;
    let trimmed = v.trim();
    if trimmed.is_empty() || ABSENT_SENTINELS.contains(&trimmed) {
        None
    } else {
        Some(v)
    }
}

/// Returns the value if it is present and non-empty. Sentinels are kept:
/// a categorical selection may legitimately contain `"-"`.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

// =============================================================================
// Loose JSON normalisation
// =============================================================================

/// Textual form of an arbitrary JSON scalar.
///
/// Numbers and booleans are stringified; empty objects/arrays count as absent
/// and non-empty ones as present (rendered as compact JSON).
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(a) if a.is_empty() => None,
        Value::Object(o) if o.is_empty() => None,
        other => Some(other.to_string()),
    }
}

fn scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_text(&value))
}

fn date<'de, D>(deserializer: D) -> Result<Option<DateValue>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .map(DateValue::EpochMillis),
        Value::String(s) => Some(DateValue::Text(s)),
        _ => None,
    })
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loose_scalars_are_normalised() {
        let json = r#"{
            "studentName": "Ada Smith",
            "asn": 123456789,
            "approved": true,
            "value": null,
            "StudentType_Value": "Non-Primary",
            "payment_status": "paid"
        }"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record.student_name.as_deref(), Some("Ada Smith"));
        assert_eq!(record.asn.as_deref(), Some("123456789"));
        assert_eq!(record.approved.as_deref(), Some("true"));
        assert_eq!(record.value, None);
        assert_eq!(record.student_type.as_deref(), Some("Non-Primary"));
        assert_eq!(record.payment_status.as_deref(), Some("paid"));
        assert!(record.multiple_records.is_empty());
    }

    #[test]
    fn test_dates_accept_numbers_and_strings() {
        let json = r#"{
            "startDate": 1726358400000,
            "startDateFormatted": "2024-09-15",
            "assignmentDate": 1726358400000.5,
            "resumingOnDate": false,
            "ScheduleEndDate": "Sun Sep 15 2024"
        }"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record.start_date, Some(DateValue::EpochMillis(1_726_358_400_000)));
        assert_eq!(record.start_date_formatted, Some(DateValue::from("2024-09-15")));
        assert_eq!(
            record.assignment_date,
            Some(DateValue::EpochMillis(1_726_358_400_000))
        );
        assert_eq!(record.resuming_on_date, None);
        assert_eq!(record.schedule_end_date, Some(DateValue::from("Sun Sep 15 2024")));
    }

    #[test]
    fn test_sub_records_and_flags() {
        let json = r#"{
            "pasiRecords": { "COM1255": { "grade": 80 }, "INF2020": null },
            "multipleRecords": [
                { "term": "Fall", "status": "Smith-reviewed", "exitDate": "2024-06-30", "workItems": "Warning" }
            ]
        }"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert!(record.sub_course_flag("COM1255").is_some());
        assert_eq!(record.sub_course_flag("INF2020"), None);
        assert_eq!(record.multiple_records.len(), 1);
        let fields: Vec<_> = record.multiple_records[0].searchable_fields().collect();
        assert_eq!(fields, vec!["Fall", "Smith-reviewed", "2024-06-30", "Warning"]);
    }

    #[test]
    fn test_null_multiple_records_is_empty() {
        let record: Record = serde_json::from_str(r#"{ "multipleRecords": null }"#).unwrap();
        assert!(record.multiple_records.is_empty());
    }

    #[test]
    fn test_meaningful_rejects_sentinels() {
        assert_eq!(meaningful(Some("87%")), Some("87%"));
        assert_eq!(meaningful(Some("-")), None);
        assert_eq!(meaningful(Some("N/A")), None);
        assert_eq!(meaningful(Some("  ")), None);
        assert_eq!(meaningful(None), None);
        assert_eq!(non_empty(Some("-")), Some("-"));
        assert_eq!(non_empty(Some("")), None);
    }
}
