// EnrolSift - core/snapshot.rs
//
// Serialisable form of `FilterState` used by saved configurations.
//
// Design principles:
// - Instants are flattened to epoch milliseconds (or null), the format the
//   shared store has always used, so snapshots written by other clients load.
// - Every field defaults when missing: snapshots written before a facet
//   existed load with that facet inactive instead of failing.
// - Range structs are rebuilt field by field on load; an unset bound stays
//   unset rather than becoming the epoch.

use crate::core::date::DateRange;
use crate::core::filter::{normalise_month_code, FilterState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A `DateRange` with bounds as epoch milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSnapshot {
    #[serde(default)]
    pub from: Option<i64>,
    #[serde(default)]
    pub to: Option<i64>,
}

impl From<&DateRange> for RangeSnapshot {
    fn from(range: &DateRange) -> Self {
        Self {
            from: range.from.map(|d| d.timestamp_millis()),
            to: range.to.map(|d| d.timestamp_millis()),
        }
    }
}

impl RangeSnapshot {
    fn to_range(self) -> DateRange {
        DateRange::new(from_millis(self.from), from_millis(self.to))
    }
}

fn from_millis(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(DateTime::from_timestamp_millis)
}

/// Empty values never select anything, same as `FilterState::with_selection`.
fn non_blank(values: BTreeSet<String>) -> BTreeSet<String> {
    values.into_iter().filter(|v| !v.is_empty()).collect()
}

/// Persisted snapshot of a `FilterState`.
///
/// Key names match the JSON written into `savedFilterConfigs/.../filters`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterSnapshot {
    pub search_term: String,

    pub selected_courses: BTreeSet<String>,
    pub selected_work_items: BTreeSet<String>,
    pub selected_student_types: BTreeSet<String>,
    pub selected_active_statuses: BTreeSet<String>,
    pub selected_diploma_months: BTreeSet<String>,
    pub selected_status_values: BTreeSet<String>,
    pub selected_payment_statuses: BTreeSet<String>,
    pub selected_approved: BTreeSet<String>,
    pub selected_deleted: BTreeSet<String>,
    pub selected_dual_enrolment: BTreeSet<String>,
    pub selected_school_enrolment: BTreeSet<String>,
    pub selected_pasi_statuses: BTreeSet<String>,
    pub selected_pasi_work_items: BTreeSet<String>,
    pub selected_pasi_terms: BTreeSet<String>,

    pub has_grade_filter: bool,
    pub missing_grade_filter: bool,
    pub has_com1255_filter: bool,
    pub missing_com1255_filter: bool,
    pub has_inf2020_filter: bool,
    pub missing_inf2020_filter: bool,
    pub has_asn_filter: bool,
    pub missing_asn_filter: bool,

    pub start_date_range: RangeSnapshot,
    pub assignment_date_range: RangeSnapshot,
    pub resuming_on_date_range: RangeSnapshot,
    pub schedule_end_date_range: RangeSnapshot,

    pub selected_months: BTreeSet<String>,

    pub date_range_start: Option<i64>,
    pub date_range_end: Option<i64>,
}

impl From<&FilterState> for FilterSnapshot {
    fn from(s: &FilterState) -> Self {
        Self {
            search_term: s.search_term.clone(),
            selected_courses: s.selected_courses.clone(),
            selected_work_items: s.selected_work_items.clone(),
            selected_student_types: s.selected_student_types.clone(),
            selected_active_statuses: s.selected_active_statuses.clone(),
            selected_diploma_months: s.selected_diploma_months.clone(),
            selected_status_values: s.selected_status_values.clone(),
            selected_payment_statuses: s.selected_payment_statuses.clone(),
            selected_approved: s.selected_approved.clone(),
            selected_deleted: s.selected_deleted.clone(),
            selected_dual_enrolment: s.selected_dual_enrolment.clone(),
            selected_school_enrolment: s.selected_school_enrolment.clone(),
            selected_pasi_statuses: s.selected_pasi_statuses.clone(),
            selected_pasi_work_items: s.selected_pasi_work_items.clone(),
            selected_pasi_terms: s.selected_pasi_terms.clone(),
            has_grade_filter: s.has_grade,
            missing_grade_filter: s.missing_grade,
            has_com1255_filter: s.has_com1255,
            missing_com1255_filter: s.missing_com1255,
            has_inf2020_filter: s.has_inf2020,
            missing_inf2020_filter: s.missing_inf2020,
            has_asn_filter: s.has_asn,
            missing_asn_filter: s.missing_asn,
            start_date_range: RangeSnapshot::from(&s.start_date_range),
            assignment_date_range: RangeSnapshot::from(&s.assignment_date_range),
            resuming_on_date_range: RangeSnapshot::from(&s.resuming_on_date_range),
            schedule_end_date_range: RangeSnapshot::from(&s.schedule_end_date_range),
            selected_months: s.selected_months.clone(),
            date_range_start: s.date_range_start.map(|d| d.timestamp_millis()),
            date_range_end: s.date_range_end.map(|d| d.timestamp_millis()),
        }
    }
}

impl FilterSnapshot {
    /// Rebuild the filter state this snapshot was taken from.
    pub fn into_state(self) -> FilterState {
        FilterState {
            search_term: self.search_term,
            selected_courses: non_blank(self.selected_courses),
            selected_work_items: non_blank(self.selected_work_items),
            selected_student_types: non_blank(self.selected_student_types),
            selected_active_statuses: non_blank(self.selected_active_statuses),
            selected_diploma_months: non_blank(self.selected_diploma_months),
            selected_status_values: non_blank(self.selected_status_values),
            selected_payment_statuses: non_blank(self.selected_payment_statuses),
            selected_approved: non_blank(self.selected_approved),
            selected_deleted: non_blank(self.selected_deleted),
            selected_dual_enrolment: non_blank(self.selected_dual_enrolment),
            selected_school_enrolment: non_blank(self.selected_school_enrolment),
            selected_pasi_statuses: non_blank(self.selected_pasi_statuses),
            selected_pasi_work_items: non_blank(self.selected_pasi_work_items),
            selected_pasi_terms: non_blank(self.selected_pasi_terms),
            has_grade: self.has_grade_filter,
            missing_grade: self.missing_grade_filter,
            has_com1255: self.has_com1255_filter,
            missing_com1255: self.missing_com1255_filter,
            has_inf2020: self.has_inf2020_filter,
            missing_inf2020: self.missing_inf2020_filter,
            has_asn: self.has_asn_filter,
            missing_asn: self.missing_asn_filter,
            start_date_range: self.start_date_range.to_range(),
            assignment_date_range: self.assignment_date_range.to_range(),
            resuming_on_date_range: self.resuming_on_date_range.to_range(),
            schedule_end_date_range: self.schedule_end_date_range.to_range(),
            selected_months: self
                .selected_months
                .iter()
                .filter_map(|m| normalise_month_code(m))
                .collect(),
            date_range_start: from_millis(self.date_range_start),
            date_range_end: from_millis(self.date_range_end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filter::{
        apply_filters, Categorical, DateField, Facet, Presence, PresenceField,
    };
    use crate::core::model::Record;
    use chrono::TimeZone;

    fn sample_state() -> FilterState {
        FilterState::default()
            .with_search("smith")
            .with_selection(Categorical::Course, ["MATH30-1", "ELA30-1"])
            .with_selection(Categorical::PaymentStatus, ["paid"])
            .with_presence(PresenceField::Inf2020, Presence::Has)
            .with_presence(PresenceField::Grade, Presence::Missing)
            .with_date_range(
                DateField::ScheduleEndDate,
                DateRange::new(
                    None,
                    Some(Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap()),
                ),
            )
            .with_months(["09", "10"])
            .with_registration_range(DateRange::new(
                Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
                None,
            ))
    }

    #[test]
    fn test_snapshot_round_trip_through_json() {
        let state = sample_state();
        let json = serde_json::to_value(FilterSnapshot::from(&state)).unwrap();
        let back: FilterSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back.into_state(), state);
    }

    #[test]
    fn test_dates_flatten_to_epoch_millis_or_null() {
        let json = serde_json::to_value(FilterSnapshot::from(&sample_state())).unwrap();
        assert_eq!(json["scheduleEndDateRange"]["from"], serde_json::Value::Null);
        assert_eq!(json["scheduleEndDateRange"]["to"], 1_719_705_600_000_i64);
        assert_eq!(json["dateRangeStart"], 1_704_067_200_000_i64);
        assert_eq!(json["dateRangeEnd"], serde_json::Value::Null);
        assert_eq!(json["hasInf2020Filter"], true);
    }

    #[test]
    fn test_missing_facets_default_when_loading() {
        let snapshot: FilterSnapshot =
            serde_json::from_str(r#"{ "searchTerm": "lee", "selectedMonths": ["9"] }"#).unwrap();
        let state = snapshot.into_state();
        assert_eq!(state.search_term, "lee");
        assert_eq!(state.selected_months.iter().next().map(String::as_str), Some("09"));
        assert!(!state.has_grade);
        assert!(!state.start_date_range.is_active());
        assert_eq!(state.active_count(), 2);
    }

    #[test]
    fn test_partial_range_keeps_unset_bound() {
        let snapshot: FilterSnapshot =
            serde_json::from_str(r#"{ "startDateRange": { "to": 1704067200000 } }"#).unwrap();
        let state = snapshot.into_state();
        assert!(state.start_date_range.from.is_none());
        assert!(state.start_date_range.to.is_some());
    }

    #[test]
    fn test_empty_selection_values_are_dropped_on_load() {
        let snapshot: FilterSnapshot = serde_json::from_str(
            r#"{ "selectedCourses": [""], "selectedPaymentStatuses": ["", "paid"] }"#,
        )
        .unwrap();
        let state = snapshot.into_state();
        assert!(state.selected_courses.is_empty());
        assert!(!state.is_active(Facet::Categorical(Categorical::Course)));
        assert_eq!(state.selected_payment_statuses.len(), 1);
        assert_eq!(state.active_count(), 1);
    }

    #[test]
    fn test_far_future_upper_bound_filters_without_overflow() {
        let snapshot: FilterSnapshot =
            serde_json::from_str(r#"{ "startDateRange": { "to": 8210266876799999 } }"#).unwrap();
        let state = snapshot.into_state();
        assert!(state.start_date_range.to.is_some());

        let record: Record = serde_json::from_str(r#"{ "startDate": "2024-03-15" }"#).unwrap();
        let outcome = apply_filters(std::slice::from_ref(&record), &state);
        assert_eq!(outcome.indices, vec![0]);
    }
}
