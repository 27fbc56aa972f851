// EnrolSift - core/filter.rs
//
// Composable filter engine for enrolment records.
// All active facets are AND-combined.
// Core layer: pure logic, no I/O.
//
// A facet is "active" when it is not in its default/empty state. The same
// `FilterState::is_active` predicate gates inclusion during filtering and
// drives the active-facet count, so a UI badge can never disagree with the
// result set.

use crate::core::date::{self, DateRange};
use crate::core::model::{meaningful, non_empty, DateValue, Record};
use crate::util::constants::{MONTH_CODES, SUB_COURSE_COM1255, SUB_COURSE_INF2020};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fmt;

// =============================================================================
// Facet identifiers
// =============================================================================

/// Multi-select categorical facets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Categorical {
    Course,
    WorkItems,
    StudentType,
    ActiveStatus,
    DiplomaMonth,
    StatusValue,
    PaymentStatus,
    Approved,
    Deleted,
    DualEnrolment,
    SchoolEnrolment,
    PasiStatus,
    PasiWorkItems,
    PasiTerm,
}

impl Categorical {
    /// All categorical facets in display order.
    pub fn all() -> &'static [Categorical] {
        &[
            Categorical::Course,
            Categorical::WorkItems,
            Categorical::StudentType,
            Categorical::ActiveStatus,
            Categorical::DiplomaMonth,
            Categorical::StatusValue,
            Categorical::PaymentStatus,
            Categorical::Approved,
            Categorical::Deleted,
            Categorical::DualEnrolment,
            Categorical::SchoolEnrolment,
            Categorical::PasiStatus,
            Categorical::PasiWorkItems,
            Categorical::PasiTerm,
        ]
    }

    /// Human-readable label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Categorical::Course => "Course",
            Categorical::WorkItems => "Work items",
            Categorical::StudentType => "Student type",
            Categorical::ActiveStatus => "Active status",
            Categorical::DiplomaMonth => "Diploma month",
            Categorical::StatusValue => "Status",
            Categorical::PaymentStatus => "Payment status",
            Categorical::Approved => "Approved",
            Categorical::Deleted => "Deleted",
            Categorical::DualEnrolment => "Dual enrolment",
            Categorical::SchoolEnrolment => "School enrolment",
            Categorical::PasiStatus => "PASI status",
            Categorical::PasiWorkItems => "PASI work items",
            Categorical::PasiTerm => "PASI term",
        }
    }

    /// The record's non-empty values for this facet.
    ///
    /// Every facet reads one scalar except `PasiWorkItems`, which reads the
    /// work items of each sub-record and falls back to the record's own
    /// `workItems` when there are no sub-records.
    pub fn record_values<'a>(&self, record: &'a Record) -> Vec<&'a str> {
        let scalar = match self {
            Categorical::Course => record.course_code.as_deref(),
            Categorical::WorkItems => record.work_items.as_deref(),
            Categorical::StudentType => record.student_type.as_deref(),
            Categorical::ActiveStatus => record.active_future_archived.as_deref(),
            Categorical::DiplomaMonth => record.diploma_month.as_deref(),
            Categorical::StatusValue => record.status_value.as_deref(),
            Categorical::PaymentStatus => record.payment_status.as_deref(),
            Categorical::Approved => record.approved.as_deref(),
            Categorical::Deleted => record.deleted.as_deref(),
            Categorical::DualEnrolment => record.dual_enrolment.as_deref(),
            Categorical::SchoolEnrolment => record.school_enrolment.as_deref(),
            Categorical::PasiStatus => record.status.as_deref(),
            Categorical::PasiTerm => record.pasi_term.as_deref(),
            Categorical::PasiWorkItems => {
                if record.multiple_records.is_empty() {
                    record.work_items.as_deref()
                } else {
                    return record
                        .multiple_records
                        .iter()
                        .filter_map(|sub| non_empty(sub.work_items.as_deref()))
                        .collect();
                }
            }
        };
        non_empty(scalar).into_iter().collect()
    }
}

/// Fields covered by a has/missing flag pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PresenceField {
    /// The record's grade (`value`).
    Grade,
    /// The `COM1255` sub-course flag.
    Com1255,
    /// The `INF2020` sub-course flag.
    Inf2020,
    /// The Alberta Student Number.
    Asn,
}

impl PresenceField {
    pub fn all() -> &'static [PresenceField] {
        &[
            PresenceField::Grade,
            PresenceField::Com1255,
            PresenceField::Inf2020,
            PresenceField::Asn,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            PresenceField::Grade => "Grade",
            PresenceField::Com1255 => SUB_COURSE_COM1255,
            PresenceField::Inf2020 => SUB_COURSE_INF2020,
            PresenceField::Asn => "ASN",
        }
    }

    /// True when the record carries genuine data (not a sentinel) for this field.
    pub fn is_present(&self, record: &Record) -> bool {
        match self {
            PresenceField::Grade => meaningful(record.value.as_deref()).is_some(),
            PresenceField::Asn => meaningful(record.asn.as_deref()).is_some(),
            PresenceField::Com1255 => {
                meaningful(record.sub_course_flag(SUB_COURSE_COM1255).as_deref()).is_some()
            }
            PresenceField::Inf2020 => {
                meaningful(record.sub_course_flag(SUB_COURSE_INF2020).as_deref()).is_some()
            }
        }
    }
}

/// Which half of a has/missing pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PresenceMode {
    Has,
    Missing,
}

/// Tri-state view over a has/missing flag pair.
///
/// The pair is stored as two independent booleans; setting both yields a
/// filter that matches nothing, reported here as `Contradictory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Presence {
    #[default]
    Any,
    Has,
    Missing,
    Contradictory,
}

/// Record date fields that carry their own range facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DateField {
    StartDate,
    AssignmentDate,
    ResumingOnDate,
    ScheduleEndDate,
}

impl DateField {
    pub fn all() -> &'static [DateField] {
        &[
            DateField::StartDate,
            DateField::AssignmentDate,
            DateField::ResumingOnDate,
            DateField::ScheduleEndDate,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            DateField::StartDate => "Start date",
            DateField::AssignmentDate => "Assignment date",
            DateField::ResumingOnDate => "Resuming on",
            DateField::ScheduleEndDate => "Schedule end",
        }
    }

    pub fn value<'a>(&self, record: &'a Record) -> Option<&'a DateValue> {
        match self {
            DateField::StartDate => record.start_date.as_ref(),
            DateField::AssignmentDate => record.assignment_date.as_ref(),
            DateField::ResumingOnDate => record.resuming_on_date.as_ref(),
            DateField::ScheduleEndDate => record.schedule_end_date.as_ref(),
        }
    }
}

/// One independently toggle-able filter dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Facet {
    Search,
    Categorical(Categorical),
    Presence(PresenceField, PresenceMode),
    DateRange(DateField),
    Months,
    Registration,
}

impl Facet {
    /// Every facet, in display order.
    pub fn all() -> Vec<Facet> {
        let mut facets = vec![Facet::Search];
        facets.extend(Categorical::all().iter().map(|c| Facet::Categorical(*c)));
        for field in PresenceField::all() {
            facets.push(Facet::Presence(*field, PresenceMode::Has));
            facets.push(Facet::Presence(*field, PresenceMode::Missing));
        }
        facets.extend(DateField::all().iter().map(|d| Facet::DateRange(*d)));
        facets.push(Facet::Months);
        facets.push(Facet::Registration);
        facets
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Facet::Search => f.write_str("Search"),
            Facet::Categorical(c) => f.write_str(c.label()),
            Facet::Presence(field, PresenceMode::Has) => write!(f, "Has {}", field.label()),
            Facet::Presence(field, PresenceMode::Missing) => {
                write!(f, "Missing {}", field.label())
            }
            Facet::DateRange(d) => f.write_str(d.label()),
            Facet::Months => f.write_str("Start month"),
            Facet::Registration => f.write_str("Registration date"),
        }
    }
}

// =============================================================================
// FilterState
// =============================================================================

/// Complete filter state. All active facets are AND-combined when applied.
///
/// Treated as an immutable value: the `with_*` methods consume the state and
/// return the changed copy, so every user action yields a new value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    /// Free-text search (case-insensitive substring). Blank = no filter.
    pub search_term: String,

    /// Selected values per categorical facet (empty = all).
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

    /// Has/missing flag pairs. Each flag is an independent facet.
    pub has_grade: bool,
    pub missing_grade: bool,
    pub has_com1255: bool,
    pub missing_com1255: bool,
    pub has_inf2020: bool,
    pub missing_inf2020: bool,
    pub has_asn: bool,
    pub missing_asn: bool,

    /// Per-field date ranges.
    pub start_date_range: DateRange,
    pub assignment_date_range: DateRange,
    pub resuming_on_date_range: DateRange,
    pub schedule_end_date_range: DateRange,

    /// Two-digit month codes matched against `startDateFormatted`.
    pub selected_months: BTreeSet<String>,

    /// Registration date bounds. None = unbounded on that side.
    pub date_range_start: Option<DateTime<Utc>>,
    pub date_range_end: Option<DateTime<Utc>>,
}

impl FilterState {
    /// Returns true if no facet is active.
    pub fn is_empty(&self) -> bool {
        self.active_count() == 0
    }

    /// The shared "is active" predicate for every facet.
    pub fn is_active(&self, facet: Facet) -> bool {
        match facet {
            Facet::Search => !self.search_term.trim().is_empty(),
            Facet::Categorical(c) => !self.selection(c).is_empty(),
            Facet::Presence(field, mode) => self.flag(field, mode),
            Facet::DateRange(d) => self.date_range(d).is_active(),
            Facet::Months => !self.selected_months.is_empty(),
            Facet::Registration => self.registration_range().is_active(),
        }
    }

    /// Active facets in display order.
    pub fn active_facets(&self) -> Vec<Facet> {
        Facet::all()
            .into_iter()
            .filter(|f| self.is_active(*f))
            .collect()
    }

    /// Number of active facets.
    pub fn active_count(&self) -> usize {
        Facet::all().into_iter().filter(|f| self.is_active(*f)).count()
    }

    pub fn selection(&self, facet: Categorical) -> &BTreeSet<String> {
        match facet {
            Categorical::Course => &self.selected_courses,
            Categorical::WorkItems => &self.selected_work_items,
            Categorical::StudentType => &self.selected_student_types,
            Categorical::ActiveStatus => &self.selected_active_statuses,
            Categorical::DiplomaMonth => &self.selected_diploma_months,
            Categorical::StatusValue => &self.selected_status_values,
            Categorical::PaymentStatus => &self.selected_payment_statuses,
            Categorical::Approved => &self.selected_approved,
            Categorical::Deleted => &self.selected_deleted,
            Categorical::DualEnrolment => &self.selected_dual_enrolment,
            Categorical::SchoolEnrolment => &self.selected_school_enrolment,
            Categorical::PasiStatus => &self.selected_pasi_statuses,
            Categorical::PasiWorkItems => &self.selected_pasi_work_items,
            Categorical::PasiTerm => &self.selected_pasi_terms,
        }
    }

    fn selection_mut(&mut self, facet: Categorical) -> &mut BTreeSet<String> {
        match facet {
            Categorical::Course => &mut self.selected_courses,
            Categorical::WorkItems => &mut self.selected_work_items,
            Categorical::StudentType => &mut self.selected_student_types,
            Categorical::ActiveStatus => &mut self.selected_active_statuses,
            Categorical::DiplomaMonth => &mut self.selected_diploma_months,
            Categorical::StatusValue => &mut self.selected_status_values,
            Categorical::PaymentStatus => &mut self.selected_payment_statuses,
            Categorical::Approved => &mut self.selected_approved,
            Categorical::Deleted => &mut self.selected_deleted,
            Categorical::DualEnrolment => &mut self.selected_dual_enrolment,
            Categorical::SchoolEnrolment => &mut self.selected_school_enrolment,
            Categorical::PasiStatus => &mut self.selected_pasi_statuses,
            Categorical::PasiWorkItems => &mut self.selected_pasi_work_items,
            Categorical::PasiTerm => &mut self.selected_pasi_terms,
        }
    }

    pub fn flag(&self, field: PresenceField, mode: PresenceMode) -> bool {
        match (field, mode) {
            (PresenceField::Grade, PresenceMode::Has) => self.has_grade,
            (PresenceField::Grade, PresenceMode::Missing) => self.missing_grade,
            (PresenceField::Com1255, PresenceMode::Has) => self.has_com1255,
            (PresenceField::Com1255, PresenceMode::Missing) => self.missing_com1255,
            (PresenceField::Inf2020, PresenceMode::Has) => self.has_inf2020,
            (PresenceField::Inf2020, PresenceMode::Missing) => self.missing_inf2020,
            (PresenceField::Asn, PresenceMode::Has) => self.has_asn,
            (PresenceField::Asn, PresenceMode::Missing) => self.missing_asn,
        }
    }

    fn flag_mut(&mut self, field: PresenceField, mode: PresenceMode) -> &mut bool {
        match (field, mode) {
            (PresenceField::Grade, PresenceMode::Has) => &mut self.has_grade,
            (PresenceField::Grade, PresenceMode::Missing) => &mut self.missing_grade,
            (PresenceField::Com1255, PresenceMode::Has) => &mut self.has_com1255,
            (PresenceField::Com1255, PresenceMode::Missing) => &mut self.missing_com1255,
            (PresenceField::Inf2020, PresenceMode::Has) => &mut self.has_inf2020,
            (PresenceField::Inf2020, PresenceMode::Missing) => &mut self.missing_inf2020,
            (PresenceField::Asn, PresenceMode::Has) => &mut self.has_asn,
            (PresenceField::Asn, PresenceMode::Missing) => &mut self.missing_asn,
        }
    }

    /// Tri-state view of a has/missing pair.
    pub fn presence(&self, field: PresenceField) -> Presence {
        match (
            self.flag(field, PresenceMode::Has),
            self.flag(field, PresenceMode::Missing),
        ) {
            (false, false) => Presence::Any,
            (true, false) => Presence::Has,
            (false, true) => Presence::Missing,
            (true, true) => Presence::Contradictory,
        }
    }

    pub fn date_range(&self, field: DateField) -> &DateRange {
        match field {
            DateField::StartDate => &self.start_date_range,
            DateField::AssignmentDate => &self.assignment_date_range,
            DateField::ResumingOnDate => &self.resuming_on_date_range,
            DateField::ScheduleEndDate => &self.schedule_end_date_range,
        }
    }

    fn date_range_mut(&mut self, field: DateField) -> &mut DateRange {
        match field {
            DateField::StartDate => &mut self.start_date_range,
            DateField::AssignmentDate => &mut self.assignment_date_range,
            DateField::ResumingOnDate => &mut self.resuming_on_date_range,
            DateField::ScheduleEndDate => &mut self.schedule_end_date_range,
        }
    }

    /// The registration bounds as a range.
    pub fn registration_range(&self) -> DateRange {
        DateRange::new(self.date_range_start, self.date_range_end)
    }

    // -------------------------------------------------------------------------
    // Value-producing updates
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search_term = term.into();
        self
    }

    /// Replace a categorical selection. Empty strings are dropped.
    #[must_use]
    pub fn with_selection<I, S>(mut self, facet: Categorical, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.selection_mut(facet) = values
            .into_iter()
            .map(Into::into)
            .filter(|v: &String| !v.is_empty())
            .collect();
        self
    }

    /// Add the value to a selection, or remove it if already selected.
    #[must_use]
    pub fn with_toggled(mut self, facet: Categorical, value: &str) -> Self {
        let set = self.selection_mut(facet);
        if !set.remove(value) && !value.is_empty() {
            set.insert(value.to_string());
        }
        self
    }

    #[must_use]
    pub fn with_flag(mut self, field: PresenceField, mode: PresenceMode, on: bool) -> Self {
        *self.flag_mut(field, mode) = on;
        self
    }

    /// Set a has/missing pair from its tri-state view.
    ///
    /// `Contradictory` sets both flags, reproducing the match-nothing state.
    #[must_use]
    pub fn with_presence(self, field: PresenceField, presence: Presence) -> Self {
        let (has, missing) = match presence {
            Presence::Any => (false, false),
            Presence::Has => (true, false),
            Presence::Missing => (false, true),
            Presence::Contradictory => (true, true),
        };
        self.with_flag(field, PresenceMode::Has, has)
            .with_flag(field, PresenceMode::Missing, missing)
    }

    #[must_use]
    pub fn with_date_range(mut self, field: DateField, range: DateRange) -> Self {
        *self.date_range_mut(field) = range;
        self
    }

    /// Replace the selected months. Codes are normalised to two digits
    /// (`"9"` becomes `"09"`); anything that is not a month is dropped.
    #[must_use]
    pub fn with_months<I, S>(mut self, months: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.selected_months = months
            .into_iter()
            .filter_map(|m| normalise_month_code(m.as_ref()))
            .collect();
        self
    }

    #[must_use]
    pub fn with_registration_range(mut self, range: DateRange) -> Self {
        self.date_range_start = range.from;
        self.date_range_end = range.to;
        self
    }

    /// Reset a single facet to its default (inactive) state.
    #[must_use]
    pub fn cleared(mut self, facet: Facet) -> Self {
        match facet {
            Facet::Search => self.search_term.clear(),
            Facet::Categorical(c) => self.selection_mut(c).clear(),
            Facet::Presence(field, mode) => *self.flag_mut(field, mode) = false,
            Facet::DateRange(d) => *self.date_range_mut(d) = DateRange::default(),
            Facet::Months => self.selected_months.clear(),
            Facet::Registration => {
                self.date_range_start = None;
                self.date_range_end = None;
            }
        }
        self
    }

    /// Quick filter: graded-work review queue (active students without a grade).
    pub fn awaiting_grade() -> Self {
        Self::default()
            .with_selection(Categorical::ActiveStatus, ["Active"])
            .with_presence(PresenceField::Grade, Presence::Missing)
    }
}

/// Normalise a month code to `"01"`..`"12"`.
pub fn normalise_month_code(code: &str) -> Option<String> {
    let n: u32 = code.trim().parse().ok()?;
    let normalised = format!("{n:02}");
    MONTH_CODES
        .contains(&normalised.as_str())
        .then_some(normalised)
}

// =============================================================================
// Applying filters
// =============================================================================

/// Result of one filter pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    /// Indices of matching records in the input slice, in input order.
    pub indices: Vec<usize>,

    /// Number of active facets.
    pub active_count: usize,

    /// The active facets, in display order.
    pub active_facets: Vec<Facet>,
}

impl FilterOutcome {
    /// The matching records.
    pub fn select<'a>(&self, records: &'a [Record]) -> Vec<&'a Record> {
        self.indices.iter().filter_map(|&i| records.get(i)).collect()
    }

    pub fn is_facet_active(&self, facet: Facet) -> bool {
        self.active_facets.contains(&facet)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Apply filters to a slice of records.
///
/// Returns indices into the original slice rather than copies, so the caller
/// keeps one owned record collection and any number of views over it.
pub fn apply_filters(records: &[Record], filter: &FilterState) -> FilterOutcome {
    let active_facets = filter.active_facets();
    let active_count = active_facets.len();

    if active_facets.is_empty() {
        return FilterOutcome {
            indices: (0..records.len()).collect(),
            active_count,
            active_facets,
        };
    }

    let search_lower = filter.search_term.trim().to_lowercase();

    let indices = records
        .iter()
        .enumerate()
        .filter(|(_, record)| {
            active_facets
                .iter()
                .all(|facet| facet_matches(record, filter, *facet, &search_lower))
        })
        .map(|(idx, _)| idx)
        .collect::<Vec<_>>();

    tracing::debug!(
        total = records.len(),
        matched = indices.len(),
        active = active_count,
        "Filters applied"
    );

    FilterOutcome {
        indices,
        active_count,
        active_facets,
    }
}

/// Check a single record against one facet. The facet is assumed active.
fn facet_matches(record: &Record, filter: &FilterState, facet: Facet, search_lower: &str) -> bool {
    match facet {
        Facet::Search => matches_search(record, search_lower),
        Facet::Categorical(c) => {
            let selected = filter.selection(c);
            c.record_values(record)
                .into_iter()
                .any(|v| selected.contains(v))
        }
        Facet::Presence(field, PresenceMode::Has) => field.is_present(record),
        Facet::Presence(field, PresenceMode::Missing) => !field.is_present(record),
        Facet::DateRange(d) => date::is_within_range(d.value(record), filter.date_range(d)),
        Facet::Months => record
            .start_date_formatted
            .as_ref()
            .and_then(date::extract_month)
            .is_some_and(|m| filter.selected_months.contains(&m)),
        Facet::Registration => {
            date::is_within_range(registration_date(record), &filter.registration_range())
        }
    }
}

/// Case-insensitive substring match on the record's searchable fields or on
/// any of its sub-records.
fn matches_search(record: &Record, search_lower: &str) -> bool {
    let hit = |field: &str| field.to_lowercase().contains(search_lower);
    record.searchable_fields().any(hit)
        || record
            .multiple_records
            .iter()
            .any(|sub| sub.searchable_fields().any(hit))
}

/// The date tested by the registration facet: `startDate`, or
/// `startDateFormatted` when `startDate` is absent.
pub fn registration_date(record: &Record) -> Option<&DateValue> {
    record
        .start_date
        .as_ref()
        .or(record.start_date_formatted.as_ref())
}
