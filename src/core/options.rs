// EnrolSift - core/options.rs
//
// Derives the selectable values for each categorical facet from the full,
// unfiltered record collection. Independent of the current filter state so
// that available options never shrink as the user narrows the view.

use crate::core::date;
use crate::core::filter::{Categorical, PresenceField};
use crate::core::model::Record;
use serde::Serialize;
use std::collections::BTreeMap;

/// Distinct values of one facet with their occurrence counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FacetOptions {
    /// Sorted distinct non-empty values.
    pub values: Vec<String>,

    /// Occurrences per value.
    pub counts: BTreeMap<String, usize>,
}

impl FacetOptions {
    fn from_counts(counts: BTreeMap<String, usize>) -> Self {
        Self {
            values: counts.keys().cloned().collect(),
            counts,
        }
    }

    pub fn count(&self, value: &str) -> usize {
        self.counts.get(value).copied().unwrap_or(0)
    }
}

/// Named aggregate counts shown alongside the facet lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OptionAggregates {
    pub total_records: usize,
    pub with_com1255: usize,
    pub with_inf2020: usize,
    pub with_grade: usize,
    pub missing_asn: usize,
}

/// Available options for every categorical facet plus start months.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    pub facets: BTreeMap<Categorical, FacetOptions>,

    /// Month codes found in `startDateFormatted`.
    pub months: FacetOptions,

    pub aggregates: OptionAggregates,
}

impl FilterOptions {
    /// Options for one categorical facet (empty if no record carries it).
    pub fn facet(&self, facet: Categorical) -> &FacetOptions {
        static EMPTY: FacetOptions = FacetOptions {
            values: Vec::new(),
            counts: BTreeMap::new(),
        };
        self.facets.get(&facet).unwrap_or(&EMPTY)
    }
}

/// Extract options from the full record collection.
///
/// A record contributes each distinct value once per facet, so counts are
/// numbers of records rather than numbers of sub-record occurrences.
pub fn extract_options(records: &[Record]) -> FilterOptions {
    let mut counts: BTreeMap<Categorical, BTreeMap<String, usize>> = BTreeMap::new();
    let mut month_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut aggregates = OptionAggregates {
        total_records: records.len(),
        ..Default::default()
    };

    for record in records {
        for facet in Categorical::all() {
            let mut values = facet.record_values(record);
            values.sort_unstable();
            values.dedup();
            let per_facet = counts.entry(*facet).or_default();
            for value in values {
                *per_facet.entry(value.to_string()).or_insert(0) += 1;
            }
        }

        if let Some(month) = record
            .start_date_formatted
            .as_ref()
            .and_then(date::extract_month)
        {
            *month_counts.entry(month).or_insert(0) += 1;
        }

        if PresenceField::Com1255.is_present(record) {
            aggregates.with_com1255 += 1;
        }
        if PresenceField::Inf2020.is_present(record) {
            aggregates.with_inf2020 += 1;
        }
        if PresenceField::Grade.is_present(record) {
            aggregates.with_grade += 1;
        }
        if !PresenceField::Asn.is_present(record) {
            aggregates.missing_asn += 1;
        }
    }

    let facets = counts
        .into_iter()
        .filter(|(_, c)| !c.is_empty())
        .map(|(facet, c)| (facet, FacetOptions::from_counts(c)))
        .collect();

    tracing::debug!(
        records = records.len(),
        months = month_counts.len(),
        "Filter options extracted"
    );

    FilterOptions {
        facets,
        months: FacetOptions::from_counts(month_counts),
        aggregates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{DateValue, PasiRecords, SubRecord};
    use crate::util::constants::SUB_COURSE_COM1255;

    fn course(code: &str) -> Record {
        Record {
            course_code: Some(code.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_values_sorted_and_counted() {
        let records = vec![course("SCI10"), course("ELA10-1"), course("SCI10"), course("")];
        let options = extract_options(&records);
        let courses = options.facet(Categorical::Course);
        assert_eq!(courses.values, vec!["ELA10-1", "SCI10"]);
        assert_eq!(courses.count("SCI10"), 2);
        assert_eq!(courses.count("MATH"), 0);
        assert_eq!(options.aggregates.total_records, 4);
    }

    #[test]
    fn test_missing_facets_are_empty() {
        let options = extract_options(&[]);
        assert!(options.facet(Categorical::PaymentStatus).values.is_empty());
        assert!(options.months.values.is_empty());
    }

    #[test]
    fn test_sub_record_values_counted_once_per_record() {
        let record = Record {
            multiple_records: vec![
                SubRecord {
                    work_items: Some("Warning".to_string()),
                    ..Default::default()
                },
                SubRecord {
                    work_items: Some("Warning".to_string()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let options = extract_options(&[record]);
        assert_eq!(options.facet(Categorical::PasiWorkItems).count("Warning"), 1);
    }

    #[test]
    fn test_months_and_aggregates() {
        let mut flags = std::collections::BTreeMap::new();
        flags.insert(SUB_COURSE_COM1255.to_string(), serde_json::json!("Completed"));
        let records = vec![
            Record {
                start_date_formatted: Some(DateValue::from("2024-09-15")),
                value: Some("87%".to_string()),
                asn: Some("1234-5678-9".to_string()),
                pasi_records: Some(PasiRecords(flags)),
                ..Default::default()
            },
            Record {
                start_date_formatted: Some(DateValue::from("2024-09-01")),
                value: Some("-".to_string()),
                ..Default::default()
            },
        ];
        let options = extract_options(&records);
        assert_eq!(options.months.values, vec!["09"]);
        assert_eq!(options.months.count("09"), 2);
        assert_eq!(options.aggregates.with_com1255, 1);
        assert_eq!(options.aggregates.with_inf2020, 0);
        assert_eq!(options.aggregates.with_grade, 1);
        assert_eq!(options.aggregates.missing_asn, 1);
    }
}
