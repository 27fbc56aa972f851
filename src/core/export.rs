// EnrolSift - core/export.rs
//
// CSV and JSON export of filtered records.
// Core layer: writes to any Write trait object.

use crate::core::date;
use crate::core::model::{DateValue, Record};
use crate::util::constants::MAX_EXPORT_RECORDS;
use crate::util::error::ExportError;
use std::io::Write;
use std::path::Path;

/// CSV column headers, in output order.
const CSV_HEADERS: &[&str] = &[
    "student_name",
    "asn",
    "course_code",
    "term",
    "pasi_term",
    "status",
    "grade",
    "work_items",
    "student_type",
    "active_status",
    "payment_status",
    "start_date",
    "schedule_end_date",
];

/// Export records to CSV.
///
/// Dates are written as RFC 3339 when parseable, otherwise verbatim, so an
/// unusual source string is never silently dropped from the export.
pub fn export_csv<W: Write>(
    records: &[&Record],
    writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    check_size(records.len())?;
    let csv_err = |e| ExportError::Csv {
        path: export_path.to_path_buf(),
        source: e,
    };

    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(CSV_HEADERS).map_err(csv_err)?;

    for record in records {
        let text = |f: &Option<String>| f.clone().unwrap_or_default();
        csv_writer
            .write_record([
                text(&record.student_name),
                text(&record.asn),
                text(&record.course_code),
                text(&record.term),
                text(&record.pasi_term),
                text(&record.status),
                text(&record.value),
                text(&record.work_items),
                text(&record.student_type),
                text(&record.active_future_archived),
                text(&record.payment_status),
                date_cell(record.start_date.as_ref().or(record.start_date_formatted.as_ref())),
                date_cell(record.schedule_end_date.as_ref()),
            ])
            .map_err(csv_err)?;
    }

    csv_writer.flush().map_err(|e| ExportError::Io {
        path: export_path.to_path_buf(),
        source: e,
    })?;

    tracing::info!(records = records.len(), path = %export_path.display(), "CSV export written");
    Ok(records.len())
}

/// Export records to JSON (array of objects, source field names).
pub fn export_json<W: Write>(
    records: &[&Record],
    writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    check_size(records.len())?;
    serde_json::to_writer_pretty(writer, records).map_err(|e| ExportError::Json {
        path: export_path.to_path_buf(),
        source: e,
    })?;
    tracing::info!(records = records.len(), path = %export_path.display(), "JSON export written");
    Ok(records.len())
}

fn check_size(count: usize) -> Result<(), ExportError> {
    if count > MAX_EXPORT_RECORDS {
        return Err(ExportError::TooManyRecords {
            count,
            max: MAX_EXPORT_RECORDS,
        });
    }
    Ok(())
}

fn date_cell(value: Option<&DateValue>) -> String {
    match value {
        None => String::new(),
        Some(v) => match date::parse_date(v) {
            Some(dt) => dt.to_rfc3339(),
            None => match v {
                DateValue::Text(s) => s.clone(),
                DateValue::EpochMillis(ms) => ms.to_string(),
            },
        },
    }
}
