//! CSV rendering of stored production records.

use crate::clock::DisplayZone;
use crate::db::ProductionRecord;

pub const EXPORT_FILE_NAME: &str = "production_data.csv";

const HEADER: [&str; 13] = [
    "id",
    "machine_name",
    "batch",
    "batch_size",
    "product",
    "start_time",
    "running_time",
    "stop_time",
    "actual_value",
    "expected_value",
    "efficiency",
    "created_at",
    "created_at_local",
];

pub fn records_to_csv(records: &[ProductionRecord], zone: DisplayZone) -> String {
    let mut out = String::new();
    push_row(&mut out, HEADER.iter().map(|h| h.to_string()));

    for record in records {
        push_row(
            &mut out,
            [
                record.id.clone(),
                record.machine_name.clone(),
                record.batch.clone(),
                record.batch_size.to_string(),
                record.product.clone(),
                record
                    .start_time
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_default(),
                record.running_seconds.to_string(),
                record.stop_seconds.to_string(),
                record.actual_units.to_string(),
                record.expected_units.to_string(),
                format!("{:.2}", record.efficiency),
                record.created_at.to_rfc3339(),
                zone.date_time_label(record.created_at),
            ],
        );
    }

    out
}

fn push_row(out: &mut String, fields: impl IntoIterator<Item = String>) {
    for (index, field) in fields.into_iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        push_field(out, &field);
    }
    out.push_str("\r\n");
}

fn push_field(out: &mut String, field: &str) {
    if field.contains([',', '"', '\n', '\r']) {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}
