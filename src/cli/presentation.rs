//! CLI presentation: text and json renderings of registry results.

use crate::record::{ServiceIdentity, ServiceRecord, Status};
use crate::registry::{ChangeEvent, UpdateOutcome};
use crate::substrate::EventKind;
use chrono::DateTime;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde_json::json;

/// Output format selected per command via `--format`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

fn colored_status(status: Status) -> String {
    match status {
        Status::Up => status.as_str().green().to_string(),
        Status::Down => status.as_str().red().to_string(),
        Status::Unknown => status.as_str().yellow().to_string(),
    }
}

fn timestamp(epoch_seconds: i64) -> String {
    DateTime::from_timestamp(epoch_seconds, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| epoch_seconds.to_string())
}

fn record_json(record: &ServiceRecord) -> serde_json::Value {
    json!({
        "uuid": record.uuid,
        "type": record.service_type,
        "host": record.host,
        "region": record.region,
        "status": record.status().as_str(),
        "maintenance_note": (!record.maintenance_note.is_empty())
            .then_some(&record.maintenance_note),
        "maintenance_start": (record.maintenance_start != 0).then_some(record.maintenance_start),
        "maintenance_end": (record.maintenance_end != 0).then_some(record.maintenance_end),
    })
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

fn maintenance_summary(record: &ServiceRecord) -> String {
    if record.maintenance_note.is_empty() {
        return "-".to_string();
    }
    let mut summary = record.maintenance_note.clone();
    if record.maintenance_start != 0 {
        summary.push_str(&format!(" (since {})", timestamp(record.maintenance_start)));
    }
    if record.maintenance_end != 0 {
        summary.push_str(&format!(" (until {})", timestamp(record.maintenance_end)));
    }
    summary
}

/// Render one record, or its absence
pub fn format_record(record: Option<&ServiceRecord>, format: OutputFormat) -> String {
    match (record, format) {
        (None, OutputFormat::Json) => "null".to_string(),
        (None, OutputFormat::Text) => "No record found.".to_string(),
        (Some(record), OutputFormat::Json) => pretty(&record_json(record)),
        (Some(record), OutputFormat::Text) => {
            let mut output = format!("UUID:    {}\n", record.uuid);
            output.push_str(&format!("Type:    {}\n", record.service_type));
            output.push_str(&format!("Host:    {}\n", record.host));
            output.push_str(&format!("Region:  {}\n", record.region));
            output.push_str(&format!("Status:  {}", colored_status(record.status())));
            if !record.maintenance_note.is_empty() {
                output.push_str(&format!("\nMaintenance: {}", maintenance_summary(record)));
            }
            output
        }
    }
}

/// Render a `list` result as a table or json array
pub fn format_record_list(records: &[ServiceRecord], format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        let rows: Vec<_> = records.iter().map(record_json).collect();
        return pretty(&json!(rows));
    }
    if records.is_empty() {
        return "No services found.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["UUID", "Type", "Host", "Region", "Status", "Maintenance"]);
    for record in records {
        table.add_row(vec![
            record.uuid.clone(),
            record.service_type.clone(),
            record.host.clone(),
            record.region.clone(),
            colored_status(record.status()),
            maintenance_summary(record),
        ]);
    }
    format!("{}\n\nTotal: {} service(s)", table, records.len())
}

/// Render an `is_up` check
pub fn format_liveness(identity: &ServiceIdentity, up: bool, format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        let selector = match identity {
            ServiceIdentity::Uuid(uuid) => json!({ "uuid": uuid }),
            ServiceIdentity::TypeHost { service_type, host } => {
                json!({ "type": service_type, "host": host })
            }
        };
        return pretty(&json!({ "identity": selector, "up": up }));
    }
    if up {
        format!("{} is {}", identity, "UP".green())
    } else {
        format!(
            "{} is {} (marked down or lease expired)",
            identity,
            "not UP".red()
        )
    }
}

/// Render the outcome of a mutation
pub fn format_outcome(action: &str, outcome: &UpdateOutcome, format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return pretty(&json!({
            "action": action,
            "uuid": (!outcome.uuid.is_empty()).then_some(&outcome.uuid),
            "succeeded": outcome.succeeded,
            "operations": outcome.op_errors.len(),
            "op_errors": outcome.op_errors,
            "lease": outcome.lease,
            "revision": outcome.revision,
        }));
    }
    if outcome.uuid.is_empty() {
        return format!("Nothing to {}.", action);
    }
    if outcome.op_errors.is_empty() {
        return format!("{}: {} already up to date", action, outcome.uuid);
    }
    let mut output = format!(
        "{}: {} ({} operation(s) at revision {})",
        action,
        outcome.uuid,
        outcome.op_errors.len(),
        outcome.revision
    );
    if let Some(lease) = outcome.lease {
        output.push_str(&format!("\nLease: {}", lease));
    }
    output
}

/// Render one watch event as a single line (text) or object (json)
pub fn format_change_event(event: &ChangeEvent, format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return serde_json::to_string(&json!({
            "key": event.key,
            "kind": match event.kind {
                EventKind::Put => "PUT",
                EventKind::Delete => "DELETE",
            },
            "revision": event.revision,
            "record": event.record.as_ref().map(record_json),
        }))
        .unwrap_or_else(|_| "{}".to_string());
    }
    match (&event.kind, &event.record) {
        (EventKind::Delete, _) => {
            format!("rev {:>6}  DELETE  {}", event.revision, event.key)
        }
        (EventKind::Put, Some(record)) => format!(
            "rev {:>6}  PUT     {} {}@{} {}",
            event.revision,
            colored_status(record.status()),
            record.service_type,
            record.host,
            record.uuid
        ),
        (EventKind::Put, None) => format!("rev {:>6}  PUT     {}", event.revision, event.key),
    }
}
