use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::features::engine::ConflictRecord;
use crate::features::sync::{OperationStatus, QueueStats, SyncOperation};
use crate::models::SyncMetadata;

/// Human-readable age of `then` relative to `now`.
pub fn format_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(then);
    if age.num_days() > 0 {
        format!("{} days ago", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{} hours ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{} minutes ago", age.num_minutes())
    } else {
        "just now".to_string()
    }
}

fn status_icon(status: OperationStatus) -> String {
    match status {
        OperationStatus::Pending => "⏳".to_string(),
        OperationStatus::InProgress => "▶".cyan().to_string(),
        OperationStatus::Completed => "✓".green().to_string(),
        OperationStatus::Failed => "↻".yellow().to_string(),
        OperationStatus::Cancelled => "○".dimmed().to_string(),
        OperationStatus::DeadLetter => "✗".red().to_string(),
    }
}

/// Format queue counts and a one-line summary per scope
pub fn format_status_pretty(stats: &QueueStats, scopes: &[SyncMetadata], now: DateTime<Utc>) -> String {
    let mut lines = Vec::new();

    lines.push("Sync Queue Status".bold().to_string());
    lines.push("─".repeat(40));

    lines.push(format!(
        "  Pending:      {} {}",
        stats.pending,
        if stats.pending > 0 {
            "operations waiting".dimmed()
        } else {
            "".dimmed()
        }
    ));
    lines.push(format!("  In progress:  {}", stats.in_progress));
    lines.push(format!(
        "  Retrying:     {} {}",
        stats.failed,
        if stats.failed > 0 {
            "operations backing off".yellow()
        } else {
            "".normal()
        }
    ));
    lines.push(format!(
        "  Dead letter:  {} {}",
        stats.dead_letter,
        if stats.dead_letter > 0 {
            "operations need attention".red()
        } else {
            "".normal()
        }
    ));
    lines.push(format!(
        "  Completed:    {} {}",
        stats.completed + stats.cancelled,
        "operations".dimmed()
    ));

    if let Some(oldest) = stats.oldest_pending {
        lines.push(format!("  Oldest:       {}", format_age(oldest, now).dimmed()));
    }

    lines.push(String::new());
    lines.push("Scopes".bold().to_string());
    lines.push("─".repeat(40));
    if scopes.is_empty() {
        lines.push("  No scope has been pulled yet".dimmed().to_string());
    }
    for scope in scopes {
        let synced = scope
            .watermark()
            .map_or_else(|| "never".to_string(), |t| format_age(t, now));
        let mut line = format!("  {:<28} {}", scope.key, synced.dimmed());
        if scope.last_error.is_some() {
            line.push_str(&format!("  {}", "last pull failed".red()));
        }
        lines.push(line);
    }

    if stats.dead_letter > 0 {
        lines.push(String::new());
        lines.push(
            "Run 'commentsync queue retry-dead' to requeue dead-lettered operations"
                .dimmed()
                .to_string(),
        );
    }

    lines.join("\n")
}

/// Format queued operations as a table
pub fn format_operations_pretty(operations: &[SyncOperation]) -> String {
    if operations.is_empty() {
        return "No operations in queue.".to_string();
    }

    let mut lines = Vec::new();
    lines.push(format!("Operations ({})", operations.len()).bold().to_string());
    lines.push("─".repeat(72));
    lines.push(format!(
        "   {:<8} {:<8} {:<24} {:<8} {}",
        "ID", "Type", "Entity", "Attempts", "Created"
    ));
    lines.push("─".repeat(72));

    for op in operations {
        let short_id: String = op.id.chars().take(8).collect();
        let entity = format!("{}:{}", op.entity_type, op.entity_id);
        lines.push(format!(
            "{}  {:<8} {:<8} {:<24} {:<8} {}",
            status_icon(op.status),
            short_id,
            op.op_type.as_str(),
            entity,
            op.attempts,
            op.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
        ));
        if let Some(error) = &op.last_error {
            lines.push(format!("     {}", error.red()));
        }
    }

    lines.join("\n")
}

/// Format per-scope pull metadata
pub fn format_scopes_pretty(scopes: &[SyncMetadata]) -> String {
    if scopes.is_empty() {
        return "No scope metadata recorded.".to_string();
    }

    let mut output = format!("Scopes ({})\n", scopes.len());
    output.push_str(&"─".repeat(60));
    output.push('\n');

    for scope in scopes {
        output.push_str(&format!("{}\n", scope.key.bold()));
        let full = scope
            .last_full_sync_time
            .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
        output.push_str(&format!("  {}: {}\n", "Full sync".dimmed(), full));
        if let Some(incremental) = scope.last_incremental_sync_time {
            output.push_str(&format!(
                "  {}: {}\n",
                "Incremental".dimmed(),
                incremental.to_rfc3339()
            ));
        }
        output.push_str(&format!(
            "  {}: {} pulls, {} items, {} failures\n",
            "Totals".dimmed(),
            scope.sync_count,
            scope.items_synced,
            scope.failed_sync_count
        ));
        if let Some(etag) = &scope.etag {
            output.push_str(&format!("  {}: {}\n", "ETag".dimmed(), etag));
        }
        if scope.needs_migration() || !scope.migration_completed {
            output.push_str(&format!("  {}\n", "next pull is a full sync".yellow()));
        }
        if let Some(error) = &scope.last_error {
            output.push_str(&format!("  {}: {}\n", "Last error".dimmed(), error.red()));
        }
    }

    output
}

/// Format conflicts held for manual review
pub fn format_conflicts_pretty(conflicts: &[ConflictRecord]) -> String {
    if conflicts.is_empty() {
        return "No conflicts awaiting review.".to_string();
    }

    let mut output = format!("Conflicts ({})\n", conflicts.len());
    output.push_str(&"─".repeat(60));
    output.push('\n');

    for conflict in conflicts {
        output.push_str(&format!(
            "{} {}:{}  {}\n",
            "!".yellow(),
            conflict.entity_type,
            conflict.entity_id.bold(),
            conflict.detected_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
        ));
        if !conflict.conflicted_fields.is_empty() {
            output.push_str(&format!(
                "  {}: {}\n",
                "Fields".dimmed(),
                conflict.conflicted_fields.join(", ").cyan()
            ));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use crate::features::sync::OpType;
    use crate::models::EntityType;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_format_age() {
        let now = t0();
        assert_eq!(format_age(now, now), "just now");
        assert_eq!(format_age(now - Duration::minutes(5), now), "5 minutes ago");
        assert_eq!(format_age(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(format_age(now - Duration::days(2), now), "2 days ago");
    }

    #[test]
    fn test_format_status_pretty() {
        colored::control::set_override(false);
        let stats = QueueStats {
            pending: 4,
            dead_letter: 1,
            ..QueueStats::default()
        };
        let mut scope = SyncMetadata::new("video:v1");
        scope.last_full_sync_time = Some(t0() - Duration::hours(2));

        let output = format_status_pretty(&stats, &[scope], t0());
        assert!(output.contains("Pending:      4"));
        assert!(output.contains("Dead letter:  1"));
        assert!(output.contains("video:v1"));
        assert!(output.contains("2 hours ago"));
        assert!(output.contains("queue retry-dead"));
    }

    #[test]
    fn test_format_operations_pretty() {
        colored::control::set_override(false);
        let mut op = SyncOperation::new(OpType::Delete, EntityType::Comment, "c1", None, 0, t0());
        op.last_error = Some("server error (HTTP 503)".to_string());

        let output = format_operations_pretty(&[op]);
        assert!(output.contains("Operations (1)"));
        assert!(output.contains("comment:c1"));
        assert!(output.contains("delete"));
        assert!(output.contains("HTTP 503"));

        assert_eq!(format_operations_pretty(&[]), "No operations in queue.");
    }

    #[test]
    fn test_format_scopes_pretty() {
        colored::control::set_override(false);
        let mut scope = SyncMetadata::new("channel:UC1");
        scope.sync_count = 3;
        scope.items_synced = 40;
        scope.last_error = Some("rate limited".to_string());

        let output = format_scopes_pretty(&[scope]);
        assert!(output.contains("channel:UC1"));
        assert!(output.contains("3 pulls, 40 items, 0 failures"));
        assert!(output.contains("next pull is a full sync"));
        assert!(output.contains("rate limited"));
    }
}
