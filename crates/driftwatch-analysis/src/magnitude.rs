use driftwatch_core::ChangeStatus;

use crate::diff::FileChangeRecord;

/// `min(1, changed / max(1, post_change_lines * k))`.
pub fn line_magnitude(lines_added: u64, lines_removed: u64, post_change_lines: u64, k: f64) -> f64 {
    let changed = lines_added.saturating_add(lines_removed) as f64;
    let denominator = (post_change_lines as f64 * k).max(1.0);
    (changed / denominator).min(1.0)
}

/// Binary, added, and deleted files saturate; everything else is scaled by
/// its post-change size.
pub fn file_magnitude(record: &FileChangeRecord, k: f64) -> f64 {
    if record.is_binary {
        return 1.0;
    }
    match record.status {
        ChangeStatus::Added | ChangeStatus::Deleted => 1.0,
        ChangeStatus::Modified | ChangeStatus::Renamed => line_magnitude(
            record.lines_added,
            record.lines_removed,
            record.post_change_lines,
            k,
        ),
    }
}
