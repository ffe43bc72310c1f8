use crate::model::{EpochMs, SaveSnapshot};
use chrono::{DateTime, Utc};

/// Inputs to save selection for one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveSelection {
    /// Minimum spacing between kept saves.
    pub interval_ms: i64,
    /// Timestamp of the newest save already kept, 0 if none.
    pub baseline_ms: EpochMs,
    /// Drop periodic autosaves (`_autosaveN.zip`) before selecting.
    pub skip_autosaves: bool,
}

/// Greedy left-to-right selection: after sorting by mtime, keep every save
/// that lies strictly more than `interval_ms` after the previously kept one.
///
/// Saves sharing an mtime collapse into the first one; they would map to the
/// same archive name anyway.
pub fn select_saves(saves: &[SaveSnapshot], selection: &SaveSelection) -> Vec<SaveSnapshot> {
    let mut remaining: Vec<&SaveSnapshot> = saves
        .iter()
        .filter(|s| !(selection.skip_autosaves && is_autosave(&s.name)))
        .collect();
    remaining.sort_by_key(|s| s.mtime_ms);

    let mut last_ms = selection.baseline_ms;
    let mut selected = Vec::new();
    for save in remaining {
        if save.mtime_ms > last_ms.saturating_add(selection.interval_ms) {
            last_ms = save.mtime_ms;
            selected.push(save.clone());
        }
    }
    selected
}

/// Matches the names the game gives its periodic autosaves, e.g. `_autosave3.zip`.
pub fn is_autosave(name: &str) -> bool {
    const MARKER: &str = "_autosave";
    let Some(stem) = name.strip_suffix(".zip") else {
        return false;
    };
    match stem.rfind(MARKER) {
        Some(idx) => {
            let digits = &stem[idx + MARKER.len()..];
            !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// Result of applying the download size cap to a selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SizeCapped {
    pub keep: Vec<SaveSnapshot>,
    /// Saves over the cap; callers log these instead of dropping them silently.
    pub oversized: Vec<SaveSnapshot>,
}

pub fn cap_size(selected: Vec<SaveSnapshot>, max_bytes: u64) -> SizeCapped {
    let (keep, oversized) = selected.into_iter().partition(|s| s.size <= max_bytes);
    SizeCapped { keep, oversized }
}

/// Current wall-clock time in the same unit as save mtimes.
pub fn now_ms() -> EpochMs {
    Utc::now().timestamp_millis()
}

/// Local file name for an archived save: the UTC mtime in ISO-8601 with `:`
/// swapped for `_` so it is valid on every filesystem.
pub fn archive_name(mtime_ms: EpochMs) -> String {
    let at = DateTime::<Utc>::from_timestamp_millis(mtime_ms).unwrap_or_default();
    format!("{}.zip", at.format("%Y-%m-%dT%H_%M_%S%.3fZ"))
}

/// Inverse of [`archive_name`]. Accepts `_` or `-` as the time separator.
pub fn parse_archive_name(name: &str) -> Option<EpochMs> {
    let stem = name.strip_suffix(".zip")?;
    let (date, time) = stem.split_once('T')?;
    let time = time.replacen(['_', '-'], ":", 2);
    DateTime::parse_from_rfc3339(&format!("{date}T{time}"))
        .ok()
        .map(|at| at.timestamp_millis())
}

/// Baseline for the next selection: newest archive timestamp among `names`,
/// 0 when nothing parses.
pub fn latest_archived_ms<I, S>(names: I) -> EpochMs
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter_map(|n| parse_archive_name(n.as_ref()))
        .fold(0, EpochMs::max)
}
