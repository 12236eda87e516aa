use chrono::{DateTime, Duration, Utc};

use crate::models::{ReviewItem, ReviewRecord, ReviewStats};

/// Interval (in days) from which an item counts as mature.
pub const MATURE_INTERVAL_DAYS: i64 = 21;

/// Longest accepted statistics window (ten years).
pub const MAX_WINDOW_DAYS: i64 = 3650;

/// Start of a look-back window, saturating at the earliest representable time.
pub fn window_start(now: DateTime<Utc>, window_days: i64) -> DateTime<Utc> {
    Duration::try_days(window_days)
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Items whose due date has passed, earliest first.
pub fn items_due(items: &[ReviewItem], now: DateTime<Utc>) -> Vec<&ReviewItem> {
    let mut due: Vec<&ReviewItem> = items.iter().filter(|item| item.is_due(now)).collect();
    due.sort_by_key(|item| item.next_review_date);
    due
}

/// Share of successful reviews (quality >= 3) recorded at or after `since`.
pub fn accuracy_rate(records: &[ReviewRecord], since: DateTime<Utc>) -> f64 {
    let (total, successful) = count_reviews(records, since);
    if total == 0 {
        0.0
    } else {
        successful as f64 / total as f64
    }
}

fn count_reviews(records: &[ReviewRecord], since: DateTime<Utc>) -> (usize, usize) {
    records
        .iter()
        .filter(|record| record.reviewed_at >= since)
        .fold((0, 0), |(total, successful), record| {
            (total + 1, successful + record.is_successful() as usize)
        })
}

pub fn summarize(
    user_id: &str,
    items: &[ReviewItem],
    records: &[ReviewRecord],
    now: DateTime<Utc>,
    window_days: i64,
) -> ReviewStats {
    let since = window_start(now, window_days);
    let (total_reviews, successful_reviews) = count_reviews(records, since);

    let average_ease_factor = if items.is_empty() {
        0.0
    } else {
        items.iter().map(|item| item.ease_factor).sum::<f64>() / items.len() as f64
    };

    ReviewStats {
        user_id: user_id.to_string(),
        total_items: items.len(),
        due_items: items_due(items, now).len(),
        mature_items: items
            .iter()
            .filter(|item| item.interval >= MATURE_INTERVAL_DAYS)
            .count(),
        total_reviews,
        successful_reviews,
        accuracy_rate: accuracy_rate(records, since),
        average_ease_factor,
        window_days,
    }
}
