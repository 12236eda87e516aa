use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ReviewItem;

pub const INITIAL_EASE_FACTOR: f64 = 2.5;
pub const MIN_EASE_FACTOR: f64 = 1.3;
pub const MAX_QUALITY: u8 = 5;
pub const PASSING_QUALITY: u8 = 3;
pub const FIRST_INTERVAL_DAYS: i64 = 1;
pub const SECOND_INTERVAL_DAYS: i64 = 6;
/// Upper bound on a single interval (100 years).
pub const MAX_INTERVAL_DAYS: i64 = 36_500;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulingError {
    #[error("Invalid quality rating {0}: must be an integer between 0 and 5")]
    InvalidQuality(i32),

    #[error("Review time {0} is too close to the end of the supported calendar")]
    DateOutOfRange(DateTime<Utc>),
}

/// Self-assessed recall quality, 0 (complete blackout) to 5 (perfect recall).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct Quality(u8);

impl Quality {
    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_passing(self) -> bool {
        self.0 >= PASSING_QUALITY
    }
}

impl TryFrom<i32> for Quality {
    type Error = SchedulingError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match u8::try_from(value) {
            Ok(q) if q <= MAX_QUALITY => Ok(Quality(q)),
            _ => Err(SchedulingError::InvalidQuality(value)),
        }
    }
}

impl From<Quality> for i32 {
    fn from(quality: Quality) -> Self {
        quality.0 as i32
    }
}

/// SM-2 ease adjustment, floored at `MIN_EASE_FACTOR`.
pub fn adjust_ease_factor(ease_factor: f64, quality: Quality) -> f64 {
    let distance = (MAX_QUALITY - quality.value()) as f64;
    let delta = 0.1 - distance * (0.08 + distance * 0.02);
    (ease_factor + delta).max(MIN_EASE_FACTOR)
}

/// Compute the next scheduling state of `item` after a review at `now`.
///
/// The input is never modified; a new item is returned. A failed recall
/// (quality below 3) resets the repetition count and schedules the item for
/// the next day. A successful recall grows the interval 1 -> 6 -> previous
/// interval times the ease factor held before this review, capped at
/// `MAX_INTERVAL_DAYS`.
pub fn schedule_next_review(
    item: &ReviewItem,
    quality: i32,
    now: DateTime<Utc>,
) -> Result<ReviewItem, SchedulingError> {
    let quality = Quality::try_from(quality)?;

    let (repetitions, interval) = if quality.is_passing() {
        let repetitions = item.repetitions + 1;
        let interval = match repetitions {
            1 => FIRST_INTERVAL_DAYS,
            2 => SECOND_INTERVAL_DAYS,
            _ => ((item.interval as f64 * item.ease_factor).round() as i64)
                .clamp(1, MAX_INTERVAL_DAYS),
        };
        (repetitions, interval)
    } else {
        (0, FIRST_INTERVAL_DAYS)
    };

    let next_review_date = now
        .checked_add_signed(Duration::days(interval))
        .ok_or(SchedulingError::DateOutOfRange(now))?;

    Ok(ReviewItem {
        repetitions,
        interval,
        ease_factor: adjust_ease_factor(item.ease_factor, quality),
        next_review_date,
        last_reviewed: Some(now),
        ..item.clone()
    })
}

#[derive(Debug, Clone)]
pub struct ReviewLog {
    pub quality: Quality,
    pub scheduled_days: i64,
    pub ease_factor: f64,
}

#[derive(Clone, Default)]
pub struct SM2Scheduler;

impl SM2Scheduler {
    pub fn new() -> Self {
        Self
    }

    pub fn schedule_item(
        &self,
        item: &ReviewItem,
        quality: i32,
        now: DateTime<Utc>,
    ) -> Result<(ReviewItem, ReviewLog)> {
        let updated_item = schedule_next_review(item, quality, now)?;

        let review_log = ReviewLog {
            quality: Quality::try_from(quality)?,
            scheduled_days: updated_item.interval,
            ease_factor: updated_item.ease_factor,
        };

        Ok((updated_item, review_log))
    }
}
