use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sm2_scheduler::INITIAL_EASE_FACTOR;

pub const DEFAULT_CONTENT_TYPE: &str = "document";
pub const DEFAULT_DIFFICULTY: f64 = 0.5;

/// One piece of content scheduled for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub id: Uuid,
    pub user_id: String,
    pub content_id: String, // Id of the paper/note/flashcard in the wider system
    pub content_type: String,
    pub difficulty: f64, // Informational only, never changed by the scheduler
    pub interval: i64,   // Days until the next review
    pub repetitions: i32,
    pub ease_factor: f64,
    pub next_review_date: DateTime<Utc>,
    pub last_reviewed: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ReviewItem {
    /// A fresh item that is due immediately.
    pub fn new(
        user_id: String,
        content_id: String,
        content_type: String,
        difficulty: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            content_id,
            content_type,
            difficulty,
            interval: 0,
            repetitions: 0,
            ease_factor: INITIAL_EASE_FACTOR,
            next_review_date: now,
            last_reviewed: None,
            created_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_date <= now
    }
}

/// Persisted log entry for a single review event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: Uuid,
    pub item_id: Uuid,
    pub user_id: String,
    pub quality: i32, // 0=blackout .. 5=perfect recall
    pub reviewed_at: DateTime<Utc>,
    pub interval: i64,
    pub ease_factor: f64,
    pub response_time_ms: Option<i64>,
}

impl ReviewRecord {
    pub fn is_successful(&self) -> bool {
        self.quality >= crate::sm2_scheduler::PASSING_QUALITY as i32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReviewItemRequest {
    pub user_id: String,
    pub content_id: String,
    pub content_type: Option<String>,
    pub difficulty: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub quality: i32,
    pub response_time_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewStats {
    pub user_id: String,
    pub total_items: usize,
    pub due_items: usize,
    pub mature_items: usize,
    pub total_reviews: usize,
    pub successful_reviews: usize,
    pub accuracy_rate: f64,
    pub average_ease_factor: f64,
    pub window_days: i64,
}
