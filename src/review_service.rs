use anyhow::{Result, anyhow};
use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::database::ReviewRepository;
use crate::models::*;
use crate::sm2_scheduler::SM2Scheduler;
use crate::stats::{self, MAX_WINDOW_DAYS};
use crate::{log_schedule, log_service_start, log_service_success, log_service_warn};

const SERVICE: &str = "review_service";

/// Orchestrates review items: storage goes through the injected repository,
/// scheduling through the SM-2 scheduler.
#[derive(Clone)]
pub struct ReviewService {
    repository: Arc<dyn ReviewRepository>,
    scheduler: SM2Scheduler,
}

impl ReviewService {
    pub fn new(repository: Arc<dyn ReviewRepository>) -> Self {
        Self {
            repository,
            scheduler: SM2Scheduler::new(),
        }
    }

    // Storage keeps microsecond precision
    fn now() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }

    pub async fn add_item(&self, request: CreateReviewItemRequest) -> Result<ReviewItem> {
        let user_id = request.user_id.trim();
        let content_id = request.content_id.trim();
        if user_id.is_empty() {
            return Err(anyhow!("user_id cannot be empty"));
        }
        if content_id.is_empty() {
            return Err(anyhow!("content_id cannot be empty"));
        }

        let difficulty = request.difficulty.unwrap_or(DEFAULT_DIFFICULTY);
        if !(0.0..=1.0).contains(&difficulty) {
            return Err(anyhow!("difficulty must be between 0.0 and 1.0, got {}", difficulty));
        }

        let content_type = request
            .content_type
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        let item = ReviewItem::new(
            user_id.to_string(),
            content_id.to_string(),
            content_type,
            difficulty,
            Self::now(),
        );

        if let Err(e) = self.repository.insert_item(&item).await {
            log_service_warn!(SERVICE, "add_item", format!("could not store item: {}", e));
            return Err(e);
        }

        log_service_success!(SERVICE, "add_item", format!("item {} added for {}", item.id, item.user_id));
        Ok(item)
    }

    pub async fn get_item(&self, id: Uuid) -> Result<Option<ReviewItem>> {
        self.repository.get_item(id).await
    }

    pub async fn list_items(&self, user_id: Option<&str>) -> Result<Vec<ReviewItem>> {
        self.repository.list_items(user_id).await
    }

    pub async fn delete_item(&self, id: Uuid) -> Result<bool> {
        self.repository.delete_item(id).await
    }

    pub async fn due_items(&self, user_id: Option<&str>, limit: Option<i64>) -> Result<Vec<ReviewItem>> {
        self.repository.list_due_items(user_id, Self::now(), limit).await
    }

    /// Apply one review to an item and persist the result.
    ///
    /// Returns `Ok(None)` when the item does not exist. An out-of-range
    /// quality fails with `SchedulingError` before anything is written.
    pub async fn record_review(&self, item_id: Uuid, request: ReviewRequest) -> Result<Option<ReviewItem>> {
        log_service_start!(SERVICE, "record_review", item_id = item_id);
        let started = Instant::now();

        let item = match self.repository.get_item(item_id).await? {
            Some(item) => item,
            None => return Ok(None),
        };

        let now = Self::now();
        let (updated_item, review_log) = self.scheduler.schedule_item(&item, request.quality, now)?;

        log_schedule!(
            item_id = item_id,
            quality = request.quality,
            interval = review_log.scheduled_days,
            ease_factor = review_log.ease_factor
        );

        let record = ReviewRecord {
            id: Uuid::new_v4(),
            item_id,
            user_id: updated_item.user_id.clone(),
            quality: review_log.quality.into(),
            reviewed_at: now,
            interval: review_log.scheduled_days,
            ease_factor: review_log.ease_factor,
            response_time_ms: request.response_time_ms,
        };
        if !self.repository.apply_review(&item, &updated_item, &record).await? {
            log_service_warn!(SERVICE, "record_review", format!("item {} changed during review", item_id));
            return Err(anyhow!("Item {} was modified by a concurrent review", item_id));
        }

        log_service_success!(
            SERVICE,
            "record_review",
            item_id = item_id,
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(Some(updated_item))
    }

    pub async fn review_history(&self, item_id: Uuid) -> Result<Vec<ReviewRecord>> {
        self.repository.list_reviews_for_item(item_id).await
    }

    pub async fn user_stats(&self, user_id: &str, window_days: i64) -> Result<ReviewStats> {
        log_service_start!(SERVICE, "user_stats", user_id = user_id);
        if !(1..=MAX_WINDOW_DAYS).contains(&window_days) {
            return Err(anyhow!(
                "window_days must be between 1 and {}, got {}",
                MAX_WINDOW_DAYS,
                window_days
            ));
        }

        let now = Self::now();
        let since = stats::window_start(now, window_days);
        let items = self.repository.list_items(Some(user_id)).await?;
        let records = self.repository.list_reviews_for_user(user_id, Some(since)).await?;

        Ok(stats::summarize(user_id, &items, &records, now, window_days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::sm2_scheduler::{MAX_INTERVAL_DAYS, SchedulingError};
    use chrono::Duration;

    async fn create_test_service() -> ReviewService {
        let db = Database::new("sqlite::memory:").await.unwrap();
        ReviewService::new(Arc::new(db))
    }

    fn create_request(user_id: &str, content_id: &str) -> CreateReviewItemRequest {
        CreateReviewItemRequest {
            user_id: user_id.to_string(),
            content_id: content_id.to_string(),
            content_type: Some("paper".to_string()),
            difficulty: None,
        }
    }

    fn review(quality: i32) -> ReviewRequest {
        ReviewRequest {
            quality,
            response_time_ms: Some(2500),
        }
    }

    #[tokio::test]
    async fn test_service_starts_empty() {
        let service = create_test_service().await;
        assert!(service.list_items(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_item_defaults() {
        let service = create_test_service().await;

        let item = service.add_item(create_request("user-1", "paper-1")).await.unwrap();
        assert_eq!(item.repetitions, 0);
        assert_eq!(item.interval, 0);
        assert_eq!(item.ease_factor, 2.5);
        assert_eq!(item.difficulty, DEFAULT_DIFFICULTY);
        assert_eq!(item.content_type, "paper");
        assert!(item.last_reviewed.is_none());

        let stored = service.get_item(item.id).await.unwrap().unwrap();
        assert_eq!(stored, item);
    }

    #[tokio::test]
    async fn test_add_item_validation() {
        let service = create_test_service().await;

        assert!(service.add_item(create_request("  ", "paper-1")).await.is_err());
        assert!(service.add_item(create_request("user-1", "")).await.is_err());

        let mut request = create_request("user-1", "paper-1");
        request.difficulty = Some(1.5);
        assert!(service.add_item(request).await.is_err());

        let mut request = create_request("user-1", "paper-1");
        request.content_type = Some(" ".to_string());
        let item = service.add_item(request).await.unwrap();
        assert_eq!(item.content_type, DEFAULT_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn test_add_duplicate_content() {
        let service = create_test_service().await;
        service.add_item(create_request("user-1", "paper-1")).await.unwrap();
        assert!(service.add_item(create_request("user-1", "paper-1")).await.is_err());
    }

    #[tokio::test]
    async fn test_record_review_updates_and_logs() {
        let service = create_test_service().await;
        let item = service.add_item(create_request("user-1", "paper-1")).await.unwrap();

        assert_eq!(service.due_items(Some("user-1"), None).await.unwrap().len(), 1);

        let reviewed = service.record_review(item.id, review(5)).await.unwrap().unwrap();
        assert_eq!(reviewed.repetitions, 1);
        assert_eq!(reviewed.interval, 1);
        assert!((reviewed.ease_factor - 2.6).abs() < 1e-9);
        let last_reviewed = reviewed.last_reviewed.unwrap();
        assert_eq!(reviewed.next_review_date, last_reviewed + Duration::days(1));

        let stored = service.get_item(item.id).await.unwrap().unwrap();
        assert_eq!(stored, reviewed);
        assert!(service.due_items(Some("user-1"), None).await.unwrap().is_empty());

        let history = service.review_history(item.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].quality, 5);
        assert_eq!(history[0].interval, 1);
        assert_eq!(history[0].response_time_ms, Some(2500));
    }

    #[tokio::test]
    async fn test_review_sequence() {
        let service = create_test_service().await;
        let item = service.add_item(create_request("user-1", "paper-1")).await.unwrap();

        let first = service.record_review(item.id, review(5)).await.unwrap().unwrap();
        let second = service.record_review(item.id, review(5)).await.unwrap().unwrap();
        let third = service.record_review(item.id, review(4)).await.unwrap().unwrap();
        assert_eq!((first.interval, second.interval), (1, 6));
        assert_eq!(third.repetitions, 3);
        assert_eq!(third.interval, 16);

        let failed = service.record_review(item.id, review(1)).await.unwrap().unwrap();
        assert_eq!(failed.repetitions, 0);
        assert_eq!(failed.interval, 1);
        assert_eq!(service.review_history(item.id).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_invalid_quality_leaves_item_unchanged() {
        let service = create_test_service().await;
        let item = service.add_item(create_request("user-1", "paper-1")).await.unwrap();

        let err = service.record_review(item.id, review(6)).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<SchedulingError>(),
            Some(&SchedulingError::InvalidQuality(6))
        );

        let stored = service.get_item(item.id).await.unwrap().unwrap();
        assert_eq!(stored, item);
        assert!(service.review_history(item.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nonexistent_item_operations() {
        let service = create_test_service().await;
        let fake_id = Uuid::new_v4();

        assert!(service.get_item(fake_id).await.unwrap().is_none());
        assert!(service.record_review(fake_id, review(3)).await.unwrap().is_none());
        assert!(!service.delete_item(fake_id).await.unwrap());
        assert!(service.review_history(fake_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_user_stats() {
        let service = create_test_service().await;
        let a = service.add_item(create_request("user-1", "paper-1")).await.unwrap();
        let b = service.add_item(create_request("user-1", "paper-2")).await.unwrap();
        service.add_item(create_request("user-2", "paper-3")).await.unwrap();

        service.record_review(a.id, review(5)).await.unwrap();
        service.record_review(b.id, review(2)).await.unwrap();
        service.record_review(b.id, review(4)).await.unwrap();

        let stats = service.user_stats("user-1", 30).await.unwrap();
        assert_eq!(stats.total_items, 2);
        assert_eq!(stats.due_items, 0);
        assert_eq!(stats.total_reviews, 3);
        assert_eq!(stats.successful_reviews, 2);
        assert!((stats.accuracy_rate - 2.0 / 3.0).abs() < 1e-9);

        assert!(service.user_stats("user-1", 0).await.is_err());
    }

    #[tokio::test]
    async fn test_user_stats_window_bounds() {
        let service = create_test_service().await;
        let item = service.add_item(create_request("user-1", "paper-1")).await.unwrap();
        service.record_review(item.id, review(4)).await.unwrap();

        let widest = service.user_stats("user-1", MAX_WINDOW_DAYS).await.unwrap();
        assert_eq!(widest.total_reviews, 1);

        for window_days in [MAX_WINDOW_DAYS + 1, 1_000_000_000, i64::MAX] {
            let err = service.user_stats("user-1", window_days).await.unwrap_err();
            assert!(err.to_string().contains("must be between"));
        }
    }

    #[tokio::test]
    async fn test_long_success_run_stays_readable() {
        let service = create_test_service().await;
        let item = service.add_item(create_request("user-1", "paper-1")).await.unwrap();

        for _ in 0..50 {
            service.record_review(item.id, review(5)).await.unwrap().unwrap();
        }

        let stored = service.get_item(item.id).await.unwrap().unwrap();
        assert_eq!(stored.repetitions, 50);
        assert_eq!(stored.interval, MAX_INTERVAL_DAYS);
        let last_reviewed = stored.last_reviewed.unwrap();
        assert_eq!(stored.next_review_date, last_reviewed + Duration::days(MAX_INTERVAL_DAYS));

        assert!(service.due_items(Some("user-1"), None).await.unwrap().is_empty());
        assert_eq!(service.list_items(Some("user-1")).await.unwrap().len(), 1);
        assert_eq!(service.review_history(item.id).await.unwrap().len(), 50);
    }

    #[tokio::test]
    async fn test_delete_item() {
        let service = create_test_service().await;
        let item = service.add_item(create_request("user-1", "paper-1")).await.unwrap();
        service.record_review(item.id, review(3)).await.unwrap();

        assert!(service.delete_item(item.id).await.unwrap());
        assert!(service.get_item(item.id).await.unwrap().is_none());
        assert!(service.list_items(Some("user-1")).await.unwrap().is_empty());
    }
}
