// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{create_test_app, endpoint, retry_policy, TestApp};
use hookrs::domain::models::delivery::{DeliveryJob, DeliveryStatus};
use hookrs::domain::models::endpoint::EndpointStatus;
use hookrs::domain::models::event::EventType;
use hookrs::domain::repositories::delivery_job_repository::DeliveryJobRepository;
use hookrs::domain::repositories::endpoint_repository::EndpointRepository;
use hookrs::workers::manager::WorkerManager;
use hookrs::workers::Worker;
use hookrs::infrastructure::database::entities::webhook_endpoint;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn only_job(app: &TestApp, endpoint_id: Uuid) -> DeliveryJob {
    let jobs = app.jobs_for(endpoint_id).await;
    assert_eq!(jobs.len(), 1, "expected exactly one delivery job");
    jobs.into_iter().next().unwrap()
}

/// 让任务在指定时间被认领
async fn fire_when_due(app: &TestApp, job: &DeliveryJob) -> usize {
    app.worker
        .process_due_jobs_at(job.next_attempt_at.expect("job should be scheduled"))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_backoff_doubles_until_retries_are_exhausted() {
    let app = create_test_app().await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&server)
        .await;

    let e = app
        .register(
            endpoint(server.uri(), vec![EventType::EnrollmentCreated], None)
                .with_retry_policy(retry_policy(3, 1)),
        )
        .await;

    app.dispatcher
        .execute(EventType::EnrollmentCreated, json!({ "enrollment_id": "en-7" }), None, None)
        .await
        .unwrap();

    for (expected_attempt, expected_delay) in [(1u32, 1i64), (2, 2), (3, 4)] {
        let job = only_job(&app, e.id).await;
        assert_eq!(job.status, DeliveryStatus::RetryScheduled);
        assert_eq!(job.attempt_number, expected_attempt);
        assert_eq!(
            job.next_attempt_at.unwrap() - job.last_attempted_at.unwrap(),
            chrono::Duration::seconds(expected_delay)
        );

        // One second before the backoff elapses nothing is claimable.
        let early = job.next_attempt_at.unwrap() - chrono::Duration::seconds(1);
        assert_eq!(app.worker.process_due_jobs_at(early).await.unwrap(), 0);

        assert_eq!(fire_when_due(&app, &job).await, 1);
    }

    let job = only_job(&app, e.id).await;
    assert_eq!(job.status, DeliveryStatus::Failed);
    assert_eq!(job.attempt_number, 3);
    assert!(job.next_attempt_at.is_none());
    assert!(job.locked_until.is_none());

    let stats = app.stats(e.id).await;
    assert_eq!(stats.failed_count, 4);
    assert_eq!(stats.delivered_count, 0);
    assert!(stats
        .last_error
        .unwrap()
        .starts_with("max retries (3) exceeded: HTTP 500"));

    // A failed job is never claimed again.
    let later = chrono::Utc::now() + chrono::Duration::days(1);
    assert_eq!(app.worker.process_due_jobs_at(later).await.unwrap(), 0);
}

#[tokio::test]
async fn test_transient_failure_recovers_on_retry() {
    let app = create_test_app().await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let e = app
        .register(
            endpoint(server.uri(), vec![EventType::PaymentCompleted], Some("T1"))
                .with_retry_policy(retry_policy(3, 30)),
        )
        .await;

    let outcomes = app
        .dispatcher
        .execute(EventType::PaymentCompleted, json!({ "amount": 4900 }), Some("T1"), None)
        .await
        .unwrap();
    assert_eq!(outcomes[0].status, DeliveryStatus::RetryScheduled);

    let job = only_job(&app, e.id).await;
    assert_eq!(fire_when_due(&app, &job).await, 1);

    let job = only_job(&app, e.id).await;
    assert_eq!(job.status, DeliveryStatus::Delivered);
    assert_eq!(job.last_status_code, Some(200));
    assert_eq!(job.last_error.as_deref(), Some("HTTP 503"));

    let stats = app.stats(e.id).await;
    assert_eq!(stats.failed_count, 1);
    assert_eq!(stats.delivered_count, 1);

    // The retry carries the same payload as the first attempt.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].body, requests[1].body);
    assert_eq!(
        requests[0].headers.get("x-webhook-id"),
        requests[1].headers.get("x-webhook-id")
    );
}

#[tokio::test]
async fn test_retry_is_cancelled_when_endpoint_disabled() {
    let app = create_test_app().await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let e = app
        .register(
            endpoint(server.uri(), vec![EventType::CourseUpdated], None)
                .with_retry_policy(retry_policy(3, 10)),
        )
        .await;
    app.dispatcher
        .execute(EventType::CourseUpdated, json!({ "course_id": "c1" }), None, None)
        .await
        .unwrap();

    app.endpoints
        .set_status(e.id, EndpointStatus::Disabled)
        .await
        .unwrap();
    let before = app.stats(e.id).await;

    let job = only_job(&app, e.id).await;
    assert_eq!(fire_when_due(&app, &job).await, 1);

    let job = only_job(&app, e.id).await;
    assert_eq!(job.status, DeliveryStatus::Cancelled);
    assert!(job.next_attempt_at.is_none());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert_eq!(app.stats(e.id).await, before);
}

#[tokio::test]
async fn test_retry_is_cancelled_when_endpoint_deleted() {
    let app = create_test_app().await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let e = app
        .register(
            endpoint(server.uri(), vec![EventType::SubscriptionCancelled], None)
                .with_retry_policy(retry_policy(2, 5)),
        )
        .await;
    app.dispatcher
        .execute(EventType::SubscriptionCancelled, json!({}), None, None)
        .await
        .unwrap();

    let job = only_job(&app, e.id).await;
    webhook_endpoint::Entity::delete_by_id(e.id)
        .exec(app.db.as_ref())
        .await
        .unwrap();
    assert!(app.endpoints.find_by_id(e.id).await.unwrap().is_none());

    assert_eq!(fire_when_due(&app, &job).await, 1);

    let job = app.jobs.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, DeliveryStatus::Cancelled);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_retry_policy_is_read_at_fire_time() {
    let app = create_test_app().await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let e = app
        .register(
            endpoint(server.uri(), vec![EventType::UserUpdated], None)
                .with_retry_policy(retry_policy(5, 1)),
        )
        .await;
    app.dispatcher
        .execute(EventType::UserUpdated, json!({}), None, None)
        .await
        .unwrap();

    // Tighten the policy after the retry was queued.
    webhook_endpoint::Entity::update_many()
        .col_expr(webhook_endpoint::Column::MaxRetries, Expr::value(1))
        .filter(webhook_endpoint::Column::Id.eq(e.id))
        .exec(app.db.as_ref())
        .await
        .unwrap();

    let job = only_job(&app, e.id).await;
    assert_eq!(fire_when_due(&app, &job).await, 1);

    let job = only_job(&app, e.id).await;
    assert_eq!(job.status, DeliveryStatus::Failed);
    assert_eq!(
        app.stats(e.id).await.last_error.as_deref(),
        Some("max retries (1) exceeded: HTTP 500")
    );
}

#[tokio::test]
async fn test_result_of_expired_lease_is_discarded() {
    let app = create_test_app().await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let e = app
        .register(
            endpoint(server.uri(), vec![EventType::EnrollmentCreated], None)
                .with_retry_policy(retry_policy(3, 0)),
        )
        .await;
    app.dispatcher
        .execute(EventType::EnrollmentCreated, json!({ "enrollment_id": "en-2" }), None, None)
        .await
        .unwrap();

    // The first worker's lease lapses while its request is still in flight.
    let stalled = app.worker_with_lease(1);
    let takeover = app.worker_with_lease(30);
    let first = tokio::spawn(async move { stalled.process_due_jobs().await });
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(takeover.process_due_jobs().await.unwrap(), 1);
    assert_eq!(first.await.unwrap().unwrap(), 1);

    // Only the current holder's result is written back and counted.
    let job = only_job(&app, e.id).await;
    assert_eq!(job.status, DeliveryStatus::RetryScheduled);
    assert_eq!(job.attempt_number, 2);
    assert!(job.locked_until.is_none());

    let stats = app.stats(e.id).await;
    assert_eq!(stats.failed_count, 2);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_live_lease_is_not_claimed_by_another_worker() {
    let app = create_test_app().await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(1)))
        .mount(&server)
        .await;

    let e = app
        .register(
            endpoint(server.uri(), vec![EventType::PaymentCompleted], None)
                .with_retry_policy(retry_policy(3, 0)),
        )
        .await;
    app.dispatcher
        .execute(EventType::PaymentCompleted, json!({ "amount": 1200 }), None, None)
        .await
        .unwrap();

    let holder = app.worker_with_lease(30);
    let other = app.worker_with_lease(30);
    let first = tokio::spawn(async move { holder.process_due_jobs().await });
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(other.process_due_jobs().await.unwrap(), 0);
    assert_eq!(first.await.unwrap().unwrap(), 1);

    let job = only_job(&app, e.id).await;
    assert_eq!(job.status, DeliveryStatus::Delivered);
    let stats = app.stats(e.id).await;
    assert_eq!(stats.delivered_count, 1);
    assert_eq!(stats.failed_count, 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_worker_loop_delivers_due_retry() {
    let app = create_test_app().await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let e = app
        .register(
            endpoint(server.uri(), vec![EventType::LessonCompleted], None)
                .with_retry_policy(retry_policy(3, 0)),
        )
        .await;

    let mut manager = WorkerManager::new();
    manager.spawn(app.worker.clone());

    app.dispatcher
        .execute(EventType::LessonCompleted, json!({ "lesson_id": "l9" }), None, None)
        .await
        .unwrap();

    let mut delivered = false;
    for _ in 0..100 {
        if app.stats(e.id).await.delivered_count == 1 {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(delivered, "retry was not delivered by the worker loop");
    assert_eq!(only_job(&app, e.id).await.status, DeliveryStatus::Delivered);

    manager.shutdown(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn test_worker_stops_on_shutdown_signal() {
    let app = create_test_app().await;
    let (tx, rx) = tokio::sync::watch::channel(false);

    let worker = app.worker.clone();
    let handle = tokio::spawn(async move { worker.run(rx).await });

    tokio::time::sleep(Duration::from_millis(120)).await;
    tx.send(true).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("worker did not stop")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(app.worker.name(), "retry_worker");
}
