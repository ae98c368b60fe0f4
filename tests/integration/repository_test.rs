// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{create_test_app, endpoint, retry_policy};
use chrono::{Duration, Utc};
use hookrs::domain::models::delivery::{lease_deadline, DeliveryJob, DeliveryStatus};
use hookrs::domain::models::endpoint::{EndpointStatus, StatsDelta};
use hookrs::domain::models::event::{EventPayload, EventType};
use hookrs::domain::repositories::delivery_job_repository::DeliveryJobRepository;
use hookrs::domain::repositories::endpoint_repository::EndpointRepository;
use hookrs::domain::repositories::RepositoryError;
use serde_json::json;
use uuid::Uuid;

fn scheduled_job(endpoint_id: Uuid, due_in: Duration) -> DeliveryJob {
    let payload = EventPayload::new(EventType::QuizSubmitted, json!({ "score": 10 }), None)
        .serialize()
        .unwrap();
    let mut job = DeliveryJob::new(endpoint_id, payload);
    job.attempt_number = 1;
    job.status = DeliveryStatus::RetryScheduled;
    job.next_attempt_at = Some(Utc::now() + due_in);
    job
}

#[tokio::test]
async fn test_endpoint_round_trip_preserves_configuration() {
    let app = create_test_app().await;
    let created = app
        .register(
            endpoint(
                "https://lms.example.com/hooks".to_string(),
                vec![EventType::CoursePublished, EventType::BadgeEarned],
                Some("T1"),
            )
            .with_secret("whsec_123")
            .with_header("X-First", "1")
            .with_header("Authorization", "Bearer abc")
            .with_header("X-Last", "3")
            .with_retry_policy(retry_policy(5, 15)),
        )
        .await;

    let found = app.endpoints.find_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(found.tenant_id.as_deref(), Some("T1"));
    assert_eq!(found.secret.as_deref(), Some("whsec_123"));
    assert_eq!(
        found.subscribed_events,
        vec![EventType::CoursePublished, EventType::BadgeEarned]
    );
    let names: Vec<_> = found.custom_headers.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(names, vec!["X-First", "Authorization", "X-Last"]);
    assert_eq!(found.retry_policy, retry_policy(5, 15));
    assert_eq!(found.status, EndpointStatus::Active);
    assert_eq!(found.stats.delivered_count, 0);

    assert!(app.endpoints.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_find_active_endpoints_filters_status_tenant_and_event() {
    let app = create_test_app().await;
    let url = || "https://example.com/hook".to_string();

    let t1 = app
        .register(endpoint(url(), vec![EventType::PaymentCompleted], Some("T1")))
        .await;
    let global = app
        .register(endpoint(url(), vec![EventType::PaymentCompleted], None))
        .await;
    let other_event = app
        .register(endpoint(url(), vec![EventType::PaymentFailed], Some("T1")))
        .await;
    let disabled = app
        .register(endpoint(url(), vec![EventType::PaymentCompleted], Some("T1")))
        .await;
    app.endpoints
        .set_status(disabled.id, EndpointStatus::Disabled)
        .await
        .unwrap();

    let scoped = app
        .endpoints
        .find_active_endpoints(EventType::PaymentCompleted, Some("T1"))
        .await
        .unwrap();
    let ids: Vec<_> = scoped.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![t1.id]);

    let all = app
        .endpoints
        .find_active_endpoints(EventType::PaymentCompleted, None)
        .await
        .unwrap();
    let ids: Vec<_> = all.iter().map(|e| e.id).collect();
    assert!(ids.contains(&t1.id));
    assert!(ids.contains(&global.id));
    assert!(!ids.contains(&other_event.id));
    assert!(!ids.contains(&disabled.id));
}

#[tokio::test]
async fn test_concurrent_stats_updates_are_not_lost() {
    let app = create_test_app().await;
    let e = app
        .register(endpoint(
            "https://example.com/hook".to_string(),
            vec![EventType::UserCreated],
            None,
        ))
        .await;

    let mut handles = Vec::new();
    for i in 0..50 {
        let repo = app.endpoints.clone();
        let delta = if i % 2 == 0 {
            StatsDelta::Delivered { at: Utc::now() }
        } else {
            StatsDelta::Failed {
                at: Utc::now(),
                error: format!("HTTP 500: attempt {}", i),
            }
        };
        handles.push(tokio::spawn(async move { repo.update_stats(e.id, delta).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stats = app.stats(e.id).await;
    assert_eq!(stats.delivered_count, 25);
    assert_eq!(stats.failed_count, 25);
    assert!(stats.last_error.unwrap().starts_with("HTTP 500"));
}

#[tokio::test]
async fn test_success_keeps_last_error() {
    let app = create_test_app().await;
    let e = app
        .register(endpoint(
            "https://example.com/hook".to_string(),
            vec![EventType::UserCreated],
            None,
        ))
        .await;

    app.endpoints
        .update_stats(
            e.id,
            StatsDelta::Failed {
                at: Utc::now(),
                error: "connection refused".to_string(),
            },
        )
        .await
        .unwrap();
    app.endpoints
        .update_stats(e.id, StatsDelta::Delivered { at: Utc::now() })
        .await
        .unwrap();

    let stats = app.stats(e.id).await;
    assert_eq!(stats.last_error.as_deref(), Some("connection refused"));
    assert_eq!(stats.delivered_count, 1);
}

#[tokio::test]
async fn test_missing_endpoint_is_not_found() {
    let app = create_test_app().await;
    let missing = Uuid::new_v4();

    let result = app
        .endpoints
        .update_stats(missing, StatsDelta::Delivered { at: Utc::now() })
        .await;
    assert!(matches!(result, Err(RepositoryError::NotFound)));

    let result = app
        .endpoints
        .set_status(missing, EndpointStatus::Disabled)
        .await;
    assert!(matches!(result, Err(RepositoryError::NotFound)));
}

#[tokio::test]
async fn test_delivery_job_round_trip() {
    let app = create_test_app().await;
    let endpoint_id = Uuid::new_v4();
    let job = scheduled_job(endpoint_id, Duration::seconds(30));

    app.jobs.create(&job).await.unwrap();
    let mut found = app.jobs.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(found.payload, job.payload);
    assert_eq!(found.status, DeliveryStatus::RetryScheduled);
    assert_eq!(found.attempt_number, 1);

    found.status = DeliveryStatus::Delivered;
    found.next_attempt_at = None;
    found.last_status_code = Some(204);
    app.jobs.update(&found).await.unwrap();

    let updated = app.jobs.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(updated.status, DeliveryStatus::Delivered);
    assert_eq!(updated.last_status_code, Some(204));
    assert!(updated.next_attempt_at.is_none());

    let missing = DeliveryJob::new(endpoint_id, job.payload.clone());
    assert!(matches!(
        app.jobs.update(&missing).await,
        Err(RepositoryError::NotFound)
    ));
}

#[tokio::test]
async fn test_claim_due_leases_jobs() {
    let app = create_test_app().await;
    let endpoint_id = Uuid::new_v4();
    let due = scheduled_job(endpoint_id, Duration::seconds(-5));
    let not_due = scheduled_job(endpoint_id, Duration::minutes(10));
    app.jobs.create(&due).await.unwrap();
    app.jobs.create(&not_due).await.unwrap();

    let now = Utc::now();
    let lease = Duration::seconds(30);
    let claimed = app.jobs.claim_due(now, 10, lease).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, due.id);
    assert_eq!(claimed[0].status, DeliveryStatus::InFlight);
    assert_eq!(claimed[0].locked_until, Some(lease_deadline(now, lease)));

    // Held while the lease is live.
    let again = app
        .jobs
        .claim_due(now + Duration::seconds(10), 10, lease)
        .await
        .unwrap();
    assert!(again.is_empty());

    // Reclaimed after the holder's lease lapses.
    let reclaimed = app
        .jobs
        .claim_due(now + Duration::seconds(31), 10, lease)
        .await
        .unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].id, due.id);
}

#[tokio::test]
async fn test_write_back_is_fenced_by_the_lease() {
    let app = create_test_app().await;
    let due = scheduled_job(Uuid::new_v4(), Duration::seconds(-5));
    app.jobs.create(&due).await.unwrap();

    let lease = Duration::seconds(30);
    let now = Utc::now();
    let mut stale = app.jobs.claim_due(now, 10, lease).await.unwrap().remove(0);
    let stale_lease = stale.locked_until.unwrap();

    // The holder stalls past its lease and a second claimer takes over.
    let later = now + Duration::seconds(31);
    let mut current = app.jobs.claim_due(later, 10, lease).await.unwrap().remove(0);
    let current_lease = current.locked_until.unwrap();
    assert_eq!(current.id, stale.id);

    stale.status = DeliveryStatus::Delivered;
    stale.locked_until = None;
    assert!(!app.jobs.update_claimed(&stale, stale_lease).await.unwrap());
    assert!(!app
        .jobs
        .renew_lease(stale.id, stale_lease, lease_deadline(later, lease))
        .await
        .unwrap());

    let stored = app.jobs.find_by_id(due.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DeliveryStatus::InFlight);
    assert_eq!(stored.locked_until, Some(current_lease));

    // The current holder renews and writes back.
    let renewed = lease_deadline(later + Duration::seconds(5), lease);
    assert!(app
        .jobs
        .renew_lease(current.id, current_lease, renewed)
        .await
        .unwrap());
    current.status = DeliveryStatus::RetryScheduled;
    current.attempt_number = 2;
    current.next_attempt_at = Some(later + Duration::seconds(60));
    current.locked_until = None;
    current.last_status_code = Some(503);
    assert!(app.jobs.update_claimed(&current, renewed).await.unwrap());

    let stored = app.jobs.find_by_id(due.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DeliveryStatus::RetryScheduled);
    assert_eq!(stored.attempt_number, 2);
    assert_eq!(stored.last_status_code, Some(503));
    assert!(stored.locked_until.is_none());

    // A released job no longer matches any lease.
    assert!(!app.jobs.update_claimed(&current, renewed).await.unwrap());
}

#[tokio::test]
async fn test_concurrent_claims_never_share_a_job() {
    let app = create_test_app().await;
    let endpoint_id = Uuid::new_v4();
    for _ in 0..10 {
        app.jobs
            .create(&scheduled_job(endpoint_id, Duration::seconds(-1)))
            .await
            .unwrap();
    }

    let now = Utc::now();
    let mut handles = Vec::new();
    for _ in 0..4 {
        let jobs = app.jobs.clone();
        handles.push(tokio::spawn(async move {
            jobs.claim_due(now, 10, Duration::seconds(30)).await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.extend(handle.await.unwrap().unwrap().into_iter().map(|j| j.id));
    }
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(total, 10);
    assert_eq!(ids.len(), 10);
}

#[tokio::test]
async fn test_find_by_endpoint_orders_by_creation() {
    let app = create_test_app().await;
    let endpoint_id = Uuid::new_v4();
    let first = scheduled_job(endpoint_id, Duration::seconds(5));
    let mut second = scheduled_job(endpoint_id, Duration::seconds(5));
    second.created_at = first.created_at + Duration::seconds(1);
    app.jobs.create(&second).await.unwrap();
    app.jobs.create(&first).await.unwrap();
    app.jobs
        .create(&scheduled_job(Uuid::new_v4(), Duration::seconds(5)))
        .await
        .unwrap();

    let ids: Vec<_> = app
        .jobs
        .find_by_endpoint(endpoint_id)
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.id)
        .collect();
    assert_eq!(ids, vec![first.id, second.id]);
}
