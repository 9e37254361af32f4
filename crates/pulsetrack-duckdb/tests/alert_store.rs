use std::sync::Arc;

use chrono::{Duration, Utc};
use pulsetrack_core::alerts::{AlertCondition, CreateAlertRuleRequest};
use pulsetrack_core::analytics::AlertStore;
use pulsetrack_duckdb::DuckDbBackend;

fn request(site: &str, condition: AlertCondition, threshold: Option<f64>) -> CreateAlertRuleRequest {
    CreateAlertRuleRequest {
        site_id: site.to_string(),
        name: format!("{} rule", condition.as_str()),
        condition,
        threshold,
        time_window: Some(60),
        notification_email: Some("ops@example.com".to_string()),
    }
}

#[tokio::test]
async fn test_create_get_list_rules() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let rule = db
        .create_alert_rule(&request("site_1", AlertCondition::PageViewsSpike, Some(100.0)))
        .await
        .expect("create");
    assert!(rule.id.starts_with("alr_"));
    assert_eq!(rule.id.len(), 25);
    assert!(rule.is_active);
    assert_eq!(rule.time_window, 60);
    assert_eq!(rule.threshold, Some(100.0));
    assert_eq!(rule.last_fired_at, None);

    let fetched = db
        .get_alert_rule(&rule.id)
        .await
        .expect("get")
        .expect("exists");
    assert_eq!(fetched, rule);

    db.create_alert_rule(&request("site_2", AlertCondition::CustomEvent, None))
        .await
        .expect("create");
    let site_1 = db.list_active_alert_rules("site_1").await.expect("list");
    assert_eq!(site_1.len(), 1);
    assert!(db.get_alert_rule("alr_missing").await.expect("get").is_none());
}

#[tokio::test]
async fn test_default_time_window_applies() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let mut req = request("site_1", AlertCondition::ErrorRate, Some(5.0));
    req.time_window = None;
    let rule = db.create_alert_rule(&req).await.expect("create");
    assert_eq!(rule.time_window, 300);
}

#[tokio::test]
async fn test_deactivate_is_soft_and_single_shot() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let rule = db
        .create_alert_rule(&request("site_1", AlertCondition::ErrorRate, Some(5.0)))
        .await
        .expect("create");

    assert!(db.deactivate_alert_rule(&rule.id).await.expect("deactivate"));
    assert!(!db.deactivate_alert_rule(&rule.id).await.expect("deactivate"));
    assert!(!db.deactivate_alert_rule("alr_missing").await.expect("deactivate"));

    assert!(db.list_active_alert_rules("site_1").await.expect("list").is_empty());
    let kept = db
        .get_alert_rule(&rule.id)
        .await
        .expect("get")
        .expect("row kept");
    assert!(!kept.is_active);
}

#[tokio::test]
async fn test_claim_allows_one_fire_per_window() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let rule = db
        .create_alert_rule(&request("site_1", AlertCondition::PageViewsSpike, Some(1.0)))
        .await
        .expect("create");
    let now = Utc::now();
    let window = Duration::seconds(60);

    assert!(db.claim_alert_fire(&rule.id, now, window).await.expect("claim"));
    assert!(!db
        .claim_alert_fire(&rule.id, now + Duration::seconds(30), window)
        .await
        .expect("claim"));
    assert!(db
        .claim_alert_fire(&rule.id, now + Duration::seconds(61), window)
        .await
        .expect("claim"));

    let rule = db
        .get_alert_rule(&rule.id)
        .await
        .expect("get")
        .expect("exists");
    assert!(rule.last_fired_at.is_some());
}

#[tokio::test]
async fn test_release_restores_previous_fire_time() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let rule = db
        .create_alert_rule(&request("site_1", AlertCondition::CustomEvent, None))
        .await
        .expect("create");
    let now = Utc::now();
    let window = Duration::seconds(60);

    assert!(db.claim_alert_fire(&rule.id, now, window).await.expect("claim"));
    assert!(db
        .release_alert_fire(&rule.id, now, None)
        .await
        .expect("release"));
    let stored = db.get_alert_rule(&rule.id).await.expect("get").expect("exists");
    assert_eq!(stored.last_fired_at, None);

    // The slot is free again within the same window.
    let later = now + Duration::seconds(5);
    assert!(db.claim_alert_fire(&rule.id, later, window).await.expect("claim"));

    // A release for a claim that has been superseded leaves the newer one.
    assert!(!db
        .release_alert_fire(&rule.id, now, None)
        .await
        .expect("release"));
    assert!(!db
        .claim_alert_fire(&rule.id, later + Duration::seconds(1), window)
        .await
        .expect("claim"));
}

#[tokio::test]
async fn test_claim_with_unrepresentable_window_is_an_error() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let rule = db
        .create_alert_rule(&request("site_1", AlertCondition::CustomEvent, None))
        .await
        .expect("create");
    assert!(db
        .claim_alert_fire(&rule.id, Utc::now(), Duration::MAX)
        .await
        .is_err());
}

#[tokio::test]
async fn test_concurrent_claims_have_one_winner() {
    let db = Arc::new(DuckDbBackend::open_in_memory().expect("db"));
    let rule = db
        .create_alert_rule(&request("site_1", AlertCondition::CustomEvent, None))
        .await
        .expect("create");
    let now = Utc::now();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let db = db.clone();
        let id = rule.id.clone();
        handles.push(tokio::spawn(async move {
            db.claim_alert_fire(&id, now, Duration::seconds(300)).await
        }));
    }
    let mut winners = 0;
    for handle in handles {
        if handle.await.expect("join").expect("claim") {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_notifications_newest_first_with_clamped_limit() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let rule = db
        .create_alert_rule(&request("site_1", AlertCondition::CustomEvent, None))
        .await
        .expect("create");
    let now = Utc::now();
    for i in 0..3 {
        let n = db
            .insert_notification(&rule, &format!("message {i}"), now + Duration::seconds(i))
            .await
            .expect("insert");
        assert!(n.id.starts_with("ntf_"));
        assert_eq!(n.alert_name.as_deref(), Some("custom_event rule"));
        assert_eq!(n.notification_email.as_deref(), Some("ops@example.com"));
    }

    let listed = db.list_notifications("site_1", 50).await.expect("list");
    let messages: Vec<_> = listed.iter().map(|n| n.message.as_str()).collect();
    assert_eq!(messages, vec!["message 2", "message 1", "message 0"]);

    let one = db.list_notifications("site_1", 0).await.expect("list");
    assert_eq!(one.len(), 1);
    assert!(db.list_notifications("site_2", 50).await.expect("list").is_empty());
}

#[tokio::test]
async fn test_store_usable_through_trait_object() {
    let db = Arc::new(DuckDbBackend::open_in_memory().expect("db"));
    let store: Arc<dyn AlertStore> = db.clone();
    let rule = store
        .create_alert_rule(&request("site_1", AlertCondition::ErrorRate, Some(5.0)))
        .await
        .expect("create");
    assert_eq!(store.list_active_alert_rules("site_1").await.expect("list"), vec![rule]);
}
