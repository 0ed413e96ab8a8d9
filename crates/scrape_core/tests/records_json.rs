use std::time::Duration;

use pretty_assertions::assert_eq;
use scrape_core::{
    FieldMap, FieldValue, Job, JobId, QueueConfig, ScrapeConfig, ScrapeMode, ScrapeResult, Strategy,
};
use serde_json::json;

#[test]
fn scrape_result_uses_camel_case_and_untagged_values() {
    let mut data = FieldMap::new();
    data.insert("title".into(), FieldValue::from("Hello"));
    data.insert(
        "links".into(),
        FieldValue::from(vec!["a".to_string(), "b".to_string()]),
    );
    let result = ScrapeResult::succeeded("https://example.com", data, Strategy::Dynamic);

    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["url"], json!("https://example.com"));
    assert_eq!(value["success"], json!(true));
    assert_eq!(value["mode"], json!("dynamic"));
    assert_eq!(value["data"]["title"], json!("Hello"));
    assert_eq!(value["data"]["links"], json!(["a", "b"]));
    assert!(value.get("scrapedAt").is_some());
    assert!(value.get("error").is_none());
}

#[test]
fn failed_result_carries_error_and_empty_data() {
    let result = ScrapeResult::failed("https://example.com", "boom", Strategy::Static);
    assert!(!result.success);
    assert!(result.data.is_empty());
    assert!(!result.has_data());

    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["error"], json!("boom"));
    assert_eq!(value["data"], json!({}));
}

#[test]
fn has_data_ignores_empty_strings_and_lists() {
    let mut data = FieldMap::new();
    data.insert("a".into(), FieldValue::from(""));
    data.insert("b".into(), FieldValue::List(Vec::new()));
    let mut result = ScrapeResult::succeeded("u", data, Strategy::Static);
    assert!(!result.has_data());

    result.data.insert("c".into(), FieldValue::from("x"));
    assert!(result.has_data());
}

#[test]
fn job_serializes_with_lowercase_status() {
    let job = Job::new(JobId::from("job_42"), 5);
    let value = serde_json::to_value(&job).unwrap();

    assert_eq!(value["id"], json!("job_42"));
    assert_eq!(value["status"], json!("pending"));
    assert_eq!(value["totalUrls"], json!(5));
    assert_eq!(value["completedUrls"], json!(0));
    assert_eq!(value["results"], json!([]));
    assert!(value.get("createdAt").is_some());
    assert!(value.get("updatedAt").is_some());
}

#[test]
fn scrape_config_builder_and_defaults() {
    let config = ScrapeConfig::new("https://example.com")
        .with_selector("title", "h1")
        .with_mode(ScrapeMode::Static)
        .with_timeout(Duration::from_secs(2))
        .with_wait_for_selector("#app")
        .with_proxy("http://127.0.0.1:8080");

    assert_eq!(config.field_selectors.get("title").map(String::as_str), Some("h1"));
    assert_eq!(config.mode, ScrapeMode::Static);
    assert_eq!(config.timeout(), Duration::from_secs(2));
    assert_eq!(config.wait_for_selector.as_deref(), Some("#app"));
    assert_eq!(config.proxy.as_deref(), Some("http://127.0.0.1:8080"));

    let parsed: ScrapeConfig =
        serde_json::from_value(json!({ "url": "https://x.example" })).unwrap();
    assert_eq!(parsed.mode, ScrapeMode::Auto);
    assert_eq!(parsed.timeout_ms, 300_000);
    assert!(parsed.field_selectors.is_empty());
}

#[test]
fn queue_config_defaults_and_zero_concurrency() {
    let config = QueueConfig::default();
    assert_eq!(config.concurrency, 3);
    assert_eq!(config.delay(), Duration::from_millis(1000));
    assert_eq!(config.timeout(), Duration::from_millis(30_000));

    let zero = QueueConfig {
        concurrency: 0,
        ..QueueConfig::default()
    };
    assert_eq!(zero.effective_concurrency(), 1);

    let partial: QueueConfig = serde_json::from_value(json!({ "concurrency": 8 })).unwrap();
    assert_eq!(partial.concurrency, 8);
    assert_eq!(partial.delay_ms, 1000);
}
