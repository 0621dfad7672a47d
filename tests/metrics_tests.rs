//! Tests for stagepack metrics module

use stagepack::PackMetrics;
use std::thread;
use std::time::Duration;

#[test]
fn test_metrics_basic() {
    let mut metrics = PackMetrics::new();

    thread::sleep(Duration::from_millis(10));
    metrics.mark_assets_fetched();

    thread::sleep(Duration::from_millis(5));
    metrics.mark_serialized();

    assert!(metrics.assets_fetched.is_some());
    assert!(metrics.serialized.is_some());
    assert!(metrics.serialized.unwrap() > metrics.assets_fetched.unwrap());
}

#[test]
fn test_time_phase() {
    let mut metrics = PackMetrics::new();

    let result = metrics.time_phase("fetch", || {
        thread::sleep(Duration::from_millis(5));
        42
    });

    assert_eq!(result, 42);
    assert_eq!(metrics.phases().len(), 1);
    assert!(metrics.phases()[0].1 >= Duration::from_millis(5));
}

#[test]
fn test_report_format() {
    let mut metrics = PackMetrics::new();
    metrics.mark_assets_fetched();
    metrics.mark_layout_transformed();
    metrics.add_phase("layout", Duration::from_millis(3));

    let report = metrics.report();
    assert!(report.contains("Packaging Performance"));
    assert!(report.contains("Assets fetched"));
    assert!(report.contains("Layout transformed"));
    assert!(!report.contains("Serialized"));
    assert!(report.contains("Detailed Phases"));
}
