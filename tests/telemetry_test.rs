//! Integration tests for telemetry initialization and span helpers.

use carscan::model::ImageRef;

#[test]
fn telemetry_initializes_without_endpoint() {
    // Note: tracing subscriber can only be set once per process.
    // This may return Err if a global subscriber was already set by
    // another test in this process; that is acceptable.
    let config = carscan::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "carscan-test".to_string(),
        log_level: "debug".to_string(),
    };
    let _guard = carscan::telemetry::init_telemetry(config);
}

#[test]
fn worker_span_records_transitions() {
    let span = carscan::telemetry::work::start_worker_span("consumer", "car_images");
    carscan::telemetry::work::record_state_transition(&span, "consumer", "AwaitingQueue", "Draining");
    carscan::telemetry::work::record_state_transition(&span, "consumer", "Draining", "Flushing");
}

#[test]
fn vision_span_records_result_count() {
    let image = ImageRef::new("car-images", "a.jpg");
    let span = carscan::telemetry::vision::start_vision_span("detect_text", &image);
    carscan::telemetry::vision::record_result_count(&span, 3);
}

#[test]
fn metric_instruments_accept_measurements_without_provider() {
    use opentelemetry::KeyValue;

    carscan::telemetry::metrics::queue_operations().add(
        1,
        &[
            KeyValue::new("queue", "car_images"),
            KeyValue::new("operation", "send"),
        ],
    );
    carscan::telemetry::metrics::images_classified().add(1, &[KeyValue::new("result", "matched")]);
    carscan::telemetry::metrics::results_flushed().add(2, &[]);
}
