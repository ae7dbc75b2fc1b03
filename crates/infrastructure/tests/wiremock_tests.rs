//! Integration tests for the resilient DAV transport
//!
//! Tests cover:
//! - Authentication and correlation headers
//! - Retry gating by request kind
//! - Per-host circuit breaking and half-open probing
//! - Audit sink selection

use std::time::Duration;

use application::{
    DavCredentials, DavError, DavMethod, DavRequest, RequestContext, TransportFailure,
    TransportPort,
};
use infrastructure::{
    AuditConfig, CircuitBreakerConfig, CircuitState, HttpDavTransport, RetryConfig,
    TransportConfig, audit_log_from_config,
};
use uuid::Uuid;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ctx() -> RequestContext {
    RequestContext::new(DavCredentials::new("alice", "secret"))
}

fn transport(max_retries: u32, failure_threshold: u32, cooldown: Duration) -> HttpDavTransport {
    HttpDavTransport::new(
        &TransportConfig::default(),
        RetryConfig::new(1, 5, 2.0, max_retries).without_jitter(),
        CircuitBreakerConfig::custom(failure_threshold, cooldown),
    )
    .unwrap()
}

fn get(server: &MockServer, p: &str) -> DavRequest {
    DavRequest::new(DavMethod::Get, format!("{}{p}", server.uri()))
}

// ============================================================================
// Request Shaping
// ============================================================================

mod request_tests {
    use super::*;

    #[tokio::test]
    async fn forwards_basic_auth_and_request_id() {
        let server = MockServer::start().await;
        let request_id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/evt.ics"))
            .and(header("authorization", "Basic YWxpY2U6c2VjcmV0"))
            .and(header("x-request-id", request_id.to_string().as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"etag-1\"")
                    .set_body_string("BEGIN:VCALENDAR"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = transport(0, 5, Duration::from_secs(30));
        let ctx = RequestContext::with_request_id(DavCredentials::new("alice", "secret"), request_id);
        let response = transport.execute(&ctx, get(&server, "/evt.ics")).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.etag().unwrap().as_str(), "\"etag-1\"");
        assert_eq!(response.body, "BEGIN:VCALENDAR");
    }

    #[tokio::test]
    async fn sends_report_with_body_and_depth() {
        let server = MockServer::start().await;

        Mock::given(method("REPORT"))
            .and(path("/cal/"))
            .and(header("depth", "1"))
            .and(header_exists("content-type"))
            .respond_with(ResponseTemplate::new(207).set_body_string("<d:multistatus/>"))
            .expect(1)
            .mount(&server)
            .await;

        let request = DavRequest::new(DavMethod::Report, format!("{}/cal/", server.uri()))
            .with_header("Depth", "1")
            .with_body("application/xml; charset=utf-8", "<c:calendar-query/>");
        let response = transport(0, 5, Duration::from_secs(30))
            .execute(&ctx(), request)
            .await
            .unwrap();
        assert_eq!(response.status, 207);
    }

    #[tokio::test]
    async fn client_errors_are_returned_not_raised() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(412))
            .expect(1)
            .mount(&server)
            .await;

        let request = DavRequest::new(DavMethod::Put, format!("{}/evt.ics", server.uri()))
            .with_header("If-Match", "\"old\"")
            .with_body("text/calendar", "BEGIN:VCALENDAR");
        let response = transport(3, 5, Duration::from_secs(30))
            .execute(&ctx(), request)
            .await
            .unwrap();
        assert_eq!(response.status, 412);
    }
}

// ============================================================================
// Retry Gating
// ============================================================================

mod retry_tests {
    use super::*;

    #[tokio::test]
    async fn reads_are_retried_on_gateway_errors() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let err = transport(2, 10, Duration::from_secs(30))
            .execute(&ctx(), get(&server, "/evt.ics"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DavError::Transport {
                kind: TransportFailure::Status(503),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn read_recovers_after_transient_failure() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let response = transport(2, 10, Duration::from_secs(30))
            .execute(&ctx(), get(&server, "/evt.ics"))
            .await
            .unwrap();
        assert_eq!(response.body, "ok");
    }

    #[tokio::test]
    async fn conditional_writes_are_retried() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(504))
            .expect(3)
            .mount(&server)
            .await;

        let request = DavRequest::new(DavMethod::Put, format!("{}/evt.ics", server.uri()))
            .with_header("If-Match", "\"etag-1\"")
            .with_body("text/calendar", "BEGIN:VCALENDAR");
        let result = transport(2, 10, Duration::from_secs(30))
            .execute(&ctx(), request)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unguarded_writes_are_sent_once() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let request = DavRequest::new(DavMethod::Delete, format!("{}/evt.ics", server.uri()));
        let err = transport(3, 10, Duration::from_secs(30))
            .execute(&ctx(), request)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn slow_reads_time_out_and_retry() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .expect(2)
            .mount(&server)
            .await;

        let request = get(&server, "/slow").with_timeout(Duration::from_millis(50));
        let err = transport(1, 10, Duration::from_secs(30))
            .execute(&ctx(), request)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DavError::Transport {
                kind: TransportFailure::Timeout,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn refused_connection_is_a_connect_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let request = DavRequest::new(DavMethod::Put, format!("http://127.0.0.1:{port}/evt.ics"));
        let err = transport(1, 10, Duration::from_secs(30))
            .execute(&ctx(), request)
            .await
            .unwrap_err();
        assert!(err.is_pre_send());
    }
}

// ============================================================================
// Circuit Breaker
// ============================================================================

mod breaker_tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_threshold_without_further_requests() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let transport = transport(0, 3, Duration::from_secs(60));
        for _ in 0..3 {
            let err = transport
                .execute(&ctx(), get(&server, "/evt.ics"))
                .await
                .unwrap_err();
            assert!(matches!(err, DavError::Transport { .. }));
        }

        let err = transport
            .execute(&ctx(), get(&server, "/evt.ics"))
            .await
            .unwrap_err();
        assert!(matches!(err, DavError::CircuitOpen { .. }));
        assert_eq!(
            transport.circuit_state(&server.uri()),
            Some(CircuitState::Open)
        );
    }

    #[tokio::test]
    async fn client_errors_do_not_trip_the_breaker() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let transport = transport(0, 2, Duration::from_secs(60));
        for _ in 0..5 {
            let response = transport
                .execute(&ctx(), get(&server, "/missing.ics"))
                .await
                .unwrap();
            assert_eq!(response.status, 404);
        }
        assert_eq!(
            transport.circuit_state(&server.uri()),
            Some(CircuitState::Closed)
        );
    }

    #[tokio::test]
    async fn probe_after_cooldown_closes_circuit() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let transport = transport(0, 2, Duration::from_millis(100));
        for _ in 0..2 {
            transport
                .execute(&ctx(), get(&server, "/evt.ics"))
                .await
                .unwrap_err();
        }
        assert!(matches!(
            transport
                .execute(&ctx(), get(&server, "/evt.ics"))
                .await
                .unwrap_err(),
            DavError::CircuitOpen { .. }
        ));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(
            transport.circuit_state(&server.uri()),
            Some(CircuitState::HalfOpen)
        );

        transport
            .execute(&ctx(), get(&server, "/evt.ics"))
            .await
            .unwrap();
        assert_eq!(
            transport.circuit_state(&server.uri()),
            Some(CircuitState::Closed)
        );
        transport
            .execute(&ctx(), get(&server, "/evt.ics"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn breakers_are_independent_per_host() {
        let failing = MockServer::start().await;
        let healthy = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&failing)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&healthy)
            .await;

        let transport = transport(0, 1, Duration::from_secs(60));
        transport
            .execute(&ctx(), get(&failing, "/x"))
            .await
            .unwrap_err();
        assert_eq!(
            transport.circuit_state(&failing.uri()),
            Some(CircuitState::Open)
        );

        transport.execute(&ctx(), get(&healthy, "/x")).await.unwrap();
    }
}

// ============================================================================
// Audit Sink Selection
// ============================================================================

mod audit_tests {
    use domain::{AuditEntry, AuditOperation, AuditOutcome, EntityKind};

    use super::*;

    #[tokio::test]
    async fn enabled_config_writes_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let sink = audit_log_from_config(&AuditConfig {
            enabled: true,
            path: path.clone(),
        });

        sink.record(AuditEntry::new(
            AuditOperation::Delete,
            EntityKind::Contact,
            "c-1",
            AuditOutcome::NotFound,
        ))
        .await;

        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("\"not_found\""));
    }

    #[tokio::test]
    async fn disabled_config_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let sink = audit_log_from_config(&AuditConfig {
            enabled: false,
            path: path.clone(),
        });

        sink.record(AuditEntry::new(
            AuditOperation::Create,
            EntityKind::Event,
            "e-1",
            AuditOutcome::Applied,
        ))
        .await;

        assert!(!path.exists());
    }
}
