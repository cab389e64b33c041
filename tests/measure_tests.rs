//! Measurement integration tests against a local mock HTTP server
//!
//! These run real transactions through the instrumented client and check
//! what ends up in the reported measurements.

use http_pinger::{
    types::{IpFamily, NameValue},
    HttpMeasure, Measure, Measurer, PingConfig, Pinger, RuntimeConfig, WebClient,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer, route: &str) -> PingConfig {
    let mut config = PingConfig::new(format!("{}{}", server.uri(), route));
    config.ip_family = IpFamily::V4;
    config.wait = Duration::from_secs(5);
    config
}

async fn measure_once(config: PingConfig) -> HttpMeasure {
    let mut client = WebClient::new(config, RuntimeConfig::new()).await.unwrap();
    client.do_measure(false).await
}

fn millis(measure: Measure) -> f64 {
    measure.as_millis_f64().unwrap_or_default()
}

#[tokio::test]
async fn test_plaintext_measure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/payload"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(1234)))
        .mount(&server)
        .await;

    let measure = measure_once(config_for(&server, "/payload")).await;

    assert!(!measure.is_failure, "unexpected failure: {}", measure.failure_cause);
    assert_eq!(measure.status_code, 200);
    assert_eq!(measure.bytes, 1234);
    assert_eq!(measure.proto, "HTTP/1.1");
    assert!(!measure.tls_enabled);
    assert!(!measure.tls_duration.is_valid());
    assert!(!measure.socket_reused);
    assert!(measure.in_bytes >= 1234);
    assert!(measure.out_bytes > 0);
    assert_eq!(measure.remote_addr, server.address().to_string());
}

#[tokio::test]
async fn test_phases_fit_inside_total() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(50)))
        .mount(&server)
        .await;

    let measure = measure_once(config_for(&server, "/")).await;

    assert!(measure.total_time.is_valid());
    assert!(measure.tcp_handshake.is_valid());
    assert!(measure.conn_establishment.is_valid());
    assert!(measure.request_sending.is_valid());
    assert!(measure.wait.is_valid());
    assert!(measure.response_ingesting.is_valid());

    assert!(millis(measure.wait) >= 45.0);
    assert!(millis(measure.tcp_handshake) <= millis(measure.conn_establishment));

    let sequential: f64 = measure.sequential_phases().iter().map(|m| millis(*m)).sum();
    assert!(sequential <= millis(measure.total_time) + 0.001);
}

#[tokio::test]
async fn test_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let measure = measure_once(config_for(&server, "/")).await;
    assert!(measure.is_failure);
    assert_eq!(measure.status_code, 503);
    assert_eq!(measure.failure_cause, "Server-side error");

    let mut config = config_for(&server, "/");
    config.ignore_server_errors = true;
    let measure = measure_once(config).await;
    assert!(!measure.is_failure);
    assert_eq!(measure.status_code, 503);
}

#[tokio::test]
async fn test_client_errors_are_answers() {
    let server = MockServer::start().await;

    let measure = measure_once(config_for(&server, "/missing")).await;
    assert!(!measure.is_failure);
    assert_eq!(measure.status_code, 404);
}

#[tokio::test]
async fn test_keep_alive_reuses_socket() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(2)
        .mount(&server)
        .await;

    let mut client = WebClient::new(config_for(&server, "/"), RuntimeConfig::new()).await.unwrap();
    let first = client.do_measure(false).await;
    let second = client.do_measure(false).await;

    assert!(!first.socket_reused);
    assert!(second.socket_reused);
    assert!(!second.tcp_handshake.is_valid());
    assert!(!second.dns_resolution.is_valid());
}

#[tokio::test]
async fn test_without_keep_alive_every_request_dials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("connection", "close"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = config_for(&server, "/");
    config.keep_alive = false;
    let mut client = WebClient::new(config, RuntimeConfig::new()).await.unwrap();
    let first = client.do_measure(false).await;
    let second = client.do_measure(false).await;

    assert_eq!(first.status_code, 200);
    assert!(!second.socket_reused);
    assert!(second.tcp_handshake.is_valid());
}

#[tokio::test]
async fn test_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/new"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("landed"))
        .mount(&server)
        .await;

    let not_followed = measure_once(config_for(&server, "/old")).await;
    assert_eq!(not_followed.status_code, 302);
    assert!(!not_followed.is_failure);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let runtime = RuntimeConfig::new().on_redirect(move |url| sink.lock().unwrap().push(url.to_string()));
    let mut client = WebClient::new(config_for(&server, "/old"), runtime).await.unwrap();

    let followed = client.do_measure(true).await;
    assert_eq!(followed.status_code, 200);
    assert_eq!(followed.bytes, 6);

    let expected = format!("{}/new", server.uri());
    assert_eq!(client.url(), expected);
    assert_eq!(*seen.lock().unwrap(), vec![expected.clone()]);

    // later rounds go straight to the adopted URL
    let again = client.do_measure(false).await;
    assert_eq!(again.status_code, 200);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_redirect_to_another_host() {
    let origin = MockServer::start().await;
    let landing = MockServer::start().await;
    let landing_authority = format!("localhost:{}", landing.address().port());
    let landing_url = format!("http://{}/landing", landing_authority);

    Mock::given(method("GET"))
        .and(path("/away"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", landing_url.as_str()))
        .expect(1)
        .mount(&origin)
        .await;
    Mock::given(method("GET"))
        .and(path("/landing"))
        .and(header("host", landing_authority.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string("second host"))
        .expect(2)
        .mount(&landing)
        .await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let runtime = RuntimeConfig::new().on_redirect(move |url| sink.lock().unwrap().push(url.to_string()));
    let mut client = WebClient::new(config_for(&origin, "/away"), runtime).await.unwrap();

    let followed = client.do_measure(true).await;
    assert!(!followed.is_failure, "unexpected failure: {}", followed.failure_cause);
    assert_eq!(followed.status_code, 200);
    assert_eq!(followed.bytes, 11);
    assert_eq!(followed.remote_addr, landing.address().to_string());

    assert_eq!(client.url(), landing_url);
    assert_eq!(client.connect_target(), landing_authority);
    assert_eq!(*seen.lock().unwrap(), vec![landing_url.clone()]);

    // the next round dials nothing new and never goes back to the origin
    let again = client.do_measure(false).await;
    assert_eq!(again.status_code, 200);
    assert_eq!(again.remote_addr, landing.address().to_string());
    assert!(again.socket_reused);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

/// The first connection gets a redirect whose body ends early; later
/// connections get a plain answer
async fn spawn_cut_redirect_server() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let first = counter.fetch_add(1, Ordering::SeqCst) == 0;
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let response: &[u8] = if first {
                    b"HTTP/1.1 302 Found\r\nlocation: /next\r\ncontent-length: 100\r\n\r\nshort"
                } else {
                    b"HTTP/1.1 200 OK\r\ncontent-length: 4\r\nconnection: close\r\n\r\ndone"
                };
                let _ = socket.write_all(response).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, accepted)
}

#[tokio::test]
async fn test_unreadable_redirect_body_drops_connection() {
    let (addr, accepted) = spawn_cut_redirect_server().await;

    let mut config = PingConfig::new(format!("http://{}/start", addr));
    config.wait = Duration::from_secs(5);
    let mut client = WebClient::new(config, RuntimeConfig::new()).await.unwrap();

    let measure = client.do_measure(true).await;

    assert!(!measure.is_failure, "unexpected failure: {}", measure.failure_cause);
    assert_eq!(measure.status_code, 200);
    assert_eq!(measure.bytes, 4);
    assert!(!measure.socket_reused);
    assert_eq!(client.url(), format!("http://{}/next", addr));
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_redirect_loop_is_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
        .mount(&server)
        .await;

    let mut client = WebClient::new(config_for(&server, "/loop"), RuntimeConfig::new()).await.unwrap();
    let measure = client.do_measure(true).await;
    assert!(measure.is_failure);
    assert_eq!(measure.status_code, 0);
}

#[tokio::test]
async fn test_host_override_and_request_decorations() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("host", "virtual.test"))
        .and(header("cookie", "session=abc"))
        .and(header("x-trace-tag", "1"))
        .and(query_param("q", "search"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config_for(&server, "/");
    config.headers = vec![NameValue::new("Host", "virtual.test"), NameValue::new("X-Trace-Tag", "1")];
    config.cookies = vec![NameValue::new("session", "abc")];
    config.parameters = vec![NameValue::new("q", "search")];

    let measure = measure_once(config).await;
    assert_eq!(measure.status_code, 204);
}

#[tokio::test]
async fn test_server_cookies_kept_across_rounds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("cookie", "token=t1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).insert_header("Set-Cookie", "token=t1; Path=/"))
        .mount(&server)
        .await;

    let mut config = config_for(&server, "/");
    config.keep_cookies = true;
    let mut client = WebClient::new(config.clone(), RuntimeConfig::new()).await.unwrap();
    assert_eq!(client.do_measure(false).await.status_code, 401);
    assert_eq!(client.do_measure(false).await.status_code, 200);

    config.keep_cookies = false;
    let mut client = WebClient::new(config, RuntimeConfig::new()).await.unwrap();
    assert_eq!(client.do_measure(false).await.status_code, 401);
    assert_eq!(client.do_measure(false).await.status_code, 401);
}

#[tokio::test]
async fn test_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let mut config = config_for(&server, "/");
    config.wait = Duration::from_millis(200);
    let measure = measure_once(config).await;

    assert!(measure.is_failure);
    assert_eq!(measure.status_code, 0);
    assert_eq!(measure.failure_cause, "Request timeout");
    assert!(!measure.total_time.is_valid());
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = PingConfig::new(format!("http://{}/", addr));
    config.wait = Duration::from_secs(2);
    let measure = measure_once(config).await;

    assert!(measure.is_failure);
    assert_eq!(measure.status_code, 0);
    assert!(!measure.failure_cause.is_empty());
}

#[tokio::test]
async fn test_conn_target_overrides_dialed_address() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("host", "unresolvable.invalid"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut config = PingConfig::new("http://unresolvable.invalid/");
    config.conn_target = Some(server.address().to_string());
    config.wait = Duration::from_secs(5);
    let measure = measure_once(config).await;

    assert_eq!(measure.status_code, 200);
    assert!(!measure.dns_resolution.is_valid());
    assert_eq!(measure.remote_addr, server.address().to_string());
}

#[tokio::test]
async fn test_pinger_reports_count_rounds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = config_for(&server, "/");
    config.count = Some(3);
    config.interval = Duration::from_millis(50);

    let pinger = Pinger::new(config, RuntimeConfig::new()).await.unwrap();
    let mut run = pinger.ping();

    let mut measures = Vec::new();
    while let Some(measure) = run.next().await {
        measures.push(measure);
    }
    run.finish().await.unwrap();

    assert_eq!(measures.len(), 3);
    assert!(measures.iter().all(|m| m.status_code == 200 && m.bytes == 4));
    // keep-alive runs without warm-up, so only the first round dials
    assert!(!measures[0].socket_reused);
    assert!(measures[1..].iter().all(|m| m.socket_reused));
}

#[tokio::test]
async fn test_pinger_warms_up_without_keep_alive() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = config_for(&server, "/");
    config.count = Some(2);
    config.interval = Duration::from_millis(20);
    config.keep_alive = false;

    let mut run = Pinger::new(config, RuntimeConfig::new()).await.unwrap().ping();
    let mut reported = 0;
    while let Some(measure) = run.next().await {
        assert!(!measure.socket_reused);
        reported += 1;
    }
    run.finish().await.unwrap();

    assert_eq!(reported, 2);
}
