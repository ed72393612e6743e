use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;
use serde_json::json;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};
use txrequest::{
    Locale, MemoryNavigator, Navigator, Notifier, OnlineFlag, PendingKey, RequestClient,
    RequestClientConfig, RequestError, UploadForm,
};
use wiremock::{
    matchers::{body_json, body_string, header, header_regex, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

#[derive(Default)]
struct Recorder {
    warnings: Mutex<Vec<String>>,
    alerts: Mutex<Vec<String>>,
}

impl Notifier for Recorder {
    fn warning(&self, message: &str) {
        self.warnings.lock().push(message.into());
    }

    fn alert(&self, message: &str) {
        self.alerts.lock().push(message.into());
    }
}

struct Harness {
    client: RequestClient,
    recorder: Arc<Recorder>,
    navigator: Arc<MemoryNavigator>,
    network: Arc<OnlineFlag>,
}

fn harness(base_url: &str, locale: Locale) -> Harness {
    let mut cfg = RequestClientConfig::default();
    cfg.with_base_url(base_url).with_locale(locale);
    let recorder = Arc::new(Recorder::default());
    let navigator = Arc::new(MemoryNavigator::new("/cart"));
    let network = Arc::new(OnlineFlag::default());
    let client = RequestClient::builder(cfg)
        .with_notifier(recorder.clone())
        .with_navigator(navigator.clone())
        .with_network_status(network.clone())
        .build()
        .unwrap();
    Harness {
        client,
        recorder,
        navigator,
        network,
    }
}

async fn server_harness(locale: Locale) -> (MockServer, Harness) {
    let server = MockServer::start().await;
    let h = harness(&format!("{}/dev", server.uri()), locale);
    (server, h)
}

fn envelope(status: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "status": status }))
}

/// GET sends query string and resolves with payload.
#[tokio::test]
async fn get_unwraps_payload() {
    let (server, h) = server_harness(Locale::En).await;
    Mock::given(method("GET"))
        .and(path("/dev/users"))
        .and(query_param("id", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "TX0000", "data": { "name": "a" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let data = h.client.get("/users", json!({ "id": 1 })).await.unwrap();
    assert_eq!(data, json!({ "name": "a" }));
    assert!(h.recorder.warnings.lock().is_empty());
    assert!(h.client.pending().is_empty());
}

/// Form POST keeps field order and content type, known failure code is shown.
#[tokio::test]
async fn post_form_known_failure() {
    let (server, h) = server_harness(Locale::ZhCn).await;
    Mock::given(method("POST"))
        .and(path("/dev/login"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string("u=a&p=b"))
        .respond_with(envelope("TX2011"))
        .expect(1)
        .mount(&server)
        .await;

    let err = h
        .client
        .post_form("/login", json!({ "u": "a", "p": "b" }))
        .await
        .unwrap_err();
    let env = err.envelope().unwrap();
    assert_eq!(env.status, "TX2011");
    assert_eq!(env.data, None);
    assert_eq!(*h.recorder.warnings.lock(), vec!["邮箱或密码错误".to_owned()]);
    assert_eq!(h.navigator.current_path(), "/cart");
}

/// JSON POST sends payload as is, unknown code uses generic message.
#[tokio::test]
async fn post_json_unknown_failure() {
    let (server, h) = server_harness(Locale::En).await;
    Mock::given(method("POST"))
        .and(path("/dev/orders"))
        .and(body_json(json!({ "items": [1, 2], "note": null })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "status": "TX9999", "msg": "?" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = h
        .client
        .post_json("/orders", json!({ "items": [1, 2], "note": null }))
        .await
        .unwrap_err();
    match err {
        RequestError::Application(env) => {
            assert_eq!(env.status, "TX9999");
            assert_eq!(env.extra.get("msg"), Some(&json!("?")));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(
        *h.recorder.warnings.lock(),
        vec!["request failed: TX9999".to_owned()]
    );
}

/// Session expiry redirects to login once.
#[tokio::test]
async fn session_expired_redirects() {
    let (server, h) = server_harness(Locale::En).await;
    Mock::given(path("/dev/profile"))
        .respond_with(envelope("TX2014"))
        .mount(&server)
        .await;

    let err = h.client.get("/profile", ()).await.unwrap_err();
    assert_eq!(err.envelope().map(|e| e.status.as_str()), Some("TX2014"));
    assert_eq!(h.navigator.current_path(), "/login?redirect=/cart");
    assert_eq!(
        *h.recorder.warnings.lock(),
        vec!["Not logged in or session has expired".to_owned()]
    );
}

/// Newer request with same URL and method cancels the older one.
#[tokio::test]
async fn same_key_supersedes() {
    let (server, h) = server_harness(Locale::En).await;
    Mock::given(method("GET"))
        .and(path("/dev/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "TX0000", "data": "done" }))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let first = tokio::spawn({
        let client = h.client.clone();
        async move { client.get("/search", json!({ "q": "a" })).await }
    });
    let key = PendingKey::new("/search", &reqwest::Method::GET);
    while !h.client.pending().contains(&key) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let second = h.client.get("/search", json!({ "q": "ab" })).await;

    let first = first.await.unwrap();
    assert!(first.unwrap_err().is_cancelled());
    assert_eq!(second.unwrap(), json!("done"));
    assert!(h.recorder.warnings.lock().is_empty());
    assert!(h.recorder.alerts.lock().is_empty());
    assert!(h.client.pending().is_empty());
}

/// Server which sends response headers at once and the envelope body after a delay.
///
/// Returns base URL and number of responses whose headers were already sent.
async fn slow_body_server(body_delay: Duration) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let started = Arc::new(AtomicUsize::new(0));
    let counter = started.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };
            let seq = counter.load(Ordering::SeqCst) + 1;
            let counter = counter.clone();
            tokio::spawn(async move {
                let mut req = Vec::new();
                let mut buf = [0_u8; 1024];
                while !req.windows(4).any(|w| w == b"\r\n\r\n") {
                    match sock.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => req.extend_from_slice(&buf[..n]),
                    }
                }
                let body = json!({ "status": "TX0000", "data": format!("resp{seq}") }).to_string();
                let head = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                     content-length: {}\r\nconnection: close\r\n\r\n",
                    body.len()
                );
                if sock.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                let _ = sock.flush().await;
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(body_delay).await;
                let _ = sock.write_all(body.as_bytes()).await;
                let _ = sock.shutdown().await;
            });
        }
    });
    (format!("http://{addr}/dev"), started)
}

/// Request whose body is still downloading is cancelled by a newer one with the same key.
#[tokio::test]
async fn same_key_supersedes_while_reading_body() {
    let (base_url, started) = slow_body_server(Duration::from_millis(400)).await;
    let h = harness(&base_url, Locale::En);

    let first = tokio::spawn({
        let client = h.client.clone();
        async move { client.get("/search", ()).await }
    });
    while started.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    let key = PendingKey::new("/search", &reqwest::Method::GET);
    assert!(h.client.pending().contains(&key));
    assert!(!first.is_finished());

    let second = h.client.get("/search", ()).await;
    let first = first.await.unwrap();
    assert!(first.unwrap_err().is_cancelled());
    assert_eq!(second.unwrap(), json!("resp2"));
    assert!(h.recorder.alerts.lock().is_empty());
    assert!(h.client.pending().is_empty());
}

/// Abandoned request does not stay in the pending list.
#[tokio::test]
async fn dropped_request_leaves_no_record() {
    let (server, h) = server_harness(Locale::En).await;
    Mock::given(path("/dev/slow"))
        .respond_with(envelope("TX0000").set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let res = tokio::time::timeout(Duration::from_millis(50), h.client.get("/slow", ())).await;
    assert!(res.is_err());
    assert!(h.client.pending().is_empty());
}

/// Different methods on the same URL run side by side.
#[tokio::test]
async fn different_method_not_superseded() {
    let (server, h) = server_harness(Locale::En).await;
    Mock::given(path("/dev/cart"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "TX0000", "data": 1 }))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let (get, post) = tokio::join!(
        h.client.get("/cart", ()),
        h.client.post_json("/cart", json!({}))
    );
    assert_eq!(get.unwrap(), json!(1));
    assert_eq!(post.unwrap(), json!(1));
}

/// Non-success HTTP status raises an alert.
#[tokio::test]
async fn http_status_alerts() {
    let (server, h) = server_harness(Locale::En).await;
    Mock::given(path("/dev/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = h.client.get("/broken", ()).await.unwrap_err();
    assert!(matches!(err, RequestError::Status(status) if status.as_u16() == 500));
    assert_eq!(
        *h.recorder.alerts.lock(),
        vec!["Request failed with status code 500".to_owned()]
    );
    assert!(h.client.pending().is_empty());
}

/// Body which is not an envelope is a failure.
#[tokio::test]
async fn invalid_body_alerts() {
    let (server, h) = server_harness(Locale::En).await;
    Mock::given(path("/dev/html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&server)
        .await;

    let err = h.client.get("/html", ()).await.unwrap_err();
    assert!(matches!(err, RequestError::Decode(_)));
    assert_eq!(h.recorder.alerts.lock().len(), 1);
}

/// Offline state replaces the alert with a notification.
#[tokio::test]
async fn offline_notifies() {
    let (server, h) = server_harness(Locale::ZhCn).await;
    Mock::given(path("/dev/broken"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    h.network.set(false);

    let err = h.client.get("/broken", ()).await.unwrap_err();
    assert!(matches!(err, RequestError::Status(_)));
    assert_eq!(
        *h.recorder.warnings.lock(),
        vec!["请求出错了：没有网络!".to_owned()]
    );
    assert!(h.recorder.alerts.lock().is_empty());
}

/// Connection failure raises an alert.
#[tokio::test]
async fn connection_refused_alerts() {
    let h = harness("http://127.0.0.1:1/dev", Locale::En);
    let err = h.client.get("/users", ()).await.unwrap_err();
    assert!(matches!(err, RequestError::Transport(_)));
    assert_eq!(h.recorder.alerts.lock().len(), 1);
    assert!(h.client.pending().is_empty());
}

/// Multipart upload reports cumulative progress up to total size.
#[tokio::test]
async fn upload_reports_progress() {
    let (server, h) = server_harness(Locale::En).await;
    Mock::given(method("POST"))
        .and(path("/dev/upload"))
        .and(header_regex("content-type", "^multipart/form-data; boundary="))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "TX0000", "data": { "id": 7 } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let form = UploadForm::new()
        .with_chunk_size(1024)
        .text("title", "avatar")
        .file("file", "avatar.png", vec![7_u8; 5000])
        .mime("image/png");
    let total = form.total_len().unwrap();
    let ticks = Arc::new(Mutex::new(Vec::new()));
    let ticks_cb = ticks.clone();
    let data = h
        .client
        .upload_file(
            "/upload",
            form,
            Some(Arc::new(move |loaded: u64, total: u64| {
                ticks_cb.lock().push((loaded, total));
            })),
        )
        .await
        .unwrap();

    assert_eq!(data, json!({ "id": 7 }));
    let ticks = ticks.lock();
    assert!(!ticks.is_empty());
    assert!(ticks.windows(2).all(|w| w[0].0 <= w[1].0));
    assert!(ticks.iter().all(|&(_, t)| t == total));
    assert_eq!(ticks.last(), Some(&(total, total)));
}

/// Unknown upload size disables progress reporting.
#[tokio::test]
async fn upload_unknown_size_no_progress() {
    let (server, h) = server_harness(Locale::En).await;
    Mock::given(path("/dev/upload"))
        .respond_with(envelope("TX0000"))
        .mount(&server)
        .await;

    let chunks = futures::stream::iter(vec![Ok(bytes::Bytes::from_static(b"abc"))]);
    let form = UploadForm::new().file_stream("file", "a.txt", chunks, None);
    let called = Arc::new(Mutex::new(false));
    let called_cb = called.clone();
    let data = h
        .client
        .upload_file(
            "/upload",
            form,
            Some(Arc::new(move |_: u64, _: u64| *called_cb.lock() = true)),
        )
        .await
        .unwrap();

    assert_eq!(data, serde_json::Value::Null);
    assert!(!*called.lock());
}
