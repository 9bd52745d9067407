//! End-to-end tests
//!
//! Each test starts a real server on an ephemeral port and talks to it with
//! the minirpc client (or with reqwest when raw HTTP matters).

use async_trait::async_trait;
use minirpc_client::{Client, ClientOptions, InvokeOption};
use minirpc_common::{
    code, AbortCall, CallContext, Enveloped, Lifecycle, Metadata, Result, RpcError,
    STATUS_CODE_HEADER, STATUS_MSG_HEADER, TRACE_ID_HEADER,
};
use minirpc_server::{
    AnyMessage, Interceptor, MethodDesc, Next, Server, ServerConfig, ServerHandle, ServerOptions,
    ServiceDesc,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Reply {
    data: String,
}

fn echo_service() -> ServiceDesc {
    ServiceDesc::new("Echo")
        .method(MethodDesc::new("Say", |_ctx, req: Reply| async move {
            Ok(Enveloped(req))
        }))
        .method(MethodDesc::new("Ping", |_ctx, req: Value| async move { Ok(req) }))
        .method(MethodDesc::new("Fail", |_ctx, _req: Value| async move {
            Err::<Value, _>(RpcError::status(1001, "nope"))
        }))
        .method(MethodDesc::new("FailWrapped", |_ctx, _req: Value| async move {
            Err::<Enveloped<Option<Reply>>, _>(RpcError::status(1001, "nope"))
        }))
        .method(MethodDesc::new("Panic", |_ctx, _req: Value| async move {
            if true {
                panic!("handler exploded");
            }
            Ok(Value::Null)
        }))
        .method(MethodDesc::new("Abort", |_ctx, _req: Value| async move {
            if true {
                std::panic::panic_any(AbortCall);
            }
            Ok(Value::Null)
        }))
        .method(MethodDesc::new("Sleep", |_ctx, ms: u64| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(ms)
        }))
        .method(MethodDesc::new("Whoami", |ctx: CallContext, _req: ()| async move {
            Ok(json!({
                "token": ctx.incoming_token(),
                "ldap": ctx.incoming_ldap(),
                "trace": ctx.trace_id(),
            }))
        }))
}

async fn start(config: ServerConfig, register: impl FnOnce(&mut Server)) -> (ServerHandle, Client) {
    let mut server = Server::new(config.with_addr("127.0.0.1:0"), ServerOptions::default());
    register(&mut server);
    let handle = server.start().await.unwrap();
    let client = Client::new(
        "e2e",
        handle.local_addr().to_string(),
        ClientOptions::new(),
    )
    .await
    .unwrap();
    (handle, client)
}

async fn start_echo() -> (ServerHandle, Client) {
    start(ServerConfig::default(), |server| {
        server.register_service(echo_service()).unwrap();
    })
    .await
}

fn ctx() -> CallContext {
    CallContext::new()
}

// ============================================================================
// Envelope round trips
// ============================================================================

#[tokio::test]
async fn test_wrapped_round_trip() {
    let (handle, client) = start_echo().await;

    let reply: Enveloped<Reply> = client
        .invoke(&ctx(), "/Echo/Say", Some(&Reply { data: "x".into() }), &[])
        .await
        .unwrap();
    assert_eq!(reply.0, Reply { data: "x".into() });

    handle.stop().await;
}

#[tokio::test]
async fn test_wrong_expected_code() {
    let (handle, client) = start_echo().await;

    let err = client
        .invoke::<_, Enveloped<Reply>>(
            &ctx(),
            "/Echo/Say",
            Some(&Reply { data: "x".into() }),
            &[InvokeOption::expected_code(7)],
        )
        .await
        .unwrap_err();

    match &err {
        RpcError::UnexpectedCode {
            expected, actual, ..
        } => {
            assert_eq!(*expected, 7);
            assert_eq!(*actual, code::OK);
        }
        other => panic!("unexpected error: {}", other),
    }
    let msg = err.to_string();
    assert!(msg.contains("expected 7") && msg.contains("got 0"), "{}", msg);

    handle.stop().await;
}

#[tokio::test]
async fn test_wrapped_error_is_enveloped() {
    let (handle, client) = start_echo().await;

    let reply: Enveloped<Option<Reply>> = client
        .invoke(
            &ctx(),
            "/Echo/FailWrapped",
            None::<&()>,
            &[InvokeOption::expected_code(1001)],
        )
        .await
        .unwrap();
    assert!(reply.0.is_none());

    let err = client
        .invoke::<(), Enveloped<Option<Reply>>>(&ctx(), "/Echo/FailWrapped", None, &[])
        .await
        .unwrap_err();
    assert_eq!(err.code(), 1001);

    handle.stop().await;
}

#[tokio::test]
async fn test_raw_error_uses_status_headers() {
    let (handle, client) = start_echo().await;

    let err = client
        .invoke::<_, Value>(&ctx(), "/Echo/Fail", Some(&json!({})), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Status { code: 1001, ref message } if message == "nope"));

    handle.stop().await;
}

#[tokio::test]
async fn test_raw_error_keeps_utf8_message() {
    let (handle, client) = start(ServerConfig::default(), |server| {
        server
            .register_service(ServiceDesc::new("Intl").method(MethodDesc::new(
                "Fail",
                |_ctx, _req: Value| async move {
                    Err::<Value, _>(RpcError::status(1002, "échec: données invalides"))
                },
            )))
            .unwrap();
    })
    .await;

    let err = client
        .invoke::<_, Value>(&ctx(), "/Intl/Fail", Some(&json!({})), &[])
        .await
        .unwrap_err();
    assert!(
        matches!(err, RpcError::Status { code: 1002, ref message } if message == "échec: données invalides"),
        "{:?}",
        err
    );

    handle.stop().await;
}

#[tokio::test]
async fn test_raw_bad_request() {
    let (handle, _client) = start_echo().await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/Echo/Ping", handle.local_addr()))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(resp.headers()[STATUS_CODE_HEADER], "400");

    handle.stop().await;
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let (handle, client) = start_echo().await;

    let err = client
        .invoke::<(), Value>(&ctx(), "/Echo/Missing", None, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::NotFound { ref path } if path == "/Echo/Missing"));

    // the server keeps serving
    let pong: Value = client
        .invoke(&ctx(), "/Echo/Ping", Some(&json!({"n": 1})), &[])
        .await
        .unwrap();
    assert_eq!(pong, json!({"n": 1}));

    handle.stop().await;
}

#[tokio::test]
async fn test_wrong_verb_is_not_found() {
    let (handle, _client) = start_echo().await;

    let resp = reqwest::Client::new()
        .get(format!("http://{}/Echo/Ping", handle.local_addr()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(resp.headers()[STATUS_CODE_HEADER], "404");
    assert_eq!(resp.headers()[STATUS_MSG_HEADER], "not found");

    handle.stop().await;
}

#[tokio::test]
async fn test_reserved_headers_and_trace_id() {
    let (handle, _client) = start_echo().await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/Echo/Ping", handle.local_addr()))
        .header(TRACE_ID_HEADER, "trace-123")
        .body("[1,2]")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()[STATUS_CODE_HEADER], "0");
    assert_eq!(resp.headers()[STATUS_MSG_HEADER], "success");
    assert_eq!(resp.headers()[TRACE_ID_HEADER], "trace-123");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!([1, 2]));

    handle.stop().await;
}

// ============================================================================
// Metadata
// ============================================================================

#[tokio::test]
async fn test_metadata_reaches_handler() {
    let (handle, client) = start_echo().await;

    let mut call = CallContext::new().with_trace_id("t-1");
    call.append_outgoing(&Metadata::new().with("token", "secret"));
    let who: Value = client
        .invoke(
            &call,
            "/Echo/Whoami",
            None::<&()>,
            &[InvokeOption::metadata(Metadata::new().with("ldap", "alice"))],
        )
        .await
        .unwrap();

    assert_eq!(who, json!({"token": "secret", "ldap": "alice", "trace": "t-1"}));

    handle.stop().await;
}

// ============================================================================
// Interceptors
// ============================================================================

struct Record {
    name: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl Interceptor for Record {
    async fn intercept(&self, ctx: CallContext, req: AnyMessage, next: Next<'_>) -> Result<AnyMessage> {
        self.log.lock().push(self.name);
        next.run(ctx, req).await
    }
}

/// Rejects calls that carry no token
struct RequireToken;

#[async_trait]
impl Interceptor for RequireToken {
    async fn intercept(&self, ctx: CallContext, req: AnyMessage, next: Next<'_>) -> Result<AnyMessage> {
        if ctx.incoming_token().is_none() {
            return Err(RpcError::status(401, "missing token"));
        }
        next.run(ctx, req).await
    }
}

#[tokio::test]
async fn test_interceptor_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let handler_log = log.clone();

    let service = ServiceDesc::new("Order")
        .with_interceptor(Arc::new(Record {
            name: "service",
            log: log.clone(),
        }))
        .method(MethodDesc::new("Run", move |_ctx, req: Value| {
            handler_log.lock().push("handler");
            async move { Ok(req) }
        }));

    let interceptors: Vec<Arc<dyn Interceptor>> = vec![
        Arc::new(Record {
            name: "A",
            log: log.clone(),
        }),
        Arc::new(Record {
            name: "B",
            log: log.clone(),
        }),
    ];
    let (handle, client) = start(ServerConfig::default(), |server| {
        server.register_service_with(service, interceptors).unwrap();
    })
    .await;

    let _: Value = client
        .invoke(&ctx(), "/Order/Run", Some(&json!(1)), &[])
        .await
        .unwrap();
    assert_eq!(*log.lock(), vec!["service", "A", "B", "handler"]);

    handle.stop().await;
}

#[tokio::test]
async fn test_interceptor_short_circuit() {
    let called = Arc::new(Mutex::new(0));
    let counter = called.clone();
    let service = ServiceDesc::new("Secure").method(MethodDesc::new("Get", move |_ctx, _req: ()| {
        *counter.lock() += 1;
        async move { Ok(Enveloped(json!({"secret": 42}))) }
    }));

    let (handle, client) = start(ServerConfig::default(), |server| {
        server
            .register_service_with(service, vec![Arc::new(RequireToken)])
            .unwrap();
    })
    .await;

    let err = client
        .invoke::<(), Enveloped<Value>>(&ctx(), "/Secure/Get", None, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::UnexpectedCode { actual: 401, .. }));
    assert_eq!(*called.lock(), 0);

    let ok: Enveloped<Value> = client
        .invoke(
            &ctx(),
            "/Secure/Get",
            None::<&()>,
            &[InvokeOption::metadata(Metadata::new().with("token", "t"))],
        )
        .await
        .unwrap();
    assert_eq!(ok.0, json!({"secret": 42}));
    assert_eq!(*called.lock(), 1);

    handle.stop().await;
}

// ============================================================================
// Fault isolation
// ============================================================================

#[tokio::test]
async fn test_panic_is_recovered() {
    let (handle, client) = start_echo().await;

    let err = client
        .invoke::<(), Value>(&ctx(), "/Echo/Panic", None, &[])
        .await
        .unwrap_err();
    assert_eq!(err.code(), code::INTERNAL);
    assert!(err.to_string().contains("handler exploded"), "{}", err);

    let pong: Value = client
        .invoke(&ctx(), "/Echo/Ping", Some(&json!("still up")), &[])
        .await
        .unwrap();
    assert_eq!(pong, json!("still up"));

    handle.stop().await;
}

#[tokio::test]
async fn test_abort_drops_connection() {
    let (handle, client) = start_echo().await;

    let err = client
        .invoke::<(), Value>(&ctx(), "/Echo/Abort", None, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Transport { .. }), "{}", err);
    assert!(err.is_retryable());

    let pong: Value = client
        .invoke(&ctx(), "/Echo/Ping", Some(&json!(true)), &[])
        .await
        .unwrap();
    assert_eq!(pong, json!(true));

    handle.stop().await;
}

#[tokio::test]
async fn test_handler_deadline() {
    let (handle, client) = start(ServerConfig::default().with_handler_timeout_ms(50), |server| {
        server.register_service(echo_service()).unwrap();
    })
    .await;

    let err = client
        .invoke::<_, u64>(&ctx(), "/Echo/Sleep", Some(&2_000u64), &[])
        .await
        .unwrap_err();
    assert_eq!(err.code(), code::DEADLINE_EXCEEDED);

    handle.stop().await;
}

#[tokio::test]
async fn test_client_deadline() {
    let (handle, client) = start_echo().await;

    let err = client
        .invoke::<_, u64>(
            &ctx(),
            "/Echo/Sleep",
            Some(&2_000u64),
            &[InvokeOption::timeout(Duration::from_millis(50))],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::DeadlineExceeded { .. }));

    handle.stop().await;
}

#[tokio::test]
async fn test_body_limit() {
    let (handle, _client) = start(ServerConfig::default().with_max_body_bytes(16), |server| {
        server.register_service(echo_service()).unwrap();
    })
    .await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/Echo/Ping", handle.local_addr()))
        .body(format!("\"{}\"", "x".repeat(64)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 413);
    assert_eq!(resp.headers()[STATUS_CODE_HEADER], "413");

    handle.stop().await;
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_stop_drains_in_flight_calls() {
    let (handle, client) = start_echo().await;

    let in_flight = tokio::spawn(async move {
        client
            .invoke::<_, u64>(&CallContext::new(), "/Echo/Sleep", Some(&200u64), &[])
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(5), handle.stop())
        .await
        .unwrap();
    assert_eq!(in_flight.await.unwrap().unwrap(), 200);
}

#[tokio::test]
async fn test_lifecycle_shutdown_waits_for_drain() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let addr = format!("127.0.0.1:{}", port);
    let mut server = Server::new(
        ServerConfig::default().with_addr(addr.clone()),
        ServerOptions::default(),
    );
    server.register_service(echo_service()).unwrap();

    let lifecycle = Arc::new(Lifecycle::new());
    let running = {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move { server.run(&lifecycle).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = Client::new("e2e", addr, ClientOptions::new()).await.unwrap();
    let in_flight = tokio::spawn(async move {
        client
            .invoke::<_, u64>(&CallContext::new(), "/Echo/Sleep", Some(&300u64), &[])
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    tokio::time::timeout(Duration::from_secs(5), lifecycle.shutdown())
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(150));

    assert_eq!(in_flight.await.unwrap().unwrap(), 300);
    running.await.unwrap().unwrap();
}
