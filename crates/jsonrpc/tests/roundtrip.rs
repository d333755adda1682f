//! End-to-end coverage running a real `ServiceHost` and `Client` over a
//! bundled line-delimited transport, one process talking to itself through
//! an in-memory duplex pipe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use jsonrpc_runtime::{
    Args, Client, ClientError, ClientOptions, HostBuilder, JsonRpcError, LineDelimitedReader,
    LineDelimitedWriter, MethodDef, Params, ParamSpec, Reader, RpcException, ServiceBuilder,
    ServiceHost, SharedServiceFactory, ValueKind, Writer,
};
use serde_json::{Map, Value};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
struct Calc {
    terminated: Arc<AtomicBool>,
}

fn build_host(terminated: Arc<AtomicBool>) -> ServiceHost {
    HostBuilder::new()
        .add_service(
            "calc",
            ServiceBuilder::new(SharedServiceFactory(Calc { terminated }))
                .method(
                    MethodDef::new("sum")
                        .param(ParamSpec::required("x", ValueKind::Number))
                        .param(ParamSpec::required("y", ValueKind::Number)),
                    |_svc, _ctx, args: Args| async move {
                        let x: i64 = args.require("x")?;
                        let y: i64 = args.require("y")?;
                        Ok::<_, JsonRpcError>(x + y)
                    },
                )
                .unwrap()
                .method(
                    MethodDef::new("add")
                        .param(ParamSpec::required("x", ValueKind::Number))
                        .param(ParamSpec::required("y", ValueKind::Number)),
                    |_svc, _ctx, args: Args| async move {
                        let x: i64 = args.require("x")?;
                        let y: i64 = args.require("y")?;
                        Ok::<_, JsonRpcError>(Value::from(x + y))
                    },
                )
                .unwrap()
                .method(
                    MethodDef::new("add")
                        .param(ParamSpec::required("a", ValueKind::String))
                        .param(ParamSpec::required("b", ValueKind::String)),
                    |_svc, _ctx, args: Args| async move {
                        let a: String = args.require("a")?;
                        let b: String = args.require("b")?;
                        Ok::<_, JsonRpcError>(Value::from(format!("{a}{b}")))
                    },
                )
                .unwrap()
                .method(
                    MethodDef::new("throwException"),
                    |_svc, _ctx, _args: Args| async move {
                        Err::<Value, _>(JsonRpcError::Application(RpcException::new(
                            -32010,
                            "Boom: kaboom",
                        )))
                    },
                )
                .unwrap()
                .method(
                    MethodDef::new("slow"),
                    |_svc, _ctx, _args: Args| async move {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok::<_, JsonRpcError>(Value::from("too late"))
                    },
                )
                .unwrap()
                .notification(
                    MethodDef::new("terminate"),
                    |svc: Calc, _ctx, _args: Args| async move {
                        svc.terminated.store(true, Ordering::SeqCst);
                        Ok(())
                    },
                )
                .unwrap()
                .finish(),
        )
        .unwrap()
        .build()
}

struct Harness {
    client: Client,
    terminated: Arc<AtomicBool>,
    _host_task: tokio::task::JoinHandle<()>,
}

fn spawn_harness() -> Harness {
    let (client_stream, server_stream) = tokio::io::duplex(8192);
    let (client_read, client_write) = tokio::io::split(client_stream);
    let (server_read, server_write) = tokio::io::split(server_stream);

    let client_reader: Arc<dyn Reader> = Arc::new(LineDelimitedReader::spawn(BufReader::new(client_read)));
    let client_writer: Arc<dyn Writer> = Arc::new(LineDelimitedWriter::spawn(client_write));
    let server_reader: Arc<dyn Reader> = Arc::new(LineDelimitedReader::spawn(BufReader::new(server_read)));
    let server_writer: Arc<dyn Writer> = Arc::new(LineDelimitedWriter::spawn(server_write));

    let terminated = Arc::new(AtomicBool::new(false));
    let host = build_host(terminated.clone());
    let host_task = tokio::spawn(async move {
        let _ = host
            .run(server_reader, server_writer, CancellationToken::new())
            .await;
    });

    let client = Client::connect(client_reader, client_writer, ClientOptions::default());

    Harness {
        client,
        terminated,
        _host_task: host_task,
    }
}

fn obj(fields: impl IntoIterator<Item = (&'static str, Value)>) -> Params {
    Params::Object(Map::from_iter(fields.into_iter().map(|(k, v)| (k.to_string(), v))))
}

#[tokio::test]
async fn scenario_sum_returns_number() {
    let harness = spawn_harness();
    let cancel = CancellationToken::new();
    let result = harness
        .client
        .request("sum", obj([("x", Value::from(100)), ("y", Value::from(-200))]), &cancel)
        .await
        .unwrap();
    assert_eq!(result, Value::from(-100));
}

#[tokio::test]
async fn scenario_overload_selects_by_param_names() {
    let harness = spawn_harness();
    let cancel = CancellationToken::new();

    let numeric = harness
        .client
        .request("add", obj([("x", Value::from(2)), ("y", Value::from(3))]), &cancel)
        .await
        .unwrap();
    assert_eq!(numeric, Value::from(5));

    let stringly = harness
        .client
        .request(
            "add",
            obj([("a", Value::from("foo")), ("b", Value::from("bar"))]),
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(stringly, Value::from("foobar"));
}

#[tokio::test]
async fn scenario_application_exception_maps_to_declared_code() {
    let harness = spawn_harness();
    let cancel = CancellationToken::new();
    let err = harness
        .client
        .request("throwException", Params::None, &cancel)
        .await
        .unwrap_err();
    match err {
        ClientError::Remote(remote) => {
            assert_eq!(remote.error.code, -32010);
            assert!(remote.error.message.starts_with("Boom"));
        }
        other => panic!("expected a remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn scenario_unknown_method_is_method_not_found() {
    let harness = spawn_harness();
    let cancel = CancellationToken::new();
    let err = harness
        .client
        .request("doesNotExist", Params::None, &cancel)
        .await
        .unwrap_err();
    match err {
        ClientError::Remote(remote) => assert_eq!(remote.error.code, -32601),
        other => panic!("expected a remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn scenario_missing_param_is_invalid_params() {
    let harness = spawn_harness();
    let cancel = CancellationToken::new();
    let err = harness
        .client
        .request("sum", obj([("x", Value::from(1))]), &cancel)
        .await
        .unwrap_err();
    match err {
        ClientError::Remote(remote) => assert_eq!(remote.error.code, -32602),
        other => panic!("expected a remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn scenario_notification_has_no_response_but_runs() {
    let harness = spawn_harness();
    let cancel = CancellationToken::new();
    harness
        .client
        .notify("terminate", Params::None, &cancel)
        .await
        .unwrap();

    for _ in 0..50 {
        if harness.terminated.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("notification side effect was never observed");
}

#[tokio::test]
async fn scenario_cancel_drops_pending_request() {
    let harness = spawn_harness();
    let cancel = CancellationToken::new();
    let client = Arc::new(harness.client);
    let client_clone = client.clone();
    let inner_cancel = cancel.clone();
    let request = tokio::spawn(async move {
        client_clone.request("slow", Params::None, &inner_cancel).await
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();
    let outcome = request.await.unwrap();
    assert!(matches!(outcome, Err(ClientError::Canceled)));
}
