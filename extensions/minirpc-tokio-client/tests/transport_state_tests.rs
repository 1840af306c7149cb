use example_minirpc_service_definition::{Args, Foo};
use minirpc::handshake::read_options;
use minirpc::{CodecError, HandshakeError, new_codec};
use minirpc_tokio_client::{Call, Client, Options, RpcError, dial};
use minirpc_tokio_server::Server;
use minirpc_tokio_server::utils::{bind_tcp_listener_on_random_port, tcp_listener_to_host_port};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{BufReader, duplex, split};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, timeout};

/// Large enough to fill a 256 byte duplex buffer many times over.
fn many_words() -> Vec<String> {
    vec!["minirpc".to_string(); 15_000]
}

async fn connected_client() -> Client {
    let server = Arc::new(Server::new());
    server.register(Foo::service()).unwrap();

    let (client_end, server_end) = duplex(64 * 1024);
    tokio::spawn(server.serve_conn(server_end));

    Client::new(client_end, &[]).await.unwrap()
}

#[tokio::test]
async fn test_client_errors_on_connection_failure() {
    // Nothing listens on port 1.
    let result = dial("tcp", "127.0.0.1:1", &[]).await;

    match result {
        Err(RpcError::Io(err)) => assert_eq!(err.kind(), std::io::ErrorKind::ConnectionRefused),
        Err(other) => panic!("Unexpected error: {:?}", other),
        Ok(_) => panic!("dial unexpectedly succeeded"),
    }
}

#[tokio::test]
async fn test_too_many_options_rejected_before_dial() {
    // Would be refused if it were dialed.
    let opts = [Options::default(), Options::default()];
    let result = dial("tcp", "127.0.0.1:1", &opts).await;

    assert!(
        matches!(
            result,
            Err(RpcError::Handshake(HandshakeError::TooManyOptions))
        ),
        "expected TooManyOptions"
    );
}

#[tokio::test]
async fn test_unsupported_network_is_rejected() {
    let result = dial("udp", "127.0.0.1:1", &[]).await;

    match result {
        Err(RpcError::UnsupportedNetwork(network)) => assert_eq!(network, "udp"),
        Err(other) => panic!("Unexpected error: {:?}", other),
        Ok(_) => panic!("dial unexpectedly succeeded"),
    }
}

#[tokio::test]
async fn test_dial_tcp4() {
    let server = Arc::new(Server::new());
    server.register(Foo::service()).unwrap();

    let (listener, _) = bind_tcp_listener_on_random_port().await.unwrap();
    let (host, port) = tcp_listener_to_host_port(&listener).unwrap();
    tokio::spawn(server.clone().accept(listener));

    let client = dial("tcp4", &format!("{}:{}", host, port), &[])
        .await
        .unwrap();

    let mut reply = 0_i64;
    client
        .call(Foo::SUM, Args::new(1, 2), &mut reply)
        .await
        .unwrap();
    assert_eq!(reply, 3);
}

#[tokio::test]
async fn test_close_then_call_fails_with_shutdown() {
    let client = connected_client().await;
    assert!(client.is_available());

    client.close().await.unwrap();
    assert!(!client.is_available());

    let mut reply = 7_i64;
    let err = client
        .call(Foo::SUM, Args::new(1, 2), &mut reply)
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Shutdown), "got {:?}", err);
    assert_eq!(err.to_string(), "connection is shut down");
    assert_eq!(reply, 7);

    let mut done = client.go_default::<_, i64>(Foo::SUM, Args::new(1, 2)).await;
    let call = done.recv().await.unwrap();
    assert_eq!(call.seq, 0);
    assert!(matches!(call.error, Some(RpcError::Shutdown)));
}

#[tokio::test]
async fn test_double_close_reports_shutdown() {
    let client = connected_client().await;

    client.close().await.unwrap();
    let err = client.close().await.unwrap_err();
    assert!(matches!(err, RpcError::Shutdown), "got {:?}", err);
}

#[tokio::test]
async fn test_close_completes_pending_calls_with_shutdown() {
    let client = connected_client().await;

    let (done, mut completions) = mpsc::channel::<Call<Args, i64>>(1);
    client.go(Foo::SLEEP, Args::new(500, 0), done).await;

    client.close().await.unwrap();

    let call = timeout(Duration::from_secs(5), completions.recv())
        .await
        .expect("pending call was never completed")
        .unwrap();
    assert!(matches!(call.error, Some(RpcError::Shutdown)), "got {:?}", call.error);
    assert!(call.reply.is_none());
}

#[tokio::test]
async fn test_lost_connection_fails_every_pending_call_once() {
    const IN_FLIGHT: i64 = 5;

    let (client_end, server_end) = duplex(64 * 1024);

    // A peer that reads every request and then hangs up without replying.
    let peer = tokio::spawn(async move {
        let (read_half, write_half) = split(server_end);
        let mut buffered = BufReader::new(read_half);
        let opt = read_options(&mut buffered).await.unwrap();
        let (mut reader, _writer) = new_codec(opt.codec_type, buffered, write_half);

        for _ in 0..IN_FLIGHT {
            reader.read_header().await.unwrap();
            reader.read_body(None).await.unwrap();
        }
    });

    let client = Client::new(client_end, &[]).await.unwrap();
    let (done, mut completions) = mpsc::channel::<Call<Args, i64>>(IN_FLIGHT as usize);
    for i in 0..IN_FLIGHT {
        client.go(Foo::SUM, Args::new(i, i), done.clone()).await;
    }
    drop(done);

    peer.await.unwrap();

    let mut errors = Vec::new();
    while let Some(call) = timeout(Duration::from_secs(5), completions.recv())
        .await
        .expect("pending calls were never completed")
    {
        errors.push(call.error.expect("call should carry the transport error"));
    }

    assert_eq!(errors.len(), IN_FLIGHT as usize);
    for err in &errors {
        assert!(
            matches!(err, RpcError::Codec(CodecError::Closed)),
            "got {:?}",
            err
        );
    }
    assert!(!client.is_available());

    let mut reply = 0_i64;
    let err = client
        .call(Foo::SUM, Args::new(1, 1), &mut reply)
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Shutdown), "got {:?}", err);
}

#[tokio::test]
async fn test_handshake_failure_is_reported() {
    let (client_end, server_end) = duplex(1024);
    drop(server_end);

    let result = Client::new(client_end, &[]).await;
    assert!(
        matches!(result, Err(RpcError::Handshake(_))),
        "expected a handshake error"
    );
}

#[tokio::test]
async fn test_timed_out_call_leaves_connection_usable() {
    let server = Arc::new(Server::new());
    server.register(Foo::service()).unwrap();

    // The server only starts reading once resumed, so the request stalls.
    let (client_end, server_end) = duplex(256);
    let (resume, paused) = oneshot::channel::<()>();
    tokio::spawn(async move {
        if paused.await.is_ok() {
            server.serve_conn(server_end).await;
        }
    });

    let client = Client::new(client_end, &[]).await.unwrap();

    let mut tally: HashMap<String, u64> = HashMap::new();
    let timed_out = timeout(
        Duration::from_millis(50),
        client.call(Foo::TALLY, many_words(), &mut tally),
    )
    .await;
    assert!(timed_out.is_err(), "call should still be writing");

    resume.send(()).unwrap();

    let mut reply = 0_i64;
    timeout(
        Duration::from_secs(5),
        client.call(Foo::SUM, Args::new(1, 2), &mut reply),
    )
    .await
    .expect("call after a timed out one never completed")
    .unwrap();
    assert_eq!(reply, 3);
    assert!(client.is_available());
}

#[tokio::test]
async fn test_close_does_not_wait_for_stalled_write() {
    // A peer that never reads.
    let (client_end, _peer) = duplex(256);
    let client = Client::new(client_end, &[]).await.unwrap();

    let (done, mut completions) = mpsc::channel::<Call<Vec<String>, HashMap<String, u64>>>(1);
    let stalled = timeout(
        Duration::from_millis(50),
        client.go(Foo::TALLY, many_words(), done),
    )
    .await;
    assert!(stalled.is_err(), "write should be stuck on the peer");

    timeout(Duration::from_secs(2), client.close())
        .await
        .expect("close waited on the stalled write")
        .unwrap();
    assert!(!client.is_available());

    let call = timeout(Duration::from_secs(5), completions.recv())
        .await
        .expect("stalled call was never completed")
        .unwrap();
    assert!(matches!(call.error, Some(RpcError::Shutdown)), "got {:?}", call.error);
}
