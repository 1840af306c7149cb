use example_minirpc_service_definition::{Args, Foo};
use minirpc_tokio_client::{Call, CodecType, Options, dial};
use minirpc_tokio_server::utils::{bind_tcp_listener_on_random_port, tcp_listener_to_host_port};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Bind to a random available port
    let (listener, _) = bind_tcp_listener_on_random_port().await.unwrap();
    let (host, port) = tcp_listener_to_host_port(&listener).unwrap();

    minirpc_tokio_server::register(Foo::service()).unwrap();
    let _server_task = tokio::spawn(minirpc_tokio_server::accept(listener));

    let address = format!("{}:{}", host, port);

    {
        let client = dial("tcp", &address, &[]).await.unwrap();

        // Fire off several calls before waiting on any of them.
        let (done, mut completions) = mpsc::channel::<Call<Args, i64>>(5);
        for i in 0..5 {
            client.go(Foo::SUM, Args::new(i, i * i), done.clone()).await;
        }
        drop(done);

        while let Some(call) = completions.recv().await {
            let args = call.args.clone();
            match call.into_result() {
                Ok(reply) => tracing::info!("{} + {} = {}", args.num1, args.num2, reply),
                Err(err) => tracing::error!("call failed: {}", err),
            }
        }

        let mut quotient = 0_i64;
        if let Err(err) = client.call(Foo::DIV, Args::new(1, 0), &mut quotient).await {
            tracing::info!("Foo.Div(1, 0) failed as expected: {}", err);
        }

        client.close().await.unwrap();
    }

    {
        let client = dial("tcp", &address, &[Options::with_codec(CodecType::Json)])
            .await
            .unwrap();

        let mut tally: HashMap<String, u64> = HashMap::new();
        let words: Vec<String> = "the quick fox jumps over the lazy dog"
            .split(' ')
            .map(str::to_string)
            .collect();
        client.call(Foo::TALLY, words, &mut tally).await.unwrap();

        println!("Result from Foo.Tally over JSON: {:?}", tally);
    }
}
