//! End-to-end throughput benchmark for Huddle.
//!
//! Measures event throughput over real WebSocket connections against a
//! running server. Every client subscribes to the public room and publishes
//! chat events to it as fast as it can.
//!
//! ```bash
//! HUDDLE_URL=ws://127.0.0.1:8080/ws e2e_throughput 16
//! ```

use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use huddle_protocol::{codec, ChatEvent, Frame, PROTOCOL_VERSION};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Barrier;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const DEFAULT_URL: &str = "ws://127.0.0.1:8080/ws";
const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    let num_clients = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(16);
    let url = std::env::var("HUDDLE_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());

    println!("Huddle end-to-end throughput");
    println!("  server:  {url}");
    println!("  clients: {num_clients}");
    println!("  warmup {WARMUP_SECS}s, measure {BENCH_SECS}s");
    println!();

    let received = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(num_clients + 1));

    let handles: Vec<_> = (0..num_clients)
        .map(|client_id| {
            let url = url.clone();
            let received = Arc::clone(&received);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                if let Err(e) = run_client(&url, client_id, received, barrier).await {
                    eprintln!("client {client_id} error: {e}");
                }
            })
        })
        .collect();

    barrier.wait().await;
    println!("all {num_clients} clients connected");

    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;

    received.store(0, Ordering::SeqCst);
    let start = Instant::now();
    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;
    let elapsed = start.elapsed();
    let total = received.load(Ordering::SeqCst);

    let per_sec = total as f64 / elapsed.as_secs_f64();
    println!();
    println!("  duration:        {:>12.2}s", elapsed.as_secs_f64());
    println!("  events received: {total:>12}");
    println!("  throughput:      {per_sec:>12.0} events/s");
    println!(
        "  per client:      {:>12.0} events/s",
        per_sec / num_clients as f64
    );

    for handle in handles {
        handle.abort();
    }
}

async fn run_client(
    url: &str,
    client_id: usize,
    received: Arc<AtomicU64>,
    barrier: Arc<Barrier>,
) -> Result<(), BoxError> {
    let (ws, _) = connect_async(url).await?;
    let (mut sender, mut receiver) = ws.split();

    let handshake = [
        Frame::connect(PROTOCOL_VERSION),
        Frame::subscribe(1, "public"),
    ];
    for frame in &handshake {
        sender
            .send(Message::Binary(codec::encode(frame)?.to_vec()))
            .await?;
        // Connected, then the subscribe ack
        receiver.next().await;
    }

    barrier.wait().await;

    let event = ChatEvent::chat(format!("bench-{client_id}"), "x".repeat(64));
    let publish = codec::encode(&Frame::send("chat/public/sendMessage", event))?;
    let publish_msg = Message::Binary(publish.to_vec());

    let recv_task = tokio::spawn(async move {
        let mut buffer = BytesMut::with_capacity(65536);
        while let Some(result) = receiver.next().await {
            if let Ok(Message::Binary(data)) = result {
                buffer.extend_from_slice(&data);
                while let Ok(Some(frame)) = codec::decode_from(&mut buffer) {
                    if matches!(frame, Frame::Event { .. }) {
                        received.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    });

    while sender.send(publish_msg.clone()).await.is_ok() {
        tokio::task::yield_now().await;
    }

    recv_task.abort();
    Ok(())
}
