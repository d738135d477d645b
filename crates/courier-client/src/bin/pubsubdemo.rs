//! Pub/sub demo binary for the in-process broker.
//!
//! # Purpose
//! Walks through wildcard subscription, publish, request/reply and a
//! slow-consumer notification against a broker running in this process.
//!
//! # Notes
//! This is a developer-facing demo; it favors clarity over performance.
use anyhow::{Context, Result};
use bytes::Bytes;
use courier_broker::Broker;
use courier_client::{
    Client, ClientConfig, InProcessConnector, Message, SubscribeOptions, error_handler,
};
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use tracing_subscriber::EnvFilter;

async fn run_demo() -> Result<()> {
    println!("== Courier Pub/Sub Demo ==");
    println!("Goal: show per-subscription dispatch, request/reply and slow consumers.");

    println!("Step 1/5: booting in-process broker and connecting a client.");
    let broker = Arc::new(Broker::new());
    let config = ClientConfig::from_env_or_yaml(None).context("load client config")?;
    let handler = error_handler(|err| async move {
        println!("  async error [{:?}] sid={:?}: {err}", err.kind(), err.subscription_id());
    });
    let client = Client::connect_with_error_handler(
        &InProcessConnector::new(Arc::clone(&broker)),
        config,
        handler,
    )
    .await?;

    println!("Step 2/5: wildcard subscription on tests.>");
    let sid = client
        .subscribe(
            "tests.>",
            |msg: Message| async move {
                println!(
                    "  [sid {}] {} => {}",
                    msg.subscription_id(),
                    msg.subject(),
                    String::from_utf8_lossy(msg.payload())
                );
                Ok(())
            },
            SubscribeOptions::default(),
        )
        .await?;
    for i in 0..5 {
        client
            .publish(&format!("tests.{i}"), Bytes::from(format!("hello {i}")))
            .await?;
    }
    sleep(Duration::from_millis(50)).await;

    println!("Step 3/5: request/reply through a responder subscription.");
    let responder = client.clone();
    let help_sid = client
        .subscribe(
            "help",
            move |msg: Message| {
                let responder = responder.clone();
                async move {
                    if let Some(reply) = msg.reply() {
                        responder
                            .publish(reply, Bytes::from_static(b"I can help!"))
                            .await?;
                    }
                    anyhow::Ok(())
                }
            },
            SubscribeOptions::default(),
        )
        .await?;
    let reply = client
        .request("help", Bytes::from_static(b"help please"), Duration::from_secs(1))
        .await?;
    println!(
        "  reply on {}: {}",
        reply.subject(),
        String::from_utf8_lossy(reply.payload())
    );
    match client
        .request("nobody.home", Bytes::new(), Duration::from_millis(200))
        .await
    {
        Ok(_) => println!("  unexpected reply from nobody.home"),
        Err(err) => println!("  request without responder failed as expected: {err}"),
    }

    println!("Step 4/5: slow consumer with pending_msgs_limit=2.");
    let slow_sid = client
        .subscribe(
            "slow",
            |_msg: Message| async move {
                sleep(Duration::from_millis(200)).await;
                Ok(())
            },
            SubscribeOptions::default().pending_msgs_limit(2),
        )
        .await?;
    for i in 0..5 {
        client.publish("slow", Bytes::from(format!("{i}"))).await?;
    }
    sleep(Duration::from_millis(100)).await;
    if let Some(info) = client.subscription_info(slow_sid) {
        println!(
            "  slow subscription: pending={} delivered={} dropped={}",
            info.pending_msgs, info.delivered, info.dropped
        );
    }
    sleep(Duration::from_secs(1)).await;

    println!("Step 5/5: cleanup.");
    for id in [sid, help_sid, slow_sid] {
        client.unsubscribe(id).await?;
    }
    let stats = client.stats();
    println!(
        "  in={} out={} slow_consumer_drops={} callback_failures={}",
        stats.in_msgs, stats.out_msgs, stats.slow_consumer_drops, stats.callback_failures
    );
    client.close().await;
    println!("Demo complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    run_demo().await
}
