//! Provider demo: publish to a broker fleet and watch the audience
//!
//! Run with: cargo run --example provider -- BROKERS [TOPIC]
//!
//! Examples:
//!   cargo run --example provider -- 127.0.0.1:7000
//!   cargo run --example provider -- 10.0.0.1:7000,10.0.0.2:7000 room42
//!
//! Every second one message is published to TOPIC (default "room1") with a
//! rotating weight, and the decorated audience plus pipeline counters are
//! printed. Ctrl+C stops it.

use std::time::Duration;

use livecast::{Provider, ProviderConfig, PublishOutcome, PublishRequest, Scope};

fn print_usage() {
    eprintln!("Usage: provider BROKERS [TOPIC]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BROKERS    Comma-separated broker addresses (host:port)");
    eprintln!("  TOPIC      Topic to publish to (default: room1)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") || args.len() < 2 {
        print_usage();
        return Ok(());
    }

    let brokers: Vec<String> = args[1]
        .split(',')
        .map(|addr| addr.trim().replace("localhost", "127.0.0.1"))
        .filter(|addr| !addr.is_empty())
        .collect();
    let topic = args.get(2).cloned().unwrap_or_else(|| "room1".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("livecast=debug".parse()?)
                .add_directive("provider=debug".parse()?),
        )
        .init();

    let config = ProviderConfig::with_brokers(brokers)
        .max_weight(5)
        .max_publish_count(50)
        .consumer_concurrency(2);

    let provider = Provider::new(config)?;
    provider.start();

    println!("Publishing to '{}' every second, Ctrl+C to stop", topic);

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut seq: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                seq += 1;
                let request = PublishRequest {
                    topic: topic.clone(),
                    payload: format!("{{\"seq\":{}}}", seq),
                    weight: (seq % 5) as i64 + 1,
                    invoker: "demo".to_string(),
                    ..Default::default()
                };

                match provider.publish(request).await {
                    PublishOutcome::Accepted { upstream_id } => {
                        println!("#{} accepted as {}", seq, upstream_id);
                    }
                    PublishOutcome::Dropped => println!("#{} dropped", seq),
                }

                let online = provider.online(&topic).await;
                let stats = provider.stats();
                println!(
                    "online={} pending={} dispatched={} requeued={} expired={} broker_ok={} broker_err={}",
                    online,
                    provider.pending_jobs(),
                    stats.dispatched,
                    stats.requeued,
                    stats.expired,
                    stats.broker_publishes,
                    stats.broker_publish_failures,
                );
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
        }
    }

    let ranking = provider.online_ranking(Scope::Total, 10);
    println!(
        "Cached topics: {} (audience {})",
        ranking.topic_count, ranking.total_online
    );
    for (topic, online) in ranking.topics {
        println!("  {:<20} {}", topic, online);
    }

    provider.shutdown();
    Ok(())
}
