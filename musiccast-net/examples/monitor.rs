//! Discover MusicCast devices and print every state delta.
//!
//! Run with: cargo run --example monitor

use musiccast_net::{Config, MusicCast, StateDelta, NETWORK_TOPIC};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let system = MusicCast::start(Config::default()).await?;
    let mut network = system.subscribe(NETWORK_TOPIC).await;
    system.discover().await;

    println!("discovering devices, ctrl-c to quit");
    loop {
        match network.recv().await {
            Some(StateDelta::Online { state }) => {
                let device_id = state["device_id"].as_str().unwrap_or("?").to_string();
                println!(
                    "online: {} ({}) at {}",
                    device_id, state["network_name"], state["host"]
                );

                // Follow this device's deltas in the background.
                let mut deltas = system.subscribe(&device_id).await;
                tokio::spawn(async move {
                    while let Some(delta) = deltas.recv().await {
                        if let StateDelta::Update { device_id, changes } = delta {
                            println!("{}: {}", device_id, changes);
                        }
                    }
                });
            }
            Some(StateDelta::Offline { device_id }) => println!("offline: {}", device_id),
            Some(_) => {}
            None => break,
        }
    }
    Ok(())
}
