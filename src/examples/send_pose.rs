use collabvis::protocol::HeadsetUpdate;
use collabvis::*;
use std::sync::Arc;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };
    logging::init(&config.log_level);
    println!("🌀 Sending headset poses to {}", config.server.address());

    let router = Router::new();
    router.add_listener(Arc::new(|m: &Message| {
        println!("📨 {:?}", m.message_type());
    }));

    let mut transport = Transport::new(Arc::new(config), router)?;
    transport.add_status_listener(Arc::new(|s: ConnectionStatus| {
        println!("🔌 {:?}", s);
    }));
    transport.start()?;

    // Walk a slow circle for five seconds, ten updates per second
    for step in 0..50 {
        let angle = step as f32 * 0.1;
        let update = HeadsetUpdate {
            position: [angle.cos(), 1.6, angle.sin()],
            rotation: [(angle / 2.0).cos(), 0.0, (angle / 2.0).sin(), 0.0],
            pointing_dataset_id: -1,
            pointing_subdataset_id: -1,
            ..HeadsetUpdate::default()
        };
        transport.send(&Command::HeadsetUpdate(update))?;
        std::thread::sleep(Duration::from_millis(100));
    }

    transport.shutdown();
    println!("✅ Done");
    Ok(())
}
