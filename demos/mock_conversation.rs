//! Mock conversation example.
//!
//! Runs a full conversation session against a scripted device and remote
//! service: a short tone goes up, two reply chunks come back, the second
//! turn is interrupted.
//!
//! Run with: cargo run --example mock_conversation

use std::sync::Arc;
use std::time::Duration;

use companion_runtime::{
    event_callback, ConversationConfig, ConversationEvent, ConversationManager, MockDevice,
    MockRemoteService, ResponseEvent,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt::init();

    let device = Arc::new(MockDevice::new());
    let remote = Arc::new(MockRemoteService::new());

    // One second of 440Hz, as 20ms frames
    device.queue_sine(440.0, 50, 320);

    // 100ms of 24kHz silence per chunk
    remote.push_event(ResponseEvent::with_audio(vec![0; 4800]));
    remote.push_event(ResponseEvent::with_audio(vec![0; 4800]));
    remote.push_event(ResponseEvent::end_of_turn());
    remote.push_event(ResponseEvent::with_audio(vec![0; 4800]));
    remote.push_event(ResponseEvent::interruption());

    let config = ConversationConfig::new("demo-key")?.with_greeting();
    let manager = ConversationManager::with_event_callback(
        device.clone(),
        remote.clone(),
        config,
        event_callback(|event| match event {
            ConversationEvent::SessionEnded { .. } => println!("Session ended"),
            other => println!("Event: {other:?}"),
        }),
    )?;

    manager.start_conversation();
    tokio::time::sleep(Duration::from_secs(2)).await;

    let stats = manager.stop_conversation().await?;

    println!("Sent {} input frames", remote.sent_inputs().len());
    println!("Played {} output frames", device.output_len());
    println!("Stats: {stats:?}");

    Ok(())
}
