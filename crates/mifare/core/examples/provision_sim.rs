//! Provision a simulated DESFire card for NDEF and round-trip a message

use std::time::Duration;

use mifare_core::{
    MifareConfig, PresenceEvent, ReaderHandle,
    event::reader_event_channel,
    provision::FormatOptions,
    sim::{SimCard, SimField, SimTransport},
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let field = SimField::new();
    let reader = ReaderHandle::new(SimTransport::new("sim0", field.clone()), MifareConfig::default());

    let (tx, rx) = reader_event_channel();
    reader.listen_channel(tx)?;

    println!("Placing a blank card on {}", reader.name());
    field.insert(&SimCard::desfire("04a1b2c3d4e5f6"));

    let card = match rx.recv_timeout(Duration::from_secs(5))?.event {
        PresenceEvent::Arrived(card) => card,
        other => {
            println!("Unexpected event: {other:?}");
            reader.release();
            return Ok(());
        }
    };

    let info = card.info()?;
    println!("Card {} ({} bytes of storage)", card.uid()?, info.storage_bytes());
    println!("Master key: {:?}", card.master_key_info()?);

    card.format(FormatOptions::default())?;
    let mapping = card.create_ndef()?;
    println!("Created NDEF application ({mapping:?})");

    let capacity = card.write_ndef(b"hello from the simulator")?;
    let message = card.read_ndef()?;
    println!(
        "Read {} of {} bytes: {}",
        message.payload.len(),
        capacity,
        String::from_utf8_lossy(&message.payload)
    );

    drop(card);
    field.clear();
    if let Ok(event) = rx.recv_timeout(Duration::from_secs(5)) {
        println!("{}: {:?}", event.reader, event.event);
    }

    reader.release();
    Ok(())
}
