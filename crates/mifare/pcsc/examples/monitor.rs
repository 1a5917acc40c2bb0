//! Watch every reader and report tag arrivals and removals

use std::sync::Arc;

use mifare_core::{MifareConfig, PresenceEvent, ReaderHandle, ReaderRegistry};
use mifare_transport_pcsc::{PcscDeviceManager, PcscTransport, PresenceOnly};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let manager = PcscDeviceManager::new()?;
    let mut registry = ReaderRegistry::new(manager, MifareConfig::default());

    for reader in registry.refresh()? {
        println!("Watching {}", reader.name());
        reader.listen(
            |reader: &Arc<ReaderHandle<PcscTransport<PresenceOnly>>>,
             event: PresenceEvent<PcscTransport<PresenceOnly>>| match event {
                PresenceEvent::Arrived(card) => match card.uid() {
                    Ok(uid) => println!("{}: tag {uid} arrived", reader.name()),
                    Err(e) => println!("{}: {e}", reader.name()),
                },
                PresenceEvent::Removed => println!("{}: tag removed", reader.name()),
                PresenceEvent::Failed(err) => println!("{}: {}", reader.name(), err.status()),
            },
        )?;
    }

    println!("Press Enter to stop");
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;

    drop(registry);
    Ok(())
}
