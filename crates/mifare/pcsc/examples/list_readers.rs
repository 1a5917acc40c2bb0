//! Lists attached readers with their status and the UID of any tag in the field
//!
//! Run with `RUST_LOG=debug` to see the PC/SC traffic.

use mifare_core::{driver::CardDriver, transport::CardTransport};
use mifare_transport_pcsc::{PcscDeviceManager, ReaderStatus};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let manager = PcscDeviceManager::new()?;
    for reader in manager.list_readers()? {
        print!("{:<40} {:<11}", reader.name(), reader.status().as_str());

        if let Some((kind, name)) = reader.tag() {
            print!(" {name} ({kind:?})");
        }
        if reader.status() != ReaderStatus::Present {
            println!();
            continue;
        }

        let mut transport = manager.open_reader(reader.name())?;
        transport.open()?;
        match transport.scan() {
            Ok(batch) => match batch.tags().first() {
                Some(tag) => println!(" uid {}", tag.uid()),
                None => println!(" left the field"),
            },
            Err(e) => println!(" {}", e.status()),
        }
        transport.close();
    }

    Ok(())
}
