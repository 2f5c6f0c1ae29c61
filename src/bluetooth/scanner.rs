//! Adapter selection and BLE device discovery.

use crate::config::Config;
use anyhow::{anyhow, Result};
use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager};
use std::time::Duration;
use tracing::debug;

/// Pick the adapter whose identifier matches the configured name, falling
/// back to the first available adapter.
pub async fn find_adapter(manager: &Manager, name: &str) -> Result<Adapter> {
    let adapters = manager.adapters().await?;
    for adapter in &adapters {
        if let Ok(info) = adapter.adapter_info().await {
            if info.contains(name) {
                debug!("Using adapter {info}");
                return Ok(adapter.clone());
            }
        }
    }
    adapters
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No bluetooth adapter available"))
}

/// Scan with the configured adapter and print every device found.
pub async fn scan(config: &Config) -> Result<()> {
    let manager = Manager::new().await?;
    let adapter = find_adapter(&manager, &config.adapter_name).await?;

    println!("Scanning");
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(Duration::from_secs(config.scan_timeout)).await;
    adapter.stop_scan().await?;

    let peripherals = adapter.peripherals().await?;
    println!(
        "Found {} devices using {}",
        peripherals.len(),
        config.adapter_name
    );
    for peripheral in peripherals {
        let name = peripheral
            .properties()
            .await
            .ok()
            .flatten()
            .and_then(|properties| properties.local_name)
            .unwrap_or_else(|| "Unknown".to_string());
        println!("{}: {}", peripheral.address(), name);
    }

    Ok(())
}
