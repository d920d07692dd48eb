//! Subcommand implementations

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::info;

use bluekit::{scan, AdapterRegistry, Peripheral};

pub async fn adapters(registry: &AdapterRegistry) -> Result<()> {
    let enabled = registry.bluetooth_enabled().await?;
    println!("Bluetooth enabled: {}", enabled);

    let adapters = registry.adapters().await?;
    if adapters.is_empty() {
        println!("No Bluetooth adapters found");
        return Ok(());
    }
    for (index, adapter) in adapters.iter().enumerate() {
        println!(
            "[{}] {} ({})",
            index,
            adapter.identifier(),
            adapter.address()
        );
    }
    Ok(())
}

/// Explicit `--timeout-ms` wins over the configured `scan_timeout`.
fn scan_duration(registry: &AdapterRegistry, timeout_ms: Option<u64>) -> Duration {
    timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(registry.config().scan_timeout)
}

pub async fn scan_command(
    registry: &AdapterRegistry,
    timeout_ms: Option<u64>,
    adapter_index: usize,
) -> Result<()> {
    let duration = scan_duration(registry, timeout_ms);

    let peripherals = if adapter_index == 0 {
        scan(registry, duration).await?
    } else {
        let adapters = registry.adapters().await?;
        let adapter = adapters
            .get(adapter_index)
            .with_context(|| format!("no adapter at index {}", adapter_index))?;
        adapter.scan_for(duration).await?
    };

    info!("Scan finished: {} peripheral(s)", peripherals.len());
    print_results(&peripherals);
    Ok(())
}

pub async fn info(registry: &AdapterRegistry, address: &str, timeout_ms: Option<u64>) -> Result<()> {
    let peripherals = scan(registry, scan_duration(registry, timeout_ms)).await?;
    let peripheral = peripherals
        .iter()
        .find(|p| p.address().eq_ignore_ascii_case(address))
        .with_context(|| format!("peripheral {} not seen during scan", address))?;

    if !peripheral.is_connectable() {
        bail!("peripheral {} is not connectable", address);
    }

    peripheral
        .connect()
        .await
        .with_context(|| format!("connecting to {}", address))?;

    let outcome = dump_gatt(peripheral).await;
    peripheral.disconnect().await?;
    outcome
}

async fn dump_gatt(peripheral: &Peripheral) -> Result<()> {
    println!("{}", peripheral);
    println!("  address type: {}", peripheral.address_type_display());
    println!("  rssi:         {}", peripheral.rssi_display());
    if let Some(tx_power) = peripheral.tx_power_display() {
        println!("  tx power:     {}", tx_power);
    }
    if let Some(mtu) = peripheral.mtu_display() {
        println!("  mtu:          {}", mtu);
    }

    for service in peripheral.services().await? {
        println!("  service {}", service.uuid);
        for characteristic in &service.characteristics {
            let capabilities: Vec<String> = characteristic
                .capabilities
                .iter()
                .map(|c| c.to_string())
                .collect();
            println!(
                "    characteristic {} [{}]",
                characteristic.uuid,
                capabilities.join(", ")
            );
            for descriptor in &characteristic.descriptors {
                println!("      descriptor {}", descriptor.uuid);
            }
        }
    }
    Ok(())
}

fn print_results(peripherals: &[Peripheral]) {
    if peripherals.is_empty() {
        println!("No peripherals discovered");
        return;
    }
    println!(
        "{:<24} {:<20} {:<12} {:>8}  {}",
        "NAME", "ADDRESS", "TYPE", "RSSI", "CONNECTABLE"
    );
    for peripheral in peripherals {
        println!(
            "{:<24} {:<20} {:<12} {:>8}  {}",
            peripheral.name(),
            peripheral.address(),
            peripheral.address_type_display(),
            peripheral.rssi_display(),
            peripheral.is_connectable()
        );
    }
}
