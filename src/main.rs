/*!
 * Registry Probe - Main Entry Point
 *
 * Diagnostic tool that exercises the registry on the current host:
 * - Derives the host id and mints identities
 * - Runs a map round-trip in an anonymous shared region
 * - Prints the final map statistics as JSON
 */

use miette::{IntoDiagnostic, Result};
use std::sync::Arc;
use tracing::info;

use shm_registry::{
    init_tracing, key_from_identity, monitoring::span_operation, ConcurrentMap, DeadlineClock,
    IdentityGenerator, MapValue, RegistryConfig, RegistryError, ShmRegion,
};

const SAMPLE_IDENTITIES: usize = 3;

fn main() -> Result<()> {
    init_tracing();

    info!("Registry probe starting...");

    let config = RegistryConfig::from_env()?;
    let ids = Arc::new(IdentityGenerator::from_config(&config));

    let host_id = ids.host_id()?;
    println!("host id:   {:#018x}", host_id);
    println!("boot id:   {}", ids.boot_id_path().display());
    for _ in 0..SAMPLE_IDENTITIES {
        let id = ids.generate_id()?;
        println!("identity:  {}  key {:#018x}", id, key_from_identity(&id));
    }

    let clock = DeadlineClock::system();
    let seed = clock.now().as_nanos() as u64;
    let region_bytes = ConcurrentMap::checked_region_size(config.map_capacity).ok_or_else(|| {
        RegistryError::InvalidArgument(format!(
            "map capacity {} overflows the region size",
            config.map_capacity
        ))
    })?;
    let region = ShmRegion::anonymous(region_bytes)?;
    let map = ConcurrentMap::create_with(&region, seed, ids.clone(), config.map.clone())?;
    info!(capacity = map.capacity(), "Shared map ready");

    let span = span_operation("probe_round_trip");
    let mut keys = Vec::with_capacity(SAMPLE_IDENTITIES);
    for n in 0..SAMPLE_IDENTITIES as u64 {
        keys.push(map.add_genkey(MapValue(n + 1))?);
    }
    for (n, key) in keys.iter().enumerate() {
        let value = map.get(*key)?;
        println!("record:    {:#018x} -> {}", key, value);
        debug_assert_eq!(value.get(), n as u64 + 1);
    }
    let deadline = clock.deadline_after(std::time::Duration::from_millis(10));
    map.delete_with_deadline(keys[0], &deadline)?;
    span.record_items_processed(keys.len());
    span.record_result(true);
    drop(span);

    let stats = map.stats();
    println!("{}", serde_json::to_string_pretty(&stats).into_diagnostic()?);

    map.destroy()?;
    info!("Registry probe finished");
    Ok(())
}
