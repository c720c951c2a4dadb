//! Interop tour
//!
//! Installs the bridge on a fresh realm and walks through conversion,
//! inspection, the rich catalog on native promises and suppression.

use anyhow::{Context, Result, anyhow};
use thenable_interop::{Awaitable, Bridge, error::Result as InteropResult};
use thenable_rich::RichLibrary;
use thenable_runtime::{Function, PromiseRef, Realm, RuntimeConfig, Value, arg};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = RuntimeConfig::from_env().context("reading THENABLE_* settings")?;
    println!("=== Promise Interop Tour ===\n");
    println!("host: {config:?}");

    // Interop errors carry script values, which stay on this thread.
    let realm = Realm::new(config);
    tour(&realm).map_err(|e| anyhow!("tour failed: {e}"))?;

    println!("\n=== Done ===");
    Ok(())
}

fn tour(realm: &Realm) -> InteropResult<()> {
    let library = RichLibrary::for_realm(realm);
    let bridge = Bridge::for_realm(realm, &library)?;
    println!("bridge: {bridge:?}\n");

    println!("Conversion");
    let native = realm.resolve(21);
    let rich = native.to_bluebird()?;
    println!("  toBluebird twice is the same promise: {}", rich.ptr_eq(&native.to_bluebird()?));
    println!("  back to native: {:?}", rich.to_native()?);

    println!("\nInspection");
    let (pending, resolvers) = realm.pending();
    println!("  pending: isPending = {}", pending.is_pending()?);
    resolvers.resolve(Value::from("done"));
    realm.run_until_idle();
    println!("  settled: value = {}", pending.value()?);

    println!("\nCatalog");
    let double = Function::new("double", |_, args| {
        Ok(Value::from(arg(args, 0).as_number().unwrap_or_default() * 2.0))
    });
    let items = realm.resolve(Value::array([1, 2, 3].map(Value::from)));
    let mapped = Awaitable::map(&items, double, Some(2))?;
    let last = Awaitable::get(&mapped, Value::from(-1))?;
    let delayed: PromiseRef = Awaitable::delay(&last, 50)?;
    realm.run_until_idle();
    println!("  map(double).get(-1).delay(50) = {:?}", delayed);
    println!("  clock advanced to {}ms", realm.event_loop().current_time());

    let cancel = realm.resolve(1).cancel();
    println!("  cancel on native: {}", cancel.map_or_else(|e| e.to_string(), |_| "ok".into()));

    println!("\nSuppression");
    let rejected = realm.reject("ignored on purpose");
    rejected.suppress_unhandled_rejections()?;
    realm.run_until_idle();
    let reported = realm.event_loop().take_unhandled_rejections();
    println!("  unhandled rejections reported: {}", reported.len());
    Ok(())
}
