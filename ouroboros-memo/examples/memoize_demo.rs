//! Memoization Demo Application
//!
//! Demonstrates cached functions, cached accessors, TTL expiry and the
//! background sweeper.
//!
//! Usage:
//!   cargo run --example memoize_demo
//!
//! Environment variables (a `.env` file is honored):
//!   RUST_LOG                            - log filter (default: info)
//!   OUROBOROS_MEMO_CLEANUP_INTERVAL_MS  - sweep interval (demo default: 50)
//!   OUROBOROS_MEMO_METRICS              - record hit/miss statistics

use ouroboros_memo::cache::config::ENV_CLEANUP_INTERVAL_MS;
use ouroboros_memo::{
    spawn_auto_cleanup, Callable, Class, ClearTarget, MemoOptions, Memoizer, MemoizerConfig, Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("=== Memoization Demo ===");

    let mut config = MemoizerConfig::from_env()?;
    config.enable_auto_cleanup = true;
    if std::env::var_os(ENV_CLEANUP_INTERVAL_MS).is_none() {
        // Short enough to see a sweep before the demo exits
        config.cleanup_interval = Duration::from_millis(50);
    }
    let memoizer = Arc::new(Memoizer::new(config));
    let sweeper = spawn_auto_cleanup(&memoizer)?;

    info!("\n--- Cached Function ---");
    let calls = Arc::new(AtomicUsize::new(0));
    let slow_square = {
        let calls = Arc::clone(&calls);
        Callable::from_fn("slow_square", move |_, args| {
            calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            let n = args.first().and_then(Value::as_int).unwrap_or(0);
            Ok(Value::Int(n * n))
        })
    };
    let square = memoizer.cached(&slow_square, Some(MemoOptions::with_ttl_ms(100)))?;
    for _ in 0..3 {
        let result = square.call_detached(&[Value::Int(12)])?;
        info!("slow_square(12) = {:?}", result);
    }
    info!("Underlying calls: {}", calls.load(Ordering::SeqCst));
    info!("Stats: {}", square.stats());

    info!("\n--- Cached Accessor ---");
    let rect = Class::new("Rect");
    rect.define_getter(
        "area",
        Callable::from_fn("area", |ctx, _| {
            let this = ctx.object().ok_or("area needs a receiver")?;
            let w = this.field("w").and_then(|v| v.as_int()).unwrap_or(0);
            let h = this.field("h").and_then(|v| v.as_int()).unwrap_or(0);
            info!("Computing area of {}x{}", w, h);
            Ok(Value::Int(w * h))
        }),
    );
    let area = memoizer.cache_accessor(&rect, "area", None)?;

    let r = rect.instantiate();
    r.set_field("w", Value::Int(3));
    r.set_field("h", Value::Int(4));
    info!("area = {:?}", r.get("area")?);
    info!("area = {:?}", r.get("area")?);

    r.set_field("w", Value::Int(5));
    let removed = memoizer.clear(ClearTarget::Member { context: &r, name: "area" }, None)?;
    info!("Cleared {} entries after resize", removed);
    info!("area = {:?}", r.get("area")?);
    info!("Accessor stats: {}", area.stats());
    info!("Forgot {} entries for the rect", memoizer.forget(&r));

    info!("\n--- Background Sweep ---");
    tokio::time::sleep(Duration::from_millis(200)).await;
    info!("Entries after TTL and sweep: {}", square.stats().entries);

    if let Some(handle) = sweeper {
        handle.abort();
    }

    info!("\n=== Demo Complete ===");
    Ok(())
}
