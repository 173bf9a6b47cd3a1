//! Scout Images - command line loader
//!
//! Loads each URL into its own slot and reports what every slot ended up
//! showing.

use scout_images::cache::capacity_for_memory_class;
use scout_images::imaging::{error_image, placeholder_image};
use scout_images::{
    CacheLineage, Dimension, Dispatcher, ImageRequest, LoaderConfig, NAME, Slot, SlotHandle,
    SlotState, VERSION,
};
use std::env;
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Heap size assumed when sizing the decoded-image cache
const MEMORY_CLASS_MB: usize = 256;

struct Options {
    size: Option<Dimension>,
    fade: bool,
    offline: bool,
    urls: Vec<String>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}");
            print_usage();
            process::exit(2);
        }
    };

    if let Err(e) = run(options) {
        eprintln!("❌ {}", e);
        process::exit(1);
    }
}

fn print_usage() {
    eprintln!("Usage: scout-images [--size WxH] [--fade] [--offline] URL...");
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut options = Options {
        size: None,
        fade: false,
        offline: false,
        urls: Vec::new(),
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--size" => {
                let value = iter.next().ok_or("--size needs a value")?;
                options.size = Some(parse_size(value)?);
            }
            "--fade" => options.fade = true,
            "--offline" => options.offline = true,
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            flag if flag.starts_with("--") => return Err(format!("unknown option {flag}")),
            url => options.urls.push(url.to_string()),
        }
    }

    if options.urls.is_empty() {
        return Err("no URLs given".to_string());
    }
    Ok(options)
}

/// `WxH`, where either side may be left empty
fn parse_size(value: &str) -> Result<Dimension, String> {
    let (width, height) = value
        .split_once('x')
        .ok_or_else(|| format!("invalid size {value}, expected WxH"))?;
    let side = |s: &str| -> Result<i32, String> {
        if s.is_empty() {
            Ok(0)
        } else {
            s.parse().map_err(|_| format!("invalid size {value}"))
        }
    };
    Ok(Dimension::new(side(width)?, side(height)?))
}

fn run(options: Options) -> scout_images::Result<()> {
    println!("🚀 {} v{}", NAME, VERSION);

    let config = LoaderConfig::default()
        .with_fade_in(options.fade)
        .with_downloading(!options.offline);
    let dispatcher = Dispatcher::from_config(&config)?;

    let lineage = CacheLineage::new();
    let cache = lineage.succeed(capacity_for_memory_class(MEMORY_CLASS_MB));
    dispatcher.set_cache(Some(cache.clone()));

    let placeholder = Arc::new(placeholder_image(64, 64));
    let error = Arc::new(error_image(64, 64));

    let slots: Vec<SlotHandle> = options.urls.iter().map(|_| Slot::handle()).collect();
    for (url, slot) in options.urls.iter().zip(&slots) {
        let mut request = ImageRequest::new(url.as_str())
            .with_placeholder(placeholder.clone())
            .with_error_fallback(error.clone());
        if let Some(size) = options.size {
            request = request.with_target(size);
        }
        dispatcher.request_image(request, slot);
    }

    let deadline = Instant::now() + config.fetch_timeout + Duration::from_secs(5);
    if !dispatcher.pump_until(&slots, deadline) {
        println!("⚠️  Some images did not finish loading");
    }

    for (url, slot) in options.urls.iter().zip(&slots) {
        let outcome = match slot.current_buffer() {
            None => "cleared".to_string(),
            Some(buffer) if Arc::ptr_eq(&buffer, &placeholder) => "placeholder".to_string(),
            Some(buffer) if Arc::ptr_eq(&buffer, &error) => "error".to_string(),
            Some(buffer) => format!("{}x{}", buffer.width(), buffer.height()),
        };
        let state = match slot.state() {
            SlotState::Pending => "pending",
            SlotState::Settled => "settled",
            SlotState::Idle => "idle",
        };
        println!("{url}: {state}, {outcome}");
    }

    let stats = cache.stats();
    println!(
        "📊 Cache: {} entries, {} / {} bytes, {} hits, {} misses, {} evictions",
        stats.entries,
        stats.size_bytes,
        stats.max_size_bytes,
        stats.hits,
        stats.misses,
        stats.evictions
    );

    lineage.teardown(&cache);
    Ok(())
}
