use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use scout_images::imaging::resize;
use scout_images::{BitmapCache, CacheKey, Dimension, ImageCache, PixelBuffer};

/// Byte-bounded LRU under steady eviction pressure
fn benchmark_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache");
    let buffer = Arc::new(PixelBuffer::solid(64, 64, [1, 2, 3, 255]));
    let keys: Vec<CacheKey> = (0..512)
        .map(|i| CacheKey::new(&format!("http://x/{i}.jpg"), Some(Dimension::new(64, 64))))
        .collect();

    group.bench_function("put_with_eviction", |b| {
        let cache = BitmapCache::new(buffer.byte_size() * 128);
        let mut i = 0;
        b.iter(|| {
            cache.put(keys[i % keys.len()].clone(), buffer.clone());
            i += 1;
        })
    });

    group.bench_function("get_hit", |b| {
        let cache = BitmapCache::new(buffer.byte_size() * keys.len());
        for key in &keys {
            cache.put(key.clone(), buffer.clone());
        }
        let mut i = 0;
        b.iter(|| {
            i += 1;
            black_box(cache.get(&keys[i % keys.len()]))
        })
    });

    group.finish();
}

/// Thumbnail extraction from a large decode
fn benchmark_resize(c: &mut Criterion) {
    let source = PixelBuffer::solid(1024, 768, [9, 9, 9, 255]);

    c.bench_function("resize_1024x768_to_128x128", |b| {
        b.iter(|| resize(black_box(source.clone()), Dimension::new(128, 128)))
    });
}

criterion_group!(benches, benchmark_cache, benchmark_resize);
criterion_main!(benches);
