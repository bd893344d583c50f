use std::sync::Arc;

use shelf_core::cache::{CacheEntry, DiskCache, MemoryCache};
use shelf_core::codec::DecodedImage;
use shelf_core::pipeline::queue::PrefetchQueue;
use shelf_core::types::{CacheBudget, ComicId, ImageDimensions, ImageKey, PageId, PrefetchPolicy};

fn page(comic: i64, index: u32) -> PageId {
    PageId { comic: ComicId(comic), index }
}

fn frame(bytes: usize, value: u8) -> Arc<DecodedImage> {
    Arc::new(DecodedImage {
        dimensions: ImageDimensions { width: (bytes / 4) as u32, height: 1 },
        pixels: vec![value; bytes],
    })
}

fn entry(index: u32, bytes: usize) -> (ImageKey, CacheEntry) {
    let page = page(1, index);
    (ImageKey::for_page(&page), CacheEntry::new(page, frame(bytes, index as u8)))
}

#[test]
fn memory_cache_evicts_least_recently_used() {
    let mut cache = MemoryCache::new(CacheBudget { bytes_max: 64 });
    let (key1, entry1) = entry(1, 32);
    let (key2, entry2) = entry(2, 32);
    let (key3, entry3) = entry(3, 32);

    assert!(cache.insert(key1.clone(), entry1));
    assert!(cache.insert(key2.clone(), entry2));

    // Touch page 1 so page 2 becomes the eviction candidate.
    cache.get(&key1);
    assert!(cache.insert(key3.clone(), entry3));

    assert!(cache.get(&key1).is_some());
    assert!(cache.get(&key2).is_none());
    assert!(cache.get(&key3).is_some());
    assert!(cache.bytes_used() <= 64);
}

#[test]
fn memory_cache_rejects_frames_larger_than_the_budget() {
    let mut cache = MemoryCache::new(CacheBudget { bytes_max: 16 });
    let (key, oversized) = entry(0, 32);
    assert!(!cache.insert(key.clone(), oversized));
    assert!(cache.is_empty());
    assert_eq!(cache.bytes_used(), 0);
}

#[test]
fn membership_checks_do_not_keep_pages_alive() {
    let mut cache = MemoryCache::new(CacheBudget { bytes_max: 64 });
    let (key1, entry1) = entry(1, 32);
    let (key2, entry2) = entry(2, 32);
    let (key3, entry3) = entry(3, 32);
    cache.insert(key1.clone(), entry1);
    cache.insert(key2.clone(), entry2);

    let shared: &MemoryCache = &cache;
    assert!(shared.contains(&key1) && shared.contains(&key2));
    cache.insert(key3.clone(), entry3);

    assert!(!cache.contains(&key1));
    assert!(cache.contains(&key2) && cache.contains(&key3));
}

#[test]
fn disk_cache_round_trips_cover_bytes() {
    let temp = tempfile::tempdir().unwrap();
    let cache = DiskCache::new(temp.path().join("covers")).unwrap();
    let key = ImageKey::for_cover(std::path::Path::new("/library/Saga 01.cbz"));

    assert!(cache.read(&key).unwrap().is_none());
    let path = cache.write(&key, b"jpeg bytes").unwrap();
    assert!(path.starts_with(cache.root()));
    assert_eq!(cache.read(&key).unwrap().as_deref(), Some(&b"jpeg bytes"[..]));

    cache.remove(&key).unwrap();
    assert!(!path.exists());
}

#[test]
fn prefetch_window_follows_reading_direction() {
    let mut queue = PrefetchQueue::new();
    let policy = PrefetchPolicy { ahead: 2, behind: 1 };
    queue.plan_window(&page(4, 5), 20, policy, 1.0);

    let (_, first) = queue.next_task().expect("a task ahead of the reader");
    assert_eq!(first.page, page(4, 6));

    let mut rest = Vec::new();
    while let Some((token, task)) = queue.next_task() {
        rest.push(task.page.index);
        assert!(queue.complete(&token));
    }
    rest.sort_unstable();
    assert!(rest.contains(&7));
    assert!(!rest.contains(&5));
    assert!(rest.iter().all(|index| (4..=7).contains(index)));
}

#[test]
fn prefetch_window_is_clamped_to_the_comic() {
    let mut queue = PrefetchQueue::new();
    queue.plan_window(&page(4, 2), 3, PrefetchPolicy { ahead: 5, behind: 0 }, 1.0);
    assert!(queue.is_empty());
}
