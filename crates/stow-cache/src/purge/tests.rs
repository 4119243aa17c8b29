use super::*;
use crate::layout::temp_pointer_name;
use crate::testing::TempCache;
use proptest::prelude::*;
use std::io::Write;
use std::os::unix::fs::symlink;

fn partition_len(cache: &Cache, key: &str) -> usize {
    let partition = cache.root().join(cache.digest(key).partition());
    fs::read_dir(partition).map(|entries| entries.count()).unwrap_or(0)
}

#[test]
fn test_purge_empty_cache() {
    let cache = TempCache::new();
    let report = cache.purge(Duration::ZERO).unwrap();
    assert_eq!(report, PurgeReport::default());
}

#[test]
fn test_purge_by_age() {
    // Two seconds pass before each write; ages end up 6, 4, 2 and 0 seconds.
    let (cache, clock) = TempCache::with_fake_clock(Duration::ZERO);
    for key in ["hello", "world", "in", "2021"] {
        clock.advance(Duration::from_secs(2));
        cache.write_file(key, key.as_bytes()).unwrap();
    }

    let report = cache.purge(Duration::from_millis(3500)).unwrap();
    assert_eq!(report.objects_removed, 2);
    assert_eq!(report.pointers_removed, 2);
    assert_eq!(report.bytes_freed, 10);

    assert!(cache.read_file("hello").unwrap_err().is_not_found());
    assert!(cache.read_file("world").unwrap_err().is_not_found());
    assert_eq!(cache.read_file("in").unwrap(), b"in");
    assert_eq!(cache.read_file("2021").unwrap(), b"2021");

    // Nothing left behind for the purged keys
    assert_eq!(partition_len(&cache, "hello"), 0);
    assert_eq!(partition_len(&cache, "world"), 0);
}

#[test]
fn test_purge_zero_removes_everything() {
    let cache = TempCache::new();
    cache.write_file("a", b"1").unwrap();
    cache
        .stage_dir("b", |dir| {
            fs::write(dir.join("x"), b"xyz").map_err(|e| StowError::io("write", e))?;
            Ok(())
        })
        .unwrap();

    let report = cache.purge(Duration::ZERO).unwrap();
    assert_eq!(report.objects_removed, 2);
    assert_eq!(report.pointers_removed, 2);
    assert_eq!(report.bytes_freed, 4);
    assert!(!cache.contains("a"));
    assert!(!cache.contains("b"));
}

#[test]
fn test_purge_reclaims_orphans() {
    let cache = TempCache::new();
    let (tx, mut file) = cache.create("abandoned").unwrap();
    file.write_all(b"never committed").unwrap();
    drop(file);
    // Simulates a crash between create and commit.
    drop(tx);

    let report = cache.purge(Duration::ZERO).unwrap();
    assert_eq!(report.objects_removed, 1);
    assert_eq!(report.pointers_removed, 0);
    assert_eq!(partition_len(&cache, "abandoned"), 0);
}

#[test]
fn test_purge_keeps_pointer_to_newer_generation() {
    let (cache, _clock) = TempCache::with_fake_clock(Duration::from_secs(1));

    // Staged at 1s and never resolved
    let (_stale, _file) = cache.create("key").unwrap();
    // Staged at 2s, pointer at 3s
    cache.write_file("key", b"fresh").unwrap();

    let report = cache.purge(Duration::from_millis(1500)).unwrap();
    assert_eq!(report.objects_removed, 1);
    assert_eq!(report.pointers_removed, 0);
    assert_eq!(cache.read_file("key").unwrap(), b"fresh");
    assert_eq!(partition_len(&cache, "key"), 2);
}

#[test]
fn test_purge_aborts_on_malformed_entry() {
    let cache = TempCache::new();
    cache.write_file("test", b"value").unwrap();
    cache.write_file("hello", b"value").unwrap();

    let digest = cache.digest("test");
    let corrupted = cache
        .root()
        .join(digest.partition())
        .join(format!("{}.not-a-stamp", digest.to_hex()));
    fs::write(&corrupted, b"junk").unwrap();

    let err = cache.purge(Duration::ZERO).unwrap_err();
    assert!(matches!(err, StowError::MalformedEntry { .. }));

    // Nothing was deleted
    assert_eq!(cache.read_file("test").unwrap(), b"value");
    assert_eq!(cache.read_file("hello").unwrap(), b"value");
    assert!(corrupted.exists());
}

#[test]
fn test_purge_rejects_foreign_directory() {
    let cache = TempCache::new();
    cache.write_file("test", b"value").unwrap();
    fs::create_dir(cache.root().join("lost+found")).unwrap();

    let err = cache.purge(Duration::ZERO).unwrap_err();
    assert!(matches!(err, StowError::MalformedEntry { .. }));
    assert!(cache.contains("test"));
}

#[test]
fn test_purge_rejects_entry_in_wrong_partition() {
    let cache = TempCache::new();
    let digest = cache.digest("test");
    let wrong = cache.root().join("00");
    fs::create_dir(&wrong).unwrap();
    fs::write(wrong.join(format!("{}.10", digest.to_hex())), b"misplaced").unwrap();

    let err = cache.purge(Duration::ZERO).unwrap_err();
    assert!(matches!(err, StowError::MalformedEntry { .. }));
}

#[test]
fn test_purge_ignores_files_at_root() {
    let cache = TempCache::new();
    fs::write(cache.root().join("CACHEDIR.TAG"), b"Signature: 8a477f597d28d172789f06886806bc55").unwrap();
    cache.write_file("key", b"value").unwrap();

    let report = cache.purge(Duration::ZERO).unwrap();
    assert_eq!(report.objects_removed, 1);
    assert!(cache.root().join("CACHEDIR.TAG").exists());
}

#[test]
fn test_purge_spares_fresh_temp_pointer() {
    let (cache, clock) = TempCache::with_fake_clock(Duration::ZERO);
    let digest = cache.digest("key");
    let partition = cache.root().join(digest.partition());
    fs::create_dir_all(&partition).unwrap();

    // A commit that has created its pointer but not renamed it yet
    let temp = partition.join(temp_pointer_name(&digest, clock.peek()).unwrap());
    symlink(format!("{}.10", digest.to_hex()), &temp).unwrap();

    let report = cache.purge(Duration::ZERO).unwrap();
    assert_eq!(report.temp_pointers_removed, 0);
    assert!(fs::symlink_metadata(&temp).is_ok());

    clock.advance(TEMP_POINTER_GRACE);
    let report = cache.purge(Duration::ZERO).unwrap();
    assert_eq!(report.temp_pointers_removed, 1);
    assert!(fs::symlink_metadata(&temp).is_err());
}

#[test]
fn test_purge_of_uncommitted_object_fails_commit_cleanly() {
    let cache = TempCache::new();
    let (mut tx, mut file) = cache.create("key").unwrap();
    file.write_all(b"value").unwrap();
    drop(file);

    // Uncommitted objects are fair game for purge.
    cache.purge(Duration::ZERO).unwrap();

    let err = cache.commit(&mut tx).unwrap_err();
    assert!(err.is_not_found());
    assert!(!cache.contains("key"));
    assert_eq!(partition_len(&cache, "key"), 0);
}

#[test]
fn test_purge_alongside_commits() {
    let cache = TempCache::new();

    std::thread::scope(|s| {
        for writer in 0..4u8 {
            let cache = cache.cache();
            s.spawn(move || {
                for _ in 0..25 {
                    // Only a purged staged object may fail a write; publishing never does.
                    if let Err(e) = cache.write_file("raced", &[writer; 32]) {
                        assert!(e.is_not_found(), "unexpected commit failure: {}", e);
                    }
                }
            });
        }

        let cache = cache.cache();
        s.spawn(move || {
            for _ in 0..25 {
                cache.purge(Duration::ZERO).unwrap();
            }
        });
    });

    // Staged objects and temporary pointers are all gone; at most the
    // published pointer remains, dangling if its object lost the race.
    cache.purge(Duration::ZERO).unwrap();
    let partition = cache.root().join(cache.digest("raced").partition());
    for entry in fs::read_dir(partition).unwrap() {
        let name = entry.unwrap().file_name().into_string().unwrap();
        assert!(matches!(EntryName::parse(&name), Ok(EntryName::Pointer(_))), "{} left behind", name);
    }
}

#[test]
fn test_purge_key() {
    let (cache, clock) = TempCache::with_fake_clock(Duration::from_secs(1));
    cache.write_file("hello", b"hello").unwrap();
    cache.write_file("world", b"world").unwrap();

    // Too young
    let report = cache.purge_key("hello", Duration::from_secs(60)).unwrap();
    assert_eq!(report, PurgeReport::default());
    assert!(cache.contains("hello"));

    clock.advance(Duration::from_secs(60));
    let report = cache.purge_key("hello", Duration::from_secs(60)).unwrap();
    assert_eq!(report.objects_removed, 1);
    assert_eq!(report.pointers_removed, 1);
    assert_eq!(report.bytes_freed, 5);
    assert!(!cache.contains("hello"));
    assert!(cache.contains("world"));

    let report = cache.purge_key("missing", Duration::ZERO).unwrap();
    assert_eq!(report, PurgeReport::default());
}

#[test]
fn test_purge_expired_uses_configured_age() {
    let (cache, clock) = TempCache::with_fake_clock(Duration::from_secs(1));
    let cache_with_age = cache.cache().clone().with_purge_max_age(Duration::from_secs(30));
    cache_with_age.write_file("key", b"value").unwrap();

    assert_eq!(cache_with_age.purge_expired().unwrap().objects_removed, 0);
    clock.advance(Duration::from_secs(30));
    assert_eq!(cache_with_age.purge_expired().unwrap().objects_removed, 1);
}

#[test]
fn test_format_bytes_freed() {
    let report = |bytes_freed| PurgeReport {
        bytes_freed,
        ..PurgeReport::default()
    };
    assert_eq!(report(512).format_bytes_freed(), "512 B");
    assert_eq!(report(1536).format_bytes_freed(), "1.5 KB");
    assert_eq!(report(5 * 1024 * 1024).format_bytes_freed(), "5.0 MB");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(10))]

    /// Property: an entry is purged exactly when its age reaches the threshold
    #[test]
    fn prop_purge_age_boundary(age_secs in 0u64..100, max_age_secs in 1u64..100) {
        let (cache, clock) = TempCache::with_fake_clock(Duration::from_nanos(1));
        cache.write_file("key", b"value").unwrap();
        clock.advance(Duration::from_secs(age_secs));

        let report = cache.purge(Duration::from_secs(max_age_secs)).unwrap();
        let expired = age_secs >= max_age_secs;
        prop_assert_eq!(report.objects_removed, usize::from(expired));
        prop_assert_eq!(cache.contains("key"), !expired);
    }
}
