//! Integration tests for the rolling log writer
//!
//! Tests cover:
//! - Flush boundaries and byte-exact file contents
//! - Size-based rotation
//! - Backup retention
//! - Reopening existing files
//! - Concurrent writers and the tracing fmt adapter

use rolling_log_writer::{
    Config, LocalStorage, RollingWriter, Settings, SharedWriter, Thresholds,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Helper to create relaxed settings with byte-sized thresholds
fn relaxed(dir: &TempDir, rotation: u64, flush: u64, sync: u64, backups: usize) -> Settings {
    Settings::new(
        dir.path().join("app.log"),
        Thresholds {
            rotation_size: rotation,
            flush_size: flush,
            sync_size: sync,
            max_backups: backups,
        },
        true,
    )
}

fn open(settings: Settings) -> RollingWriter {
    RollingWriter::with_storage(settings, LocalStorage).unwrap()
}

/// Helper to list the files in the log directory
fn files(dir: &TempDir) -> Vec<PathBuf> {
    let mut files: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    files.sort();
    files
}

fn read(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap()
}

#[test]
fn test_small_thresholds_scenario() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.log");
    let mut log = open(relaxed(&dir, 9, 3, 6, 4));

    log.append(b"AB").unwrap();
    assert_eq!(read(&path), b"");

    // "ABC" reaches the flush size and is pushed, "D" stays buffered
    log.append(b"CD").unwrap();
    assert_eq!(read(&path), b"ABC");
    assert_eq!(log.buffered(), 1);

    log.append(b"EF").unwrap();
    assert_eq!(read(&path), b"ABCDEF");
    assert_eq!(log.unsynced(), 0);

    log.append(b"GH").unwrap();
    assert_eq!(log.backups().unwrap().len(), 0);

    log.append(b"IJ").unwrap();

    let backups = log.backups().unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(read(&backups[0].path), b"ABCDEFGHI");

    log.flush().unwrap();
    assert_eq!(read(&path), b"J");
    assert_eq!(log.active_size(), 1);
}

#[test]
fn test_appends_below_rotation_size_are_preserved() {
    let dir = TempDir::new().unwrap();
    let mut log = open(relaxed(&dir, 10_000, 7, 20, 4));

    let mut expected = Vec::new();
    for i in 0..200 {
        // Mix of buffered and direct writes
        let record = format!("record {} {}\n", i, "x".repeat(i % 13));
        log.append(record.as_bytes()).unwrap();
        expected.extend_from_slice(record.as_bytes());
    }

    log.flush().unwrap();

    assert!(expected.len() < 10_000);
    assert_eq!(read(log.path()), expected);
    assert_eq!(log.active_size(), expected.len() as u64);
    assert!(log.backups().unwrap().is_empty());
}

#[test]
fn test_rotation_once_per_crossing() {
    let dir = TempDir::new().unwrap();
    let mut log = open(relaxed(&dir, 10, 3, 6, 16));

    for _ in 0..35 {
        log.append(b"z").unwrap();
    }
    log.flush().unwrap();

    let backups = log.backups().unwrap();
    assert_eq!(backups.len(), 3);
    for backup in &backups {
        assert_eq!(read(&backup.path).len(), 10);
    }
    assert_eq!(read(log.path()).len(), 5);
}

#[test]
fn test_payload_spanning_several_files() {
    let dir = TempDir::new().unwrap();
    let mut log = open(relaxed(&dir, 8, 2, 4, 4));

    let payload: Vec<u8> = (b'a'..b'a' + 20).collect();
    assert_eq!(log.append(&payload).unwrap(), 20);
    log.flush().unwrap();

    let backups = log.backups().unwrap();
    assert_eq!(backups.len(), 2);
    // newest first
    assert_eq!(read(&backups[1].path), &payload[..8]);
    assert_eq!(read(&backups[0].path), &payload[8..16]);
    assert_eq!(read(log.path()), &payload[16..]);
}

#[test]
fn test_retention_keeps_newest_backups() {
    let dir = TempDir::new().unwrap();
    let mut log = open(relaxed(&dir, 4, 2, 4, 2));

    log.append(b"aaaabbbbccccdddd").unwrap();

    let backups = log.backups().unwrap();
    assert_eq!(backups.len(), 2);
    assert_eq!(read(&backups[0].path), b"dddd");
    assert_eq!(read(&backups[1].path), b"cccc");

    // two backups plus the (empty) active file
    assert_eq!(files(&dir).len(), 3);
}

#[test]
fn test_forced_rotations_get_distinct_names() {
    let dir = TempDir::new().unwrap();
    let mut log = open(relaxed(&dir, 1024, 4, 8, 8));

    for record in [b"one\n" as &[u8], b"two\n", b"three\n"] {
        log.append(record).unwrap();
        log.rotate().unwrap();
    }

    let backups = log.backups().unwrap();
    assert_eq!(backups.len(), 3);
    assert!(backups[0] > backups[1] && backups[1] > backups[2]);
    assert_eq!(read(&backups[0].path), b"three\n");
    assert_eq!(read(&backups[2].path), b"one\n");
    assert_eq!(read(log.path()), b"");
}

#[test]
fn test_backup_names_follow_the_output_path() {
    let dir = TempDir::new().unwrap();
    let mut log = open(relaxed(&dir, 4, 2, 4, 4));

    log.append(b"abcd").unwrap();

    let backups = log.backups().unwrap();
    let name = backups[0].path.file_name().unwrap().to_str().unwrap();
    let timestamp = name.strip_prefix("app.log-").unwrap();
    assert!(
        chrono::NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H-%M-%S%.3f").is_ok(),
        "{name}"
    );
    assert_eq!(backups[0].path.parent(), Some(dir.path()));
}

#[test]
fn test_reopen_appends_to_existing_file() {
    let dir = TempDir::new().unwrap();

    let mut log = open(relaxed(&dir, 100, 4, 8, 4));
    log.append(b"hello ").unwrap();
    log.close().unwrap();

    let mut log = open(relaxed(&dir, 100, 4, 8, 4));
    assert_eq!(log.active_size(), 6);
    log.append(b"world").unwrap();
    log.close().unwrap();

    assert_eq!(read(&dir.path().join("app.log")), b"hello world");
}

#[test]
fn test_reopen_oversized_file_rotates_first() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.log");
    fs::write(&path, b"0123456789ab").unwrap();

    let mut log = open(relaxed(&dir, 9, 3, 6, 4));
    log.append(b"x").unwrap();
    log.flush().unwrap();

    let backups = log.backups().unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(read(&backups[0].path), b"0123456789ab");
    assert_eq!(read(&path), b"x");
}

#[test]
fn test_close_and_drop_drain_the_buffer() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.log");

    let mut log = open(relaxed(&dir, 100, 50, 100, 4));
    log.append(b"closed").unwrap();
    assert_eq!(read(&path), b"");
    log.close().unwrap();
    assert_eq!(read(&path), b"closed");

    let mut log = open(relaxed(&dir, 100, 50, 100, 4));
    log.append(b" dropped").unwrap();
    drop(log);
    assert_eq!(read(&path), b"closed dropped");
}

#[test]
fn test_default_config_is_page_aligned() {
    let dir = TempDir::new().unwrap();
    let config = Config::new(dir.path().join("logs").join("app.log"));

    let mut log = RollingWriter::open(&config).unwrap();
    assert_eq!(log.settings().flush_size(), 64 * 1024);

    log.append(b"first\n").unwrap();
    log.sync().unwrap();

    assert_eq!(read(&dir.path().join("logs").join("app.log")), b"first\n");
}

#[test]
fn test_io_write_adapter() {
    use std::io::Write;

    let dir = TempDir::new().unwrap();
    let mut log = open(relaxed(&dir, 16, 4, 8, 4));

    writeln!(log, "{}-{}", "key", 42).unwrap();
    log.write_all(b"0123456789").unwrap();
    Write::flush(&mut log).unwrap();

    let backups = log.backups().unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(read(&backups[0].path), b"key-42\n012345678");
    assert_eq!(read(log.path()), b"9");
}

#[test]
fn test_shared_writer_serializes_records() {
    let dir = TempDir::new().unwrap();
    let log = SharedWriter::new(open(relaxed(&dir, 1 << 20, 64, 128, 4)));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let log = log.clone();
            std::thread::spawn(move || {
                for i in 0..100 {
                    let record = format!("thread-{t}-record-{i}\n");
                    log.append(record.as_bytes()).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    log.close().unwrap();

    let contents = String::from_utf8(read(&dir.path().join("app.log"))).unwrap();
    let lines: Vec<_> = contents.lines().collect();
    assert_eq!(lines.len(), 800);
    for line in lines {
        assert!(line.starts_with("thread-") && line.contains("-record-"), "{line}");
    }
}

#[test]
fn test_tracing_fmt_layer_writes_to_log() {
    let dir = TempDir::new().unwrap();
    let log = SharedWriter::new(open(relaxed(&dir, 1 << 20, 1024, 2048, 4)));

    let subscriber = tracing_subscriber::fmt()
        .with_writer(log.clone())
        .with_ansi(false)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        tracing::info!(answer = 42, "hello from tracing");
    });

    log.flush().unwrap();

    let contents = String::from_utf8(read(&dir.path().join("app.log"))).unwrap();
    assert!(contents.contains("hello from tracing"), "{contents}");
    assert!(contents.contains("answer=42"), "{contents}");
}

#[test]
fn test_shared_writer_operations() {
    use std::io::Write;

    let dir = TempDir::new().unwrap();
    let log = SharedWriter::new(open(relaxed(&dir, 1024, 8, 16, 4)));

    (&log).write_all(b"via io::Write\n").unwrap();
    log.append(b"direct\n").unwrap();
    assert_eq!(log.with(|w| w.buffered() as u64 + w.active_size()), 21);

    log.rotate().unwrap();
    let backups = log.backups().unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(read(&backups[0].path), b"via io::Write\ndirect\n");

    // another handle keeps the writer alive, close only syncs
    let other = log.clone();
    log.append(b"tail").unwrap();
    log.close().unwrap();
    assert_eq!(read(&dir.path().join("app.log")), b"tail");

    other.append(b"!").unwrap();
    other.close().unwrap();
    assert_eq!(read(&dir.path().join("app.log")), b"tail!");
}

#[test]
fn test_rotating_an_empty_file_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let mut log = open(relaxed(&dir, 1024, 4, 8, 1));

    log.append(b"kept").unwrap();
    log.rotate().unwrap();
    assert_eq!(log.backups().unwrap().len(), 1);

    // an empty backup would push "kept" out of retention
    log.rotate().unwrap();
    log.rotate().unwrap();

    let backups = log.backups().unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(read(&backups[0].path), b"kept");

    // buffered bytes alone are enough to rotate
    log.append(b"x").unwrap();
    assert_eq!(log.active_size(), 0);
    log.rotate().unwrap();
    assert_eq!(read(&log.backups().unwrap()[0].path), b"x");
}
