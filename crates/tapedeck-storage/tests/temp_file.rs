//! Integration tests for `TempFile`.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use rstest::{fixture, rstest};
use tapedeck_storage::{
    FileStatus, StorageError, TempAllocator, TempFile, TempFileOptions, WaitOutcome,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct Fixture {
    _dir: TempDir,
    file: TempFile,
    cancel: CancellationToken,
}

#[fixture]
fn temp() -> Fixture {
    let dir = TempDir::new().unwrap();
    let alloc = TempAllocator::new(dir.path());
    let cancel = CancellationToken::new();
    let file = TempFile::create(
        &alloc,
        TempFileOptions::new(alloc.allocate_temp_location(), cancel.clone()),
    )
    .unwrap();
    Fixture {
        _dir: dir,
        file,
        cancel,
    }
}

fn never() -> bool {
    false
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[test]
fn cursor_tracks_appended_bytes(temp: Fixture) {
    let chunks: [&[u8]; 4] = [b"abc", b"", b"defgh", b"i"];
    let mut expected = 0u64;
    let mut last = 0u64;

    for chunk in chunks {
        let cursor = temp.file.append(chunk).unwrap();
        expected += chunk.len() as u64;
        assert_eq!(cursor, expected);
        assert!(cursor >= last);
        last = cursor;
    }

    let on_disk = std::fs::read(temp.file.path()).unwrap();
    assert_eq!(on_disk, b"abcdefghi");
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[test]
fn out_of_order_write_does_not_move_cursor(temp: Fixture) {
    temp.file.write_at(0, &[1; 100]).unwrap();
    temp.file.write_at(300, &[3; 100]).unwrap();
    assert_eq!(temp.file.write_cursor(), 100);
    assert_eq!(temp.file.readable_end(300), 400);

    temp.file.write_at(100, &[2; 200]).unwrap();
    assert_eq!(temp.file.write_cursor(), 400);
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[test]
fn read_at_is_clamped_to_durable_bytes(temp: Fixture) {
    temp.file.append(b"0123456789").unwrap();

    let mut buf = [0u8; 32];
    assert_eq!(temp.file.read_at(4, &mut buf).unwrap(), 6);
    assert_eq!(&buf[..6], b"456789");
    assert_eq!(temp.file.read_at(10, &mut buf).unwrap(), 0);
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[test]
fn wait_range_wakes_on_write(temp: Fixture) {
    let writer = temp.file.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        writer.append(&[0u8; 64]).unwrap();
    });

    let outcome = temp.file.wait_range(0..64, &never).unwrap();
    assert_eq!(outcome, WaitOutcome::Ready);
    handle.join().unwrap();
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[test]
fn wait_past_complete_len_is_eof(temp: Fixture) {
    temp.file.append(&[0u8; 10]).unwrap();
    temp.file.complete(10).unwrap();

    assert_eq!(temp.file.wait_range(10..20, &never).unwrap(), WaitOutcome::Eof);
    assert_eq!(temp.file.wait_range(5..20, &never).unwrap(), WaitOutcome::Ready);
    assert_eq!(temp.file.status(), FileStatus::Complete { len: 10 });
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[test]
fn complete_with_hole_is_rejected(temp: Fixture) {
    temp.file.write_at(0, &[0u8; 10]).unwrap();
    temp.file.write_at(20, &[0u8; 10]).unwrap();

    let err = temp.file.complete(30).unwrap_err();
    assert!(matches!(err, StorageError::InvalidRange { start: 10, end: 20 }));
    assert_eq!(temp.file.status(), FileStatus::Active);
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[test]
fn abandoned_file_serves_prefix_then_eof(temp: Fixture) {
    temp.file.append(&[9u8; 300]).unwrap();
    temp.file.abandon("network gone");

    assert_eq!(temp.file.wait_range(0..1, &never).unwrap(), WaitOutcome::Ready);
    assert_eq!(temp.file.wait_range(300..301, &never).unwrap(), WaitOutcome::Eof);

    let err = temp.file.append(b"more").unwrap_err();
    assert!(matches!(err, StorageError::Abandoned(_)));
    assert_eq!(std::fs::metadata(temp.file.path()).unwrap().len(), 300);
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[test]
fn cancel_unblocks_waiter(temp: Fixture) {
    let file = temp.file.clone();
    let handle = thread::spawn(move || file.wait_range(0..1, &never));

    thread::sleep(Duration::from_millis(30));
    let started = Instant::now();
    temp.cancel.cancel();

    let result = handle.join().unwrap();
    assert!(matches!(result, Err(StorageError::Cancelled)));
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[test]
fn interrupt_predicate_unblocks_waiter(temp: Fixture) {
    let flag = Arc::new(AtomicBool::new(false));
    let file = temp.file.clone();
    let waiter_flag = Arc::clone(&flag);
    let handle =
        thread::spawn(move || file.wait_range(0..1, &|| waiter_flag.load(Ordering::Acquire)));

    thread::sleep(Duration::from_millis(30));
    flag.store(true, Ordering::Release);
    temp.file.wake_waiters();

    assert_eq!(handle.join().unwrap().unwrap(), WaitOutcome::Interrupted);
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[test]
fn reader_handle_survives_relocation(temp: Fixture) {
    temp.file.append(b"persisted bytes").unwrap();
    temp.file.complete(15).unwrap();
    let mut reader = temp.file.open_reader().unwrap();

    let dest = temp.file.path().with_extension("mp3");
    TempAllocator::default()
        .move_file(&temp.file.path(), &dest)
        .unwrap();
    temp.file.relocate(&dest);

    let mut buf = String::new();
    std::io::Read::read_to_string(&mut reader, &mut buf).unwrap();
    assert_eq!(buf, "persisted bytes");
    assert_eq!(temp.file.path(), dest);
}
