//! Multi-threaded safety: readers run in parallel, mutations serialise,
//! and every file reads back exactly what its operation history implies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;

use fatdisk::{DiskError, FatDisk};
use rand::Rng;
use tempfile::TempDir;

const BLOCK_SIZE: usize = 1024;
const MAX_DISK_SIZE: usize = 64 * 1024 * 1024;
const MAX_FILES: usize = 1024;
const THREAD_COUNT: usize = 16;

fn scratch_disk() -> (TempDir, Arc<FatDisk>) {
    let dir = TempDir::new().expect("tempdir");
    let disk = FatDisk::create_with(
        dir.path().join("disk.img"),
        BLOCK_SIZE,
        MAX_DISK_SIZE,
        MAX_FILES,
    )
    .expect("create disk");
    (dir, Arc::new(disk))
}

#[test]
fn concurrent_readers_see_identical_bytes() {
    let (_dir, disk) = scratch_disk();
    disk.write_file("file1", b"test").unwrap();

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let disk = Arc::clone(&disk);
            thread::spawn(move || {
                for _ in 0..100 {
                    assert_eq!(disk.read_file("file1").unwrap(), b"test");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn concurrent_writers_on_distinct_names() {
    let (_dir, disk) = scratch_disk();

    let handles: Vec<_> = (0..THREAD_COUNT)
        .map(|i| {
            let disk = Arc::clone(&disk);
            thread::spawn(move || {
                disk.write_file(&format!("file_{i}"), format!("data_{i}").as_bytes())
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for i in 0..THREAD_COUNT {
        assert_eq!(
            disk.read_file(&format!("file_{i}")).unwrap(),
            format!("data_{i}").into_bytes()
        );
    }
}

#[test]
fn readers_interleaved_with_writers() {
    let (_dir, disk) = scratch_disk();
    disk.write_file("stable", b"constant bytes").unwrap();

    let writers: Vec<_> = (0..4)
        .map(|i| {
            let disk = Arc::clone(&disk);
            thread::spawn(move || {
                for round in 0..50 {
                    disk.write_file(&format!("writer_{i}"), format!("round_{round}").as_bytes())
                        .unwrap();
                }
            })
        })
        .collect();
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let disk = Arc::clone(&disk);
            thread::spawn(move || {
                for _ in 0..200 {
                    assert_eq!(disk.read_file("stable").unwrap(), b"constant bytes");
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }
}

/// Each file is touched by exactly one thread, so the tracked expectation
/// is exact; the interleaving across files is arbitrary.
#[test]
fn mixed_workload_matches_tracked_state() {
    let (_dir, disk) = scratch_disk();
    let file_count = 500;
    let expected: Arc<Mutex<HashMap<String, Vec<u8>>>> = Arc::new(Mutex::new(HashMap::new()));

    for i in 0..file_count {
        let name = format!("file_{i}");
        let content = format!("initial_{i}").into_bytes();
        disk.write_file(&name, &content).unwrap();
        expected.lock().unwrap().insert(name, content);
    }

    let handles: Vec<_> = (0..THREAD_COUNT)
        .map(|t| {
            let disk = Arc::clone(&disk);
            let expected = Arc::clone(&expected);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for i in (t..file_count).step_by(THREAD_COUNT) {
                    let name = format!("file_{i}");
                    match rng.gen_range(0..4) {
                        0 => {
                            disk.delete_file(&name).unwrap();
                            expected.lock().unwrap().remove(&name);
                        }
                        1 => {
                            let content = format!("updated_{i}").into_bytes();
                            disk.write_file(&name, &content).unwrap();
                            expected.lock().unwrap().insert(name, content);
                        }
                        2 => {
                            let suffix = format!("_appended_{i}").into_bytes();
                            disk.append_file(&name, &suffix).unwrap();
                            expected
                                .lock()
                                .unwrap()
                                .get_mut(&name)
                                .unwrap()
                                .extend_from_slice(&suffix);
                        }
                        _ => {
                            let read = disk.read_file(&name).unwrap();
                            assert_eq!(read, expected.lock().unwrap()[&name]);
                        }
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let expected = expected.lock().unwrap();
    for i in 0..file_count {
        let name = format!("file_{i}");
        match expected.get(&name) {
            Some(content) => assert_eq!(disk.read_file(&name).unwrap(), *content),
            None => assert!(matches!(
                disk.read_file(&name).unwrap_err(),
                DiskError::FileNotFound(_)
            )),
        }
    }
}
