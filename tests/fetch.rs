use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use seqidx::domain::{DownloadTask, Protocol, RemoteFileRef};
use seqidx::error::{SeqidxError, Stage};
use seqidx::fetch::Downloader;
use seqidx::remote::Fetcher;

/// Serves fixed bodies keyed by file name and records every request.
#[derive(Default)]
struct MockFetcher {
    bodies: HashMap<String, Vec<u8>>,
    failing: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    fn with_files(count: usize) -> Self {
        let bodies = (0..count)
            .map(|index| {
                let body = format!("file {index}\n").repeat(1000 + index * 37);
                (format!("file{index}.gz"), body.into_bytes())
            })
            .collect();
        Self {
            bodies,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    fn retrieve(&self, file: &RemoteFileRef, sink: &mut dyn Write) -> Result<u64, SeqidxError> {
        self.calls.lock().unwrap().push(file.file_name.clone());
        if self.failing.as_deref() == Some(file.file_name.as_str()) {
            return Err(SeqidxError::Transfer {
                file: file.file_name.clone(),
                message: "550 no such file".to_string(),
            });
        }
        let body = &self.bodies[&file.file_name];
        // Several writes so a cancelled sink can interrupt mid-file.
        for chunk in body.chunks(512) {
            sink.write_all(chunk).map_err(|err| SeqidxError::Transfer {
                file: file.file_name.clone(),
                message: err.to_string(),
            })?;
        }
        Ok(body.len() as u64)
    }
}

fn scratch() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

fn tasks(dir: &Utf8PathBuf, count: usize) -> Vec<DownloadTask> {
    (0..count)
        .map(|index| {
            let name = format!("file{index}.gz");
            DownloadTask {
                file: RemoteFileRef::new(Protocol::Ftp, "ftp.example.org", "pub", name.clone()),
                destination: dir.join(name),
            }
        })
        .collect()
}

#[test]
fn every_file_fetched_once_for_any_concurrency() {
    const FILES: usize = 6;
    for connections in 1..=FILES {
        let (_temp, root) = scratch();
        let dir = root.join("bundle");
        let downloader = Downloader::new(MockFetcher::with_files(FILES), connections);

        let report = downloader.download(&dir, tasks(&dir, FILES)).unwrap();

        let mut calls = downloader.fetcher().calls();
        calls.sort();
        let mut expected = (0..FILES)
            .map(|index| format!("file{index}.gz"))
            .collect::<Vec<_>>();
        expected.sort();
        assert_eq!(calls, expected, "connections = {connections}");
        assert_eq!(report.files.len(), FILES);

        for (name, body) in &downloader.fetcher().bodies {
            assert_eq!(&std::fs::read(dir.join(name)).unwrap(), body);
        }
        let expected_bytes: usize = downloader.fetcher().bodies.values().map(Vec::len).sum();
        assert_eq!(report.total_bytes(), expected_bytes as u64);
    }
}

#[test]
fn report_carries_urls() {
    let (_temp, root) = scratch();
    let dir = root.join("bundle");
    let downloader = Downloader::new(MockFetcher::with_files(1), 3);
    let report = downloader.download(&dir, tasks(&dir, 1)).unwrap();
    assert_eq!(report.files[0].url, "ftp://ftp.example.org:21/pub/file0.gz");
    assert_eq!(report.files[0].destination, dir.join("file0.gz"));
}

#[test]
fn failure_cancels_remaining_transfers() {
    let (_temp, root) = scratch();
    let dir = root.join("bundle");
    let fetcher = MockFetcher {
        failing: Some("file1.gz".to_string()),
        ..MockFetcher::with_files(5)
    };
    let downloader = Downloader::new(fetcher, 1);

    let err = downloader.download(&dir, tasks(&dir, 5)).unwrap_err();

    assert_matches!(
        err,
        SeqidxError::StageFailed { stage: Stage::Fetch, ref failures, ref incomplete }
            if failures.len() == 1
                && incomplete == &["file2.gz", "file3.gz", "file4.gz"]
    );
    assert_eq!(downloader.fetcher().calls(), vec!["file0.gz", "file1.gz"]);
    assert!(dir.join("file0.gz").exists());
    assert!(!dir.join("file1.gz").exists());
    assert!(!dir.join("file2.gz").exists());
}

/// Streams `good*` files slowly; `bad.gz` fails once every good file is mid-transfer.
struct SlowFetcher {
    streaming: AtomicUsize,
    good_files: usize,
}

impl Fetcher for SlowFetcher {
    fn retrieve(&self, file: &RemoteFileRef, sink: &mut dyn Write) -> Result<u64, SeqidxError> {
        let transfer_error = |message: String| SeqidxError::Transfer {
            file: file.file_name.clone(),
            message,
        };
        if file.file_name == "bad.gz" {
            let deadline = Instant::now() + Duration::from_secs(5);
            while self.streaming.load(Ordering::SeqCst) < self.good_files
                && Instant::now() < deadline
            {
                thread::sleep(Duration::from_millis(1));
            }
            return Err(transfer_error("connection reset".to_string()));
        }

        let mut written = 0;
        for chunk in 0..5000 {
            sink.write_all(&[b'A'; 64])
                .map_err(|err| transfer_error(err.to_string()))?;
            written += 64;
            if chunk == 0 {
                self.streaming.fetch_add(1, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_millis(2));
        }
        Ok(written)
    }
}

#[test]
fn failure_interrupts_transfers_in_flight() {
    let (_temp, root) = scratch();
    let dir = root.join("bundle");
    let downloader = Downloader::new(
        SlowFetcher {
            streaming: AtomicUsize::new(0),
            good_files: 2,
        },
        3,
    );
    let tasks = ["good1.gz", "good2.gz", "bad.gz"]
        .into_iter()
        .map(|name| DownloadTask {
            file: RemoteFileRef::new(Protocol::Ftp, "ftp.example.org", "pub", name),
            destination: dir.join(name),
        })
        .collect();

    let started = Instant::now();
    let err = downloader.download(&dir, tasks).unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(8));
    let (failures, mut incomplete) = match err {
        SeqidxError::StageFailed {
            stage: Stage::Fetch,
            failures,
            incomplete,
        } => (failures, incomplete),
        other => panic!("expected a fetch stage failure, got {other:?}"),
    };
    assert_matches!(&failures[..], [SeqidxError::Transfer { file, .. }] if file == "bad.gz");
    incomplete.sort();
    assert_eq!(incomplete, vec!["good1.gz", "good2.gz"]);
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
}

#[test]
fn failed_transfer_leaves_no_partial_file() {
    let (_temp, root) = scratch();
    let dir = root.join("bundle");
    let fetcher = MockFetcher {
        failing: Some("file0.gz".to_string()),
        ..MockFetcher::with_files(3)
    };
    let downloader = Downloader::new(fetcher, 3);

    assert!(downloader.download(&dir, tasks(&dir, 3)).is_err());
    let leftovers = std::fs::read_dir(&dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .filter(|name| name.ends_with(".part"))
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn existing_destination_is_rejected() {
    let (_temp, root) = scratch();
    let dir = root.join("bundle");
    std::fs::create_dir(&dir).unwrap();
    std::fs::write(dir.join("keep.txt"), b"untouched").unwrap();
    let downloader = Downloader::new(MockFetcher::with_files(2), 2);

    let err = downloader.download(&dir, tasks(&dir, 2)).unwrap_err();

    assert_matches!(err, SeqidxError::DestinationExists(path) if path == dir);
    assert!(downloader.fetcher().calls().is_empty());
    assert_eq!(std::fs::read(dir.join("keep.txt")).unwrap(), b"untouched");
}

#[test]
fn zero_connections_is_invalid() {
    let (_temp, root) = scratch();
    let dir = root.join("bundle");
    let downloader = Downloader::new(MockFetcher::with_files(1), 0);
    let err = downloader.download(&dir, tasks(&dir, 1)).unwrap_err();
    assert_matches!(err, SeqidxError::InvalidArgument(_));
    assert!(!dir.exists());
}
