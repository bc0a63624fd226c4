use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use medley_core::{BatchFile, Checkpoint, CheckpointWriter, DirectoryRecord};
use medley_scan::{ScanStreamParser, StreamEvent};
use medley_worker::{WorkerError, WorkerOptions, run};

fn collection() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("music");
    for (sub, files) in [
        ("a", &["01.mp3", "02.mp3"][..]),
        ("b", &["01.flac"][..]),
        ("c", &["notes.txt"][..]),
    ] {
        fs::create_dir_all(root.join(sub)).unwrap();
        for file in files {
            fs::write(root.join(sub).join(file), format!("{sub}/{file}")).unwrap();
        }
    }
    dir
}

fn parse(bytes: &[u8]) -> (Option<StreamEvent>, Vec<DirectoryRecord>) {
    let mut parser = ScanStreamParser::new();
    let events = parser.push(bytes).unwrap();
    parser.finish().unwrap();

    let header = events
        .iter()
        .find(|e| matches!(e, StreamEvent::Header { .. }))
        .cloned();
    let dirs = events
        .into_iter()
        .filter_map(|e| match e {
            StreamEvent::Directory(d) => Some(d),
            _ => None,
        })
        .collect();
    (header, dirs)
}

fn options(batch: &Path, checkpoint: &Path) -> WorkerOptions {
    WorkerOptions {
        batch: Some(batch.to_path_buf()),
        checkpoint: Some(checkpoint.to_path_buf()),
        recursive: true,
        ..Default::default()
    }
}

#[test]
fn test_stream_round_trips_through_parser() {
    let dir = collection();
    let root = dir.path().join("music");

    let mut out = Vec::new();
    let written = run(
        &WorkerOptions {
            directories: vec![root.clone()],
            recursive: true,
            ..Default::default()
        },
        &mut out,
    )
    .unwrap();
    assert_eq!(written, 4);

    let (header, dirs) = parse(&out);
    assert_eq!(
        header,
        Some(StreamEvent::Header {
            count: Some(4),
            incremental: false
        })
    );
    let paths: Vec<PathBuf> = dirs.iter().map(|d| d.path.clone()).collect();
    assert_eq!(
        paths,
        vec![root.clone(), root.join("a"), root.join("b"), root.join("c")]
    );
    assert_eq!(dirs[1].track_count(), 2);
    assert_eq!(dirs[2].track_count(), 1);
    assert_eq!(dirs[3].track_count(), 0);
    assert!(dirs.iter().flat_map(|d| d.tracks()).all(|t| !t.unique_id.is_empty()));
}

#[test]
fn test_incremental_skips_unchanged_directories() {
    let dir = collection();
    let root = dir.path().join("music");
    let mtime = |p: &Path| {
        fs::metadata(p)
            .unwrap()
            .modified()
            .unwrap()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
    };

    let batch_path = dir.path().join("batch.json");
    BatchFile::new([root.clone()])
        .with_known(root.join("a"), mtime(&root.join("a")))
        .with_known(root.join("b"), 1)
        .write(&batch_path)
        .unwrap();

    let mut out = Vec::new();
    let mut opts = options(&batch_path, &dir.path().join("checkpoint"));
    opts.incremental = true;
    run(&opts, &mut out).unwrap();

    let (header, dirs) = parse(&out);
    assert!(matches!(
        header,
        Some(StreamEvent::Header {
            incremental: true,
            ..
        })
    ));
    let a = dirs.iter().find(|d| d.path == root.join("a")).unwrap();
    let b = dirs.iter().find(|d| d.path == root.join("b")).unwrap();
    assert!(a.skipped);
    assert_eq!(a.track_count(), 0);
    assert!(!b.skipped);
    assert_eq!(b.track_count(), 1);
}

fn journal(path: &Path, directories: &[PathBuf]) {
    let mut writer = CheckpointWriter::open(path, false).unwrap();
    for directory in directories {
        writer.record(directory).unwrap();
    }
}

#[test]
fn test_restart_resumes_after_checkpoint() {
    let dir = collection();
    let root = dir.path().join("music");
    let batch_path = dir.path().join("batch.json");
    let checkpoint = dir.path().join("checkpoint");
    BatchFile::new([root.clone()]).write(&batch_path).unwrap();

    let mut out = Vec::new();
    run(&options(&batch_path, &checkpoint), &mut out).unwrap();
    assert_eq!(Checkpoint::read(&checkpoint).len(), 4);

    // pretend the first run died after two directories
    journal(&checkpoint, &[root.clone(), root.join("a")]);
    let mut opts = options(&batch_path, &checkpoint);
    opts.restart = true;
    let mut resumed = Vec::new();
    let written = run(&opts, &mut resumed).unwrap();
    assert_eq!(written, 2);

    let (_, dirs) = parse(&resumed);
    let paths: Vec<PathBuf> = dirs.into_iter().map(|d| d.path).collect();
    assert_eq!(paths, vec![root.join("b"), root.join("c")]);
    assert_eq!(Checkpoint::read(&checkpoint).len(), 4);
}

#[test]
fn test_restart_after_tree_changed_emits_every_remaining_directory() {
    let dir = collection();
    let root = dir.path().join("music");
    let batch_path = dir.path().join("batch.json");
    let checkpoint = dir.path().join("checkpoint");
    BatchFile::new([root.clone()]).write(&batch_path).unwrap();

    journal(&checkpoint, &[root.clone(), root.join("a")]);
    fs::remove_dir_all(root.join("a")).unwrap();
    fs::create_dir(root.join("aa")).unwrap();

    let mut opts = options(&batch_path, &checkpoint);
    opts.restart = true;
    let mut resumed = Vec::new();
    run(&opts, &mut resumed).unwrap();

    let (_, dirs) = parse(&resumed);
    let paths: Vec<PathBuf> = dirs.into_iter().map(|d| d.path).collect();
    assert_eq!(paths, vec![root.join("aa"), root.join("b"), root.join("c")]);
}

#[test]
fn test_without_restart_checkpoint_is_ignored() {
    let dir = collection();
    let root = dir.path().join("music");
    let batch_path = dir.path().join("batch.json");
    let checkpoint = dir.path().join("checkpoint");
    BatchFile::new([root.clone()]).write(&batch_path).unwrap();
    journal(&checkpoint, &[root.clone(), root.join("a"), root.join("b")]);

    let written = run(&options(&batch_path, &checkpoint), Vec::new()).unwrap();
    assert_eq!(written, 4);
    assert_eq!(Checkpoint::read(&checkpoint).len(), 4);
}

#[test]
fn test_nothing_to_scan() {
    let result = run(&WorkerOptions::default(), Vec::new());
    assert!(matches!(result, Err(WorkerError::NothingToScan)));
}

#[test]
fn test_missing_batch_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = run(
        &options(&dir.path().join("missing.json"), &dir.path().join("cp")),
        Vec::new(),
    );
    assert!(matches!(result, Err(WorkerError::Batch { .. })));
}

#[test]
fn test_binary_reports_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_medley-scanner"))
        .arg("--version")
        .output()
        .unwrap();
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).unwrap();
    assert_eq!(
        text.split_whitespace().last(),
        Some(medley_core::VERSION)
    );
}

#[test]
fn test_binary_writes_stream_to_stdout() {
    let dir = collection();
    let root = dir.path().join("music");
    let output = Command::new(env!("CARGO_BIN_EXE_medley-scanner"))
        .arg("--recursive")
        .arg(root.join("a"))
        .output()
        .unwrap();
    assert!(output.status.success());

    let (_, dirs) = parse(&output.stdout);
    assert_eq!(dirs.len(), 1);
    assert_eq!(dirs[0].track_count(), 2);
}
