use std::{
    path::Path,
    process::{Command, Output},
};

use chainmig_migrator::Namespace;
use chainmig_storage::{
    KeyValueReader, StorageBackend,
    api::schema::{ANCIENT_CUTOFF_KEY, canonical_hash_key, header_key},
    backend::rocksdb::RocksDBBackend,
};
use ethereum_types::H256;
use serde_json::Value;
use tempfile::TempDir;

const NAMESPACE: [u8; 32] = [0x5a; 32];
const BLOCKS: u64 = 8;

fn chainmig(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_chainmig"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("chainmig should run")
}

fn json_line(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let line = stdout
        .lines()
        .last()
        .unwrap_or_else(|| panic!("no stdout; stderr: {stderr}"));
    serde_json::from_str(line).expect("stdout should be a json line")
}

fn stdout_lines(output: &Output) -> usize {
    String::from_utf8_lossy(&output.stdout).lines().count()
}

fn seed_source(path: &Path) {
    let store = RocksDBBackend::open(path).expect("open source");
    for number in 0..BLOCKS {
        let hash = H256::from_low_u64_be(0xbeef + number);
        let header = [NAMESPACE.as_slice(), &header_key(number, hash)].concat();
        let canonical = [NAMESPACE.as_slice(), &canonical_hash_key(number)].concat();
        store.put(&header, &[0xc2, 0x80, 0x80]).expect("put header");
        store.put(&canonical, hash.as_bytes()).expect("put canonical");
    }
    store.flush().expect("flush source");
}

#[test]
fn help_lists_subcommands() {
    let output = chainmig(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for name in ["migrate", "verify", "partition", "--log.level"] {
        assert!(stdout.contains(name), "help is missing {name}");
    }
}

#[test]
fn invalid_namespace_is_rejected() {
    let output = chainmig(&[
        "migrate",
        "--source",
        "a",
        "--destination",
        "b",
        "--namespace",
        "0x1234",
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--namespace"));
}

#[test]
fn missing_source_emits_json_failure() {
    let temp_dir = TempDir::new().expect("temp dir");
    let report_file = temp_dir.path().join("reports").join("run.jsonl");
    let output = chainmig(&[
        "migrate",
        "--source",
        temp_dir.path().join("missing").to_str().expect("utf8 path"),
        "--destination",
        temp_dir.path().join("dest").to_str().expect("utf8 path"),
        "--json",
        "--report-file",
        report_file.to_str().expect("utf8 path"),
    ]);

    assert_eq!(output.status.code(), Some(1));
    let report = json_line(&output);
    assert_eq!(report["status"], "failed");
    assert!(
        report["error"]
            .as_str()
            .expect("error string")
            .contains("Cannot open source store")
    );
    assert_eq!(report["total"], 0);
    assert_eq!(report["written"], 0);
    assert!(report["tip_hash"].is_null());
    assert_eq!(stdout_lines(&output), 1, "failure must be reported once");

    let recorded = std::fs::read_to_string(&report_file).expect("report file written");
    assert_eq!(recorded.lines().count(), 1);
}

#[test]
fn migrate_verify_and_partition_end_to_end() {
    let temp_dir = TempDir::new().expect("temp dir");
    let source = temp_dir.path().join("source");
    let destination = temp_dir.path().join("chaindata");
    seed_source(&source);

    let namespace = Namespace::new(NAMESPACE).to_string();
    let migrated = chainmig(&[
        "migrate",
        "--source",
        source.to_str().expect("utf8 path"),
        "--destination",
        destination.to_str().expect("utf8 path"),
        "--namespace",
        &namespace,
        "--batch-size",
        "3",
        "--json",
    ]);
    assert!(
        migrated.status.success(),
        "migrate failed: {}",
        String::from_utf8_lossy(&migrated.stderr)
    );
    let report = json_line(&migrated);
    assert_eq!(report["status"], "completed");
    assert_eq!(report["phase"], "committing_head");
    assert_eq!(report["headers"], BLOCKS);
    assert_eq!(report["canonical"], BLOCKS);
    assert_eq!(report["total_difficulty"], BLOCKS);
    assert_eq!(report["tip_number"], BLOCKS - 1);

    let verified = chainmig(&[
        "verify",
        "--destination",
        destination.to_str().expect("utf8 path"),
        "--json",
    ]);
    assert!(verified.status.success());
    let report = json_line(&verified);
    assert_eq!(report["status"], "ok");
    assert_eq!(report["checked_blocks"], BLOCKS);
    assert_eq!(report["head_number"], BLOCKS - 1);

    let partitioned = chainmig(&[
        "partition",
        "--destination",
        destination.to_str().expect("utf8 path"),
        "--finality-delay",
        "3",
        "--json",
    ]);
    assert!(partitioned.status.success());
    let report = json_line(&partitioned);
    assert_eq!(report["status"], "planned");
    assert_eq!(report["cutoff"], BLOCKS - 1 - 3);

    let manifest: Value = serde_json::from_slice(
        &std::fs::read(temp_dir.path().join("ancient").join("metadata.json"))
            .expect("manifest written"),
    )
    .expect("manifest json");
    assert_eq!(manifest["type"], "badgerdb");
    assert_eq!(manifest["ancientBlocks"], BLOCKS - 1 - 3);
}

#[test]
fn partition_marks_trimmed_only_after_archive_confirmation() {
    let temp_dir = TempDir::new().expect("temp dir");
    let source = temp_dir.path().join("source");
    let destination = temp_dir.path().join("chaindata");
    seed_source(&source);
    let namespace = Namespace::new(NAMESPACE).to_string();
    let migrated = chainmig(&[
        "migrate",
        "--source",
        source.to_str().expect("utf8 path"),
        "--destination",
        destination.to_str().expect("utf8 path"),
        "--namespace",
        &namespace,
    ]);
    assert!(migrated.status.success());

    let partition = |destination: &Path| {
        chainmig(&[
            "partition",
            "--destination",
            destination.to_str().expect("utf8 path"),
            "--finality-delay",
            "3",
            "--mark-trimmed",
            "--json",
        ])
    };

    let unconfirmed = partition(&destination);
    assert!(unconfirmed.status.success());
    let report = json_line(&unconfirmed);
    assert_eq!(report["status"], "planned");
    assert_eq!(report["trimmed"], false);

    let manifest_path = temp_dir.path().join("ancient").join("metadata.json");
    let mut manifest: Value =
        serde_json::from_slice(&std::fs::read(&manifest_path).expect("manifest written"))
            .expect("manifest json");
    manifest["durableBlocks"] = Value::from(BLOCKS - 1 - 3);
    std::fs::write(&manifest_path, manifest.to_string()).expect("confirm archive");

    let confirmed = partition(&destination);
    assert!(confirmed.status.success());
    let report = json_line(&confirmed);
    assert_eq!(report["trimmed"], true);

    let store = RocksDBBackend::open(&destination).expect("reopen destination");
    assert_eq!(
        store.get(ANCIENT_CUTOFF_KEY).expect("get"),
        Some((BLOCKS - 1 - 3).to_be_bytes().to_vec())
    );
}

#[test]
fn verify_fails_on_store_without_head() {
    let temp_dir = TempDir::new().expect("temp dir");
    let destination = temp_dir.path().join("empty");
    RocksDBBackend::open(&destination).expect("create store");

    let output = chainmig(&[
        "verify",
        "--destination",
        destination.to_str().expect("utf8 path"),
        "--json",
    ]);
    assert_eq!(output.status.code(), Some(1));
    let report = json_line(&output);
    assert_eq!(report["status"], "inconsistent");
    assert_eq!(report["head_failures"], 4);
}
