//! Unit tests driving the service through [`crate::run_with`].

use std::ffi::OsString;
use std::fs;
use std::io::Cursor;
use std::process::ExitCode;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use cluster_config::{
    ClusterConfig, ClusterSecret, ConfigRegistry, DEFAULT_CONFIG_FILE, DEFAULT_ROTATION_DEPTH,
    NumpinInformerConfig,
};

use crate::lock::{ExecutionLock, LOCK_FILE};
use crate::snapshot::generation_path;
use crate::state::{MapState, Pin, STATE_VERSION};
use crate::workflows::Services;
use crate::{IoStreams, LocalComponentFactory, run_with};

use super::support::{ConfigFixture, HealthEvent, RecordingHealthReporter, ScriptedInterrupts};

const SECRET: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

/// Captured result of one invocation.
struct Invocation {
    exit: ExitCode,
    stdout: String,
    stderr: String,
}

struct Harness {
    reporter: RecordingHealthReporter,
    interrupts: ScriptedInterrupts,
    env_secret: Option<String>,
    stdin: String,
}

impl Harness {
    fn new() -> Self {
        Self {
            reporter: RecordingHealthReporter::default(),
            interrupts: ScriptedInterrupts::new(0),
            env_secret: None,
            stdin: String::new(),
        }
    }

    fn with_interrupts(mut self, count: usize) -> Self {
        self.interrupts = ScriptedInterrupts::new(count);
        self
    }

    fn with_env_secret(mut self, secret: &str) -> Self {
        self.env_secret = Some(secret.to_owned());
        self
    }

    fn with_stdin(mut self, input: &str) -> Self {
        self.stdin = input.to_owned();
        self
    }

    fn run(&self, args: &[&str]) -> Invocation {
        let args: Vec<OsString> = std::iter::once("ipfs-cluster-service")
            .chain(args.iter().copied())
            .map(OsString::from)
            .collect();
        let mut stdin = Cursor::new(self.stdin.clone().into_bytes());
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let services = Services {
            factory: &LocalComponentFactory,
            reporter: &self.reporter,
            interrupts: &self.interrupts,
        };
        let exit = {
            let mut io = IoStreams::new(&mut stdin, &mut stdout, &mut stderr);
            run_with(args, &mut io, self.env_secret.clone(), services)
        };
        Invocation {
            exit,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        }
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

#[fixture]
fn config() -> ConfigFixture {
    ConfigFixture::new()
}

fn path_arg(dir: &std::path::Path) -> String {
    dir.to_string_lossy().into_owned()
}

#[rstest]
fn state_version_prints_current_format(harness: Harness) {
    let result = harness.run(&["state", "version"]);
    assert_eq!(result.exit, ExitCode::SUCCESS);
    assert_eq!(result.stdout, format!("{STATE_VERSION}\n"));
}

#[rstest]
fn version_prints_package_version(harness: Harness) {
    let result = harness.run(&["version"]);
    assert_eq!(result.exit, ExitCode::SUCCESS);
    assert!(
        result.stdout.starts_with(env!("CARGO_PKG_VERSION")),
        "{}",
        result.stdout
    );
}

#[rstest]
fn help_is_printed_on_stdout(harness: Harness) {
    let result = harness.run(&["--help"]);
    assert_eq!(result.exit, ExitCode::SUCCESS);
    assert!(result.stdout.contains("daemon"), "{}", result.stdout);
}

#[rstest]
fn unknown_subcommand_is_rejected(harness: Harness) {
    let result = harness.run(&["launch"]);
    assert_eq!(result.exit, ExitCode::FAILURE);
    assert!(
        result
            .stderr
            .contains("unknown subcommand. Run \"ipfs-cluster-service help\" for more info"),
        "{}",
        result.stderr
    );
}

#[rstest]
fn init_writes_configuration_with_environment_secret(harness: Harness) {
    let dir = TempDir::new().expect("temp dir");
    let harness = harness.with_env_secret(SECRET);

    let result = harness.run(&["-c", &path_arg(dir.path()), "init"]);

    assert_eq!(result.exit, ExitCode::SUCCESS, "{}", result.stderr);
    assert!(result.stderr.contains("configuration written to"));
    let mut registry = ConfigRegistry::standard();
    registry
        .load(&dir.path().join(DEFAULT_CONFIG_FILE))
        .expect("load written configuration");
    let cluster = registry.get::<ClusterConfig>().expect("cluster section");
    assert_eq!(
        cluster.secret,
        ClusterSecret::decode(SECRET).expect("valid secret")
    );
}

#[rstest]
fn init_prompts_for_custom_secret(harness: Harness) {
    let dir = TempDir::new().expect("temp dir");
    let harness = harness.with_stdin(&format!("{SECRET}\n"));

    let result = harness.run(&["-c", &path_arg(dir.path()), "init", "--custom-secret"]);

    assert_eq!(result.exit, ExitCode::SUCCESS, "{}", result.stderr);
    assert!(result.stderr.contains("Enter cluster secret (32-byte hex string): "));
}

#[rstest]
fn init_rejects_invalid_secret(harness: Harness) {
    let dir = TempDir::new().expect("temp dir");
    let harness = harness.with_env_secret("not-hex");

    let result = harness.run(&["-c", &path_arg(dir.path()), "init"]);

    assert_eq!(result.exit, ExitCode::FAILURE);
    assert!(result.stderr.contains("error parsing user-provided secret"));
    assert!(!dir.path().join(DEFAULT_CONFIG_FILE).exists());
}

#[rstest]
fn init_refuses_to_overwrite_without_force(harness: Harness, config: ConfigFixture) {
    let before = fs::read(config.config_path()).expect("read configuration");

    let result = harness.run(&["-c", &path_arg(config.dir()), "init"]);

    assert_eq!(result.exit, ExitCode::FAILURE);
    assert!(
        result.stderr.contains("exists. Try running: ipfs-cluster-service -f init"),
        "{}",
        result.stderr
    );
    let after = fs::read(config.config_path()).expect("read configuration");
    assert_eq!(before, after);
}

#[rstest]
#[case(&["-f", "init"])]
#[case(&["init", "-f"])]
fn init_overwrites_when_forced(
    harness: Harness,
    config: ConfigFixture,
    #[case] args: &[&str],
) {
    let before = fs::read(config.config_path()).expect("read configuration");
    let mut full: Vec<String> = vec!["-c".to_owned(), path_arg(config.dir())];
    full.extend(args.iter().map(|arg| (*arg).to_owned()));
    let full: Vec<&str> = full.iter().map(String::as_str).collect();

    let result = harness.run(&full);

    assert_eq!(result.exit, ExitCode::SUCCESS, "{}", result.stderr);
    let after = fs::read(config.config_path()).expect("read configuration");
    assert_ne!(before, after, "identity should have been regenerated");
}

#[rstest]
fn daemon_runs_until_interrupted_and_persists_state(harness: Harness, config: ConfigFixture) {
    let state: MapState = [Pin::everywhere("QmDaemon")].into_iter().collect();
    config.snapshots().persist(&state).expect("persist");
    let harness = harness.with_interrupts(1);

    let result = harness.run(&["-c", &path_arg(config.dir()), "-a", "numpin", "daemon"]);

    assert_eq!(result.exit, ExitCode::SUCCESS, "{}", result.stderr);
    assert!(!config.dir().join(LOCK_FILE).exists(), "lock must be released");
    let latest = config
        .snapshots()
        .store()
        .latest()
        .expect("read snapshots")
        .expect("snapshot present");
    assert_eq!(latest.seq, 2, "shutdown should persist a new snapshot");
    let events = harness.reporter.events();
    assert!(
        events
            .iter()
            .any(|event| matches!(event, HealthEvent::AssemblySucceeded(_))),
        "{events:?}"
    );
}

#[rstest]
fn daemon_is_the_default_command(harness: Harness, config: ConfigFixture) {
    let harness = harness.with_interrupts(1);
    let result = harness.run(&["-c", &path_arg(config.dir()), "-a", "pincount"]);
    assert_eq!(result.exit, ExitCode::SUCCESS, "{}", result.stderr);
}

#[rstest]
fn daemon_refuses_locked_directory(harness: Harness, config: ConfigFixture) {
    let _held = ExecutionLock::acquire(config.dir()).expect("acquire lock");

    let result = harness.run(&["-c", &path_arg(config.dir()), "daemon"]);

    assert_eq!(result.exit, ExitCode::FAILURE);
    assert!(
        result.stderr.contains("error acquiring execution lock"),
        "{}",
        result.stderr
    );
    assert!(harness.reporter.events().is_empty());
}

#[rstest]
fn daemon_rejects_unknown_allocation(harness: Harness, config: ConfigFixture) {
    let result = harness.run(&["-c", &path_arg(config.dir()), "-a", "disk", "daemon"]);

    assert_eq!(result.exit, ExitCode::FAILURE);
    assert!(result.stderr.contains("error creating informer"), "{}", result.stderr);
    assert!(!config.dir().join(LOCK_FILE).exists());
}

#[rstest]
fn daemon_refuses_bootstrap_with_configured_peers(harness: Harness, config: ConfigFixture) {
    config.update::<ClusterConfig>(|cluster| {
        cluster.peers = vec!["/ip4/10.0.0.2/tcp/9096".parse().expect("multiaddr")];
    });

    let result = harness.run(&[
        "-c",
        &path_arg(config.dir()),
        "-j",
        "/ip4/10.0.0.3/tcp/9096",
        "daemon",
    ]);

    assert_eq!(result.exit, ExitCode::FAILURE);
    assert!(
        result.stderr.contains("Use -f to ignore and proceed bootstrapping"),
        "{}",
        result.stderr
    );
}

#[rstest]
fn daemon_without_configuration_fails_to_load(harness: Harness) {
    let dir = TempDir::new().expect("temp dir");

    let result = harness.run(&["-c", &path_arg(dir.path()), "daemon"]);

    assert_eq!(result.exit, ExitCode::FAILURE);
    assert!(result.stderr.contains("error loading configuration"), "{}", result.stderr);
    assert!(!dir.path().join(LOCK_FILE).exists());
}

#[rstest]
fn daemon_upgrade_migrates_old_snapshot_before_start(harness: Harness, config: ConfigFixture) {
    config.write_snapshot(
        3,
        serde_json::json!({
            "pins": [{ "cid": "QmThree", "name": "", "replication_factor": -1, "allocations": [] }]
        }),
    );
    let harness = harness.with_interrupts(1);

    let result = harness.run(&["-c", &path_arg(config.dir()), "-a", "numpin", "daemon", "-u"]);

    assert_eq!(result.exit, ExitCode::SUCCESS, "{}", result.stderr);
    let state = config
        .snapshots()
        .latest_state()
        .expect("current state")
        .expect("state present");
    assert!(state.get("QmThree").is_some());
}

#[rstest]
fn export_writes_to_file(harness: Harness, config: ConfigFixture) {
    let state: MapState = [Pin::everywhere("QmFile")].into_iter().collect();
    config.snapshots().persist(&state).expect("persist");
    let output = config.dir().join("export.json");

    let result = harness.run(&[
        "-c",
        &path_arg(config.dir()),
        "state",
        "export",
        "-f",
        &path_arg(&output),
    ]);

    assert_eq!(result.exit, ExitCode::SUCCESS, "{}", result.stderr);
    let written = fs::read_to_string(&output).expect("export written");
    assert!(written.contains("QmFile"));
    assert!(result.stdout.is_empty());
}

#[rstest]
fn import_reads_stdin_when_no_path_is_given(config: ConfigFixture) {
    let export = serde_json::json!({ "version": 1, "pins": ["QmStdin"] }).to_string();
    let harness = Harness::new().with_stdin(&export);

    let result = harness.run(&["-f", "-c", &path_arg(config.dir()), "state", "import"]);

    assert_eq!(result.exit, ExitCode::SUCCESS, "{}", result.stderr);
    let state = config
        .snapshots()
        .latest_state()
        .expect("current state")
        .expect("state present");
    assert!(state.get("QmStdin").is_some());
}

#[rstest]
fn daemon_upgrade_without_state_starts_normally(harness: Harness, config: ConfigFixture) {
    let harness = harness.with_interrupts(1);

    let result = harness.run(&["-c", &path_arg(config.dir()), "-a", "numpin", "daemon", "-u"]);

    assert_eq!(result.exit, ExitCode::SUCCESS, "{}", result.stderr);
    let latest = config
        .snapshots()
        .store()
        .latest()
        .expect("read snapshots")
        .expect("shutdown snapshot");
    assert_eq!(latest.seq, 1);
}

#[rstest]
fn daemon_accepts_unbounded_metric_ttl(harness: Harness, config: ConfigFixture) {
    config.update::<NumpinInformerConfig>(|informer| informer.metric_ttl_secs = u64::MAX);
    let harness = harness.with_interrupts(1);

    let result = harness.run(&["-c", &path_arg(config.dir()), "-a", "numpin", "daemon"]);

    assert_eq!(result.exit, ExitCode::SUCCESS, "{}", result.stderr);
}

#[rstest]
fn exported_state_imports_into_a_fresh_peer(harness: Harness, config: ConfigFixture) {
    let mut bounded = Pin::everywhere("QmBounded");
    bounded.name = "docs".to_owned();
    bounded.replication_factor_min = 1;
    bounded.replication_factor_max = 2;
    bounded.allocations = vec!["peer-a".to_owned()];
    let state: MapState = [Pin::everywhere("QmEverywhere"), bounded]
        .into_iter()
        .collect();
    config.snapshots().persist(&state).expect("persist");
    let output = config.dir().join("export.json");
    let exported = harness.run(&[
        "-c",
        &path_arg(config.dir()),
        "state",
        "export",
        "-f",
        &path_arg(&output),
    ]);
    assert_eq!(exported.exit, ExitCode::SUCCESS, "{}", exported.stderr);

    let fresh = ConfigFixture::new();
    let imported = harness.run(&[
        "-f",
        "-c",
        &path_arg(fresh.dir()),
        "state",
        "import",
        &path_arg(&output),
    ]);

    assert_eq!(imported.exit, ExitCode::SUCCESS, "{}", imported.stderr);
    let restored = fresh
        .snapshots()
        .latest_state()
        .expect("current state")
        .expect("state present");
    assert_eq!(restored, state);
}

#[rstest]
fn failed_export_keeps_existing_file(harness: Harness, config: ConfigFixture) {
    let output = config.dir().join("export.json");
    fs::write(&output, "previous export").expect("seed file");

    let result = harness.run(&[
        "-c",
        &path_arg(config.dir()),
        "state",
        "export",
        "-f",
        &path_arg(&output),
    ]);

    assert_eq!(result.exit, ExitCode::FAILURE);
    assert!(result.stderr.contains("error exporting state"), "{}", result.stderr);
    assert_eq!(
        fs::read_to_string(&output).expect("file kept"),
        "previous export"
    );
    let leftovers: Vec<_> = fs::read_dir(config.dir())
        .expect("list config dir")
        .map(|entry| entry.expect("entry").file_name())
        .filter(|name| name.to_string_lossy().starts_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "partial output left behind: {leftovers:?}");
}

#[rstest]
fn repeated_cleanups_keep_the_default_number_of_generations(
    harness: Harness,
    config: ConfigFixture,
) {
    let state: MapState = [Pin::everywhere("QmRotated")].into_iter().collect();
    let cleanups = DEFAULT_ROTATION_DEPTH + 2;
    for _ in 0..cleanups {
        config.snapshots().persist(&state).expect("persist");
        let result = harness.run(&["-f", "-c", &path_arg(config.dir()), "state", "cleanup"]);
        assert_eq!(result.exit, ExitCode::SUCCESS, "{}", result.stderr);
    }

    let data_dir = config.snapshots().data_dir().to_path_buf();
    assert!(!data_dir.exists());
    for generation in 0..DEFAULT_ROTATION_DEPTH {
        assert!(
            generation_path(&data_dir, generation).is_dir(),
            "generation {generation} missing"
        );
    }
    assert!(!generation_path(&data_dir, DEFAULT_ROTATION_DEPTH).exists());
}

#[rstest]
fn declined_cleanup_keeps_state_and_releases_lock(config: ConfigFixture) {
    let state: MapState = [Pin::everywhere("QmKept")].into_iter().collect();
    config.snapshots().persist(&state).expect("persist");
    let harness = Harness::new().with_stdin("n\n");

    let result = harness.run(&["-c", &path_arg(config.dir()), "state", "cleanup"]);

    assert_eq!(result.exit, ExitCode::SUCCESS, "{}", result.stderr);
    let data_dir = config.snapshots().data_dir().to_path_buf();
    assert!(data_dir.is_dir());
    assert!(!generation_path(&data_dir, 0).exists());
    assert!(!config.dir().join(LOCK_FILE).exists());
    let kept = config
        .snapshots()
        .latest_state()
        .expect("current state")
        .expect("state present");
    assert_eq!(kept, state);
}
