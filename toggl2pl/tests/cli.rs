use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::write;
use tempfile::NamedTempFile;

fn toggl2pl() -> Command {
    let mut cmd = Command::cargo_bin("toggl2pl").expect("Binary exists");
    cmd.env_remove("TOGGL2PL_CONFIG")
        .env_remove("TOGGL_API_TOKEN")
        .env_remove("PL_USER_KEY")
        .env_remove("PL_APP_KEY");
    cmd
}

#[test]
fn help_lists_subcommands() {
    toggl2pl()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sync").and(predicate::str::contains("catalog")));
}

#[test]
fn sync_help_lists_flags() {
    toggl2pl()
        .args(["sync", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--dry-run")
                .and(predicate::str::contains("--reconcile"))
                .and(predicate::str::contains("--round")),
        );
}

#[test]
fn sync_fails_on_missing_config_file() {
    toggl2pl()
        .args(["sync", "--config", "/definitely/not/here/config.yml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn config_path_can_come_from_environment() {
    toggl2pl()
        .arg("sync")
        .env("TOGGL2PL_CONFIG", "/from/env/config.yml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("/from/env/config.yml"));
}

#[test]
fn sync_rejects_malformed_date() {
    toggl2pl()
        .args(["sync", "--date", "14/03/2024"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn sync_fails_without_secrets() {
    let config = NamedTempFile::new().expect("Creating temp config file failed");
    write(
        config.path(),
        b"toggl:\n  workspace: rnd\npl:\n  base_url: https://pl.invalid/api\n",
    )
    .expect("Writing temp config failed");

    toggl2pl()
        .arg("sync")
        .arg("--config")
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("TOGGL_API_TOKEN"));
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{:?}", event));
    }
}

#[tokio::test]
async fn run_logs_start_and_failure() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use toggl2pl::cli::{run, Cli, Commands};

    let cli = Cli {
        command: Commands::Catalog {
            config: Some(std::path::PathBuf::from("dummy.yaml")),
        },
    };

    let result = run(cli).await;
    assert!(result.is_err(), "dummy config must not load");

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("[CLI] Starting")),
        "Expected a start event, got: {:?}",
        event_msgs
    );
    assert!(
        event_msgs.iter().any(|msg| msg.contains("[CLI][ERROR]")),
        "Expected a failure event, got: {:?}",
        event_msgs
    );
}
