//! CLI argument parsing tests.

use assert_cmd::Command;
use predicates::prelude::*;

fn pilothouse() -> Command {
    Command::cargo_bin("pilothouse").unwrap()
}

mod help {
    use super::*;

    #[test]
    fn shows_help() {
        pilothouse()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("pilothouse"))
            .stdout(predicate::str::contains("serve"))
            .stdout(predicate::str::contains("config"));
    }

    #[test]
    fn shows_version() {
        pilothouse()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("pilothouse"));
    }

    #[test]
    fn requires_a_subcommand() {
        pilothouse().assert().failure();
    }
}

mod serve_command {
    use super::*;

    #[test]
    fn serve_help_shows_global_options() {
        pilothouse()
            .args(["serve", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--host"))
            .stdout(predicate::str::contains("--port"))
            .stdout(predicate::str::contains("--browser-path"))
            .stdout(predicate::str::contains("--headful"));
    }

    #[test]
    fn rejects_non_numeric_port() {
        pilothouse()
            .args(["serve", "--port", "not-a-port"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--port"));
    }
}

mod config_command {
    use super::*;

    #[test]
    fn config_path_prints_a_toml_path() {
        pilothouse()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_requires_a_subcommand() {
        pilothouse().arg("config").assert().failure();
    }
}
