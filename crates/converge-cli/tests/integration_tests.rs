//! Integration tests for CLI commands

use std::process::Command;

/// Helper to run converge command
fn converge(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_converge"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute converge")
}

/// Get the fixtures path
fn fixtures_path() -> &'static str {
    concat!(env!("CARGO_MANIFEST_DIR"), "/../../fixtures")
}

fn fixture(name: &str) -> String {
    format!("{}/{}", fixtures_path(), name)
}

mod plan_command {
    use super::*;

    #[test]
    fn test_plan_update_in_place() {
        let output = converge(&[
            "plan",
            "--kind",
            "server",
            "--observed",
            &fixture("server-observed.yaml"),
            "--desired",
            &fixture("server-desired.yaml"),
        ]);

        assert!(output.status.success(), "Expected success for plan");
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("server will be updated in place (re-provisions)"));
        assert!(stdout.contains("/cores: 2 -> 8"));
        assert!(stdout.contains("remove /notes"));
        // Computed fields never show up
        assert!(!stdout.contains("public_ipv4"));
    }

    #[test]
    fn test_plan_json_output() {
        let output = converge(&[
            "plan",
            "--kind",
            "server",
            "--observed",
            &fixture("server-observed.yaml"),
            "--desired",
            &fixture("server-desired.yaml"),
            "--json",
        ]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        let json: serde_json::Value =
            serde_json::from_str(&stdout).expect("Output should be valid JSON");

        assert_eq!(json["action"], "update");
        assert_eq!(json["reprovisions"], true);
        assert!(json["operations"].as_array().is_some_and(|ops| !ops.is_empty()));
    }

    #[test]
    fn test_plan_immutable_change_requires_replace() {
        let output = converge(&[
            "plan",
            "--kind",
            "server",
            "--observed",
            &fixture("server-observed.yaml"),
            "--desired",
            &fixture("server-moved.yaml"),
        ]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("server must be replaced"));
        assert!(stdout.contains("/datacenter (immutable)"));
        assert!(!stdout.contains("Operations:"));
    }

    #[test]
    fn test_plan_unchanged() {
        let output = converge(&[
            "plan",
            "--kind",
            "server",
            "--observed",
            &fixture("server-desired.yaml"),
            "--desired",
            &fixture("server-desired.yaml"),
        ]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("No changes for server"));
    }

    #[test]
    fn test_plan_missing_file() {
        let output = converge(&[
            "plan",
            "--kind",
            "server",
            "--observed",
            &fixture("does-not-exist.yaml"),
            "--desired",
            &fixture("server-desired.yaml"),
        ]);

        assert_eq!(output.status.code(), Some(5));
    }
}

mod kinds_command {
    use super::*;

    #[test]
    fn test_kinds_lists_builtin_and_kubernetes() {
        let output = converge(&["kinds"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        for kind in ["cluster", "app", "server", "Deployment", "Service"] {
            assert!(stdout.contains(kind), "missing kind {kind}");
        }
    }

    #[test]
    fn test_kinds_shows_mutability_table() {
        let output = converge(&["kinds", "server"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("FIELDS"));
        assert!(
            stdout
                .lines()
                .any(|l| l.contains("/datacenter") && l.contains("immutable"))
        );
    }

    #[test]
    fn test_kinds_lookup_ignores_case() {
        let output = converge(&["kinds", "deployment", "--json"]);

        assert!(output.status.success());
        let json: serde_json::Value =
            serde_json::from_slice(&output.stdout).expect("Output should be valid JSON");
        assert_eq!(json["kind"], "Deployment");
    }

    #[test]
    fn test_unknown_kind_suggests_close_match() {
        let output = converge(&["kinds", "clustr"]);

        assert_eq!(output.status.code(), Some(64));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("clustr"));
        assert!(stderr.contains("cluster"));
    }
}

mod apply_command {
    use super::*;

    #[test]
    fn test_apply_simulated_server() {
        let output = converge(&[
            "apply",
            "-f",
            &fixture("server-manifest.yaml"),
            "--simulate",
        ]);

        assert!(
            output.status.success(),
            "stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("server/"));
        assert!(stdout.contains("created"));
        assert!(stdout.contains("active"));
    }

    #[test]
    fn test_apply_simulated_deployment() {
        let output = converge(&[
            "apply",
            "-f",
            &fixture("deployment-manifest.yaml"),
            "--simulate",
            "--set",
            "spec.replicas=3",
        ]);

        assert!(
            output.status.success(),
            "stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("created"));
        assert!(stdout.contains("Available"));
    }

    #[test]
    fn test_apply_set_typed_by_schema() {
        let output = converge(&[
            "apply",
            "-f",
            &fixture("server-manifest.yaml"),
            "--simulate",
            "--set",
            "cores=eight",
        ]);

        assert_eq!(output.status.code(), Some(64));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("/cores"));
        assert!(stderr.contains("an integer"));
    }

    #[test]
    fn test_apply_set_requires_assignment() {
        let output = converge(&[
            "apply",
            "-f",
            &fixture("server-manifest.yaml"),
            "--simulate",
            "--set",
            "cores",
        ]);

        assert_eq!(output.status.code(), Some(64));
        assert!(String::from_utf8_lossy(&output.stderr).contains("path=value"));
    }

    #[test]
    fn test_apply_requires_kind() {
        let output = converge(&["apply", "-f", &fixture("no-kind.yaml"), "--simulate"]);

        assert_eq!(output.status.code(), Some(64));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("has no 'kind'"));
    }
}

mod config_option {
    use super::*;
    use std::fs;

    #[test]
    fn test_config_file_is_loaded() {
        let output = converge(&["--config", &fixture("config.yaml"), "kinds"]);
        assert!(output.status.success());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.yaml");
        fs::write(&path, "timing:\n  timeout: 0s\n").unwrap();

        let output = converge(&["--config", path.to_str().unwrap(), "kinds"]);

        assert_eq!(output.status.code(), Some(64));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("timing"));
    }
}
