//! End-to-end orchestrator behaviour against a scripted runner.

use std::path::Path;
use std::sync::Arc;

use crossforge::policy::FixedMemoryProbe;
use crossforge::{BuildConfig, BuildRequest, ForgeError, Toolchain};
use crossforge_runner::{ScriptedResponse, ScriptedRunner};
use tempfile::TempDir;

const DIST_LIST: &str = "aix/ppc64\ndarwin/arm64\nlinux/386\nlinux/amd64\nlinux/arm64\nwindows/amd64\n";

const GIB: u64 = 1024 * 1024 * 1024;

const ALLOWED_KEYS: &[&str] = &[
    "CC",
    "CXX",
    "CGO_ENABLED",
    "GOOS",
    "GOARCH",
    "GOPATH",
    "GOCACHE",
    "GOMODCACHE",
    "GOPRIVATE",
    "GOPROXY",
    "PATH",
];

struct Harness {
    _temp: TempDir,
    runner: Arc<ScriptedRunner>,
    toolchain: Toolchain,
    config: BuildConfig,
}

fn harness(build_response: ScriptedResponse, memory: Option<u64>) -> Harness {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(
        ScriptedRunner::new()
            .respond_to(&["tool", "dist", "list"], ScriptedResponse::ok(DIST_LIST))
            .with_default(build_response),
    );
    let toolchain =
        Toolchain::new(runner.clone()).with_memory_probe(Arc::new(FixedMemoryProbe(memory)));
    let config = BuildConfig::for_app_dir(temp.path(), temp.path().join("project"), "linux", "amd64");
    Harness {
        _temp: temp,
        runner,
        toolchain,
        config,
    }
}

fn is_hex_seed(arg: &str) -> bool {
    arg.strip_prefix("-seed=")
        .map(|hex| hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

#[test]
fn plain_build_runs_toolchain_with_isolated_env() {
    let h = harness(ScriptedResponse::ok("compiled"), None);

    let output = h
        .toolchain
        .build(&h.config, &BuildRequest::new("/out/agent"))
        .unwrap();

    assert_eq!(output.artifact, b"compiled");
    assert!(output.seed.is_none());

    let builds = h.runner.calls_matching(&["build"]);
    assert_eq!(builds.len(), 1);
    let call = &builds[0];
    assert_eq!(call.program, h.config.toolchain_path());
    assert_eq!(call.args, vec!["build", "-o", "/out/agent", "."]);
    assert_eq!(call.working_dir, h.config.project_root);
    assert_eq!(call.env_value("GOOS"), Some("linux"));
    assert_eq!(call.env_value("GOARCH"), Some("amd64"));
    assert_eq!(
        call.env_value("GOPATH"),
        Some(h.config.project_root.to_string_lossy().as_ref())
    );
}

#[test]
fn obfuscated_low_memory_build_uses_obfuscator_and_small_cap() {
    let h = harness(ScriptedResponse::ok(""), Some(2 * GIB));
    let config = h.config.clone().with_obfuscation(true);

    let output = h
        .toolchain
        .build(&config, &BuildRequest::new("/out/agent"))
        .unwrap();

    let call = h.runner.last_call().unwrap();
    assert_eq!(call.program, config.obfuscator_path());
    assert_ne!(call.program, config.toolchain_path());
    assert!(is_hex_seed(&call.args[0]), "unexpected seed arg {}", call.args[0]);
    assert_eq!(call.args[1], "-literals");
    assert_eq!(call.args[2], "-literals-max-size=2048");
    assert_eq!(&call.args[3..], ["build", "-o", "/out/agent", "."]);
    assert_eq!(output.seed.as_deref(), call.args[0].strip_prefix("-seed="));
}

#[test]
fn failed_memory_probe_falls_back_to_low_cap() {
    let h = harness(ScriptedResponse::ok(""), None);
    let config = h.config.clone().with_obfuscation(true);

    let output = h.toolchain.build(&config, &BuildRequest::new("out")).unwrap();

    assert_eq!(output.policy.unwrap().max_literal_size, 2048);
    assert!(h
        .runner
        .last_call()
        .unwrap()
        .args
        .contains(&"-literals-max-size=2048".to_string()));
}

#[test]
fn consecutive_obfuscated_builds_use_fresh_seeds() {
    let h = harness(ScriptedResponse::ok(""), Some(8 * GIB));
    let config = h.config.clone().with_obfuscation(true);
    let request = BuildRequest::new("out");

    let first = h.toolchain.build(&config, &request).unwrap();
    let second = h.toolchain.build(&config, &request).unwrap();

    assert_ne!(first.seed, second.seed);
    assert_ne!(first.build_id, second.build_id);
}

#[test]
fn unsupported_target_never_reaches_build() {
    let h = harness(ScriptedResponse::ok(""), None);

    for (os, arch) in [("linux", "sparc"), ("plan9", "amd64"), ("windows", "arm64"), ("", "")] {
        let config = h.config.clone().with_target(os, arch);
        let err = h
            .toolchain
            .build(&config, &BuildRequest::new("out"))
            .unwrap_err();
        assert!(err.is_invalid_target(), "{}/{} gave {:?}", os, arch, err);
    }

    assert!(h.runner.calls_matching(&["build"]).is_empty());
    assert!(h.runner.calls().iter().all(|c| c.has_args(&["tool", "dist", "list"])));
}

#[test]
fn missing_toolchain_rejects_every_target() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(ScriptedRunner::new().with_default(ScriptedResponse::Missing));
    let toolchain = Toolchain::new(runner.clone());
    let config = BuildConfig::for_app_dir(temp.path(), temp.path(), "linux", "amd64");

    let err = toolchain.build(&config, &BuildRequest::new("out")).unwrap_err();

    assert!(err.is_invalid_target());
    assert!(runner.calls_matching(&["build"]).is_empty());
    assert!(toolchain.resolve_targets(&config).is_empty());
}

#[test]
fn output_and_package_appear_once_with_every_option() {
    let h = harness(ScriptedResponse::ok(""), Some(16 * GIB));
    let config = h.config.clone().with_obfuscation(true);
    let request = BuildRequest::new("bin/agent.so")
        .trimpath(true)
        .tags(["netgo", "osusergo"])
        .ldflags(["-s", "-w"])
        .gcflags("all=-N -l")
        .asmflags("all=-trimpath")
        .build_mode(crossforge::BuildMode::CShared);

    h.toolchain.build(&config, &request).unwrap();

    let args = h.runner.last_call().unwrap().args;
    assert_eq!(args.iter().filter(|a| *a == "-o").count(), 1);
    assert_eq!(args.iter().filter(|a| *a == ".").count(), 1);
    assert_eq!(args.last().map(String::as_str), Some("."));
    assert_eq!(args[args.len() - 2], "bin/agent.so");
    assert!(args.contains(&"-buildmode=c-shared".to_string()));
    assert!(args.contains(&"-literals-max-size=524288".to_string()));
}

#[test]
fn build_environment_is_isolated() {
    let h = harness(ScriptedResponse::ok(""), None);

    h.toolchain.build(&h.config, &BuildRequest::new("out")).unwrap();

    let call = h.runner.last_call().unwrap();
    for (key, _) in &call.env {
        assert!(ALLOWED_KEYS.contains(&key.as_str()), "unexpected key {}", key);
    }
    let path = call.env_value("PATH").unwrap();
    assert!(path.starts_with(h.config.toolchain_bin_dir().to_string_lossy().as_ref()));
}

#[test]
fn toolchain_failure_carries_diagnostics() {
    let h = harness(
        ScriptedResponse::exit(2, "main.go:3:1: syntax error"),
        None,
    );

    let err = h
        .toolchain
        .build(&h.config, &BuildRequest::new("out"))
        .unwrap_err();

    assert!(matches!(err, ForgeError::ToolchainExecution(_)));
    let diagnostics = err.diagnostics().unwrap();
    assert_eq!(diagnostics.stderr_lossy(), "main.go:3:1: syntax error");
    assert_eq!(diagnostics.args, vec!["build", "-o", "out", "."]);
    assert!(diagnostics.env.iter().any(|line| line == "GOOS=linux"));
}

#[test]
fn missing_obfuscator_is_launch_failure() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(
        ScriptedRunner::new()
            .respond_to(&["tool", "dist", "list"], ScriptedResponse::ok(DIST_LIST))
            .with_default(ScriptedResponse::Missing),
    );
    let toolchain = Toolchain::new(runner);
    let config = BuildConfig::for_app_dir(temp.path(), temp.path(), "linux", "amd64")
        .with_obfuscation(true);

    let err = toolchain.build(&config, &BuildRequest::new("out")).unwrap_err();

    assert!(matches!(err, ForgeError::ToolchainLaunch(_)));
    assert!(err.diagnostics().is_some());
}

#[test]
fn timed_out_build_is_reported() {
    let h = harness(ScriptedResponse::TimedOut, None);

    let err = h
        .toolchain
        .build(&h.config, &BuildRequest::new("out"))
        .unwrap_err();

    assert!(matches!(err, ForgeError::TimedOut(_)));
}

#[test]
fn mod_and_version_skip_target_validation() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(ScriptedRunner::new().with_default(ScriptedResponse::ok("ok\n")));
    let toolchain = Toolchain::new(runner.clone());
    let config = BuildConfig::for_app_dir(temp.path(), temp.path(), "nonexistent", "cpu")
        .with_obfuscation(true)
        .with_source_dir(temp.path().join("src"));

    let stdout = toolchain.mod_command(&config, ["download", "-x"]).unwrap();
    assert_eq!(stdout, b"ok\n");
    toolchain.version(&config).unwrap();

    let calls = runner.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].args, vec!["mod", "download", "-x"]);
    assert_eq!(calls[0].working_dir, temp.path().join("src"));
    assert_eq!(calls[0].program, config.toolchain_path());
    assert_eq!(calls[1].args, vec!["version"]);
    assert!(calls.iter().all(|c| c.env_value("GOOS").is_none()));
}

#[test]
fn matrix_is_cached_between_builds() {
    let h = harness(ScriptedResponse::ok(""), None);

    for _ in 0..3 {
        h.toolchain.build(&h.config, &BuildRequest::new("out")).unwrap();
    }

    assert_eq!(h.runner.calls_matching(&["tool", "dist", "list"]).len(), 1);
    assert_eq!(h.runner.calls_matching(&["build"]).len(), 3);
}

#[test]
fn zero_ttl_queries_matrix_every_build() {
    let h = harness(ScriptedResponse::ok(""), None);
    let toolchain = h
        .toolchain
        .with_target_cache_ttl(std::time::Duration::ZERO);

    for _ in 0..2 {
        toolchain.build(&h.config, &BuildRequest::new("out")).unwrap();
    }

    assert_eq!(h.runner.calls_matching(&["tool", "dist", "list"]).len(), 2);
}

#[test]
fn settings_flow_into_build() {
    let temp = TempDir::new().unwrap();
    let project_config = temp.path().join(".crossforge.toml");
    std::fs::write(
        &project_config,
        "[cgo]\nenabled = \"off\"\n\n[modules]\nprivate = [\"git.corp/*\"]\n\n[obfuscation]\nenabled = true\nliterals = false\n",
    )
    .unwrap();

    let effective =
        crossforge::EffectiveConfig::build(None, Some(project_config.as_path()), None).unwrap();
    let settings = effective.settings();
    let config = settings.build_config(Path::new(temp.path()), temp.path(), "linux", "arm64");

    let runner = Arc::new(
        ScriptedRunner::new()
            .respond_to(&["tool", "dist", "list"], ScriptedResponse::ok(DIST_LIST))
            .with_default(ScriptedResponse::ok("")),
    );
    let toolchain = Toolchain::from_settings(settings, runner.clone())
        .unwrap()
        .with_memory_probe(Arc::new(FixedMemoryProbe(Some(32 * GIB))));

    toolchain.build(&config, &BuildRequest::new("out")).unwrap();

    let call = runner.last_call().unwrap();
    assert_eq!(call.program, config.obfuscator_path());
    assert!(!call.args.contains(&"-literals".to_string()));
    assert_eq!(call.env_value("CGO_ENABLED"), Some("0"));
    assert_eq!(call.env_value("GOPRIVATE"), Some("git.corp/*"));
    assert_eq!(call.env_value("GOARCH"), Some("arm64"));
}

#[test]
fn concurrent_builds_keep_their_own_target() {
    let h = harness(ScriptedResponse::ok("compiled"), Some(8 * GIB));
    let targets = [
        ("linux", "amd64"),
        ("linux", "arm64"),
        ("windows", "amd64"),
        ("darwin", "arm64"),
        ("linux", "386"),
        ("aix", "ppc64"),
    ];

    std::thread::scope(|scope| {
        for round in 0..4 {
            for (os, arch) in targets {
                let toolchain = &h.toolchain;
                let config = h.config.clone().with_target(os, arch).with_obfuscation(round % 2 == 1);
                scope.spawn(move || {
                    let dest = format!("/out/{}-{}-{}", os, arch, round);
                    toolchain.build(&config, &BuildRequest::new(&dest)).unwrap();
                });
            }
        }
    });

    let builds = h.runner.calls_matching(&["build"]);
    assert_eq!(builds.len(), targets.len() * 4);
    for call in &builds {
        let dest = call
            .args
            .iter()
            .position(|a| a == "-o")
            .map(|i| call.args[i + 1].clone())
            .unwrap();
        let mut parts = dest.trim_start_matches("/out/").split('-');
        let (os, arch) = (parts.next().unwrap(), parts.next().unwrap());
        assert_eq!(call.env_value("GOOS"), Some(os), "{}", dest);
        assert_eq!(call.env_value("GOARCH"), Some(arch), "{}", dest);
    }
    assert!(!h.runner.calls_matching(&["tool", "dist", "list"]).is_empty());
}
