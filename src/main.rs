//! crossforge CLI
//!
//! Entry point for the `crossforge` operator tool.

use clap::{Parser, Subcommand};
use crossforge::config::{host_config_path, project_config_path};
use crossforge::signal::{SignalHandler, EXIT_CODE_CANCELLED};
use crossforge::{
    BuildConfig, BuildMode, BuildRequest, CancelFlag, CgoMode, EffectiveConfig, ForgeError,
    SystemRunner, Toolchain, ToolchainVersion,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Exit code when the requested target is not supported
const EXIT_CODE_INVALID_TARGET: i32 = 2;

/// Exit code when the toolchain exceeded its deadline
const EXIT_CODE_TIMED_OUT: i32 = 124;

#[derive(Parser)]
#[command(name = "crossforge")]
#[command(about = "Cross-compile Go-style projects with an isolated toolchain", version)]
struct Cli {
    /// Application directory holding the toolchain (default: ~/.crossforge)
    #[arg(long, global = true)]
    app_dir: Option<PathBuf>,

    /// Package root used as GOPATH (default: current directory)
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    /// Project config file (default: <project>/.crossforge.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List targets the toolchain supports
    Targets {
        /// Only show architectures for this OS
        #[arg(long)]
        os: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the toolchain version
    Version {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Build the package for one target
    Build(BuildArgs),

    /// Run module maintenance (`mod <args>`) in the source directory
    Mod {
        /// Directory containing the module (default: project root)
        #[arg(long)]
        source_dir: Option<PathBuf>,

        /// Arguments passed after `mod` (after --)
        #[arg(last = true, required = true)]
        args: Vec<String>,
    },

    /// Show the effective configuration
    Config {
        /// Output in JSON format with sources and digests
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct BuildArgs {
    /// Target operating system
    #[arg(long)]
    os: String,

    /// Target architecture
    #[arg(long)]
    arch: String,

    /// Artifact output path
    #[arg(long, short = 'o')]
    output: PathBuf,

    /// Directory containing the package (default: project root)
    #[arg(long)]
    source_dir: Option<PathBuf>,

    /// Route the build through the obfuscator
    #[arg(long)]
    obfuscate: bool,

    /// Reuse an obfuscation seed (hex) instead of a fresh one
    #[arg(long, requires = "obfuscate")]
    seed: Option<String>,

    /// Native interop: on, off or unset
    #[arg(long)]
    cgo: Option<CgoMode>,

    /// C compiler for native interop
    #[arg(long)]
    cc: Option<PathBuf>,

    /// C++ compiler for native interop
    #[arg(long)]
    cxx: Option<PathBuf>,

    /// Build tags (comma-separated)
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,

    /// Linker flag; repeat for several
    #[arg(long = "ldflag", allow_hyphen_values = true)]
    ldflags: Vec<String>,

    /// Compiler flags (`-gcflags=`)
    #[arg(long, allow_hyphen_values = true)]
    gcflags: Option<String>,

    /// Assembler flags (`-asmflags=`)
    #[arg(long, allow_hyphen_values = true)]
    asmflags: Option<String>,

    /// Build mode (exe, pie, c-shared, c-archive, ...)
    #[arg(long)]
    buildmode: Option<BuildMode>,

    /// Strip local paths from the artifact
    #[arg(long)]
    trimpath: bool,

    /// Print the command and environment without running it
    #[arg(long)]
    dry_run: bool,

    /// Output a JSON build summary
    #[arg(long)]
    json: bool,
}

/// Paths and settings shared by every command
struct Context {
    app_dir: PathBuf,
    project_root: PathBuf,
    effective: EffectiveConfig,
}

impl Context {
    fn load(cli: &Cli, overrides: Option<serde_json::Value>) -> Self {
        let project_root = match &cli.project {
            Some(p) => p.clone(),
            None => std::env::current_dir().unwrap_or_else(|e| {
                eprintln!("Error: cannot determine current directory: {}", e);
                process::exit(1);
            }),
        };
        let app_dir = cli.app_dir.clone().unwrap_or_else(default_app_dir);

        let project_config = cli
            .config
            .clone()
            .unwrap_or_else(|| project_config_path(&project_root));
        if cli.config.is_some() && !project_config.exists() {
            eprintln!("Error: config file not found: {}", project_config.display());
            process::exit(1);
        }

        let host_config = host_config_path();
        let effective = match EffectiveConfig::build(
            host_config.as_deref(),
            Some(project_config.as_path()),
            overrides,
        ) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                process::exit(1);
            }
        };

        Self {
            app_dir,
            project_root,
            effective,
        }
    }

    fn build_config(&self, os: &str, arch: &str) -> BuildConfig {
        self.effective
            .settings()
            .build_config(&self.app_dir, &self.project_root, os, arch)
    }

    /// Config for commands that do not target anything in particular.
    fn host_config(&self) -> BuildConfig {
        self.build_config(host_os(), host_arch())
    }

    fn toolchain(&self) -> Toolchain {
        let settings = self.effective.settings();
        let cancel = CancelFlag::new();
        if let Err(e) = SignalHandler::new(cancel.clone()).install() {
            debug!("interrupt handler not installed: {}", e);
        }
        let runner = SystemRunner::new()
            .with_cancel_flag(cancel)
            .with_grace(settings.timeouts.grace());
        Toolchain::from_settings(settings, Arc::new(runner)).unwrap_or_else(|e| fail(&e))
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Targets { os, json } => run_targets(&cli, os.as_deref(), *json),
        Commands::Version { json } => run_version(&cli, *json),
        Commands::Build(args) => run_build(&cli, args),
        Commands::Mod { source_dir, args } => run_mod(&cli, source_dir.as_deref(), args),
        Commands::Config { json } => run_config(&cli, *json),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_targets(cli: &Cli, os: Option<&str>, json_output: bool) {
    let ctx = Context::load(cli, None);
    let config = ctx.host_config();
    let matrix = ctx.toolchain().resolve_targets(&config);

    if matrix.is_empty() {
        eprintln!(
            "No targets discovered. Is the toolchain installed at {}?",
            config.toolchain_path().display()
        );
        process::exit(1);
    }

    let targets: Vec<_> = matrix
        .iter()
        .filter(|t| os.map_or(true, |os| t.os == os))
        .collect();

    if json_output {
        print_json(&targets);
    } else {
        for target in targets {
            println!("{}", target);
        }
    }
}

fn run_version(cli: &Cli, json_output: bool) {
    let ctx = Context::load(cli, None);
    let config = ctx.host_config();

    let stdout = ctx
        .toolchain()
        .version(&config)
        .unwrap_or_else(|e| fail(&e));
    let text = String::from_utf8_lossy(&stdout);

    if json_output {
        match ToolchainVersion::parse(&text) {
            Some(version) => print_json(&version),
            None => {
                eprintln!("Error: unrecognised version output: {}", text.trim());
                process::exit(1);
            }
        }
    } else {
        print!("{}", text);
    }
}

fn run_build(cli: &Cli, args: &BuildArgs) {
    let mut overrides = serde_json::json!({});
    if args.obfuscate {
        overrides["obfuscation"] = serde_json::json!({"enabled": true});
    }
    let mut cgo = serde_json::Map::new();
    if let Some(mode) = args.cgo {
        cgo.insert("enabled".into(), serde_json::to_value(mode).unwrap_or_default());
    }
    if let Some(cc) = &args.cc {
        cgo.insert("cc".into(), cc.display().to_string().into());
    }
    if let Some(cxx) = &args.cxx {
        cgo.insert("cxx".into(), cxx.display().to_string().into());
    }
    if !cgo.is_empty() {
        overrides["cgo"] = serde_json::Value::Object(cgo);
    }

    let ctx = Context::load(cli, Some(overrides));
    let mut config = ctx.build_config(&args.os, &args.arch);
    if let Some(dir) = &args.source_dir {
        config = config.with_source_dir(dir);
    }

    let mut request = BuildRequest::new(&args.output)
        .tags(args.tags.iter().cloned())
        .ldflags(args.ldflags.iter().cloned())
        .trimpath(args.trimpath);
    if let Some(mode) = args.buildmode {
        request = request.build_mode(mode);
    }
    if let Some(flags) = &args.gcflags {
        request = request.gcflags(flags);
    }
    if let Some(flags) = &args.asmflags {
        request = request.asmflags(flags);
    }
    if let Some(seed) = &args.seed {
        request = request.pin_seed(seed);
    }

    let toolchain = ctx.toolchain();

    if args.dry_run {
        let plan = toolchain.plan(&config, &request).unwrap_or_else(|e| fail(&e));
        if args.json {
            print_json(&serde_json::json!({
                "program": plan.invocation.program,
                "args": plan.invocation.args,
                "working_dir": plan.invocation.working_dir,
                "env": crossforge::Environment::for_build(&config).redacted(),
                "seed": plan.seed,
                "policy": plan.policy,
            }));
        } else {
            println!("{}", plan.invocation.command_line());
            for line in crossforge::Environment::for_build(&config).redacted() {
                println!("  {}", line);
            }
        }
        return;
    }

    let output = toolchain.build(&config, &request).unwrap_or_else(|e| fail(&e));

    if args.json {
        print_json(&serde_json::json!({
            "build_id": output.build_id,
            "target": config.target().to_string(),
            "dest": args.output,
            "program": output.program,
            "args": output.args,
            "seed": output.seed,
            "policy": output.policy,
            "elapsed_ms": output.elapsed.as_millis() as u64,
            "stdout_sha256": output.artifact_digest(),
        }));
    } else {
        let mut stdout = std::io::stdout();
        if let Err(e) = stdout.write_all(&output.artifact).and_then(|_| stdout.flush()) {
            eprintln!("Error writing output: {}", e);
            process::exit(1);
        }
        eprintln!(
            "Built {} -> {} in {:.1}s",
            config.target(),
            args.output.display(),
            output.elapsed.as_secs_f64()
        );
    }
}

fn run_mod(cli: &Cli, source_dir: Option<&Path>, args: &[String]) {
    let ctx = Context::load(cli, None);
    let mut config = ctx.host_config();
    if let Some(dir) = source_dir {
        config = config.with_source_dir(dir);
    }

    let stdout = ctx
        .toolchain()
        .mod_command(&config, args.iter().cloned())
        .unwrap_or_else(|e| fail(&e));
    print!("{}", String::from_utf8_lossy(&stdout));
}

fn run_config(cli: &Cli, json_output: bool) {
    let ctx = Context::load(cli, None);
    let effective = &ctx.effective;

    if json_output {
        match effective.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    println!("App dir:  {}", ctx.app_dir.display());
    println!("Project:  {}", ctx.project_root.display());
    println!("Sources:");
    for source in &effective.sources {
        match &source.path {
            Some(path) => println!("  {:?}: {}", source.origin, path),
            None => println!("  {:?}", source.origin),
        }
    }
    match toml::to_string_pretty(&effective.config) {
        Ok(text) => {
            println!();
            print!("{}", text);
        }
        Err(e) => {
            eprintln!("Error rendering config: {}", e);
            process::exit(1);
        }
    }
}

/// Print the error and exit with a code matching its kind.
fn fail(err: &ForgeError) -> ! {
    eprintln!("Error: {}", err);
    if let Some(diagnostics) = err.diagnostics() {
        let stderr = diagnostics.stderr_lossy();
        if !stderr.trim().is_empty() {
            eprintln!("{}", stderr.trim_end());
        }
    }
    let code = match err {
        ForgeError::InvalidTarget { .. } => EXIT_CODE_INVALID_TARGET,
        ForgeError::TimedOut(_) => EXIT_CODE_TIMED_OUT,
        ForgeError::Cancelled(_) => EXIT_CODE_CANCELLED,
        _ => 1,
    };
    process::exit(code);
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}

fn default_app_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".crossforge"),
        None => PathBuf::from(".crossforge"),
    }
}

/// Host OS in the toolchain's naming.
fn host_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// Host architecture in the toolchain's naming.
fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64",
        "loongarch64" => "loong64",
        other => other,
    }
}
