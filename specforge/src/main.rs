//! Specification-driven artifact pipeline CLI.
//!
//! `specforge run` picks up specifications changed since a base ref, generates
//! code, tests, docs and a benchmark for each, validates and corrects them in
//! a staging directory and promotes clean sets to `agent/<slug>` branches.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde::Serialize;

use specforge::exit_codes;
use specforge::generate::planned_paths;
use specforge::io::config::{Backend, ForgeConfig, load_config, write_config};
use specforge::io::git::Git;
use specforge::io::service::CommandService;
use specforge::io::spec_source::{changed_specs, load_spec};
use specforge::logging;
use specforge::pipeline::Orchestrator;
use specforge::validate::ValidationHarness;

#[derive(Parser)]
#[command(
    name = "specforge",
    version,
    about = "Generate, validate, correct and promote artifacts from algorithm specifications"
)]
struct Cli {
    /// Config file, relative to the repository unless absolute.
    #[arg(long, global = true, default_value = "specforge.toml")]
    config: PathBuf,

    /// Content backend (overrides config).
    #[arg(long, global = true, env = "SPECFORGE_BACKEND", value_enum)]
    backend: Option<Backend>,

    /// Backend model (overrides config).
    #[arg(long, global = true, env = "SPECFORGE_MODEL")]
    model: Option<String>,

    /// Correction rounds before abandoning a specification (overrides config).
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    /// Repository to operate on.
    #[arg(short = 'C', long = "repo", global = true, default_value = ".")]
    repo: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process specifications changed since BASE (or the given files).
    Run {
        /// Git ref to diff against.
        #[arg(required_unless_present = "spec")]
        base: Option<String>,
        /// Keep staging for inspection and never touch the repository.
        #[arg(long)]
        dry_run: bool,
        /// Process these files instead of the diff.
        #[arg(long = "spec", value_name = "FILE")]
        spec: Vec<PathBuf>,
        /// Write a JSON run report here.
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },
    /// List specification files changed since BASE.
    Changed {
        base: String,
    },
    /// Parse and validate specification files without running the pipeline.
    CheckSpec {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    let directives = match cli.command {
        Command::Run { .. } => "warn,specforge=info",
        _ => "warn",
    };
    logging::init(directives);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    match &cli.command {
        Command::Run {
            base,
            dry_run,
            spec,
            report,
        } => cmd_run(&cli, base.as_deref(), *dry_run, spec, report.as_deref()),
        Command::Changed { base } => cmd_changed(&cli, base),
        Command::CheckSpec { files } => cmd_check_spec(&cli, files),
        Command::Init { force } => cmd_init(&cli, *force),
    }
}

fn repo_root(cli: &Cli) -> Result<PathBuf> {
    Git::new(&cli.repo)
        .toplevel()
        .with_context(|| format!("{} is not inside a git repository", cli.repo.display()))
}

fn config_path(cli: &Cli, root: &Path) -> PathBuf {
    if cli.config.is_absolute() {
        cli.config.clone()
    } else {
        root.join(&cli.config)
    }
}

/// Load config and apply CLI overrides.
fn resolve_config(cli: &Cli, root: &Path) -> Result<ForgeConfig> {
    let mut cfg = load_config(&config_path(cli, root))?;
    if let Some(backend) = cli.backend {
        cfg.generator.backend = backend;
    }
    if let Some(model) = &cli.model {
        cfg.generator.model = Some(model.clone());
    }
    if let Some(max_attempts) = cli.max_attempts {
        cfg.max_attempts = max_attempts;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn cmd_run(
    cli: &Cli,
    base: Option<&str>,
    dry_run: bool,
    explicit: &[PathBuf],
    report: Option<&Path>,
) -> Result<i32> {
    let root = repo_root(cli)?;
    let cfg = resolve_config(cli, &root)?;

    let paths = if explicit.is_empty() {
        let base = base.ok_or_else(|| anyhow!("BASE is required without --spec"))?;
        changed_specs(&Git::new(&root), &root, &cfg.specs_dir, base)?
    } else {
        explicit
            .iter()
            .map(|path| {
                std::path::absolute(path).with_context(|| format!("resolve {}", path.display()))
            })
            .collect::<Result<Vec<_>>>()?
    };
    if paths.is_empty() {
        println!("no changed specifications");
        return Ok(exit_codes::OK);
    }

    let service = CommandService::from_config(&cfg, &root)?;
    let harness = ValidationHarness::from_config(&cfg);
    let orchestrator = Orchestrator::new(&root, &cfg, service, harness, dry_run)?;
    let summary = orchestrator.run(&paths);

    for spec_run in &summary.runs {
        println!("{}", spec_run.summary_line());
    }
    if let Some(report) = report {
        write_json(report, &summary)?;
    }
    Ok(if summary.failures() == 0 {
        exit_codes::OK
    } else {
        exit_codes::INCOMPLETE
    })
}

fn cmd_changed(cli: &Cli, base: &str) -> Result<i32> {
    let root = repo_root(cli)?;
    let cfg = resolve_config(cli, &root)?;
    for path in changed_specs(&Git::new(&root), &root, &cfg.specs_dir, base)? {
        let shown = path.strip_prefix(&root).unwrap_or(&path);
        println!("{}", shown.display());
    }
    Ok(exit_codes::OK)
}

fn cmd_check_spec(cli: &Cli, files: &[PathBuf]) -> Result<i32> {
    // Layout comes from the repository config when there is one.
    let cfg = match repo_root(cli) {
        Ok(root) => resolve_config(cli, &root)?,
        Err(_) => ForgeConfig::default(),
    };
    let mut invalid = 0usize;
    for file in files {
        match load_spec(file) {
            Ok(spec) => {
                println!("ok      {} ({})", file.display(), spec.slug());
                for (kind, path) in planned_paths(&cfg.layout, &spec) {
                    println!("  {:<5} {}", kind.as_str(), path.display());
                }
            }
            Err(err) => {
                invalid += 1;
                println!("invalid {err}");
            }
        }
    }
    Ok(if invalid == 0 {
        exit_codes::OK
    } else {
        exit_codes::INVALID
    })
}

fn cmd_init(cli: &Cli, force: bool) -> Result<i32> {
    let root = repo_root(cli)?;
    let path = config_path(cli, &root);
    if path.exists() && !force {
        println!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(&path, &ForgeConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

/// Serialize `value` to pretty-printed JSON with trailing newline.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(value).context("serialize json")?;
    payload.push('\n');
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, payload).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
