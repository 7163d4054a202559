use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::io::{self, Write};
use std::path::PathBuf;
use tie_runner::{
    CurlSmtpNotifier, LogNotifier, Notifier, Pipeline, PlaceholderTemplate, RunMode, RunSummary,
    Stage, SystemExecutor,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "blacktie",
    version = "0.3.0",
    about = "Run the tophat/cufflinks/cuffmerge/cuffdiff pipeline from one YAML file"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    #[value(name = "analyze")]
    Analyze,
    #[value(name = "dry_run")]
    DryRun,
    #[value(name = "qsub_script")]
    QsubScript,
}

impl From<ModeArg> for RunMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Analyze => RunMode::Analyze,
            ModeArg::DryRun => RunMode::DryRun,
            ModeArg::QsubScript => RunMode::QsubScript,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve and run every enabled stage.
    Run {
        config: PathBuf,
        #[arg(long, value_enum, default_value = "analyze")]
        mode: ModeArg,
        #[arg(long)]
        json: bool,
    },
    /// Show the calls a run would make without resolving them.
    Describe {
        config: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(cli.command);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", format!("{:#}", err), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Run { config, mode, json } => {
            let config = tie_runner::load_config(&config)?;
            let mut notifier: Box<dyn Notifier> = match &config.email {
                Some(email) => Box::new(CurlSmtpNotifier::new(email.smtp_url.as_deref())),
                None => Box::new(LogNotifier),
            };
            let mut executor = SystemExecutor;
            let renderer = PlaceholderTemplate::default();
            let mut pipeline = Pipeline::new(config, mode.into());
            let mut env = tie_runner::CallEnv::new(
                pipeline.config(),
                &mut executor,
                &mut *notifier,
                &renderer,
            );
            let summary = pipeline.run(&mut env)?;
            if json {
                let recovered: Vec<String> =
                    summary.recovered.iter().map(|id| id.to_string()).collect();
                return Ok(Some(json!({
                    "ok": true,
                    "command": "run",
                    "run_id": summary.run_id,
                    "mode": summary.mode.as_str(),
                    "completed": summary.completed,
                    "recovered": recovered
                })));
            }
            if summary_to_stderr(summary.mode) {
                write_run_summary(&mut std::io::stderr().lock(), &summary)?;
            } else {
                write_run_summary(&mut std::io::stdout().lock(), &summary)?;
            }
        }
        Commands::Describe { config, json } => {
            let config = tie_runner::load_config(&config)?;
            let pipeline = Pipeline::new(config, RunMode::DryRun);
            let config = pipeline.config();
            let plan: Vec<String> = pipeline.plan().iter().map(|id| id.to_string()).collect();
            let stages: Vec<&str> = Stage::ALL
                .iter()
                .filter(|s| config.stage_enabled(**s))
                .map(|s| s.program())
                .collect();
            let groups: Vec<String> = config.conditions.groups().iter().map(|g| g.name()).collect();
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "describe",
                    "run_id": config.run_id,
                    "base_dir": config.run.base_dir.display().to_string(),
                    "log_dir": config.log_dir().display().to_string(),
                    "stages": stages,
                    "groups": groups,
                    "calls": plan
                })));
            }
            println!("run_id: {}", config.run_id);
            println!("base_dir: {}", config.run.base_dir.display());
            println!("log_dir: {}", config.log_dir().display());
            println!("stages: {}", stages.join(" -> "));
            println!("groups: {}", groups.join(", "));
            for call_id in plan {
                println!("call: {}", call_id);
            }
        }
    }
    Ok(None)
}

/// Dry runs print command lines on stdout, so their summary goes elsewhere.
fn summary_to_stderr(mode: RunMode) -> bool {
    mode == RunMode::DryRun
}

fn write_run_summary(out: &mut impl Write, summary: &RunSummary) -> io::Result<()> {
    writeln!(out, "run_id: {}", summary.run_id)?;
    writeln!(out, "mode: {}", summary.mode.as_str())?;
    writeln!(out, "completed: {}", summary.completed)?;
    if !summary.recovered.is_empty() {
        let recovered: Vec<String> = summary.recovered.iter().map(|id| id.to_string()).collect();
        writeln!(out, "recovered: {}", recovered.join(", "))?;
    }
    Ok(())
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Run { json, .. } | Commands::Describe { json, .. } => *json,
    }
}
