use anyhow::{Context, Result};
use clap::Parser;
use class_weaver::cache::{WeaveLedger, WeaveSettings};
use class_weaver::classfile::{ClassFile, ClassSummary};
use class_weaver::cli::{Cli, Commands};
use class_weaver::config::{clear_db, load_model, resolve_db_path, resolve_target_version};
use class_weaver::jar::{ArchiveSummary, observe_directory, observe_jar, weave_directory, weave_jar};
use class_weaver::logging;
use class_weaver::probe::xml_transient_available;
use class_weaver::weaver::{ClassWeaver, WeaveContext, WeaveOutcome, WeaveReport};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    match cli.command.clone() {
        Commands::Clear => {
            let db_path = resolve_db_path(&cli)?;
            clear_db(&db_path)?;
        }
        Commands::Stats => {
            let db_path = resolve_db_path(&cli)?;
            let ledger = WeaveLedger::open(db_path)?;
            let stats = ledger.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Inspect { class_file, model } => {
            let inspection = inspect(&class_file, model.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&inspection)?);
        }
        Commands::Weave {
            model,
            inputs,
            output,
            classpath,
            java_version,
            force,
            report,
        } => {
            let request = WeaveRequest {
                model,
                inputs,
                output,
                classpath,
                java_version,
                force,
                report,
            };
            let run = weave(&cli, &request)?;
            println!("{}", serde_json::to_string_pretty(&run)?);
        }
    }

    Ok(())
}

struct WeaveRequest {
    model: PathBuf,
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
    classpath: Vec<PathBuf>,
    java_version: Option<String>,
    force: bool,
    report: bool,
}

#[derive(Debug, Serialize)]
struct WeaveRun {
    target_java: &'static str,
    xml_transient: bool,
    model_sha256: String,
    native_change_trackers: usize,
    elapsed_ms: u128,
    inputs: Vec<InputRun>,
}

#[derive(Debug, Serialize)]
struct InputRun {
    input: String,
    output: String,
    skipped: bool,
    classes: usize,
    woven: usize,
    already_woven: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    reports: Vec<WeaveReport>,
}

impl InputRun {
    fn skipped(input: &Path, output: &Path) -> Self {
        Self {
            input: input.to_string_lossy().to_string(),
            output: output.to_string_lossy().to_string(),
            skipped: true,
            classes: 0,
            woven: 0,
            already_woven: 0,
            reports: Vec::new(),
        }
    }

    fn from_summary(summary: ArchiveSummary, keep_reports: bool) -> Self {
        Self {
            input: summary.input,
            output: summary.output,
            skipped: false,
            classes: summary.classes,
            woven: summary.woven,
            already_woven: summary.already_woven,
            reports: if keep_reports {
                summary.reports
            } else {
                Vec::new()
            },
        }
    }
}

fn weave(cli: &Cli, request: &WeaveRequest) -> Result<WeaveRun> {
    let started = Instant::now();
    if request.output.is_some() && request.inputs.len() > 1 {
        anyhow::bail!("--output needs exactly one input");
    }

    let (model, model_sha256) = load_model(&request.model)?;
    let target = resolve_target_version(request.java_version.as_deref());

    let mut probe_path = request.classpath.clone();
    probe_path.extend(request.inputs.iter().cloned());
    let mut context = WeaveContext::new(target, xml_transient_available(&probe_path));

    // Native change trackers in any input affect subclasses in every other.
    for input in &request.inputs {
        if input.is_dir() {
            observe_directory(input, &mut context)?;
        } else {
            observe_jar(input, &mut context)?;
        }
    }

    // Inputs are keyed separately; only the extra classpath joins the settings.
    let settings = WeaveSettings::new(
        &model_sha256,
        target.major,
        context.xml_transient(),
        &request.classpath,
    );
    let ledger = WeaveLedger::open(resolve_db_path(cli)?)?;
    let weaver = ClassWeaver::new(&model, &context);
    let mut inputs = Vec::with_capacity(request.inputs.len());
    for input in &request.inputs {
        let output = request.output.as_deref().unwrap_or(input);
        if !request.force && ledger.is_current(input, output, &settings)? {
            info!(input = %input.display(), "Unchanged since last weave");
            inputs.push(InputRun::skipped(input, output));
            continue;
        }
        let summary = if input.is_dir() {
            weave_directory(input, output, &weaver)?
        } else {
            weave_jar(input, output, &weaver)?
        };
        ledger.record(input, output, &settings, summary.classes, summary.woven)?;
        inputs.push(InputRun::from_summary(summary, request.report));
    }

    Ok(WeaveRun {
        target_java: target.name,
        xml_transient: context.xml_transient(),
        model_sha256,
        native_change_trackers: context.native_change_tracker_count(),
        elapsed_ms: started.elapsed().as_millis(),
        inputs,
    })
}

#[derive(Debug, Serialize)]
struct Inspection {
    class: ClassSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    already_woven: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    weave: Option<WeaveReport>,
}

fn inspect(class_file: &Path, model: Option<&Path>) -> Result<Inspection> {
    let bytes = std::fs::read(class_file)
        .with_context(|| format!("Failed to read class file: {}", class_file.display()))?;
    let class = ClassFile::parse(&bytes)
        .with_context(|| format!("Malformed class file: {}", class_file.display()))?;
    let summary = class.summary()?;

    let Some(model_path) = model else {
        return Ok(Inspection {
            class: summary,
            already_woven: None,
            weave: None,
        });
    };
    let (model, _) = load_model(model_path)?;
    let context = WeaveContext::default();
    let outcome = ClassWeaver::new(&model, &context)
        .weave(&bytes)
        .with_context(|| format!("Failed to weave {}", summary.name))?;
    let (already_woven, weave) = match outcome {
        WeaveOutcome::AlreadyWoven => (true, None),
        WeaveOutcome::Woven { report, .. } => (false, Some(report)),
    };
    Ok(Inspection {
        class: summary,
        already_woven: Some(already_woven),
        weave,
    })
}
