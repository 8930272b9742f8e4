use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use tuition_ledger::{BillingPartyFilter, EngineConfig, ReconciliationScope, TuitionEngine};

const DEFAULT_CONFIG: &str = "tuition-ledger.json";

const USAGE: &str = "\
Usage: tuition-ledger [--config <path>] <command>

Commands:
  init                                   create the database schema
  rebuild                                regenerate the tuition catalog
  reconcile <payer> <billing_party>      paid/unpaid status per lesson
  summary payer <id> [--teacher <id>] [--student <id>]
  summary teacher <id> [--parent <id>] [--student <id>]
  integrity                              list catalog problems";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let config_path = take_flag(&mut args, "--config")?
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = EngineConfig::load(&config_path)?;

    match args.first().map(String::as_str) {
        Some("init") => run_init(config),
        Some("rebuild") => run_rebuild(config),
        Some("reconcile") => run_reconcile(config, &args[1..]),
        Some("summary") => run_summary(config, &mut args[1..].to_vec()),
        Some("integrity") => run_integrity(config),
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }
}

fn open(config: EngineConfig) -> Result<TuitionEngine> {
    let path = config.database_path.clone();
    TuitionEngine::open(config).with_context(|| format!("Failed to open database {}", path.display()))
}

fn run_init(config: EngineConfig) -> Result<()> {
    println!("🔧 Setting up database...");
    let engine = open(config)?;
    println!("✓ Schema ready at {}", engine.config().database_path.display());
    Ok(())
}

fn run_rebuild(config: EngineConfig) -> Result<()> {
    println!("🏗️  Rebuilding tuition catalog...");
    let mut engine = open(config)?;
    let report = engine.rebuild().context("Catalog rebuild failed, nothing was changed")?;

    println!("✓ {} tuitions, {} charges", report.tuitions, report.charges);
    println!(
        "✓ Restored {} overrides, {} meeting links",
        report.overrides_restored, report.links_restored
    );
    if report.links_dropped > 0 || report.overrides_dropped > 0 {
        println!(
            "⚠️  Dropped {} overrides, {} meeting links for tuitions that no longer exist",
            report.overrides_dropped, report.links_dropped
        );
    }
    if report.orphaned_lessons > 0 {
        println!("⚠️  {} lesson logs no longer reference a tuition", report.orphaned_lessons);
    }
    Ok(())
}

fn run_reconcile(config: EngineConfig, args: &[String]) -> Result<()> {
    let [payer, billing_party] = args else {
        bail!("reconcile needs <payer> <billing_party>\n\n{USAGE}");
    };
    let scope = ReconciliationScope::payer(parse_id(payer)?).with_billing_party(parse_id(billing_party)?);

    let mut engine = open(config)?;
    let report = engine.reconcile(scope)?;

    println!("⚖️  {}", report.summary());
    for pass in &report.passes {
        for lesson in &pass.lessons {
            println!(
                "  {}  {}  {:>10}  {}",
                lesson.start_time.format("%Y-%m-%d %H:%M"),
                lesson.lesson_id,
                lesson.cost,
                lesson.status.as_str()
            );
        }
    }
    Ok(())
}

fn run_summary(config: EngineConfig, args: &mut Vec<String>) -> Result<()> {
    match args.first().map(String::as_str) {
        Some("payer") => {
            let teacher = take_flag(args, "--teacher")?.map(|id| parse_id(&id)).transpose()?;
            let student = take_flag(args, "--student")?.map(|id| parse_id(&id)).transpose()?;
            let payer = parse_id(args.get(1).context("summary payer needs <id>")?)?;

            let mut scope = ReconciliationScope::payer(payer);
            if let Some(teacher) = teacher {
                scope = scope.with_billing_party(teacher);
            }
            if let Some(student) = student {
                scope = scope.with_student(student);
            }

            let summary = open(config)?.summarize_payer(scope)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Some("teacher") => {
            let filter = BillingPartyFilter {
                payer: take_flag(args, "--parent")?.map(|id| parse_id(&id)).transpose()?,
                student: take_flag(args, "--student")?.map(|id| parse_id(&id)).transpose()?,
            };
            let teacher = parse_id(args.get(1).context("summary teacher needs <id>")?)?;

            let summary = open(config)?.summarize_billing_party(teacher, filter, Utc::now())?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        _ => bail!("summary needs payer|teacher\n\n{USAGE}"),
    }
    Ok(())
}

fn run_integrity(config: EngineConfig) -> Result<()> {
    println!("🔍 Checking catalog integrity...");
    let issues = open(config)?.check_catalog_integrity()?;
    if issues.is_empty() {
        println!("✅ No problems found");
    } else {
        for issue in &issues {
            println!("❌ {}: {}", issue.tuition_id, issue.problem);
        }
    }
    Ok(())
}

/// Remove `--flag <value>` from `args`
fn take_flag(args: &mut Vec<String>, flag: &str) -> Result<Option<String>> {
    let Some(pos) = args.iter().position(|a| a == flag) else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        bail!("{flag} needs a value");
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(value))
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("Not a valid id: {raw}"))
}
