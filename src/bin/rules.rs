//! Rules CLI - Command-line interface for Synheart Rules
//!
//! Commands:
//! - evaluate: Evaluate a user's rules for a date from history, rule and audit files
//! - features: Print the feature snapshot of a user for a date
//! - validate: Validate rule documents, optionally against a variable catalog
//! - analytics: Daily trigger counts per rule from an audit file

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use synheart_rules::normalizer::parse_date;
use synheart_rules::providers::{InMemoryAuditLog, InMemoryHistory, InMemoryRules};
use synheart_rules::schema::{HistoryLoader, RuleLoader, VariableCatalog};
use synheart_rules::{EngineConfig, EngineError, FeatureAggregator, RulesEngine, RULES_VERSION};

/// Rules - Personalized recommendation rule engine
#[derive(Parser)]
#[command(name = "rules")]
#[command(author = "Synheart AI Inc")]
#[command(version = RULES_VERSION)]
#[command(about = "Evaluate recommendation rules against wearable history", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate all enabled rules of a tenant for one user and date
    Evaluate {
        /// History file, JSON array or NDJSON (use - for stdin)
        #[arg(long)]
        history: PathBuf,

        /// Rule file, JSON array or NDJSON
        #[arg(long)]
        rules: PathBuf,

        /// Prior audit entries (JSON array)
        #[arg(long)]
        audits: Option<PathBuf>,

        /// Engine config file (TOML, or JSON with a .json extension)
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        user: String,

        /// Target date (YYYY-MM-DD or DD/MM/YYYY)
        #[arg(long)]
        date: String,

        /// Tenant, defaults to the configured default tenant
        #[arg(long)]
        tenant: Option<String>,

        /// Include feature snapshot and per-rule traces
        #[arg(long)]
        debug: bool,

        /// Seed for reproducible message selection
        #[arg(long)]
        seed: Option<u64>,

        /// Global daily cap (0 = unlimited)
        #[arg(long, env = "RULES_MAX_RECS_PER_DAY")]
        max_recs_per_day: Option<usize>,

        /// Daily cap per category (0 = unlimited)
        #[arg(long, env = "RULES_MAX_RECS_PER_CATEGORY")]
        max_recs_per_category: Option<usize>,

        /// Anti-repetition window in days (0 = off)
        #[arg(long, env = "RULES_ANTI_REPEAT_DAYS")]
        anti_repeat_days: Option<u32>,

        /// Write the audit log, including this evaluation, to a file
        #[arg(long)]
        save_audits: Option<PathBuf>,
    },

    /// Print the feature snapshot of a user for a date
    Features {
        /// History file, JSON array or NDJSON (use - for stdin)
        #[arg(long)]
        history: PathBuf,

        #[arg(long)]
        user: String,

        #[arg(long)]
        date: String,

        /// Comma-separated variables to aggregate instead of the defaults
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
    },

    /// Validate rule documents
    Validate {
        /// Rule file, JSON array or NDJSON (use - for stdin)
        #[arg(long)]
        rules: PathBuf,

        /// Variable catalog to check condition references against
        #[arg(long)]
        variables: Option<PathBuf>,

        /// Output report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Daily trigger counts per rule
    Analytics {
        /// Audit file (JSON array)
        #[arg(long)]
        audits: PathBuf,

        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,

        #[arg(long, default_value = "default")]
        tenant: String,

        /// Comma-separated rule ids to include (default: all)
        #[arg(long, value_delimiter = ',')]
        rule_ids: Vec<String>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), RulesCliError> {
    match cli.command {
        Commands::Evaluate {
            history,
            rules,
            audits,
            config,
            user,
            date,
            tenant,
            debug,
            seed,
            max_recs_per_day,
            max_recs_per_category,
            anti_repeat_days,
            save_audits,
        } => {
            let mut config = match config {
                Some(path) => EngineConfig::from_file(path)?,
                None => EngineConfig::default(),
            };
            if let Some(cap) = max_recs_per_day {
                config.max_recs_per_day = cap;
            }
            if let Some(cap) = max_recs_per_category {
                config.max_recs_per_category_per_day = cap;
            }
            if let Some(days) = anti_repeat_days {
                config.anti_repeat_days = days;
            }
            config.validate()?;

            cmd_evaluate(EvaluateArgs {
                history: &history,
                rules: &rules,
                audits: audits.as_deref(),
                config,
                user: &user,
                date: &date,
                tenant: tenant.as_deref(),
                debug,
                seed,
                save_audits: save_audits.as_deref(),
            })
        }

        Commands::Features {
            history,
            user,
            date,
            fields,
        } => cmd_features(&history, &user, &date, fields),

        Commands::Validate {
            rules,
            variables,
            json,
        } => cmd_validate(&rules, variables.as_deref(), json),

        Commands::Analytics {
            audits,
            start,
            end,
            tenant,
            rule_ids,
        } => cmd_analytics(&audits, &start, &end, &tenant, &rule_ids),
    }
}

struct EvaluateArgs<'a> {
    history: &'a Path,
    rules: &'a Path,
    audits: Option<&'a Path>,
    config: EngineConfig,
    user: &'a str,
    date: &'a str,
    tenant: Option<&'a str>,
    debug: bool,
    seed: Option<u64>,
    save_audits: Option<&'a Path>,
}

fn cmd_evaluate(args: EvaluateArgs<'_>) -> Result<(), RulesCliError> {
    let date = cli_date(args.date)?;
    let history = HistoryLoader::parse(&read_input(args.history)?)?;
    let rules = RuleLoader::parse(&read_input(args.rules)?)?;
    let audit_log = Arc::new(match args.audits {
        Some(path) => InMemoryAuditLog::from_json(&read_input(path)?)?,
        None => InMemoryAuditLog::new(),
    });

    let engine = RulesEngine::new(
        Arc::new(InMemoryHistory::new(history)),
        Arc::new(InMemoryRules::new(rules)),
        audit_log.clone(),
        args.config,
    );

    let result = match args.seed {
        Some(seed) => {
            let mut rng = StdRng::seed_from_u64(seed);
            engine.evaluate_user_with_rng(args.user, date, args.tenant, args.debug, &mut rng)?
        }
        None => engine.evaluate_user(args.user, date, args.tenant, args.debug)?,
    };

    println!("{}", serde_json::to_string_pretty(&result)?);

    if let Some(path) = args.save_audits {
        fs::write(path, audit_log.to_json()?)?;
    }
    Ok(())
}

fn cmd_features(history: &Path, user: &str, date: &str, fields: Vec<String>) -> Result<(), RulesCliError> {
    let date = cli_date(date)?;
    let records = HistoryLoader::parse(&read_input(history)?)?;

    let aggregator = if fields.is_empty() {
        FeatureAggregator::default()
    } else {
        FeatureAggregator::with_fields(fields)
    };
    let snapshot = aggregator.build(&records, user, date);
    if snapshot.is_empty() {
        return Err(RulesCliError::NoHistory(user.to_string()));
    }

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn cmd_validate(rules: &Path, variables: Option<&Path>, json: bool) -> Result<(), RulesCliError> {
    let rules = RuleLoader::parse(&read_input(rules)?)?;
    let catalog = match variables {
        Some(path) => Some(VariableCatalog::parse(&read_input(path)?)?),
        None => None,
    };

    let details: Vec<RuleReport> = rules
        .iter()
        .enumerate()
        .map(|(index, rule)| {
            let warnings = match (&catalog, rule.condition()) {
                (Some(catalog), Ok(node)) => catalog
                    .check_condition(node)
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                _ => Vec::new(),
            };
            RuleReport {
                index,
                rule_id: rule.id.clone(),
                errors: rule.validation_errors().iter().map(ToString::to_string).collect(),
                warnings,
            }
        })
        .collect();

    let invalid = details.iter().filter(|r| !r.errors.is_empty()).count();
    let report = ValidationReport {
        total_rules: rules.len(),
        valid_rules: rules.len() - invalid,
        invalid_rules: invalid,
        rules: details,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total rules:   {}", report.total_rules);
        println!("Valid rules:   {}", report.valid_rules);
        println!("Invalid rules: {}", report.invalid_rules);

        for rule in report.rules.iter().filter(|r| !r.errors.is_empty() || !r.warnings.is_empty()) {
            println!("\nRule {} (index {}):", rule.rule_id, rule.index);
            for err in &rule.errors {
                println!("  - error: {}", err);
            }
            for warning in &rule.warnings {
                println!("  - warning: {}", warning);
            }
        }
    }

    if report.invalid_rules > 0 {
        Err(RulesCliError::ValidationFailed(report.invalid_rules))
    } else {
        Ok(())
    }
}

fn cmd_analytics(
    audits: &Path,
    start: &str,
    end: &str,
    tenant: &str,
    rule_ids: &[String],
) -> Result<(), RulesCliError> {
    let start = cli_date(start)?;
    let end = cli_date(end)?;
    if end < start {
        return Err(RulesCliError::InvalidRange { start, end });
    }

    let log = InMemoryAuditLog::from_json(&read_input(audits)?)?;
    let analytics = log.trigger_analytics(tenant, start, end, rule_ids);
    println!("{}", serde_json::to_string_pretty(&analytics)?);
    Ok(())
}

fn read_input(path: &Path) -> Result<String, RulesCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn cli_date(raw: &str) -> Result<NaiveDate, RulesCliError> {
    parse_date(raw).ok_or_else(|| RulesCliError::Engine(EngineError::DateParseError(raw.to_string())))
}

// Error types

#[derive(Debug)]
enum RulesCliError {
    Io(io::Error),
    Engine(EngineError),
    Json(serde_json::Error),
    NoHistory(String),
    ValidationFailed(usize),
    InvalidRange { start: NaiveDate, end: NaiveDate },
}

impl From<io::Error> for RulesCliError {
    fn from(e: io::Error) -> Self {
        RulesCliError::Io(e)
    }
}

impl From<EngineError> for RulesCliError {
    fn from(e: EngineError) -> Self {
        RulesCliError::Engine(e)
    }
}

impl From<serde_json::Error> for RulesCliError {
    fn from(e: serde_json::Error) -> Self {
        RulesCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<RulesCliError> for CliError {
    fn from(e: RulesCliError) -> Self {
        match e {
            RulesCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            RulesCliError::Engine(EngineError::InvalidConfig(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Check the config file and RULES_* environment variables".to_string()),
            },
            RulesCliError::Engine(EngineError::DateParseError(raw)) => CliError {
                code: "DATE_ERROR".to_string(),
                message: format!("Unrecognized date: {raw}"),
                hint: Some("Use YYYY-MM-DD or DD/MM/YYYY".to_string()),
            },
            RulesCliError::Engine(e) => CliError {
                code: "ENGINE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Ensure inputs are JSON arrays or NDJSON".to_string()),
            },
            RulesCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            RulesCliError::NoHistory(user) => CliError {
                code: "NO_HISTORY".to_string(),
                message: format!("No history for user {user} up to the target date"),
                hint: Some("Check the user id and date".to_string()),
            },
            RulesCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} rules failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            RulesCliError::InvalidRange { start, end } => CliError {
                code: "INVALID_RANGE".to_string(),
                message: format!("End date {end} is before start date {start}"),
                hint: None,
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_rules: usize,
    valid_rules: usize,
    invalid_rules: usize,
    rules: Vec<RuleReport>,
}

#[derive(serde::Serialize)]
struct RuleReport {
    index: usize,
    rule_id: String,
    errors: Vec<String>,
    warnings: Vec<String>,
}
