//! planx CLI: run the optimizer pipeline over YAML plan descriptions.

use clap::{Parser, Subcommand};
use planx_core::config::PlannerConfig;
use planx_core::id::PlanNodeIdAllocator;
use planx_core::session::{Session, WarningCollector};
use planx_optimizer::{
    bundled_registry, load_configured, parse_yaml_document, parse_yaml_plan, OptimizerContext,
    OptimizerPipeline, PassOrigin, PlannerDependencies,
};
use std::error::Error;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "planx")]
#[command(about = "planx: extensible query plan optimizer pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Optimize a plan and print it before and after
    Explain {
        /// Path to the plan YAML file
        #[arg(short, long)]
        plan: PathBuf,

        /// Planner config YAML (overrides the config embedded in the plan file)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Plugged-in optimizer identifier; repeat for several (replaces the configured list)
        #[arg(long = "optimizer")]
        optimizers: Vec<String>,

        /// Plugin setting as key=value; repeatable
        #[arg(long = "set")]
        settings: Vec<String>,

        /// Repeat whole passes until the plan stops changing
        #[arg(long)]
        fixpoint: bool,

        /// Skip output validation between optimizers
        #[arg(long)]
        no_validate: bool,

        /// Record plan fingerprints per pass
        #[arg(long)]
        trace: bool,

        /// Print only the optimized plan, as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parse a plan YAML file (syntax check)
    Validate {
        /// Path to the plan YAML file
        #[arg(short, long)]
        plan: PathBuf,
    },

    /// List the optimizer factories this binary can load
    Factories,
}

/// CLI-level settings, applied last.
#[derive(Debug, Default)]
struct Overrides {
    optimizers: Vec<String>,
    settings: Vec<String>,
    fixpoint: bool,
    no_validate: bool,
    trace: bool,
    json: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("planx=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Explain {
            plan,
            config,
            optimizers,
            settings,
            fixpoint,
            no_validate,
            trace,
            json,
        } => {
            let overrides = Overrides {
                optimizers,
                settings,
                fixpoint,
                no_validate,
                trace,
                json,
            };
            match explain_plan(&plan, config.as_ref(), &overrides) {
                Ok(report) => print!("{report}"),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Validate { plan } => {
            if let Err(e) = validate_plan(&plan) {
                eprintln!("Validation failed: {}", e);
                std::process::exit(1);
            }
            println!("✓ Plan is valid");
        }
        Commands::Factories => {
            for identifier in bundled_registry().identifiers() {
                println!("{identifier}");
            }
        }
    }
}

fn validate_plan(plan_path: &PathBuf) -> Result<(), Box<dyn Error>> {
    let yaml_content = fs::read_to_string(plan_path)?;
    let plan = parse_yaml_plan(&yaml_content, &PlanNodeIdAllocator::new())?;
    info!(nodes = plan.node_count(), "plan parsed");
    Ok(())
}

fn explain_plan(
    plan_path: &PathBuf,
    config_path: Option<&PathBuf>,
    overrides: &Overrides,
) -> Result<String, Box<dyn Error>> {
    let yaml_content = fs::read_to_string(plan_path)?;
    let base = match config_path {
        Some(path) => Some(PlannerConfig::from_yaml(&fs::read_to_string(path)?)?),
        None => None,
    };
    explain_source(&yaml_content, base, overrides)
}

/// Parse, layer config (file or embedded → env → CLI), optimize, render.
fn explain_source(
    yaml_content: &str,
    base: Option<PlannerConfig>,
    overrides: &Overrides,
) -> Result<String, Box<dyn Error>> {
    let ids = PlanNodeIdAllocator::new();
    let parsed = parse_yaml_document(yaml_content, &ids)?;

    let mut config = base.unwrap_or(parsed.config);
    config.apply_env();
    apply_overrides(&mut config, overrides)?;

    let deps = PlannerDependencies::builder().config(config.clone()).build();
    let loaded = load_configured(&bundled_registry(), &deps);
    let pipeline = OptimizerPipeline::with_builtins()
        .with_plugins(&loaded)
        .with_config(&config)
        .with_stats(Arc::clone(deps.rule_stats()));

    let session = Session::default();
    let warnings = WarningCollector::new();
    let ctx = OptimizerContext::new(&session, &warnings, &ids);

    let outcome = if overrides.fixpoint {
        pipeline.run_to_fixpoint(parsed.plan.clone(), &ctx, config.max_fixpoint_iterations)?
    } else {
        pipeline.run(parsed.plan.clone(), &ctx)?
    };

    if overrides.json {
        return Ok(format!("{}\n", outcome.plan.to_json()?));
    }

    let mut out = String::new();
    writeln!(out, "Query {}", session.query_id)?;
    writeln!(out, "Pipeline: {}", pipeline.names().join(" -> "))?;
    if !loaded.failures().is_empty() {
        writeln!(out, "Skipped plugins:")?;
        for failure in loaded.failures() {
            writeln!(out, "  {}: {}", failure.identifier(), failure)?;
        }
    }
    writeln!(out)?;
    writeln!(out, "Input plan:")?;
    out.push_str(&parsed.plan.explain());
    writeln!(out)?;
    writeln!(out, "Passes ({} iteration(s)):", outcome.iterations)?;
    for pass in &outcome.passes {
        let origin = match pass.origin {
            PassOrigin::Builtin => "builtin",
            PassOrigin::Plugin => "plugin",
        };
        let status = if pass.renumbered_only() {
            "renumbered"
        } else if pass.changed {
            "changed"
        } else {
            "unchanged"
        };
        write!(out, "  [{}] {} ({}): {}", pass.iteration, pass.optimizer, origin, status)?;
        if let (Some(before), Some(after)) = (pass.before, pass.after) {
            write!(out, " {} -> {}", before.short(), after.short())?;
        }
        writeln!(out)?;
    }
    writeln!(out)?;
    writeln!(out, "Optimized plan:")?;
    out.push_str(&outcome.plan.explain());

    let warnings = warnings.warnings();
    if !warnings.is_empty() {
        writeln!(out)?;
        writeln!(out, "Warnings:")?;
        for w in warnings {
            writeln!(out, "  {}: {}", w.source, w.message)?;
        }
    }
    Ok(out)
}

fn apply_overrides(
    config: &mut PlannerConfig,
    overrides: &Overrides,
) -> Result<(), Box<dyn Error>> {
    if !overrides.optimizers.is_empty() {
        config.additional_plan_optimizers = overrides.optimizers.clone();
    }
    for setting in &overrides.settings {
        let (key, value) = setting
            .split_once('=')
            .ok_or_else(|| format!("--set expects key=value, got {setting:?}"))?;
        config
            .plugin_settings
            .insert(key.trim().to_string(), value.trim().to_string());
    }
    if overrides.no_validate {
        config.validate_rewrites = false;
    }
    if overrides.trace {
        config.trace_pipeline = true;
    }
    Ok(())
}
