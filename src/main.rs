//! `beamline` - run an adaptive measurement against the simulated beamline.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use adaptive_beamline::agent::{AgentConfig, AgentKind};
use adaptive_beamline::config::{BeamlineConfig, DEFAULT_CONFIG_PATH};
use adaptive_beamline::experiment::RunReport;
use adaptive_beamline::telemetry;

/// Adaptive ask/tell sampling for an X-ray diffraction beamline
#[derive(Parser, Debug)]
#[command(name = "beamline")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one adaptive experiment to completion
    Run(RunArgs),

    /// List the available agents
    Agents,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Agent to drive the run (overrides the config file)
    #[arg(short, long, value_enum)]
    agent: Option<AgentArg>,

    /// Number of samples on the changer
    #[arg(short = 'n', long)]
    samples: Option<usize>,

    /// Shot budget
    #[arg(short, long)]
    shots: Option<u64>,

    /// Seed for the chaos agent and the simulated detector noise
    #[arg(long)]
    seed: Option<u64>,

    /// Policy artifact for the learned agent
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Print the full run report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum AgentArg {
    RoundRobin,
    Chaos,
    Oracle,
    Learned,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = BeamlineConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Agents => {
            for kind in AgentKind::ALL {
                println!("{:<12} {}", kind.as_str(), kind.description());
            }
            Ok(())
        }
        Commands::Run(args) => {
            apply_overrides(&mut config, &args)?;
            telemetry::init_from_config(&config)
                .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;
            let report = run(&config).await?;
            print_report(&config, &report, args.json)?;
            if report.status.is_success() {
                Ok(())
            } else {
                anyhow::bail!("run ended with status: {}", report.status)
            }
        }
    }
}

fn apply_overrides(config: &mut BeamlineConfig, args: &RunArgs) -> Result<()> {
    if let Some(samples) = args.samples {
        config.experiment.sample_count = samples;
        // Configured strengths describe a different changer load.
        if config.simulation.strengths.len() != samples {
            config.simulation.strengths.clear();
        }
    }
    if let Some(shots) = args.shots {
        config.experiment.max_shots = shots;
    }
    if let Some(seed) = args.seed {
        config.simulation.seed = seed;
        if let AgentConfig::Chaos { seed: agent_seed } = &mut config.agent {
            *agent_seed = Some(seed);
        }
    }
    if let Some(agent) = args.agent {
        config.agent = match agent {
            AgentArg::RoundRobin => AgentConfig::RoundRobin,
            AgentArg::Chaos => AgentConfig::Chaos { seed: args.seed },
            AgentArg::Oracle => AgentConfig::Oracle { strengths: vec![] },
            AgentArg::Learned => AgentConfig::Learned {
                model_path: args
                    .model
                    .clone()
                    .context("--agent learned requires --model <PATH>")?,
            },
        };
    } else if let (Some(model), AgentConfig::Learned { model_path }) =
        (&args.model, &mut config.agent)
    {
        *model_path = model.clone();
    }
    if let AgentConfig::Oracle { strengths } = &mut config.agent {
        if strengths.len() != config.experiment.sample_count {
            strengths.clear();
        }
    }
    config.validate()?;
    Ok(())
}

async fn run(config: &BeamlineConfig) -> Result<RunReport> {
    let mut adaptive = config.build_loop().context("setting up the run")?;

    let cancel = adaptive.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping after the current shot");
            cancel.cancel();
        }
    });

    Ok(adaptive.run().await?)
}

fn print_report(config: &BeamlineConfig, report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let sample_count = config.experiment.sample_count;
    let strengths = config.simulation.resolved_strengths(sample_count);

    println!(
        "Run {} ({}): {} of {} shots, {}",
        report.run_uid,
        config.agent.kind(),
        report.trace.len(),
        config.experiment.max_shots,
        report.status
    );
    println!("{:>6} {:>9} {:>6} {:>9} {:>8}", "sample", "strength", "shots", "badness", "failures");
    for (index, record) in report.records.iter().enumerate() {
        let badness = if record.is_measured() {
            format!("{:.4}", record.quality_estimate)
        } else {
            "-".to_string()
        };
        println!(
            "{:>6} {:>9.3} {:>6} {:>9} {:>8}",
            index,
            strengths.get(index).copied().unwrap_or(f64::NAN),
            record.shot_count,
            badness,
            record.failures
        );
    }
    Ok(())
}
