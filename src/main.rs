use anyhow::{bail, Context, Result};
use clap::Parser;
use faultline_config::{Config, Procedure};
use faultline_netlist::{Circuit, SignalId};
use faultline_sat::SatCtx;
use faultline_verify::faultable::compute_faultable_signals;
use faultline_verify::partitions::{
    init_partitions, partition_info, partitions_from_file, Partition,
};
use faultline_verify::{
    run_output_integrity, run_partition_refinement, IntegrityOptions, RefineOptions,
};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use tracing::info;

/// SAT-based k-fault-resistance verification for gate-level netlists.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration name inside the configuration file
    #[arg(default_value = "default")]
    config_name: String,

    /// Path to the configuration file
    #[arg(short, long, default_value = "config/config_file.json")]
    config: std::path::PathBuf,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load(&cli.config, &cli.config_name)
        .with_context(|| format!("loading configuration `{}`", cli.config_name))?;
    run(&config)
}

fn run(config: &Config) -> Result<()> {
    let mut circuit = Circuit::from_json_file(&config.design_path, &config.design_name)
        .with_context(|| format!("loading design `{}`", config.design_path.display()))?;

    if config.subcircuit {
        let path = config
            .subcircuit_interface_path
            .as_ref()
            .expect("validated by config loading");
        let name = config
            .subcircuit_interface_name
            .as_ref()
            .expect("validated by config loading");
        info!("extracting subcircuit `{name}`");
        circuit = circuit
            .extract_subcircuit_from_file(path, name)
            .with_context(|| format!("extracting subcircuit `{name}`"))?;
    }

    circuit.build_adjacent_lists();

    let mut report = BufWriter::new(
        File::create(config.dump_path.join("log")).context("creating run log")?,
    );
    write!(report, "{}", circuit.stats())?;
    info!(
        "loaded `{}`: {} cells, {} registers",
        circuit.module_name(),
        circuit.stats().cells,
        circuit.stats().regs
    );

    let mut partitions: Vec<Partition> = match &config.initial_partition_path {
        None => init_partitions(&circuit),
        Some(path) => partitions_from_file(&circuit, path)
            .with_context(|| format!("loading initial partitioning `{}`", path.display()))?,
    };
    write!(
        report,
        "{}",
        partition_info(&circuit, &partitions, &config.interesting_names)
    )?;

    // Resolve the alert nets to their bit signals.
    let mut alert_signals: HashSet<SignalId> = HashSet::new();
    for name in config.alert_list.keys() {
        let Some(bits) = circuit.net(name) else {
            bail!("alert net `{name}` not found in circuit");
        };
        alert_signals.extend(bits.iter().copied());
    }

    let faultable = compute_faultable_signals(
        &circuit,
        &config.f_included_prefix,
        &config.f_excluded_prefix,
        &config.f_excluded_signals,
        config.exclude_inputs,
    );
    info!("{} faultable signals", faultable.len());

    if config.procedure != Procedure::Proc2 {
        let opts = RefineOptions {
            k: config.k,
            delay: config.delay,
            increasing_k: config.increasing_k,
            gates: config.f_gates,
            enumerate_exploitable: config.enumerate_exploitable,
            optim_atleast2: config.optim_atleast2,
            dump_vcd: config.dump_vcd,
            dump_partitioning: config.dump_partitioning,
            merge_seed: config.merge_seed,
            interesting_names: config.interesting_names.clone(),
            dump_path: config.dump_path.clone(),
        };
        // Fresh solver per procedure; dropped with its trace at scope end.
        let mut ctx = SatCtx::new();
        let outcome = run_partition_refinement(
            &mut ctx,
            &circuit,
            &opts,
            partitions,
            &faultable,
            &alert_signals,
            &config.alert_list,
            &config.invariant_list,
            &mut report,
        )
        .context("running partition refinement")?;
        info!(
            "procedure 1 finished: {} partitions, {} solver queries",
            outcome.partitions.len(),
            outcome.solver_queries
        );
        partitions = outcome.partitions;
    }

    if config.procedure != Procedure::Proc1 {
        let opts = IntegrityOptions {
            k: config.k,
            delay: config.delay,
            increasing_k: config.increasing_k,
            gates: config.f_gates,
            dump_vcd: config.dump_vcd,
            dump_path: config.dump_path.clone(),
        };
        let mut ctx = SatCtx::new();
        let outcome = run_output_integrity(
            &mut ctx,
            &circuit,
            &opts,
            &partitions,
            &faultable,
            &alert_signals,
            &config.alert_list,
            &config.invariant_list,
            &mut report,
        )
        .context("running output-integrity check")?;
        if outcome.witnesses.is_empty() {
            info!("procedure 2 finished: no exploitable fault found");
        } else {
            info!(
                "procedure 2 finished: {} exploitable witnesses ({} fault sites, {} partitions)",
                outcome.witnesses.len(),
                outcome.exploitable_faults.len(),
                outcome.exploitable_partitions.len()
            );
        }
    }

    report.flush()?;
    Ok(())
}
