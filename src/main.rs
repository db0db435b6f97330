//! `ferromatvec` command-line driver.
//!
//! ```sh
//! ferromatvec 1000 500 --workers 4 --verify
//! mpiexec -n 4 ferromatvec 1000 500 --backend mpi   # with the `mpi` feature
//! ```

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use ferromatvec::{
    multiply_sequential, run, Collective, Inputs, Kernel, LocalGroup, RunConfig, RunReport,
};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "ferromatvec")]
#[command(about = "Distributed dense matrix-vector multiplication")]
#[command(version)]
struct Cli {
    /// Matrix rows (M). Overrides the config file.
    rows: Option<usize>,
    /// Matrix columns (N). Overrides the config file.
    cols: Option<usize>,
    /// Size of the local thread group (default: available parallelism).
    #[arg(short, long)]
    workers: Option<i32>,
    /// Transport the group communicates over.
    #[arg(short, long, value_enum, default_value_t = Backend::Local)]
    backend: Backend,
    /// Threads for the local kernel; 0 uses the global rayon pool.
    #[arg(short, long)]
    threads: Option<usize>,
    /// Seed for the random inputs.
    #[arg(short, long)]
    seed: Option<u64>,
    /// Coordinator rank.
    #[arg(short, long)]
    root: Option<i32>,
    /// TOML run configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Print the result vector.
    #[arg(long)]
    print: bool,
    /// Check the result against a sequential multiplication.
    #[arg(long)]
    verify: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Threads in this process
    Local,
    /// One MPI process per rank (requires the `mpi` feature)
    Mpi,
}

fn main() -> anyhow::Result<()> {
    init_logging()?;
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    let seed = config.seed.unwrap_or_else(clock_seed);

    let report = match local_group_size(&cli)? {
        Some(workers) => run_local(&config, workers, seed)?,
        None => run_mpi(&config, seed)?,
    };

    // Only the coordinator reports
    let Some(report) = report else {
        return Ok(());
    };

    info!(
        workers = report.workers,
        max_rows = report.table.max_rows(),
        min_rows = report.table.min_rows(),
        seed,
        "multiplication finished"
    );
    println!(
        "Total execution time: {:.6} seconds",
        report.elapsed.as_secs_f64()
    );

    if cli.print {
        let values: Vec<String> = report.y.iter().map(ToString::to_string).collect();
        println!("{}", values.join(" "));
    }

    if cli.verify {
        verify(&config, seed, &report)?;
        println!("Verification passed");
    }

    Ok(())
}

fn init_logging() -> anyhow::Result<()> {
    // RUST_LOG overrides the default level; stdout is left to the report
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}

/// Thread count for a local run, or `None` when the group comes from MPI.
fn local_group_size(cli: &Cli) -> anyhow::Result<Option<i32>> {
    match (cli.backend, cli.workers) {
        (Backend::Local, Some(workers)) => Ok(Some(workers)),
        (Backend::Local, None) => Ok(Some(
            std::thread::available_parallelism().map_or(1, |n| n.get() as i32),
        )),
        (Backend::Mpi, Some(_)) => {
            bail!("--workers only applies to the local backend; under MPI use `mpiexec -n P`")
        }
        (Backend::Mpi, None) => Ok(None),
    }
}

/// Config file first, then command-line overrides.
fn resolve_config(cli: &Cli) -> anyhow::Result<RunConfig> {
    let mut config = match &cli.config {
        Some(path) => RunConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RunConfig::default(),
    };
    if let Some(rows) = cli.rows {
        config.rows = rows;
    }
    if let Some(cols) = cli.cols {
        config.cols = cols;
    }
    if let Some(root) = cli.root {
        config.root = root;
    }
    if let Some(threads) = cli.threads {
        config.kernel = Kernel::Threaded { threads };
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    Ok(config)
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

fn run_local(
    config: &RunConfig,
    workers: i32,
    seed: u64,
) -> anyhow::Result<Option<RunReport<f64>>> {
    let reports = LocalGroup::run(workers, |comm| {
        let inputs = if comm.is_root(config.root) {
            Some(Inputs::random(config.rows, config.cols, seed)?)
        } else {
            None
        };
        run(comm, config, inputs)
    })
    .context("local run failed")?;
    Ok(reports.into_iter().flatten().next())
}

#[cfg(feature = "mpi")]
fn run_mpi(config: &RunConfig, seed: u64) -> anyhow::Result<Option<RunReport<f64>>> {
    use ferromatvec::{Mpi, ThreadLevel};
    use tracing::warn;

    // Rayon workers never call MPI, so funneled support is enough
    let mpi = Mpi::init_thread(ThreadLevel::Funneled).context("MPI initialization failed")?;
    if mpi.thread_level() < ThreadLevel::Funneled {
        warn!(provided = ?mpi.thread_level(), "MPI granted less than funneled thread support");
    }
    // A private communicator keeps the run's collectives apart from any other
    // traffic on the world communicator
    let comm = mpi.world()?.duplicate()?;
    info!(version = %Mpi::version().unwrap_or_default(), rank = comm.rank(), "MPI ready");

    let inputs = if comm.is_root(config.root) {
        match Inputs::random(config.rows, config.cols, seed) {
            Ok(inputs) => Some(inputs),
            Err(err) => {
                comm.abort(err.exit_code());
                return Err(err.into());
            }
        }
    } else {
        None
    };

    let start = Mpi::wtime();
    let report = run(&comm, config, inputs)?;
    info!(rank = comm.rank(), seconds = Mpi::wtime() - start, "MPI wall time");
    Ok(report)
}

#[cfg(not(feature = "mpi"))]
fn run_mpi(_config: &RunConfig, _seed: u64) -> anyhow::Result<Option<RunReport<f64>>> {
    bail!("this binary was built without the `mpi` feature; rebuild with `--features mpi`")
}

fn verify(config: &RunConfig, seed: u64, report: &RunReport<f64>) -> anyhow::Result<()> {
    let inputs = Inputs::random(config.rows, config.cols, seed)?;
    let expected = multiply_sequential(&inputs.matrix, &inputs.vector)?;
    if expected.len() != report.y.len() {
        bail!(
            "verification failed: expected {} results, got {}",
            expected.len(),
            report.y.len()
        );
    }
    if let Some(row) = (0..expected.len()).find(|&i| expected[i] != report.y[i]) {
        bail!(
            "verification failed at row {row}: expected {}, got {}",
            expected[row],
            report.y[row]
        );
    }
    Ok(())
}
