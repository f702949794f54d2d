use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use peertrain_core::{ParallelismMode, RunConfig, Runtime, TrainMode};
use peertrain_data::{loader, DataSharding};
use peertrain_training::{DistributedModel, TrainingLoop};
use peertrain_transport::{Collectives, Transport};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "trainer")]
#[command(about = "Runs one peer of a distributed training job")]
struct Args {
    /// Path to the run's TOML configuration.
    #[arg(long)]
    config: PathBuf,

    /// Seed for this run's parameter initialization. Every peer must be
    /// launched with the same seed so their RNG streams agree.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f32>,

    #[arg(long)]
    log_step: Option<usize>,

    #[arg(long, value_enum)]
    parallelism_mode: Option<ParallelismModeArg>,

    #[arg(long, value_enum)]
    train_mode: Option<TrainModeArg>,

    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ParallelismModeArg {
    Data,
    Pipeline,
    Tensor,
}

impl From<ParallelismModeArg> for ParallelismMode {
    fn from(value: ParallelismModeArg) -> Self {
        match value {
            ParallelismModeArg::Data => ParallelismMode::Data,
            ParallelismModeArg::Pipeline => ParallelismMode::Pipeline,
            ParallelismModeArg::Tensor => ParallelismMode::Tensor,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum TrainModeArg {
    Sync,
    Async,
}

impl From<TrainModeArg> for TrainMode {
    fn from(value: TrainModeArg) -> Self {
        match value {
            TrainModeArg::Sync => TrainMode::Sync,
            TrainModeArg::Async => TrainMode::Async,
        }
    }
}

fn load_config(args: &Args) -> Result<RunConfig> {
    let text = std::fs::read_to_string(&args.config).with_context(|| format!("reading config at {}", args.config.display()))?;
    let mut config = RunConfig::from_toml_str(&text).context("parsing run configuration")?;

    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(lr) = args.learning_rate {
        config.learning_rate = lr;
    }
    if let Some(log_step) = args.log_step {
        config.log_step = log_step;
    }
    if let Some(mode) = args.parallelism_mode {
        config.parallelism_mode = mode.into();
    }
    if let Some(mode) = args.train_mode {
        config.train_mode = mode.into();
    }
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    Ok(config)
}

/// Loads one role's part indices on root, shards or broadcasts them per
/// `mode`, then has every peer load its own slice of that role from disk.
/// Training roles are sharded per `config.parallelism_mode`; test roles are
/// always broadcast in full, since evaluation needs the whole held-out set
/// regardless of how the model itself is split.
fn load_role(transport: &dyn Collectives, data_dir: &std::path::Path, role: &str, mode: ParallelismMode) -> Result<peertrain_layers::Mat> {
    let all_indices = if transport.is_root() {
        loader::list_parts(data_dir, role).with_context(|| format!("listing {role} parts in {}", data_dir.display()))?
    } else {
        Vec::new()
    };
    let local_indices = DataSharding::plan(transport, mode, &all_indices);
    Ok(loader::load_role(data_dir, role, &local_indices)?)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let transport = Transport::init().context("initializing collective transport")?;
    let transport: Arc<dyn Collectives> = Arc::new(transport);

    info!(rank = transport.rank(), size = transport.size(), "starting trainer");

    let runtime = Runtime::bootstrap(config, transport.clone(), args.seed).context("bootstrapping process group")?;

    let train_features = load_role(transport.as_ref(), &runtime.config.data_dir, "train_features", runtime.config.parallelism_mode)?;
    let train_labels = load_role(transport.as_ref(), &runtime.config.data_dir, "train_labels", runtime.config.parallelism_mode)?;
    let test_features = load_role(transport.as_ref(), &runtime.config.data_dir, "test_features", ParallelismMode::Pipeline)?;
    let test_labels = load_role(transport.as_ref(), &runtime.config.data_dir, "test_labels", ParallelismMode::Pipeline)?;

    let model = DistributedModel::build(&runtime.layer_shape, &runtime.parameters);

    let loop_ = TrainingLoop::new(
        runtime.group.clone(),
        runtime.config.clone(),
        model,
        train_features,
        train_labels,
        test_features,
        test_labels,
    );
    loop_.run();

    runtime.group.barrier();
    info!(rank = transport.rank(), "trainer finished");
    Ok(())
}
