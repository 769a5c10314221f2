use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use wsiseg::tiling::{DeepZoomTiler, VipsTiler};
use wsiseg::{
    EvictionPolicy, Orchestrator, ProcessRequest, Service, ServiceConfig, SlideFileSource, TrainingConfig,
    UnknownOpPolicy,
};

#[derive(Parser)]
#[command(name = "wsiseg")]
#[command(about = "Segment regions of whole-slide images and train color classifiers")]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// What to do with morphology operator names that are not recognized
    #[arg(long, value_enum, default_value_t = UnknownOpPolicy::SkipUnknown, global = true)]
    unknown_ops: UnknownOpPolicy,

    /// Keep at most this many trained models, evicting the oldest first
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..), global = true)]
    max_models: Option<u64>,

    /// Training passes per train request
    #[arg(
        long,
        default_value_t = 20,
        value_parser = clap::value_parser!(u64).range(1..=wsiseg::config::MAX_EPOCHS as u64),
        global = true
    )]
    epochs: u64,

    /// Save intermediate masks to directory (must be empty)
    #[arg(long, value_name = "DIR", global = true)]
    debug_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the ROI pipeline once from a JSON request file
    Process {
        /// Request file with image_path, rois, threshold_type, morph_ops, morph_kwargs
        #[arg(long, value_name = "FILE")]
        request: PathBuf,

        /// Directory for roi_NN_mask.png and samples.json
        #[arg(long, value_name = "DIR")]
        out: PathBuf,
    },
    /// Answer JSON-lines requests on stdin, one response line each on stdout
    Serve,
    /// Generate a deep-zoom pyramid with vips
    Tile {
        #[arg(value_name = "SLIDE")]
        slide: PathBuf,

        #[arg(long, value_name = "DIR", default_value = "tiles")]
        out_dir: PathBuf,
    },
}

impl Cli {
    fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            unknown_op_policy: self.unknown_ops,
            eviction: match self.max_models {
                Some(n) => EvictionPolicy::MaxModels(n as usize),
                None => EvictionPolicy::Unbounded,
            },
            training: TrainingConfig {
                epochs: self.epochs as usize,
                ..TrainingConfig::default()
            },
            debug_dir: self.debug_dir.clone(),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    // stdout carries service responses
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = args.service_config();
    match &args.command {
        Command::Process { request, out } => run_process(&config, request, out),
        Command::Serve => run_serve(config),
        Command::Tile { slide, out_dir } => {
            let dzi = VipsTiler::default().tile(slide, out_dir)?;
            println!("{}", dzi.display());
            Ok(())
        }
    }
}

fn run_process(config: &ServiceConfig, request_path: &Path, out: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(request_path)
        .with_context(|| format!("Failed to read request file {}", request_path.display()))?;
    let request: ProcessRequest = serde_json::from_str(&text).context("Failed to parse request")?;

    let mut orchestrator = Orchestrator::new(SlideFileSource, config.unknown_op_policy);
    if let Some(dir) = &config.debug_dir {
        orchestrator = orchestrator.with_debug_dir(dir.clone());
    }
    let results = orchestrator.process_rois(&request)?;

    std::fs::create_dir_all(out).with_context(|| format!("Failed to create {}", out.display()))?;
    let mut samples = Vec::with_capacity(results.len());
    for (i, result) in results.iter().enumerate() {
        let mask_path = out.join(format!("roi_{:02}_mask.png", i + 1));
        std::fs::write(&mask_path, &result.mask_png)
            .with_context(|| format!("Failed to write {}", mask_path.display()))?;
        samples.push(&result.rgb_samples);
    }
    let samples_path = out.join("samples.json");
    std::fs::write(&samples_path, serde_json::to_vec(&samples)?)
        .with_context(|| format!("Failed to write {}", samples_path.display()))?;

    println!("\n=== ROI Segmentation Results ===");
    for (roi, result) in request.rois.iter().zip(&results) {
        println!("  ROI {}: {} foreground pixels", roi, result.rgb_samples.len());
    }
    println!("Output written to {}", out.display());
    Ok(())
}

fn run_serve(config: ServiceConfig) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let service = Arc::new(Service::new(&config));
    tracing::info!("wsiseg service ready, reading requests from stdin");

    runtime.block_on(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        wsiseg::service::serve(service, stdin, tokio::io::stdout()).await?;
        Ok::<_, anyhow::Error>(())
    })?;

    tracing::info!("Input closed, shutting down");
    Ok(())
}
