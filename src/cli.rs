//! Command-line surface over the embedding and exploration pipelines.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::error::Result;
use crate::invertor::{EmbedOptions, Invertor, InvertorConfig};
use crate::pipeline;

/// Invertir: latent-space image inversion and editing
#[derive(Parser, Debug, Clone)]
#[command(name = "invertir")]
#[command(version)]
#[command(about = "Recover and edit latent-space embeddings of images through a frozen generator")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Invertor configuration file (JSON); defaults apply when absent
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable per-step progress output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Embed every image in a directory
    Embed(EmbedArgs),

    /// Perturb a saved embedding's latent and render the variants
    Resample(ResampleArgs),

    /// Sweep the mix threshold between two saved embeddings
    Mix(MixArgs),

    /// Transfer fine-layer style between two saved embeddings
    StyleTransfer(StyleTransferArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct EmbedArgs {
    /// Directory of target images
    pub input_dir: PathBuf,

    /// Images optimized per batch
    #[arg(short, long, default_value_t = 1)]
    pub batch_size: usize,

    /// Latent-phase step budget override
    #[arg(long)]
    pub w_epochs: Option<usize>,

    /// Joint-phase step budget override
    #[arg(long)]
    pub n_epochs: Option<usize>,

    /// Write target/reconstruction comparison images
    #[arg(long)]
    pub save_images: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct ResampleArgs {
    /// Name of the saved embedding
    pub name: String,

    /// Number of variants to render
    #[arg(long, default_value_t = 8)]
    pub count: usize,

    /// Standard deviation of the latent perturbation
    #[arg(long, default_value_t = crate::latent::DEFAULT_RESAMPLE_SCALE)]
    pub scale: f32,

    /// Perturbation seed
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

#[derive(Parser, Debug, Clone)]
pub struct MixArgs {
    /// Embedding providing the coarse end of the sweep
    pub name_a: String,

    /// Embedding providing the fine end of the sweep
    pub name_b: String,
}

#[derive(Parser, Debug, Clone)]
pub struct StyleTransferArgs {
    /// Embedding contributing structure (coarse layers)
    pub content: String,

    /// Embedding contributing texture (fine layers)
    pub style: String,

    /// Synthesize with fresh random noise instead of the recovered maps
    #[arg(long)]
    pub random_noise: bool,

    /// Noise seed when --random-noise is set
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

fn build_invertor(cli: &Cli) -> Result<Invertor> {
    let mut cfg = match &cli.config {
        Some(path) => InvertorConfig::load(path)?,
        None => InvertorConfig::default(),
    };
    if cli.verbose {
        cfg.verbose = true;
    }
    Invertor::new(cfg)
}

/// Dispatch a parsed command line.
pub fn run_command(cli: Cli) -> Result<()> {
    let mut invertor = build_invertor(&cli)?;
    match &cli.command {
        Command::Embed(args) => {
            let opts = EmbedOptions {
                save_images: args.save_images,
                w_epochs: args.w_epochs,
                n_epochs: args.n_epochs,
                verbose: None,
            };
            let processed =
                pipeline::embed_directory(&mut invertor, &args.input_dir, args.batch_size, &opts)?;
            println!("embedded {} image(s)", processed.len());
        }
        Command::Resample(args) => {
            let paths =
                pipeline::resample_run(&mut invertor, &args.name, args.count, args.scale, args.seed)?;
            println!("wrote {} resampled image(s)", paths.len());
        }
        Command::Mix(args) => {
            let paths = pipeline::mix_run(&mut invertor, &args.name_a, &args.name_b)?;
            println!("wrote {} mix image(s)", paths.len());
        }
        Command::StyleTransfer(args) => {
            let path = pipeline::style_transfer_run(
                &mut invertor,
                &args.content,
                &args.style,
                args.random_noise,
                args.seed,
            )?;
            println!("wrote {}", path.display());
        }
    }
    Ok(())
}
