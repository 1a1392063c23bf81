use std::path::PathBuf;

use burn::{
    backend::NdArray,
    config::Config,
    module::Module,
    tensor::{Distribution, Tensor, backend::Backend},
};
use burn_seaformer::model::{
    sct::{SctSea, SctSeaConfig},
    seaformer::{ForwardMode, SeaFormer, SeaFormerConfig},
};
use clap::{Parser, ValueEnum};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

type ShapeBackend = NdArray<f32>;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Build a SeaFormer model and print the shapes it produces"
)]
struct Args {
    #[arg(long, value_enum, default_value_t = ModelVariant::Seaformer)]
    variant: ModelVariant,

    /// JSON configuration matching the selected variant. Defaults to its preset.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "PX", default_value_t = 512)]
    size: usize,

    #[arg(long, default_value_t = 1)]
    batch: usize,

    /// Writes the resolved configuration as JSON.
    #[arg(long, value_name = "PATH")]
    dump_config: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModelVariant {
    Seaformer,
    SctSea,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(if args.verbose {
            LevelFilter::DEBUG.into()
        } else {
            LevelFilter::INFO.into()
        })
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if args.size == 0 || args.batch == 0 {
        return Err("--size and --batch must be positive.".into());
    }

    let device = <ShapeBackend as Backend>::Device::default();
    let input = Tensor::<ShapeBackend, 4>::random(
        [args.batch, 3, args.size, args.size],
        Distribution::Normal(0.0, 1.0),
        &device,
    );

    match args.variant {
        ModelVariant::Seaformer => {
            let config = match &args.config {
                Some(path) => SeaFormerConfig::load(path)?,
                None => SeaFormerConfig::base(),
            };
            if let Some(path) = &args.dump_config {
                config.save(path)?;
            }

            let model = SeaFormer::<ShapeBackend>::new(&device, config)?;
            info!(parameters = model.num_params(), "model ready");

            let outputs = model.forward(input, ForwardMode::Inference);
            for (index, output) in outputs.iter().enumerate() {
                println!("output {index}: {:?}", output.dims());
            }
            if let Some(logits) = model.forward_head(&outputs, ForwardMode::Inference) {
                println!("light head logits: {:?}", logits.dims());
            }
        }
        ModelVariant::SctSea => {
            let config = match &args.config {
                Some(path) => SctSeaConfig::load(path)?,
                None => SctSeaConfig::default(),
            };
            if let Some(path) = &args.dump_config {
                config.save(path)?;
            }

            let model = SctSea::<ShapeBackend>::new(&device, config)?;
            info!(parameters = model.num_params(), "model ready");

            let logits = model.forward(input, ForwardMode::Inference);
            println!("sct head logits: {:?}", logits.dims());
        }
    }

    Ok(())
}
