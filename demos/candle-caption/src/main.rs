use std::path::{Path, PathBuf};

use anyhow::Context;
use candle_core::{DType, Device, Tensor};
use captioner::backend::candle::{ImageCaptioner, ParamPartition};
use captioner::config::{CaptionConfig, LimitPolicy};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

const IMAGE_SIZE: u32 = 224;

// ImageNet statistics the backbone was trained with
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Parser)]
#[command(about = "Caption images with a ResNet-50 encoder and an LSTM decoder")]
struct Args {
    /// ResNet-50 weights (safetensors, torchvision names)
    #[arg(long)]
    backbone: PathBuf,

    /// Trained projection and decoder weights
    #[arg(long)]
    head: PathBuf,

    /// Model configuration (JSON)
    #[arg(long)]
    config: PathBuf,

    /// Vocabulary file with one word per line, line number = token id
    #[arg(long)]
    vocab: Option<PathBuf>,

    /// Override the configured decode step bound
    #[arg(long)]
    max_steps: Option<usize>,

    /// Print partial captions instead of failing at the step bound
    #[arg(long)]
    truncate: bool,

    #[arg(required = true)]
    images: Vec<PathBuf>,
}

fn load_image(path: &Path, device: &Device) -> anyhow::Result<Tensor> {
    let image = image::open(path)
        .with_context(|| format!("reading {}", path.display()))?
        .resize_exact(IMAGE_SIZE, IMAGE_SIZE, image::imageops::FilterType::Triangle)
        .to_rgb8();
    let size = IMAGE_SIZE as usize;
    let pixels = Tensor::from_vec(image.into_raw(), (size, size, 3), device)?
        .permute((2, 0, 1))?
        .to_dtype(DType::F32)?;
    let mean = Tensor::new(&MEAN, device)?.reshape((3, 1, 1))?;
    let std = Tensor::new(&STD, device)?.reshape((3, 1, 1))?;
    Ok((pixels / 255.)?.broadcast_sub(&mean)?.broadcast_div(&std)?)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();
    let device = Device::Cpu;

    let mut config = CaptionConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(max_steps) = args.max_steps {
        config.generation.max_steps = max_steps;
    }
    if args.truncate {
        config.generation.on_limit = LimitPolicy::Truncate;
    }
    config.validate()?;

    let params = ParamPartition::from_safetensors(&[&args.backbone], DType::F32, &device)?;
    let mut model = ImageCaptioner::resnet50(config, params)?;
    model
        .params_mut()
        .load_trainable(&args.head)
        .with_context(|| format!("loading {}", args.head.display()))?;

    let vocab = match &args.vocab {
        Some(path) => Some(
            std::fs::read_to_string(path)?
                .lines()
                .map(str::to_owned)
                .collect::<Vec<_>>(),
        ),
        None => None,
    };

    let images = args
        .images
        .iter()
        .map(|path| load_image(path, &device))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let batch = Tensor::stack(&images, 0)?;
    info!(images = images.len(), "encoding");

    let captions = model.caption(&batch)?;
    for (path, caption) in args.images.iter().zip(captions) {
        match &vocab {
            Some(words) => {
                let text: Vec<&str> = caption
                    .iter()
                    .map(|id| words.get(*id as usize).map_or("<unk>", String::as_str))
                    .collect();
                println!("{}: {}", path.display(), text.join(" "));
            }
            None => println!("{}: {caption:?}", path.display()),
        }
    }
    Ok(())
}
