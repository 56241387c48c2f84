use burn::backend::NdArray;
use burn::backend::ndarray::NdArrayDevice;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::Relu;
use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor};
use captioner::backend::burn::{Backbone, ImageCaptioner};
use captioner::config::{CaptionConfig, GenerationConfig, LimitPolicy};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

type DemoBackend = NdArray;

/// Stand-in for a pretrained CNN: one convolution and global pooling.
#[derive(Module, Debug)]
struct TinyCnn<B: Backend> {
    conv: Conv2d<B>,
    pool: AdaptiveAvgPool2d,
    activation: Relu,
}

impl<B: Backend> TinyCnn<B> {
    const CHANNELS: usize = 16;

    fn new(device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([3, Self::CHANNELS], [3, 3]).init(device),
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> Backbone<B> for TinyCnn<B> {
    fn feature_dim(&self) -> usize {
        Self::CHANNELS
    }

    fn features(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.conv.forward(images));
        self.pool.forward(x).flatten(1, 3)
    }
}

#[derive(Parser)]
#[command(about = "Caption random images with an untrained burn model")]
struct Args {
    #[arg(long, default_value_t = 4)]
    batch: usize,

    #[arg(long, default_value_t = 32)]
    image_size: usize,

    #[arg(long, default_value_t = 1000)]
    vocab_size: usize,

    #[arg(long, default_value_t = 20)]
    max_steps: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();
    let device = NdArrayDevice::Cpu;
    DemoBackend::seed(args.seed);

    // An untrained head rarely predicts the end token
    let generation = GenerationConfig::default()
        .with_max_steps(args.max_steps)
        .with_on_limit(LimitPolicy::Truncate);
    let config = CaptionConfig::new(256, 512, args.vocab_size).with_generation(generation);

    let model = ImageCaptioner::<DemoBackend, _>::new(config, TinyCnn::<DemoBackend>::new(&device), &device)?;
    info!(trainable = model.head().num_params(), "model ready");

    let images = Tensor::<DemoBackend, 4>::random(
        [args.batch, 3, args.image_size, args.image_size],
        Distribution::Normal(0., 1.),
        &device,
    );
    for (index, caption) in model.caption(images)?.into_iter().enumerate() {
        println!("image {index}: {caption:?}");
    }
    Ok(())
}
