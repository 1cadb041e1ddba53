use anyhow::Result;
use gans_zoo::{
    common::*,
    config,
    model::{Network, PatchDiscriminator},
};
use std::env;
use structopt::StructOpt;
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};

#[derive(Debug, Clone, StructOpt)]
/// Builds and checks pix2pix/CycleGAN networks.
pub struct Args {
    #[structopt(long, default_value = "config.json5")]
    pub config: PathBuf,
}

fn main() -> Result<()> {
    // setup tracing
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true).compact();
    let filter_layer = {
        let filter = EnvFilter::from_default_env();
        if env::var("RUST_LOG").is_err() {
            filter.add_directive(LevelFilter::INFO.into())
        } else {
            filter
        }
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    // parse config
    let Args { config } = Args::from_args();
    let config = config::Config::load(&config)?;
    let config::Config {
        device,
        seed,
        input_size,
        batch_size,
        ..
    } = config;

    tch::manual_seed(seed);

    // build and initialize networks
    let generator_vs = nn::VarStore::new(device);
    let discriminator_vs = nn::VarStore::new(device);
    let weight_init = config.weight_init();

    let mut generator = config.build_generator(&generator_vs.root() / "generator")?;
    weight_init.apply(&mut generator)?;
    info!(
        "generator has {} parameters in {} blocks",
        generator.num_parameters(),
        generator.blocks().len()
    );

    let mut discriminator =
        config.build_discriminator(&discriminator_vs.root() / "discriminator")?;
    weight_init.apply(&mut discriminator)?;
    info!(
        "discriminator has {} parameters in {} blocks",
        discriminator.num_parameters(),
        discriminator.blocks().len()
    );

    // dry run
    let (batch_size, input_size) = (batch_size as i64, input_size as i64);
    let (fake, score) = tch::no_grad(|| -> Result<_> {
        let input = Tensor::zeros(
            &[batch_size, generator.in_channels(), input_size, input_size],
            (Kind::Float, device),
        );
        let fake = generator.forward_t(&input, false)?;

        // a conditional discriminator sees the input next to the output
        let score = if discriminator.in_channels() == generator.out_channels() {
            discriminator.forward_t(&fake, false)?
        } else {
            discriminator.forward_t(&Tensor::cat(&[&input, &fake], 1), false)?
        };
        Ok((fake, score))
    })?;

    let (c, h, w) = PatchDiscriminator::patch_size(input_size, input_size);
    ensure!(
        score.size() == vec![batch_size, c, h, w],
        "expect discriminator output shape {:?}, but get {:?}",
        [batch_size, c, h, w],
        score.size()
    );
    info!(
        "generated {:?} images scored on a {}x{} patch grid",
        fake.size(),
        h,
        w
    );

    Ok(())
}
