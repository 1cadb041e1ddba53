use crate::{
    common::*,
    error::ModelError,
    model::{
        self, misc, NormKind, PaddingKind, PatchDiscriminatorInit, ResnetGeneratorInit,
        UnetGeneratorInit, WeightInit,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(with = "tch_serde::serde_device")]
    pub device: Device,
    #[serde(default = "default_seed")]
    pub seed: i64,
    #[serde(default = "default_input_size")]
    pub input_size: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_init_gain")]
    pub init_gain: R64,
    pub generator: Generator,
    pub discriminator: Discriminator,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file '{}'", path.display()))?;
        Self::from_json5(&text)
    }

    pub fn from_json5(text: &str) -> Result<Self> {
        let config: Self =
            json5::from_str(text).map_err(|err| ModelError::config(err.to_string()))?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        let Self {
            input_size,
            batch_size,
            init_gain,
            ref generator,
            ref discriminator,
            ..
        } = *self;

        let mut positive = vec![
            ("input_size", input_size),
            ("batch_size", batch_size),
            ("discriminator.in_channels", discriminator.in_channels),
            ("discriminator.ngf", discriminator.ngf),
        ];
        match generator {
            Generator::Unet(config) => positive.extend([
                ("generator.in_channels", config.in_channels),
                ("generator.out_channels", config.out_channels),
            ]),
            Generator::Resnet(config) => positive.extend([
                ("generator.input_nc", config.input_nc),
                ("generator.output_nc", config.output_nc),
                ("generator.ngf", config.ngf),
            ]),
        }
        misc::check_channels(&positive)?;

        ensure!(
            init_gain.raw() >= 0.0,
            ModelError::config(format!("init_gain must be non-negative, but get {}", init_gain))
        );

        Ok(())
    }

    pub fn weight_init(&self) -> WeightInit {
        WeightInit {
            init_gain: self.init_gain.raw(),
        }
    }

    pub fn build_generator<'a>(
        &self,
        path: impl Borrow<nn::Path<'a>>,
    ) -> Result<model::Generator> {
        let generator: model::Generator = match self.generator {
            Generator::Unet(ref config) => config.init().build(path)?.into(),
            Generator::Resnet(ref config) => config.init().build(path)?.into(),
        };
        Ok(generator)
    }

    pub fn build_discriminator<'a>(
        &self,
        path: impl Borrow<nn::Path<'a>>,
    ) -> Result<model::PatchDiscriminator> {
        self.discriminator.init().build(path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Generator {
    Unet(UnetGenerator),
    Resnet(ResnetGenerator),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnetGenerator {
    #[serde(default = "default_channels")]
    pub in_channels: usize,
    #[serde(default = "default_channels")]
    pub out_channels: usize,
}

impl UnetGenerator {
    pub fn init(&self) -> UnetGeneratorInit {
        UnetGeneratorInit {
            in_channels: self.in_channels,
            out_channels: self.out_channels,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResnetGenerator {
    #[serde(default = "default_channels")]
    pub input_nc: usize,
    #[serde(default = "default_channels")]
    pub output_nc: usize,
    #[serde(default = "default_ngf")]
    pub ngf: usize,
    #[serde(default = "default_generator_norm")]
    pub norm: NormKind,
    #[serde(default)]
    pub dropout: bool,
    #[serde(default = "default_n_blocks")]
    pub n_blocks: usize,
    #[serde(default = "default_padding")]
    pub padding: PaddingKind,
}

impl ResnetGenerator {
    pub fn init(&self) -> ResnetGeneratorInit {
        let Self {
            input_nc,
            output_nc,
            ngf,
            norm,
            dropout,
            n_blocks,
            padding,
        } = *self;

        ResnetGeneratorInit {
            input_nc,
            output_nc,
            ngf,
            norm_kind: norm,
            dropout,
            n_blocks,
            padding_kind: padding,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discriminator {
    #[serde(default = "default_channels")]
    pub in_channels: usize,
    #[serde(default = "default_ngf")]
    pub ngf: usize,
    #[serde(default = "default_discriminator_norm")]
    pub norm: NormKind,
}

impl Discriminator {
    pub fn init(&self) -> PatchDiscriminatorInit {
        PatchDiscriminatorInit {
            in_channels: self.in_channels,
            norm_kind: self.norm,
            ngf: self.ngf,
        }
    }
}

fn default_seed() -> i64 {
    42
}

fn default_input_size() -> usize {
    256
}

fn default_batch_size() -> usize {
    1
}

fn default_init_gain() -> R64 {
    r64(0.02)
}

fn default_channels() -> usize {
    3
}

fn default_ngf() -> usize {
    64
}

fn default_n_blocks() -> usize {
    6
}

fn default_generator_norm() -> NormKind {
    NormKind::Batch
}

fn default_discriminator_norm() -> NormKind {
    NormKind::Instance
}

fn default_padding() -> PaddingKind {
    PaddingKind::Reflect
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_unet_config_test() -> Result<()> {
        let config = Config::from_json5(
            r#"{
                device: "cpu",
                generator: { kind: "unet" },
                discriminator: { in_channels: 6, norm: "batch_norm" },
            }"#,
        )?;

        ensure!(config.device == Device::Cpu);
        ensure!(config.seed == 42);
        ensure!(config.input_size == 256 && config.batch_size == 1);
        approx::assert_abs_diff_eq!(config.weight_init().init_gain, 0.02);
        ensure!(matches!(
            config.generator,
            Generator::Unet(UnetGenerator { in_channels, out_channels })
                if in_channels == 3 && out_channels == 3
        ));

        let init = config.discriminator.init();
        ensure!(init.in_channels == 6 && init.ngf == 64 && init.norm_kind == NormKind::Batch);

        Ok(())
    }

    #[test]
    fn load_resnet_config_test() -> Result<()> {
        let config = Config::from_json5(
            r#"{
                device: "cpu",
                seed: 7,
                input_size: 64,
                init_gain: 0.05,
                generator: {
                    kind: "resnet",
                    ngf: 8,
                    norm: "instance",
                    dropout: true,
                    n_blocks: 0,
                    padding: "zero",
                },
                discriminator: {},
            }"#,
        )?;
        ensure!(config.seed == 7);

        let init = match config.generator {
            Generator::Resnet(ref generator) => generator.init(),
            _ => bail!("expect a resnet generator"),
        };
        ensure!(init.input_nc == 3 && init.output_nc == 3 && init.ngf == 8);
        ensure!(init.norm_kind == NormKind::Instance && init.dropout && init.n_blocks == 0);
        ensure!(init.padding_kind == PaddingKind::Zeros);

        let vs = nn::VarStore::new(config.device);
        let generator = config.build_generator(&vs.root() / "generator")?;
        ensure!(generator.in_channels() == 3 && generator.out_channels() == 3);

        Ok(())
    }

    #[test]
    fn reject_bad_config_test() -> Result<()> {
        let cases = [
            r#"{ device: "cpu", generator: { kind: "resnet", norm: "unsupported" }, discriminator: {} }"#,
            r#"{ device: "cpu", generator: { kind: "resnet", n_blocks: -1 }, discriminator: {} }"#,
            r#"{ device: "cpu", generator: { kind: "unet", in_channels: 0 }, discriminator: {} }"#,
            r#"{ device: "cpu", generator: { kind: "unknown" }, discriminator: {} }"#,
            r#"{ device: "cpu", batch_size: 0, generator: { kind: "unet" }, discriminator: {} }"#,
            r#"{ device: "cpu", generator: { kind: "resnet", ngf: 0 }, discriminator: {} }"#,
            r#"{ device: "cpu", generator: { kind: "unet" }, discriminator: { ngf: 0 } }"#,
            r#"{ device: "cpu", generator: { kind: "unet" }, discriminator: { padding: "circular", norm: "group" } }"#,
        ];

        for text in cases {
            let err = Config::from_json5(text).unwrap_err();
            ensure!(
                err.downcast_ref::<ModelError>().unwrap().is_config(),
                "expect a config error for {}",
                text
            );
        }

        Ok(())
    }
}
