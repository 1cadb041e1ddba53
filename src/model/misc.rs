use super::norm::{BatchNorm2D, BatchNorm2DInit, InstanceNorm2D, InstanceNorm2DInit};
use crate::{common::*, error::ModelError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaddingKind {
    Reflect,
    Replicate,
    #[serde(alias = "zero")]
    Zeros,
}

impl PaddingKind {
    pub fn build(self, lrtb: [usize; 4]) -> Pad2D {
        let [l, r, t, b] = lrtb;
        Pad2D {
            kind: self,
            lrtb: [l as i64, r as i64, t as i64, b as i64],
        }
    }
}

impl FromStr for PaddingKind {
    type Err = ModelError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let kind = match name {
            "reflect" => Self::Reflect,
            "replicate" => Self::Replicate,
            "zeros" | "zero" => Self::Zeros,
            _ => {
                return Err(ModelError::config(format!(
                    "unsupported padding type '{}', expect one of reflect, replicate, zeros",
                    name
                )))
            }
        };
        Ok(kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormKind {
    None,
    #[serde(alias = "batch_norm")]
    Batch,
    #[serde(alias = "instance_norm")]
    Instance,
}

impl NormKind {
    /// Builds the normalization layer, or nothing for [NormKind::None].
    pub fn build<'a>(self, path: impl Borrow<nn::Path<'a>>, out_dim: i64) -> Option<Norm> {
        match self {
            Self::Batch => {
                let norm = BatchNorm2DInit::default().build(path, out_dim);
                Some(Norm::BatchNorm(norm))
            }
            Self::Instance => {
                let norm = InstanceNorm2DInit::default().build();
                Some(Norm::InstanceNorm(norm))
            }
            Self::None => None,
        }
    }
}

impl FromStr for NormKind {
    type Err = ModelError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let kind = match name {
            "none" => Self::None,
            "batch" | "batch_norm" => Self::Batch,
            "instance" | "instance_norm" => Self::Instance,
            _ => {
                return Err(ModelError::config(format!(
                    "unsupported norm layer '{}', expect one of none, batch, instance",
                    name
                )))
            }
        };
        Ok(kind)
    }
}

/// Convolutions carry a bias iff they are followed by instance normalization.
pub fn bias_enabled(norm_kind: NormKind) -> bool {
    norm_kind == NormKind::Instance
}

#[derive(Debug)]
pub enum Norm {
    BatchNorm(BatchNorm2D),
    InstanceNorm(InstanceNorm2D),
}

impl Norm {
    pub fn is_affine(&self) -> bool {
        match self {
            Self::BatchNorm(norm) => norm.is_affine(),
            Self::InstanceNorm(_) => false,
        }
    }

    pub fn weight_mut(&mut self) -> Option<&mut Tensor> {
        match self {
            Self::BatchNorm(norm) => norm.weight_mut(),
            Self::InstanceNorm(_) => None,
        }
    }

    pub fn bias_mut(&mut self) -> Option<&mut Tensor> {
        match self {
            Self::BatchNorm(norm) => norm.bias_mut(),
            Self::InstanceNorm(_) => None,
        }
    }

    pub fn parameters(&self) -> Vec<&Tensor> {
        match self {
            Self::BatchNorm(norm) => norm.parameters(),
            Self::InstanceNorm(_) => vec![],
        }
    }
}

impl nn::ModuleT for Norm {
    fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        match self {
            Self::BatchNorm(norm) => norm.forward_t(input, train),
            Self::InstanceNorm(norm) => norm.forward_t(input, train),
        }
    }
}

#[derive(Debug)]
pub struct Pad2D {
    kind: PaddingKind,
    lrtb: [i64; 4],
}

impl Pad2D {
    pub fn kind(&self) -> PaddingKind {
        self.kind
    }

    pub fn lrtb(&self) -> [i64; 4] {
        self.lrtb
    }
}

impl nn::Module for Pad2D {
    fn forward(&self, xs: &Tensor) -> Tensor {
        match self.kind {
            PaddingKind::Reflect => xs.reflection_pad2d(&self.lrtb),
            PaddingKind::Replicate => xs.replication_pad2d(&self.lrtb),
            PaddingKind::Zeros => {
                let [l, r, t, b] = self.lrtb;
                xs.zero_pad2d(l, r, t, b)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activation {
    Relu,
    LeakyRelu(f64),
    Tanh,
}

impl nn::Module for Activation {
    fn forward(&self, xs: &Tensor) -> Tensor {
        match *self {
            Self::Relu => xs.relu(),
            Self::LeakyRelu(slope) => xs.relu() - (-xs).relu() * slope,
            Self::Tanh => xs.tanh(),
        }
    }
}

/// Nearest-neighbor upsampling by an integer factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upsample {
    pub scale: i64,
}

impl nn::Module for Upsample {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let Self { scale } = *self;
        let size = xs.size();
        let (h, w) = (size[2], size[3]);
        xs.upsample_nearest2d(&[h * scale, w * scale], scale as f64, scale as f64)
    }
}

pub(crate) fn check_dropout(prob: f64) -> Result<()> {
    ensure!(
        (0.0..=1.0).contains(&prob),
        ModelError::config(format!(
            "dropout probability must be in [0, 1], but get {}",
            prob
        ))
    );
    Ok(())
}

pub(crate) fn check_channels(channels: &[(&str, usize)]) -> Result<()> {
    channels.iter().try_for_each(|&(name, value)| -> Result<()> {
        ensure!(
            value > 0,
            ModelError::config(format!("{} must be positive", name))
        );
        Ok(())
    })
}

/// Rejects inputs that a k4 s2 p1 convolution followed by `norm_kind` cannot
/// process.
pub(crate) fn check_downsample(
    norm_kind: NormKind,
    batch: i64,
    height: i64,
    width: i64,
    train: bool,
) -> Result<()> {
    ensure!(
        height >= 2 && width >= 2,
        ModelError::shape(format!(
            "downsampling requires height and width of at least 2, but get {}x{}",
            height, width
        ))
    );

    let out_area = (height / 2) * (width / 2);
    match norm_kind {
        NormKind::Instance => {
            ensure!(
                out_area > 1,
                ModelError::shape(format!(
                    "instance normalization requires more than one output element, but input is {}x{}",
                    height, width
                ))
            );
        }
        NormKind::Batch => {
            ensure!(
                !train || batch * out_area > 1,
                ModelError::shape(format!(
                    "batch normalization in training requires more than one value per channel, but get batch {} at {}x{}",
                    batch, height, width
                ))
            );
        }
        NormKind::None => {}
    }

    Ok(())
}

/// Validates a 4-D activation and returns its (batch, channels, height, width).
///
/// `multiple` is the factor both spatial sides must be a positive multiple of.
pub(crate) fn check_input(
    input: &Tensor,
    channels: i64,
    multiple: i64,
) -> Result<(i64, i64, i64, i64)> {
    let size = input.size();
    ensure!(
        size.len() == 4,
        ModelError::shape(format!(
            "expect a 4-D (batch, channels, height, width) input, but get shape {:?}",
            size
        ))
    );
    let (b, c, h, w) = (size[0], size[1], size[2], size[3]);

    ensure!(
        c == channels,
        ModelError::shape(format!(
            "expect {} input channels, but get {}",
            channels, c
        ))
    );
    ensure!(
        h > 0 && w > 0 && h % multiple == 0 && w % multiple == 0,
        ModelError::shape(format!(
            "input height and width must be positive multiples of {}, but get {}x{}",
            multiple, h, w
        ))
    );

    Ok((b, c, h, w))
}
