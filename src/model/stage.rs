use super::{
    conv::Conv2D,
    misc::{Activation, Norm, Pad2D, Upsample},
};
use crate::common::*;

/// Coarse role of a stage, used to pick an initialization policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageTag {
    Convolutional,
    NormalizationWithAffine,
    NormalizationNoAffine,
    Other,
}

#[derive(Debug)]
pub enum Stage {
    Pad(Pad2D),
    Upsample(Upsample),
    Conv(Conv2D),
    Norm(Norm),
    Activation(Activation),
    Dropout(f64),
}

impl Stage {
    pub fn tag(&self) -> StageTag {
        match self {
            Self::Conv(_) => StageTag::Convolutional,
            Self::Norm(norm) if norm.is_affine() => StageTag::NormalizationWithAffine,
            Self::Norm(_) => StageTag::NormalizationNoAffine,
            Self::Pad(_) | Self::Upsample(_) | Self::Activation(_) | Self::Dropout(_) => {
                StageTag::Other
            }
        }
    }

    pub fn weight_mut(&mut self) -> Option<&mut Tensor> {
        match self {
            Self::Conv(conv) => Some(conv.weight_mut()),
            Self::Norm(norm) => norm.weight_mut(),
            _ => None,
        }
    }

    pub fn bias_mut(&mut self) -> Option<&mut Tensor> {
        match self {
            Self::Conv(conv) => conv.bias_mut(),
            Self::Norm(norm) => norm.bias_mut(),
            _ => None,
        }
    }

    pub fn parameters(&self) -> Vec<&Tensor> {
        match self {
            Self::Conv(conv) => conv.parameters(),
            Self::Norm(norm) => norm.parameters(),
            _ => vec![],
        }
    }

    pub fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        match self {
            Self::Pad(pad) => pad.forward(xs),
            Self::Upsample(upsample) => upsample.forward(xs),
            Self::Conv(conv) => conv.forward(xs),
            Self::Norm(norm) => norm.forward_t(xs, train),
            Self::Activation(act) => act.forward(xs),
            Self::Dropout(prob) => xs.dropout(*prob, train),
        }
    }
}

impl From<Pad2D> for Stage {
    fn from(from: Pad2D) -> Self {
        Self::Pad(from)
    }
}

impl From<Upsample> for Stage {
    fn from(from: Upsample) -> Self {
        Self::Upsample(from)
    }
}

impl From<Conv2D> for Stage {
    fn from(from: Conv2D) -> Self {
        Self::Conv(from)
    }
}

impl From<Norm> for Stage {
    fn from(from: Norm) -> Self {
        Self::Norm(from)
    }
}

impl From<Activation> for Stage {
    fn from(from: Activation) -> Self {
        Self::Activation(from)
    }
}

/// A fixed, ordered list of stages.
///
/// The list is assembled once by a builder. Afterwards only the parameters
/// inside the stages may change.
#[derive(Debug)]
pub struct Block {
    stages: Vec<Stage>,
}

impl Block {
    pub fn new(stages: impl IntoIterator<Item = Stage>) -> Self {
        Self {
            stages: stages.into_iter().collect(),
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stages_mut(&mut self) -> impl Iterator<Item = &mut Stage> {
        self.stages.iter_mut()
    }

    pub fn convs(&self) -> impl Iterator<Item = &Conv2D> {
        self.stages.iter().filter_map(|stage| match stage {
            Stage::Conv(conv) => Some(conv),
            _ => None,
        })
    }

    /// Input channels expected by the first convolution.
    pub fn in_dim(&self) -> Option<i64> {
        self.convs().next().map(|conv| conv.in_dim())
    }

    /// Output channels produced by the last convolution.
    pub fn out_dim(&self) -> Option<i64> {
        self.convs().last().map(|conv| conv.out_dim())
    }

    pub fn parameters(&self) -> Vec<&Tensor> {
        self.stages
            .iter()
            .flat_map(|stage| stage.parameters())
            .collect()
    }
}

impl nn::ModuleT for Block {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        self.stages
            .iter()
            .fold(xs.shallow_clone(), |xs, stage| stage.forward_t(&xs, train))
    }
}
