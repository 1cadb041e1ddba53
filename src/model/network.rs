use super::{resnet_generator::ResnetGenerator, stage::Block, unet::UnetGenerator};
use crate::common::*;

/// A feed-forward image network assembled from [Block]s.
pub trait Network {
    fn forward_t(&self, input: &Tensor, train: bool) -> Result<Tensor>;

    /// Every block in forward order.
    fn blocks(&self) -> Vec<&Block>;

    fn blocks_mut(&mut self) -> Vec<&mut Block>;

    fn num_parameters(&self) -> i64 {
        self.blocks()
            .into_iter()
            .flat_map(|block| block.parameters())
            .map(|param| param.numel() as i64)
            .sum()
    }
}

#[derive(Debug)]
pub enum Generator {
    Unet(UnetGenerator),
    Resnet(ResnetGenerator),
}

impl Generator {
    pub fn in_channels(&self) -> i64 {
        match self {
            Self::Unet(model) => model.in_channels(),
            Self::Resnet(model) => model.in_channels(),
        }
    }

    pub fn out_channels(&self) -> i64 {
        match self {
            Self::Unet(model) => model.out_channels(),
            Self::Resnet(model) => model.out_channels(),
        }
    }
}

impl Network for Generator {
    fn forward_t(&self, input: &Tensor, train: bool) -> Result<Tensor> {
        match self {
            Self::Unet(model) => model.forward_t(input, train),
            Self::Resnet(model) => model.forward_t(input, train),
        }
    }

    fn blocks(&self) -> Vec<&Block> {
        match self {
            Self::Unet(model) => model.blocks(),
            Self::Resnet(model) => model.blocks(),
        }
    }

    fn blocks_mut(&mut self) -> Vec<&mut Block> {
        match self {
            Self::Unet(model) => model.blocks_mut(),
            Self::Resnet(model) => model.blocks_mut(),
        }
    }
}

impl From<UnetGenerator> for Generator {
    fn from(v: UnetGenerator) -> Self {
        Self::Unet(v)
    }
}

impl From<ResnetGenerator> for Generator {
    fn from(v: ResnetGenerator) -> Self {
        Self::Resnet(v)
    }
}
