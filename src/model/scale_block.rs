use super::{
    conv::Conv2DInit,
    misc::{self, Activation, NormKind},
    stage::{Block, Stage},
};
use crate::{common::*, error::ModelError};

#[derive(Debug, Clone)]
pub struct DownScaleBlockInit {
    pub normalize: bool,
    pub dropout: f64,
}

impl Default for DownScaleBlockInit {
    fn default() -> Self {
        Self {
            normalize: true,
            dropout: 0.0,
        }
    }
}

impl DownScaleBlockInit {
    pub fn build<'a>(
        self,
        path: impl Borrow<nn::Path<'a>>,
        in_c: usize,
        out_c: usize,
    ) -> Result<DownScaleBlock> {
        let path = path.borrow();
        let Self { normalize, dropout } = self;
        misc::check_dropout(dropout)?;
        misc::check_channels(&[("in_channels", in_c), ("out_channels", out_c)])?;

        let conv = Conv2DInit {
            stride: 2,
            padding: 1,
            bias: false,
            ..Conv2DInit::new(4)
        }
        .build(path / "conv", in_c, out_c)?;
        let norm = if normalize {
            NormKind::Instance.build(path / "norm", out_c as i64)
        } else {
            None
        };

        let block = Block::new(
            iter::once(Stage::from(conv))
                .chain(norm.map(Stage::from))
                .chain(iter::once(Activation::LeakyRelu(0.2).into()))
                .chain((dropout > 0.0).then(|| Stage::Dropout(dropout))),
        );

        Ok(DownScaleBlock {
            in_c: in_c as i64,
            normalize,
            block,
        })
    }
}

/// Encoder stage halving the spatial size.
#[derive(Debug)]
pub struct DownScaleBlock {
    in_c: i64,
    normalize: bool,
    block: Block,
}

impl DownScaleBlock {
    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn block_mut(&mut self) -> &mut Block {
        &mut self.block
    }

    /// Output side lengths are the input's halved and rounded down.
    pub fn forward_t(&self, input: &Tensor, train: bool) -> Result<Tensor> {
        let Self {
            in_c,
            normalize,
            ref block,
        } = *self;
        let (b, _c, h, w) = misc::check_input(input, in_c, 1)?;
        let norm_kind = if normalize {
            NormKind::Instance
        } else {
            NormKind::None
        };
        misc::check_downsample(norm_kind, b, h, w, train)?;

        Ok(block.forward_t(input, train))
    }
}

#[derive(Debug, Clone)]
pub struct UpScaleBlockInit {
    pub normalize: bool,
    pub dropout: f64,
}

impl Default for UpScaleBlockInit {
    fn default() -> Self {
        Self {
            normalize: true,
            dropout: 0.0,
        }
    }
}

impl UpScaleBlockInit {
    pub fn build<'a>(
        self,
        path: impl Borrow<nn::Path<'a>>,
        in_c: usize,
        out_c: usize,
    ) -> Result<UpScaleBlock> {
        let path = path.borrow();
        let Self { normalize, dropout } = self;
        misc::check_dropout(dropout)?;
        misc::check_channels(&[("in_channels", in_c), ("out_channels", out_c)])?;

        let conv = Conv2DInit {
            stride: 2,
            padding: 1,
            bias: false,
            transposed: true,
            ..Conv2DInit::new(4)
        }
        .build(path / "conv", in_c, out_c)?;
        let norm = if normalize {
            NormKind::Instance.build(path / "norm", out_c as i64)
        } else {
            None
        };

        let block = Block::new(
            iter::once(Stage::from(conv))
                .chain(norm.map(Stage::from))
                .chain(iter::once(Activation::Relu.into()))
                .chain((dropout > 0.0).then(|| Stage::Dropout(dropout))),
        );

        Ok(UpScaleBlock {
            in_c: in_c as i64,
            block,
        })
    }
}

/// Decoder stage doubling the spatial size and joining the encoder skip.
#[derive(Debug)]
pub struct UpScaleBlock {
    in_c: i64,
    block: Block,
}

impl UpScaleBlock {
    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn block_mut(&mut self) -> &mut Block {
        &mut self.block
    }

    /// Returns `out_channels + skip channels` feature maps at the skip's size.
    pub fn forward_t(&self, input: &Tensor, skip: &Tensor, train: bool) -> Result<Tensor> {
        let (b, _c, h, w) = misc::check_input(input, self.in_c, 1)?;
        let skip_size = skip.size();
        ensure!(
            skip_size.len() == 4,
            ModelError::shape(format!(
                "expect a 4-D skip tensor, but get shape {:?}",
                skip_size
            ))
        );
        ensure!(
            skip_size[0] == b && skip_size[2] == h * 2 && skip_size[3] == w * 2,
            ModelError::shape(format!(
                "upsampled size ({}, {}, {}) does not match skip tensor size ({}, {}, {})",
                b,
                h * 2,
                w * 2,
                skip_size[0],
                skip_size[2],
                skip_size[3]
            ))
        );

        let xs = self.block.forward_t(input, train);
        Ok(Tensor::cat(&[&xs, skip], 1))
    }
}
