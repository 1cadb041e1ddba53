use super::{
    conv::Conv2DInit,
    misc::{self, Activation, NormKind, PaddingKind, Upsample},
    stage::{Block, Stage},
};
use crate::common::*;

/// Padding, convolution, normalization and ReLU.
#[derive(Debug, Clone)]
pub struct ConvNormReluInit {
    pub ksize: usize,
    pub stride: usize,
    pub padding: usize,
    pub padding_kind: PaddingKind,
    pub norm_kind: NormKind,
    pub bias: bool,
}

impl ConvNormReluInit {
    pub fn new(ksize: usize) -> Self {
        Self {
            ksize,
            stride: 1,
            padding: ksize / 2,
            padding_kind: PaddingKind::Zeros,
            norm_kind: NormKind::Batch,
            bias: false,
        }
    }

    pub fn build<'a>(
        self,
        path: impl Borrow<nn::Path<'a>>,
        in_c: usize,
        out_c: usize,
    ) -> Result<Block> {
        let path = path.borrow();
        let Self {
            ksize,
            stride,
            padding,
            padding_kind,
            norm_kind,
            bias,
        } = self;
        misc::check_channels(&[("in_channels", in_c), ("out_channels", out_c)])?;

        let conv = Conv2DInit {
            stride,
            padding: 0,
            bias,
            ..Conv2DInit::new(ksize)
        }
        .build(path / "conv", in_c, out_c)?;

        let block = Block::new(
            (padding > 0)
                .then(|| Stage::from(padding_kind.build([padding; 4])))
                .into_iter()
                .chain(iter::once(conv.into()))
                .chain(norm_kind.build(path / "norm", out_c as i64).map(Stage::from))
                .chain(iter::once(Activation::Relu.into())),
        );

        Ok(block)
    }
}

/// Nearest ×2 upsampling followed by a 3×3 convolution that halves the
/// channels, normalization and ReLU.
#[derive(Debug, Clone)]
pub struct UpsampleConvNormReluInit {
    pub norm_kind: NormKind,
    pub bias: bool,
}

impl UpsampleConvNormReluInit {
    pub fn build<'a>(self, path: impl Borrow<nn::Path<'a>>, in_c: usize) -> Result<Block> {
        let path = path.borrow();
        let Self { norm_kind, bias } = self;
        let out_c = in_c / 2;
        misc::check_channels(&[("in_channels", in_c), ("out_channels", out_c)])?;

        let conv = Conv2DInit {
            stride: 1,
            padding: 1,
            bias,
            ..Conv2DInit::new(3)
        }
        .build(path / "conv", in_c, out_c)?;

        let block = Block::new(
            iter::once(Stage::from(Upsample { scale: 2 }))
                .chain(iter::once(conv.into()))
                .chain(norm_kind.build(path / "norm", out_c as i64).map(Stage::from))
                .chain(iter::once(Activation::Relu.into())),
        );

        Ok(block)
    }
}
