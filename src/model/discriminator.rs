use super::{
    conv::Conv2DInit,
    misc::{self, bias_enabled, Activation, NormKind, PaddingKind},
    network::Network,
    stage::{Block, Stage},
};
use crate::common::*;

const NUM_BLOCKS: usize = 4;

/// Input sides must be multiples of this, one halving per block.
pub const PATCH_SIZE_MULTIPLE: i64 = 1 << NUM_BLOCKS;

#[derive(Debug, Clone)]
pub struct DiscriminatorBlockInit {
    pub norm_kind: NormKind,
}

impl DiscriminatorBlockInit {
    pub fn build<'a>(
        self,
        path: impl Borrow<nn::Path<'a>>,
        in_c: usize,
        out_c: usize,
    ) -> Result<DiscriminatorBlock> {
        let path = path.borrow();
        let Self { norm_kind } = self;
        misc::check_channels(&[("in_channels", in_c), ("out_channels", out_c)])?;

        let conv = Conv2DInit {
            stride: 2,
            padding: 1,
            bias: bias_enabled(norm_kind),
            ..Conv2DInit::new(4)
        }
        .build(path / "conv", in_c, out_c)?;

        let block = Block::new(
            iter::once(Stage::from(conv))
                .chain(norm_kind.build(path / "norm", out_c as i64).map(Stage::from))
                .chain(iter::once(Activation::LeakyRelu(0.2).into())),
        );

        Ok(DiscriminatorBlock {
            in_c: in_c as i64,
            norm_kind,
            block,
        })
    }
}

#[derive(Debug)]
pub struct DiscriminatorBlock {
    in_c: i64,
    norm_kind: NormKind,
    block: Block,
}

impl DiscriminatorBlock {
    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn block_mut(&mut self) -> &mut Block {
        &mut self.block
    }

    pub fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let Self {
            in_c,
            norm_kind,
            ref block,
        } = *self;
        let (b, _c, h, w) = misc::check_input(xs, in_c, 1)?;
        misc::check_downsample(norm_kind, b, h, w, train)?;

        Ok(block.forward_t(xs, train))
    }
}

/// PatchGAN discriminator.
///
/// It scores every receptive-field patch of the input and returns a
/// `(batch, 1, height / 16, width / 16)` map instead of a single logit.
#[derive(Debug, Clone)]
pub struct PatchDiscriminatorInit {
    pub in_channels: usize,
    pub norm_kind: NormKind,
    pub ngf: usize,
}

impl Default for PatchDiscriminatorInit {
    fn default() -> Self {
        Self {
            in_channels: 3,
            norm_kind: NormKind::Instance,
            ngf: 64,
        }
    }
}

impl PatchDiscriminatorInit {
    pub fn build<'a>(self, path: impl Borrow<nn::Path<'a>>) -> Result<PatchDiscriminator> {
        let path = path.borrow();
        let Self {
            in_channels,
            norm_kind,
            ngf,
        } = self;
        misc::check_channels(&[("in_channels", in_channels), ("ngf", ngf)])?;

        let channels: Vec<_> = (0..NUM_BLOCKS).map(|index| ngf << index).collect();
        let last_c = channels[NUM_BLOCKS - 1];

        let blocks: Vec<_> = izip!(
            iter::once(in_channels).chain(channels.iter().cloned()),
            channels.iter().cloned(),
        )
        .enumerate()
        .map(|(index, (in_c, out_c))| {
            // the first block never normalizes
            let norm_kind = if index == 0 { NormKind::None } else { norm_kind };
            DiscriminatorBlockInit { norm_kind }.build(
                path / format!("block_{}", index),
                in_c,
                out_c,
            )
        })
        .try_collect()?;

        let head = {
            let conv = Conv2DInit {
                padding: 1,
                bias: false,
                ..Conv2DInit::new(4)
            }
            .build(path / "final_conv", last_c, 1)?;
            Block::new([
                Stage::from(PaddingKind::Zeros.build([1, 0, 1, 0])),
                conv.into(),
            ])
        };

        debug!(
            "built patch discriminator with channels {:?} and {:?} normalization",
            channels, norm_kind
        );

        Ok(PatchDiscriminator {
            in_c: in_channels as i64,
            blocks,
            head,
        })
    }
}

#[derive(Debug)]
pub struct PatchDiscriminator {
    in_c: i64,
    blocks: Vec<DiscriminatorBlock>,
    head: Block,
}

impl PatchDiscriminator {
    /// Output shape `(channels, height, width)` for an input of the given size.
    pub fn patch_size(height: i64, width: i64) -> (i64, i64, i64) {
        (1, height / PATCH_SIZE_MULTIPLE, width / PATCH_SIZE_MULTIPLE)
    }

    pub fn in_channels(&self) -> i64 {
        self.in_c
    }
}

impl Network for PatchDiscriminator {
    fn forward_t(&self, input: &Tensor, train: bool) -> Result<Tensor> {
        let Self {
            in_c,
            ref blocks,
            ref head,
        } = *self;
        misc::check_input(input, in_c, PATCH_SIZE_MULTIPLE)?;

        let xs = blocks
            .iter()
            .try_fold(input.shallow_clone(), |xs, block| block.forward_t(&xs, train))?;
        Ok(head.forward_t(&xs, train))
    }

    fn blocks(&self) -> Vec<&Block> {
        self.blocks
            .iter()
            .map(|block| block.block())
            .chain(iter::once(&self.head))
            .collect()
    }

    fn blocks_mut(&mut self) -> Vec<&mut Block> {
        let Self { blocks, head, .. } = self;
        blocks
            .iter_mut()
            .map(|block| block.block_mut())
            .chain(iter::once(head))
            .collect()
    }
}
