use super::{
    conv::Conv2DInit,
    misc::{self, Activation, PaddingKind, Upsample},
    network::Network,
    scale_block::{DownScaleBlock, DownScaleBlockInit, UpScaleBlock, UpScaleBlockInit},
    stage::{Block, Stage},
};
use crate::common::*;

const DOWN_CHANNELS: [usize; 8] = [64, 128, 256, 512, 512, 512, 512, 512];
const UP_CHANNELS: [usize; 7] = [512, 512, 512, 512, 256, 128, 64];
const DROPOUT: f64 = 0.5;

/// Input sides must be multiples of this, one halving per encoder stage.
pub const UNET_SIZE_MULTIPLE: i64 = 1 << DOWN_CHANNELS.len();

/// pix2pix encoder-decoder generator with skip connections.
///
/// The network is fully convolutional: any input whose height and width are
/// multiples of 256 comes back with the same spatial size.
#[derive(Debug, Clone)]
pub struct UnetGeneratorInit {
    pub in_channels: usize,
    pub out_channels: usize,
}

impl Default for UnetGeneratorInit {
    fn default() -> Self {
        Self {
            in_channels: 3,
            out_channels: 3,
        }
    }
}

impl UnetGeneratorInit {
    pub fn build<'a>(self, path: impl Borrow<nn::Path<'a>>) -> Result<UnetGenerator> {
        let path = path.borrow();
        let Self {
            in_channels,
            out_channels,
        } = self;
        misc::check_channels(&[("in_channels", in_channels), ("out_channels", out_channels)])?;

        let num_down = DOWN_CHANNELS.len();
        let down_blocks: Vec<_> = izip!(
            iter::once(in_channels).chain(DOWN_CHANNELS),
            DOWN_CHANNELS,
        )
        .enumerate()
        .map(|(index, (in_c, out_c))| {
            DownScaleBlockInit {
                normalize: index != 0 && index != num_down - 1,
                dropout: if index >= num_down - 4 { DROPOUT } else { 0.0 },
            }
            .build(path / format!("down_{}", index + 1), in_c, out_c)
        })
        .try_collect()?;

        // each up stage after the first consumes the previous output joined
        // with the mirrored encoder activation
        let skip_channels = DOWN_CHANNELS.iter().rev().skip(1);
        let up_in_channels = iter::once(DOWN_CHANNELS[num_down - 1]).chain(
            izip!(UP_CHANNELS, skip_channels).map(|(up_c, &skip_c)| up_c + skip_c),
        );
        let up_blocks: Vec<_> = izip!(up_in_channels, UP_CHANNELS)
            .enumerate()
            .map(|(index, (in_c, out_c))| {
                UpScaleBlockInit {
                    normalize: true,
                    dropout: if index < 4 { DROPOUT } else { 0.0 },
                }
                .build(path / format!("up_{}", index + 1), in_c, out_c)
            })
            .try_collect()?;

        let head = {
            let last_c = UP_CHANNELS[UP_CHANNELS.len() - 1] + DOWN_CHANNELS[0];
            let conv = Conv2DInit {
                padding: 1,
                ..Conv2DInit::new(4)
            }
            .build(path / "final_conv", last_c, out_channels)?;

            Block::new([
                Stage::from(Upsample { scale: 2 }),
                PaddingKind::Zeros.build([1, 0, 1, 0]).into(),
                conv.into(),
                Activation::Tanh.into(),
            ])
        };

        debug!(
            "built U-Net generator with {} down and {} up blocks, {} -> {} channels",
            down_blocks.len(),
            up_blocks.len(),
            in_channels,
            out_channels
        );

        Ok(UnetGenerator {
            in_c: in_channels as i64,
            out_c: out_channels as i64,
            down_blocks,
            up_blocks,
            head,
        })
    }
}

#[derive(Debug)]
pub struct UnetGenerator {
    in_c: i64,
    out_c: i64,
    down_blocks: Vec<DownScaleBlock>,
    up_blocks: Vec<UpScaleBlock>,
    head: Block,
}

impl UnetGenerator {
    pub fn in_channels(&self) -> i64 {
        self.in_c
    }

    pub fn out_channels(&self) -> i64 {
        self.out_c
    }

    pub fn down_blocks(&self) -> &[DownScaleBlock] {
        &self.down_blocks
    }

    pub fn up_blocks(&self) -> &[UpScaleBlock] {
        &self.up_blocks
    }
}

impl Network for UnetGenerator {
    fn forward_t(&self, input: &Tensor, train: bool) -> Result<Tensor> {
        let Self {
            in_c,
            ref down_blocks,
            ref up_blocks,
            ref head,
            ..
        } = *self;
        misc::check_input(input, in_c, UNET_SIZE_MULTIPLE)?;

        // encoder
        let features: Vec<Tensor> = down_blocks.iter().try_fold(
            vec![],
            |mut features, block| -> Result<_> {
                let xs = features.last().unwrap_or(input);
                let xs = block.forward_t(xs, train)?;
                features.push(xs);
                Ok(features)
            },
        )?;

        // decoder, pairing each stage with the mirrored encoder output
        let (bottleneck, skips) = features
            .split_last()
            .ok_or_else(|| format_err!("the encoder is empty"))?;
        let xs = izip!(up_blocks, skips.iter().rev()).try_fold(
            bottleneck.shallow_clone(),
            |xs, (block, skip)| block.forward_t(&xs, skip, train),
        )?;

        Ok(head.forward_t(&xs, train))
    }

    fn blocks(&self) -> Vec<&Block> {
        let Self {
            down_blocks,
            up_blocks,
            head,
            ..
        } = self;

        down_blocks
            .iter()
            .map(|block| block.block())
            .chain(up_blocks.iter().map(|block| block.block()))
            .chain(iter::once(head))
            .collect()
    }

    fn blocks_mut(&mut self) -> Vec<&mut Block> {
        let Self {
            down_blocks,
            up_blocks,
            head,
            ..
        } = self;

        down_blocks
            .iter_mut()
            .map(|block| block.block_mut())
            .chain(up_blocks.iter_mut().map(|block| block.block_mut()))
            .chain(iter::once(head))
            .collect()
    }
}
