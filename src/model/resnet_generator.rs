use super::{
    conv::Conv2DInit,
    conv_norm::{ConvNormReluInit, UpsampleConvNormReluInit},
    misc::{self, bias_enabled, Activation, NormKind, PaddingKind},
    network::Network,
    resnet_block::{ResnetBlock, ResnetBlockInit},
    stage::{Block, Stage},
};
use crate::{common::*, error::ModelError};

const NUM_SCALES: usize = 2;

/// Input sides must be multiples of this, one halving per downsampling stage.
pub const RESNET_SIZE_MULTIPLE: i64 = 1 << NUM_SCALES;

/// Resnet-based generator: residual blocks between a few downsampling and
/// upsampling stages, after Johnson et al.'s fast neural style transfer.
#[derive(Debug, Clone)]
pub struct ResnetGeneratorInit {
    pub input_nc: usize,
    pub output_nc: usize,
    pub ngf: usize,
    pub norm_kind: NormKind,
    pub dropout: bool,
    pub n_blocks: usize,
    pub padding_kind: PaddingKind,
}

impl Default for ResnetGeneratorInit {
    fn default() -> Self {
        Self {
            input_nc: 3,
            output_nc: 3,
            ngf: 64,
            norm_kind: NormKind::Batch,
            dropout: false,
            n_blocks: 6,
            padding_kind: PaddingKind::Reflect,
        }
    }
}

impl ResnetGeneratorInit {
    pub fn build<'a>(self, path: impl Borrow<nn::Path<'a>>) -> Result<ResnetGenerator> {
        let path = path.borrow();
        let Self {
            input_nc,
            output_nc,
            ngf,
            norm_kind,
            dropout,
            n_blocks,
            padding_kind,
        } = self;
        misc::check_channels(&[
            ("input_nc", input_nc),
            ("output_nc", output_nc),
            ("ngf", ngf),
        ])?;
        let bias = bias_enabled(norm_kind);
        let inner_c = ngf << NUM_SCALES;

        let stem = ConvNormReluInit {
            padding: 3,
            padding_kind,
            norm_kind,
            bias,
            ..ConvNormReluInit::new(7)
        }
        .build(path / "stem", input_nc, ngf)?;

        // downsampling always pads with zeros
        let down_blocks: Vec<_> = (0..NUM_SCALES)
            .map(|index| {
                let in_c = ngf << index;
                ConvNormReluInit {
                    stride: 2,
                    padding: 1,
                    padding_kind: PaddingKind::Zeros,
                    norm_kind,
                    bias,
                    ..ConvNormReluInit::new(3)
                }
                .build(path / format!("down_{}", index), in_c, in_c * 2)
            })
            .try_collect()?;

        let resnet_blocks: Vec<_> = (0..n_blocks)
            .map(|index| {
                ResnetBlockInit {
                    padding_kind,
                    norm_kind,
                    dropout,
                    bias,
                }
                .build(path / format!("resnet_{}", index), inner_c)
            })
            .try_collect()?;

        let up_blocks: Vec<_> = (0..NUM_SCALES)
            .map(|index| {
                UpsampleConvNormReluInit { norm_kind, bias }
                    .build(path / format!("up_{}", index), inner_c >> index)
            })
            .try_collect()?;

        let head = {
            let conv = Conv2DInit {
                padding: 0,
                bias,
                ..Conv2DInit::new(7)
            }
            .build(path / "head", ngf, output_nc)?;
            Block::new([
                Stage::from(padding_kind.build([3; 4])),
                conv.into(),
                Activation::Tanh.into(),
            ])
        };

        debug!(
            "built resnet generator with {} residual blocks at {} channels, {:?} normalization",
            n_blocks, inner_c, norm_kind
        );

        Ok(ResnetGenerator {
            in_c: input_nc as i64,
            out_c: output_nc as i64,
            padding_kind,
            norm_kind,
            stem,
            down_blocks,
            resnet_blocks,
            up_blocks,
            head,
        })
    }
}

#[derive(Debug)]
pub struct ResnetGenerator {
    in_c: i64,
    out_c: i64,
    padding_kind: PaddingKind,
    norm_kind: NormKind,
    stem: Block,
    down_blocks: Vec<Block>,
    resnet_blocks: Vec<ResnetBlock>,
    up_blocks: Vec<Block>,
    head: Block,
}

impl ResnetGenerator {
    pub fn in_channels(&self) -> i64 {
        self.in_c
    }

    pub fn out_channels(&self) -> i64 {
        self.out_c
    }

    pub fn resnet_blocks(&self) -> &[ResnetBlock] {
        &self.resnet_blocks
    }
}

impl Network for ResnetGenerator {
    fn forward_t(&self, input: &Tensor, train: bool) -> Result<Tensor> {
        let Self {
            in_c,
            padding_kind,
            norm_kind,
            ref stem,
            ref down_blocks,
            ref resnet_blocks,
            ref up_blocks,
            ref head,
            ..
        } = *self;
        let (_b, _c, h, w) = misc::check_input(input, in_c, RESNET_SIZE_MULTIPLE)?;

        // residual blocks run at 1/4 resolution and must be able to pad there
        let (inner_h, inner_w) = (h / RESNET_SIZE_MULTIPLE, w / RESNET_SIZE_MULTIPLE);
        if !resnet_blocks.is_empty() {
            ensure!(
                padding_kind != PaddingKind::Reflect || (inner_h > 1 && inner_w > 1),
                ModelError::shape(format!(
                    "reflect padding requires inputs of at least {} pixels per side, but get {}x{}",
                    RESNET_SIZE_MULTIPLE * 2,
                    h,
                    w
                ))
            );
        }
        ensure!(
            norm_kind != NormKind::Instance || inner_h * inner_w > 1,
            ModelError::shape(format!(
                "instance normalization requires inputs larger than {}x{}",
                RESNET_SIZE_MULTIPLE, RESNET_SIZE_MULTIPLE
            ))
        );

        let xs = stem.forward_t(input, train);
        let xs = down_blocks
            .iter()
            .fold(xs, |xs, block| block.forward_t(&xs, train));
        let xs = resnet_blocks
            .iter()
            .try_fold(xs, |xs, block| block.forward_t(&xs, train))?;
        let xs = up_blocks
            .iter()
            .fold(xs, |xs, block| block.forward_t(&xs, train));

        Ok(head.forward_t(&xs, train))
    }

    fn blocks(&self) -> Vec<&Block> {
        let Self {
            stem,
            down_blocks,
            resnet_blocks,
            up_blocks,
            head,
            ..
        } = self;

        iter::once(stem)
            .chain(down_blocks)
            .chain(resnet_blocks.iter().map(|block| block.block()))
            .chain(up_blocks)
            .chain(iter::once(head))
            .collect()
    }

    fn blocks_mut(&mut self) -> Vec<&mut Block> {
        let Self {
            stem,
            down_blocks,
            resnet_blocks,
            up_blocks,
            head,
            ..
        } = self;

        iter::once(stem)
            .chain(down_blocks)
            .chain(resnet_blocks.iter_mut().map(|block| block.block_mut()))
            .chain(up_blocks)
            .chain(iter::once(head))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resnet_generator_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();

        let generator = ResnetGeneratorInit {
            ngf: 8,
            n_blocks: 2,
            ..Default::default()
        }
        .build(&root)?;

        let input = Tensor::rand(&[2, 3, 32, 48], FLOAT_CPU) * 2.0 - 1.0;
        let output = generator.forward_t(&input, true)?;
        ensure!(output.size() == vec![2, 3, 32, 48], "incorrect output shape");
        ensure!(f64::from(output.abs().max()) <= 1.0);

        Ok(())
    }

    #[test]
    fn resnet_generator_without_blocks_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();

        let generator = ResnetGeneratorInit {
            n_blocks: 0,
            ..Default::default()
        }
        .build(&root)?;
        ensure!(generator.resnet_blocks().is_empty());
        ensure!(generator.blocks().len() == 6);

        for bs in [1, 3] {
            let input = Tensor::rand(&[bs, 3, 64, 64], FLOAT_CPU);
            let output = tch::no_grad(|| generator.forward_t(&input, true))?;
            ensure!(output.size() == vec![bs, 3, 64, 64]);
        }

        Ok(())
    }

    #[test]
    fn resnet_generator_channels_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();
        let ngf = 4;

        let generator = ResnetGeneratorInit {
            input_nc: 1,
            output_nc: 2,
            ngf,
            n_blocks: 3,
            ..Default::default()
        }
        .build(&root)?;

        let dims: Vec<_> = generator
            .blocks()
            .iter()
            .map(|block| (block.in_dim().unwrap(), block.out_dim().unwrap()))
            .collect();
        ensure!(
            dims == vec![
                (1, 4),
                (4, 8),
                (8, 16),
                (16, 16),
                (16, 16),
                (16, 16),
                (16, 8),
                (8, 4),
                (4, 2)
            ]
        );

        Ok(())
    }

    #[test]
    fn resnet_generator_bias_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();

        for norm_kind in [NormKind::Instance, NormKind::Batch, NormKind::None] {
            let generator = ResnetGeneratorInit {
                ngf: 4,
                n_blocks: 2,
                norm_kind,
                ..Default::default()
            }
            .build(&root / format!("{:?}", norm_kind))?;

            let expect = norm_kind == NormKind::Instance;
            let convs: Vec<_> = generator
                .blocks()
                .into_iter()
                .flat_map(|block| block.convs())
                .collect();
            ensure!(convs.len() == 1 + 2 + 2 * 2 + 2 + 1);
            ensure!(convs.iter().all(|conv| conv.bias().is_some() == expect));
        }

        Ok(())
    }

    #[test]
    fn resnet_generator_padding_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();

        for padding_kind in [PaddingKind::Reflect, PaddingKind::Replicate, PaddingKind::Zeros] {
            let generator = ResnetGeneratorInit {
                ngf: 4,
                n_blocks: 1,
                padding_kind,
                norm_kind: NormKind::Instance,
                dropout: true,
                ..Default::default()
            }
            .build(&root / format!("{:?}", padding_kind))?;

            // stem and head follow the configured padding, downsampling pads with zeros
            let blocks = generator.blocks();
            let first_pad = |block: &Block| {
                block.stages().iter().find_map(|stage| match stage {
                    Stage::Pad(pad) => Some(pad.kind()),
                    _ => None,
                })
            };
            ensure!(first_pad(blocks[0]) == Some(padding_kind));
            ensure!(first_pad(blocks[1]) == Some(PaddingKind::Zeros));
            ensure!(first_pad(blocks[3]) == Some(padding_kind));
            ensure!(first_pad(blocks[blocks.len() - 1]) == Some(padding_kind));

            let input = Tensor::rand(&[1, 3, 16, 16], FLOAT_CPU);
            let output = generator.forward_t(&input, true)?;
            ensure!(output.size() == vec![1, 3, 16, 16]);
        }

        Ok(())
    }

    #[test]
    fn resnet_generator_rejects_bad_input_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();
        let generator = ResnetGeneratorInit {
            ngf: 4,
            n_blocks: 1,
            ..Default::default()
        }
        .build(&root)?;

        for shape in [[1, 3, 30, 32], [1, 2, 32, 32], [1, 3, 4, 4]] {
            let err = generator
                .forward_t(&Tensor::zeros(&shape, FLOAT_CPU), false)
                .unwrap_err();
            ensure!(err.downcast_ref::<ModelError>().unwrap().is_shape());
        }

        Ok(())
    }
}
