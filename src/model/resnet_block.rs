use super::{
    conv::Conv2DInit,
    misc::{self, Activation, NormKind, PaddingKind},
    stage::{Block, Stage},
};
use crate::{common::*, error::ModelError};

#[derive(Debug, Clone)]
pub struct ResnetBlockInit {
    pub padding_kind: PaddingKind,
    pub dropout: bool,
    pub norm_kind: NormKind,
    pub bias: bool,
}

impl Default for ResnetBlockInit {
    fn default() -> Self {
        Self {
            padding_kind: PaddingKind::Reflect,
            norm_kind: NormKind::Batch,
            dropout: false,
            bias: false,
        }
    }
}

impl ResnetBlockInit {
    pub fn build<'a>(self, path: impl Borrow<nn::Path<'a>>, channels: usize) -> Result<ResnetBlock> {
        let path = path.borrow();
        let Self {
            padding_kind,
            norm_kind,
            dropout,
            bias,
        } = self;
        misc::check_channels(&[("channels", channels)])?;

        let conv_init = Conv2DInit {
            padding: 0,
            bias,
            ..Conv2DInit::new(3)
        };
        let conv1 = conv_init.clone().build(path / "conv1", channels, channels)?;
        let conv2 = conv_init.build(path / "conv2", channels, channels)?;
        let norm1 = norm_kind.build(path / "norm1", channels as i64);
        let norm2 = norm_kind.build(path / "norm2", channels as i64);

        let block = Block::new(
            iter::once(Stage::from(padding_kind.build([1, 1, 1, 1])))
                .chain(iter::once(conv1.into()))
                .chain(norm1.map(Stage::from))
                .chain(iter::once(Activation::Relu.into()))
                .chain(dropout.then(|| Stage::Dropout(0.5)))
                .chain(iter::once(padding_kind.build([1, 1, 1, 1]).into()))
                .chain(iter::once(conv2.into()))
                .chain(norm2.map(Stage::from)),
        );

        Ok(ResnetBlock {
            channels: channels as i64,
            padding_kind,
            norm_kind,
            block,
        })
    }
}

/// Residual unit computing `x + f(x)`. The output has the input's shape.
#[derive(Debug)]
pub struct ResnetBlock {
    channels: i64,
    padding_kind: PaddingKind,
    norm_kind: NormKind,
    block: Block,
}

impl ResnetBlock {
    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn block_mut(&mut self) -> &mut Block {
        &mut self.block
    }

    pub fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let Self {
            channels,
            padding_kind,
            norm_kind,
            ref block,
        } = *self;
        let (_b, _c, h, w) = misc::check_input(xs, channels, 1)?;

        // reflection needs the padding to be smaller than the side
        ensure!(
            padding_kind != PaddingKind::Reflect || (h > 1 && w > 1),
            ModelError::shape(format!(
                "reflect padding requires height and width of at least 2, but get {}x{}",
                h, w
            ))
        );
        ensure!(
            norm_kind != NormKind::Instance || h * w > 1,
            ModelError::shape("instance normalization requires more than one spatial element")
        );

        Ok(xs + block.forward_t(xs, train))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::misc::bias_enabled;

    #[test]
    fn resnet_block_shape_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();

        let cases = [
            (PaddingKind::Reflect, NormKind::Batch, 4, 9, 7),
            (PaddingKind::Reflect, NormKind::Instance, 16, 2, 2),
            (PaddingKind::Replicate, NormKind::Instance, 3, 5, 11),
            (PaddingKind::Zeros, NormKind::None, 1, 1, 1),
            (PaddingKind::Replicate, NormKind::None, 5, 1, 3),
            (PaddingKind::Zeros, NormKind::Batch, 2, 1, 1),
        ];

        for (index, &(padding_kind, norm_kind, c, h, w)) in cases.iter().enumerate() {
            let block = ResnetBlockInit {
                padding_kind,
                norm_kind,
                dropout: index % 2 == 0,
                bias: bias_enabled(norm_kind),
            }
            .build(&root / format!("block_{}", index), c)?;

            let input = Tensor::rand(&[2, c as i64, h, w], FLOAT_CPU);
            let output = block.forward_t(&input, true)?;
            ensure!(
                output.size() == input.size(),
                "shape changed from {:?} to {:?}",
                input.size(),
                output.size()
            );
        }

        Ok(())
    }

    #[test]
    fn resnet_block_stages_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();

        let block = ResnetBlockInit {
            dropout: true,
            ..Default::default()
        }
        .build(&root / "with_dropout", 8)?;
        ensure!(block.block().stages().len() == 8);
        ensure!(block.block().convs().count() == 2);
        ensure!(block.block().convs().all(|conv| conv.bias().is_none()));

        let block = ResnetBlockInit {
            norm_kind: NormKind::None,
            ..Default::default()
        }
        .build(&root / "plain", 8)?;
        ensure!(block.block().stages().len() == 5);

        Ok(())
    }

    #[test]
    fn resnet_block_identity_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();
        let mut block = ResnetBlockInit {
            norm_kind: NormKind::None,
            ..Default::default()
        }
        .build(&root / "block", 4)?;

        // with zeroed kernels the residual branch vanishes
        tch::no_grad(|| {
            block.block_mut().stages_mut().for_each(|stage| {
                if let Some(ws) = stage.weight_mut() {
                    let _ = ws.zero_();
                }
            })
        });

        let input = Tensor::rand(&[1, 4, 6, 6], FLOAT_CPU);
        let output = block.forward_t(&input, false)?;
        let diff = f64::from((output - &input).abs().max());
        approx::assert_abs_diff_eq!(diff, 0.0);

        Ok(())
    }

    #[test]
    fn resnet_block_rejects_bad_input_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();
        let block = ResnetBlockInit::default().build(&root / "block", 4)?;

        let inputs = [
            Tensor::rand(&[1, 3, 8, 8], FLOAT_CPU),
            Tensor::rand(&[1, 4, 1, 8], FLOAT_CPU),
        ];
        for input in &inputs {
            let err = block.forward_t(input, false).unwrap_err();
            ensure!(err.downcast_ref::<ModelError>().unwrap().is_shape());
        }

        Ok(())
    }
}
