use super::{network::Network, stage::StageTag};
use crate::{common::*, error::ModelError};

/// Re-samples network parameters in place, as pix2pix does after
/// construction.
///
/// Convolution kernels are drawn from `N(0, init_gain)`. Affine
/// normalization layers get their scale from `N(1, init_gain)` and a zero
/// shift. Every other stage is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightInit {
    pub init_gain: f64,
}

impl Default for WeightInit {
    fn default() -> Self {
        Self { init_gain: 0.02 }
    }
}

impl WeightInit {
    pub fn apply<N>(&self, network: &mut N) -> Result<()>
    where
        N: Network + ?Sized,
    {
        let Self { init_gain } = *self;
        ensure!(
            init_gain.is_finite() && init_gain >= 0.0,
            ModelError::config(format!(
                "init_gain must be finite and non-negative, but get {}",
                init_gain
            ))
        );

        let (num_convs, num_norms) = tch::no_grad(|| {
            network
                .blocks_mut()
                .into_iter()
                .flat_map(|block| block.stages_mut())
                .fold((0, 0), |(num_convs, num_norms), stage| match stage.tag() {
                    StageTag::Convolutional => {
                        if let Some(ws) = stage.weight_mut() {
                            let _ = ws.normal_(0.0, init_gain);
                        }
                        (num_convs + 1, num_norms)
                    }
                    StageTag::NormalizationWithAffine => {
                        if let Some(ws) = stage.weight_mut() {
                            let _ = ws.normal_(1.0, init_gain);
                        }
                        if let Some(bs) = stage.bias_mut() {
                            let _ = bs.fill_(0.0);
                        }
                        (num_convs, num_norms + 1)
                    }
                    StageTag::NormalizationNoAffine | StageTag::Other => (num_convs, num_norms),
                })
        });

        debug!(
            "initialized {} convolutions and {} affine normalizations with gain {}",
            num_convs, num_norms, init_gain
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        misc::NormKind,
        resnet_generator::ResnetGeneratorInit,
        stage::{Block, Stage},
        unet::UnetGeneratorInit,
    };

    fn collect<'a>(
        blocks: impl IntoIterator<Item = &'a Block>,
        select: impl Fn(&'a Stage) -> Option<&'a Tensor>,
    ) -> Tensor {
        let values: Vec<_> = blocks
            .into_iter()
            .flat_map(|block| block.stages())
            .filter_map(select)
            .map(|tensor| tensor.flatten(0, -1))
            .collect();
        Tensor::cat(&values, 0)
    }

    #[test]
    fn weight_init_stats_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();
        let init = WeightInit::default();

        let mut generator = ResnetGeneratorInit {
            norm_kind: NormKind::Batch,
            ..Default::default()
        }
        .build(&root)?;
        init.apply(&mut generator)?;

        let blocks = generator.blocks();
        let conv_ws = collect(blocks.iter().cloned(), |stage| match stage {
            Stage::Conv(conv) => Some(conv.weight()),
            _ => None,
        });
        let norm_params: Vec<_> = blocks
            .iter()
            .flat_map(|block| block.stages())
            .filter(|stage| stage.tag() == StageTag::NormalizationWithAffine)
            .map(|stage| stage.parameters())
            .collect();
        ensure!(!norm_params.is_empty());
        let norm_ws = Tensor::cat(
            &norm_params
                .iter()
                .map(|params| params[0].flatten(0, -1))
                .collect::<Vec<_>>(),
            0,
        );
        let norm_bs = Tensor::cat(
            &norm_params
                .iter()
                .map(|params| params[1].flatten(0, -1))
                .collect::<Vec<_>>(),
            0,
        );

        approx::assert_abs_diff_eq!(f64::from(conv_ws.mean(Kind::Float)), 0.0, epsilon = 1e-3);
        approx::assert_abs_diff_eq!(f64::from(conv_ws.std(true)), 0.02, epsilon = 1e-3);
        approx::assert_abs_diff_eq!(f64::from(norm_ws.mean(Kind::Float)), 1.0, epsilon = 5e-3);
        approx::assert_abs_diff_eq!(f64::from(norm_ws.std(true)), 0.02, epsilon = 5e-3);
        ensure!(f64::from(norm_bs.abs().max()) == 0.0);

        Ok(())
    }

    #[test]
    fn weight_init_skips_instance_norm_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();

        let mut generator = UnetGeneratorInit::default().build(&root)?;
        let conv_biases = |generator: &dyn Network| {
            collect(generator.blocks(), |stage| match stage {
                Stage::Conv(conv) => conv.bias(),
                _ => None,
            })
        };
        let before = conv_biases(&generator);

        WeightInit { init_gain: 0.05 }.apply(&mut generator)?;

        // the output head is the only biased convolution and keeps its bias
        let after = conv_biases(&generator);
        ensure!(after.size() == vec![3]);
        ensure!(f64::from((after - before).abs().max()) == 0.0);

        let conv_ws = collect(generator.blocks(), |stage| match stage {
            Stage::Conv(conv) => Some(conv.weight()),
            _ => None,
        });
        approx::assert_abs_diff_eq!(f64::from(conv_ws.std(true)), 0.05, epsilon = 1e-3);

        Ok(())
    }

    #[test]
    fn weight_init_rejects_bad_gain_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();
        let mut generator = ResnetGeneratorInit {
            ngf: 4,
            n_blocks: 1,
            ..Default::default()
        }
        .build(&root)?;

        for init_gain in [-0.1, f64::NAN] {
            let err = WeightInit { init_gain }.apply(&mut generator).unwrap_err();
            ensure!(err.downcast_ref::<ModelError>().unwrap().is_config());
        }

        Ok(())
    }
}
