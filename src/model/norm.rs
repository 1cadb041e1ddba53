use crate::common::*;
#[cfg(debug_assertions)]
use std::sync::Once;

#[cfg(debug_assertions)]
static SMALL_SCALING_WARN: Once = Once::new();

#[derive(Debug, Clone)]
pub struct BatchNorm2DInit {
    pub cudnn_enabled: bool,
    pub eps: f64,
    pub momentum: f64,
    pub affine: bool,
}

impl Default for BatchNorm2DInit {
    fn default() -> Self {
        Self {
            cudnn_enabled: true,
            eps: 1e-5,
            momentum: 0.1,
            affine: true,
        }
    }
}

impl BatchNorm2DInit {
    pub fn build<'a>(self, path: impl Borrow<nn::Path<'a>>, out_dim: i64) -> BatchNorm2D {
        let path = path.borrow();
        let Self {
            cudnn_enabled,
            eps,
            momentum,
            affine,
        } = self;

        let ws = affine.then(|| path.var("weight", &[out_dim], nn::Init::Const(1.0)));
        let bs = affine.then(|| path.var("bias", &[out_dim], nn::Init::Const(0.0)));

        BatchNorm2D {
            running_mean: path.zeros_no_train("running_mean", &[out_dim]),
            running_var: path.ones_no_train("running_var", &[out_dim]),
            ws,
            bs,
            cudnn_enabled,
            eps,
            momentum,
        }
    }
}

#[derive(Debug)]
pub struct BatchNorm2D {
    running_mean: Tensor,
    running_var: Tensor,
    ws: Option<Tensor>,
    bs: Option<Tensor>,
    cudnn_enabled: bool,
    eps: f64,
    momentum: f64,
}

impl BatchNorm2D {
    pub fn is_affine(&self) -> bool {
        self.ws.is_some()
    }

    pub fn weight_mut(&mut self) -> Option<&mut Tensor> {
        self.ws.as_mut()
    }

    pub fn bias_mut(&mut self) -> Option<&mut Tensor> {
        self.bs.as_mut()
    }

    pub fn parameters(&self) -> Vec<&Tensor> {
        self.ws.iter().chain(self.bs.iter()).collect()
    }

    pub fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        let Self {
            ref running_mean,
            ref running_var,
            ref ws,
            ref bs,
            momentum,
            eps,
            cudnn_enabled,
        } = *self;

        let output = Tensor::batch_norm(
            input,
            ws.as_ref(),
            bs.as_ref(),
            Some(running_mean),
            Some(running_var),
            train,
            momentum,
            eps,
            cudnn_enabled,
        );

        #[cfg(debug_assertions)]
        {
            let has_small_ws = ws
                .as_ref()
                .map(|ws| bool::from(ws.abs().le(1e-15).any()))
                .unwrap_or(false);

            if has_small_ws {
                SMALL_SCALING_WARN.call_once(|| {
                    warn!("batch norm scaling factor is close to zero");
                });
            }
        }

        output
    }
}

#[derive(Debug, Clone)]
pub struct InstanceNorm2DInit {
    pub cudnn_enabled: bool,
    pub eps: f64,
}

impl Default for InstanceNorm2DInit {
    fn default() -> Self {
        Self {
            cudnn_enabled: true,
            eps: 1e-5,
        }
    }
}

impl InstanceNorm2DInit {
    pub fn build(self) -> InstanceNorm2D {
        let Self { cudnn_enabled, eps } = self;
        InstanceNorm2D { cudnn_enabled, eps }
    }
}

/// Per-sample, per-channel normalization without affine parameters or
/// running statistics.
#[derive(Debug)]
pub struct InstanceNorm2D {
    cudnn_enabled: bool,
    eps: f64,
}

impl InstanceNorm2D {
    pub fn forward_t(&self, input: &Tensor, _train: bool) -> Tensor {
        let Self { cudnn_enabled, eps } = *self;

        // statistics always come from the input, so the momentum is unused
        input.instance_norm(
            None::<Tensor>,
            None::<Tensor>,
            None::<Tensor>,
            None::<Tensor>,
            true,
            0.0,
            eps,
            cudnn_enabled,
        )
    }
}
