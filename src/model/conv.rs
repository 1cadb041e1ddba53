use crate::common::*;

/// 2-D convolution, plain or transposed, with square kernels.
#[derive(Debug, Clone)]
pub struct Conv2DInit {
    pub ksize: usize,
    pub stride: usize,
    pub padding: usize,
    pub bias: bool,
    pub transposed: bool,
    pub ws_init: nn::Init,
    pub bs_init: nn::Init,
}

impl Conv2DInit {
    pub fn new(ksize: usize) -> Self {
        Self {
            ksize,
            stride: 1,
            padding: ksize / 2,
            bias: true,
            transposed: false,
            ws_init: nn::Init::KaimingUniform,
            bs_init: nn::Init::Const(0.0),
        }
    }

    pub fn build<'a>(
        self,
        path: impl Borrow<nn::Path<'a>>,
        in_dim: usize,
        out_dim: usize,
    ) -> Result<Conv2D> {
        let Self {
            ksize,
            stride,
            padding,
            bias,
            transposed,
            ws_init,
            bs_init,
        } = self;

        ensure!(
            ksize > 0 && stride > 0,
            "kernel size and stride must be positive"
        );
        ensure!(
            in_dim > 0 && out_dim > 0,
            "in_dim and out_dim must be positive"
        );

        let path = path.borrow();
        let in_dim = in_dim as i64;
        let out_dim = out_dim as i64;
        let ksize = ksize as i64;

        let bs = bias.then(|| path.var("bias", &[out_dim], bs_init));
        let ws = {
            let weight_size = if transposed {
                [in_dim, out_dim, ksize, ksize]
            } else {
                [out_dim, in_dim, ksize, ksize]
            };
            path.var("weight", &weight_size, ws_init)
        };

        Ok(Conv2D {
            in_dim,
            out_dim,
            stride: [stride as i64; 2],
            padding: [padding as i64; 2],
            transposed,
            weight: ws,
            bias: bs,
        })
    }
}

#[derive(Debug)]
pub struct Conv2D {
    in_dim: i64,
    out_dim: i64,
    stride: [i64; 2],
    padding: [i64; 2],
    transposed: bool,
    weight: Tensor,
    bias: Option<Tensor>,
}

impl Conv2D {
    pub fn in_dim(&self) -> i64 {
        self.in_dim
    }

    pub fn out_dim(&self) -> i64 {
        self.out_dim
    }

    pub fn is_transposed(&self) -> bool {
        self.transposed
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }

    pub fn weight_mut(&mut self) -> &mut Tensor {
        &mut self.weight
    }

    pub fn bias_mut(&mut self) -> Option<&mut Tensor> {
        self.bias.as_mut()
    }

    pub fn parameters(&self) -> Vec<&Tensor> {
        iter::once(&self.weight).chain(self.bias.iter()).collect()
    }
}

impl nn::Module for Conv2D {
    fn forward(&self, input: &Tensor) -> Tensor {
        let Self {
            ref stride,
            ref padding,
            transposed,
            ref weight,
            ref bias,
            ..
        } = *self;

        input.convolution(
            weight,
            bias.as_ref(),
            stride,
            padding,
            &[1, 1],
            transposed,
            &[0, 0],
            1,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conv_shape_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();
        let input = Tensor::rand(&[2, 3, 16, 20], FLOAT_CPU);

        let down = Conv2DInit {
            stride: 2,
            padding: 1,
            bias: false,
            ..Conv2DInit::new(4)
        }
        .build(&root / "down", 3, 8)?;
        ensure!(down.bias().is_none());
        let xs = down.forward(&input);
        ensure!(xs.size() == vec![2, 8, 8, 10]);

        let up = Conv2DInit {
            stride: 2,
            padding: 1,
            transposed: true,
            ..Conv2DInit::new(4)
        }
        .build(&root / "up", 8, 5)?;
        ensure!(up.bias().is_some());
        ensure!(up.weight().size() == vec![8, 5, 4, 4]);
        let ys = up.forward(&xs);
        ensure!(ys.size() == vec![2, 5, 16, 20]);

        Ok(())
    }

    #[test]
    fn conv_zero_channels_test() {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();
        assert!(Conv2DInit::new(3).build(&root / "conv", 0, 4).is_err());
    }
}
