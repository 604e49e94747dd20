use super::CnnConfig;
use crate::model::SubModel1;
use anyhow::Result;
use candle_core::{Device, Module, Tensor};
use candle_nn::{conv::Conv2dConfig, conv2d, linear, Conv2d, Linear, VarBuilder};

/// Convolutional layers with ReLU followed by a multilayer perceptron.
///
/// Takes flattened frames of shape `(batch, channels * height * width)` and
/// returns `(batch, out_dim)`, without activation on the output.
pub struct Cnn {
    shape: (usize, usize, usize),
    device: Device,
    convs: Vec<Conv2d>,
    layers: Vec<Linear>,
}

impl SubModel1 for Cnn {
    type Config = CnnConfig;
    type Input = Tensor;
    type Output = Tensor;

    fn forward(&self, xs: &Self::Input) -> Result<Tensor> {
        let (c, h, w) = self.shape;
        let batch = xs.dim(0)?;
        let mut xs = xs.to_device(&self.device)?.reshape((batch, c, h, w))?;
        for conv in self.convs.iter() {
            xs = conv.forward(&xs)?.relu()?;
        }
        let mut xs = xs.flatten_from(1)?;
        let n_layers = self.layers.len();
        for (i, layer) in self.layers.iter().enumerate() {
            xs = layer.forward(&xs)?;
            if i + 1 < n_layers {
                xs = xs.relu()?;
            }
        }
        Ok(xs)
    }

    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self> {
        let device = vb.device().clone();
        let vb = vb.pp("cnn");
        let shapes = config.conv_shapes()?;

        let mut in_channels = config.channels;
        let mut convs = vec![];
        for (i, layer) in config.conv.iter().enumerate() {
            let cfg = Conv2dConfig {
                stride: layer.stride,
                ..Default::default()
            };
            convs.push(conv2d(
                in_channels,
                layer.out_channels,
                layer.kernel,
                cfg,
                vb.pp(format!("c{}", i)),
            )?);
            in_channels = layer.out_channels;
        }

        let flat = match shapes.last() {
            Some((c, h, w)) => c * h * w,
            None => config.in_dim(),
        };
        let dims: Vec<usize> = std::iter::once(flat)
            .chain(config.units.iter().copied())
            .chain(std::iter::once(config.out_dim))
            .collect();
        let layers = dims
            .windows(2)
            .enumerate()
            .map(|(i, w)| -> Result<Linear> { Ok(linear(w[0], w[1], vb.pp(format!("ln{}", i)))?) })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            shape: (config.channels, config.height, config.width),
            device,
            convs,
            layers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cnn::ConvLayer;
    use candle_core::DType;
    use candle_nn::VarMap;

    #[test]
    fn test_cnn_shapes() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let conv = vec![ConvLayer {
            out_channels: 4,
            kernel: 2,
            stride: 1,
        }];
        let cnn = Cnn::build(vb, CnnConfig::new(6, 5, conv, vec![8], 3))?;
        let xs = Tensor::zeros((2, 30), DType::F32, &Device::Cpu)?;
        assert_eq!(cnn.forward(&xs)?.dims(), &[2, 3]);

        let mut names: Vec<_> = varmap.data().lock().unwrap().keys().cloned().collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "cnn.c0.bias",
                "cnn.c0.weight",
                "cnn.ln0.bias",
                "cnn.ln0.weight",
                "cnn.ln1.bias",
                "cnn.ln1.weight",
            ]
        );
        Ok(())
    }
}
