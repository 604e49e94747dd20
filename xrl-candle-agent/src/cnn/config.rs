use crate::util::OutDim;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use xrl_core::error::XrlError;

/// A convolutional layer without padding.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ConvLayer {
    /// Number of output channels.
    pub out_channels: usize,

    /// Size of the square kernel.
    pub kernel: usize,

    /// Stride in both directions.
    pub stride: usize,
}

fn default_channels() -> usize {
    1
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`Cnn`](super::Cnn).
///
/// The input is a batch of frames flattened in row-major order, channel
/// first.
pub struct CnnConfig {
    pub(super) height: usize,
    pub(super) width: usize,
    #[serde(default = "default_channels")]
    pub(super) channels: usize,
    pub(super) conv: Vec<ConvLayer>,
    pub(super) units: Vec<usize>,
    pub(super) out_dim: usize,
}

impl CnnConfig {
    /// Creates configuration of CNN for single-channel frames.
    pub fn new(
        height: usize,
        width: usize,
        conv: Vec<ConvLayer>,
        units: Vec<usize>,
        out_dim: usize,
    ) -> Self {
        Self {
            height,
            width,
            channels: 1,
            conv,
            units,
            out_dim,
        }
    }

    /// Sets the size of input frames.
    pub fn frame(mut self, height: usize, width: usize) -> Self {
        self.height = height;
        self.width = width;
        self
    }

    /// Sets the number of input channels.
    pub fn channels(mut self, v: usize) -> Self {
        self.channels = v;
        self
    }

    /// Number of input features, `channels * height * width`.
    pub fn in_dim(&self) -> usize {
        self.channels * self.height * self.width
    }

    /// Shape `(channels, height, width)` of the output of each
    /// convolutional layer.
    pub fn conv_shapes(&self) -> Result<Vec<(usize, usize, usize)>> {
        let (mut h, mut w) = (self.height, self.width);
        let mut shapes = vec![];
        for (i, layer) in self.conv.iter().enumerate() {
            if layer.kernel == 0 || layer.stride == 0 || layer.out_channels == 0 {
                return Err(XrlError::InvalidConfig(format!(
                    "conv layer {} must have positive sizes: {:?}",
                    i, layer
                ))
                .into());
            }
            if layer.kernel > h || layer.kernel > w {
                return Err(XrlError::InvalidConfig(format!(
                    "kernel {} of conv layer {} exceeds its {}x{} input",
                    layer.kernel, i, h, w
                ))
                .into());
            }
            h = (h - layer.kernel) / layer.stride + 1;
            w = (w - layer.kernel) / layer.stride + 1;
            shapes.push((layer.out_channels, h, w));
        }
        Ok(shapes)
    }

    /// Checks that the layers fit the frame.
    pub fn validate(&self) -> Result<()> {
        if self.in_dim() == 0 {
            return Err(XrlError::InvalidConfig(format!(
                "cnn input must be non-empty: {}x{}x{}",
                self.channels, self.height, self.width
            ))
            .into());
        }
        self.conv_shapes().map(|_| ())
    }
}

impl OutDim for CnnConfig {
    fn get_out_dim(&self) -> usize {
        self.out_dim
    }

    fn set_out_dim(&mut self, out_dim: usize) {
        self.out_dim = out_dim;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(out_channels: usize, kernel: usize, stride: usize) -> ConvLayer {
        ConvLayer {
            out_channels,
            kernel,
            stride,
        }
    }

    #[test]
    fn test_conv_shapes() -> Result<()> {
        let config = CnnConfig::new(6, 5, vec![layer(8, 3, 1), layer(4, 2, 2)], vec![16], 3);
        assert_eq!(config.conv_shapes()?, vec![(8, 4, 3), (4, 2, 1)]);
        assert_eq!(config.in_dim(), 30);
        Ok(())
    }

    #[test]
    fn test_kernel_larger_than_frame() {
        let config = CnnConfig::new(4, 4, vec![layer(8, 3, 1), layer(4, 3, 1)], vec![], 3);
        assert!(config.validate().is_err());
        let config = CnnConfig::new(4, 4, vec![layer(8, 0, 1)], vec![], 3);
        assert!(config.validate().is_err());
    }
}
