//! A small deterministic game with a pixel observation.
use anyhow::{anyhow, Result};
use log::trace;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use xrl_core::{error::XrlError, Env, FeatureExtractor, Step};

/// Grayscale image, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Number of columns.
    pub width: usize,

    /// Number of rows.
    pub height: usize,

    /// Pixel values, `height * width` of them.
    pub pixels: Vec<u8>,
}

/// Configuration of [`CatchEnv`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CatchConfig {
    /// Width of the board.
    pub width: usize,

    /// Height of the board, including the paddle row.
    pub height: usize,

    /// Number of balls dropped in an episode.
    pub rallies: usize,

    /// Seed of the column of falling balls.
    pub seed: u64,
}

impl Default for CatchConfig {
    fn default() -> Self {
        Self {
            width: 5,
            height: 6,
            rallies: 3,
            seed: 0,
        }
    }
}

impl CatchConfig {
    /// Number of pixels of a frame.
    pub fn n_pixels(&self) -> usize {
        self.width * self.height
    }

    /// Checks the values.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height < 2 || self.rallies == 0 {
            return Err(XrlError::InvalidConfig(format!(
                "catch board needs width >= 1, height >= 2 and rallies >= 1: {:?}",
                self
            ))
            .into());
        }
        Ok(())
    }
}

/// Balls fall one row per step from a random column of the top row; the
/// paddle in the bottom row moves left, stays or moves right.
///
/// A caught ball gives reward `+1`, a missed one `-1`, any other step `0`.
/// The episode ends after [`CatchConfig::rallies`] balls.
pub struct CatchEnv {
    config: CatchConfig,
    rng: StdRng,
    ball: (usize, usize),
    paddle: usize,
    rally: usize,
}

impl CatchEnv {
    /// Left, stay, right.
    pub const N_ACTIONS: usize = 3;

    /// Constructs the environment.
    pub fn build(config: &CatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            rng: StdRng::seed_from_u64(config.seed),
            ball: (0, 0),
            paddle: config.width / 2,
            rally: 0,
        })
    }

    fn drop_ball(&mut self) {
        self.ball = (0, self.rng.gen_range(0..self.config.width));
    }

    fn frame(&self) -> Frame {
        let (width, height) = (self.config.width, self.config.height);
        let mut pixels = vec![0u8; width * height];
        pixels[self.ball.0 * width + self.ball.1] = 255;
        pixels[(height - 1) * width + self.paddle] = 255;
        Frame {
            width,
            height,
            pixels,
        }
    }
}

impl Env for CatchEnv {
    type Obs = Frame;

    fn reset(&mut self) -> Result<Frame> {
        self.paddle = self.config.width / 2;
        self.rally = 0;
        self.drop_ball();
        Ok(self.frame())
    }

    fn step(&mut self, a: usize) -> Result<Step<Frame>> {
        if a >= Self::N_ACTIONS {
            return Err(anyhow!("Invalid action {}", a));
        }
        self.paddle = (self.paddle + a)
            .saturating_sub(1)
            .min(self.config.width - 1);
        self.ball.0 += 1;

        let mut reward = 0.0;
        let mut is_done = false;
        if self.ball.0 == self.config.height - 1 {
            reward = if self.ball.1 == self.paddle { 1.0 } else { -1.0 };
            self.rally += 1;
            is_done = self.rally == self.config.rallies;
            trace!("rally {}: reward {}", self.rally, reward);
            if !is_done {
                self.drop_ball();
            }
        }

        Ok(Step {
            obs: self.frame(),
            reward,
            is_done,
        })
    }

    fn action_space_size(&self) -> usize {
        Self::N_ACTIONS
    }
}

/// Flattens a [`Frame`] into pixel values scaled to `[0, 1]`.
#[derive(Clone, Debug, Default)]
pub struct FrameExtractor;

impl FeatureExtractor<Frame> for FrameExtractor {
    fn extract(&mut self, obs: &Frame) -> Result<Vec<f32>> {
        if obs.pixels.len() != obs.width * obs.height {
            return Err(anyhow!(
                "Frame of {}x{} has {} pixels",
                obs.height,
                obs.width,
                obs.pixels.len()
            ));
        }
        Ok(obs.pixels.iter().map(|&p| p as f32 / 255.0).collect())
    }
}
