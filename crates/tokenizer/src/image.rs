//! Image tokenizer: stacks camera (and goal) images, runs a visual encoder,
//! and fuses the result into a fixed number of tokens per timestep.
//!
//! Two fusion strategies are supported:
//!
//! * **Early fusion** concatenates every selected image (and goal image,
//!   repeated over time) along the channel axis, so the encoder sees one
//!   stacked image per timestep and must emit exactly `num_tokens` tokens.
//! * **Late fusion** encodes each camera separately, treats goal images as
//!   an extra timestep, attaches the goal tokens to every observation step,
//!   and reduces the result with a [`TokenLearner`].
//!
//! Non-spatial task inputs selected by `task_film_keys` are concatenated
//! and handed to the encoder as FiLM conditioning, one row per encoded image.

use candle_core::{Tensor, D};
use candle_nn::VarBuilder;

use crate::config::ImageTokenizerConfig;
use crate::errors::{invalid_input, Result, TokenizerError};
use crate::matcher::KeyMatcher;
use crate::token_learner::TokenLearner;
use crate::TensorDict;

/// Visual backbone mapping `[n, h, w, c]` images to `[n, ..., d]` features.
pub trait VisualEncoder: Send + Sync {
    /// `conditioning` is `[n, k]` when FiLM keys are configured.
    fn encode(&self, images: &Tensor, conditioning: Option<&Tensor>, train: bool) -> Result<Tensor>;

    /// Width `d` of the produced features.
    fn output_dim(&self) -> usize;
}

pub struct ImageTokenizer {
    config: ImageTokenizerConfig,
    obs_keys: KeyMatcher,
    task_keys: KeyMatcher,
    film_keys: KeyMatcher,
    encoder: Box<dyn VisualEncoder>,
    token_learner: Option<TokenLearner>,
}

impl std::fmt::Debug for ImageTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageTokenizer")
            .field("config", &self.config)
            .field("token_learner", &self.token_learner)
            .finish()
    }
}

fn extract<'a>(matcher: &KeyMatcher, inputs: &'a TensorDict, rank: Option<usize>) -> Result<Vec<&'a Tensor>> {
    matcher
        .select(inputs)
        .into_iter()
        .map(|(key, tensor)| match rank {
            Some(rank) if tensor.rank() != rank => Err(invalid_input(format!(
                "spatial input `{key}` must be rank {rank}, got shape {:?}",
                tensor.dims()
            ))),
            _ => Ok(tensor),
        })
        .collect()
}

impl ImageTokenizer {
    pub fn new(config: ImageTokenizerConfig, encoder: Box<dyn VisualEncoder>, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let token_learner = if config.early_fusion {
            None
        } else {
            Some(TokenLearner::new(
                config.num_tokens,
                encoder.output_dim(),
                &config.token_learner,
                vb.pp("token_learner"),
            )?)
        };
        Ok(Self {
            obs_keys: KeyMatcher::new(&config.obs_stack_keys)?,
            task_keys: KeyMatcher::new(&config.task_stack_keys)?,
            film_keys: KeyMatcher::new(&config.task_film_keys)?,
            config,
            encoder,
            token_learner,
        })
    }

    pub fn config(&self) -> &ImageTokenizerConfig {
        &self.config
    }

    /// Returns `[batch, horizon, num_tokens, d]` tokens.
    ///
    /// Observation images are `[batch, horizon, h, w, c]`; task images are
    /// `[batch, h, w, c]`.
    pub fn tokenize(&self, observations: &TensorDict, tasks: Option<&TensorDict>, train: bool) -> Result<Tensor> {
        let obs_inputs = extract(&self.obs_keys, observations, Some(5))?;
        if obs_inputs.is_empty() {
            return Err(TokenizerError::MissingKey(format!(
                "observation matching {:?}",
                self.obs_keys.patterns()
            )));
        }

        // Goal images gain a unit time axis: [b, 1, h, w, c].
        let task_inputs = match tasks {
            Some(tasks) if !self.task_keys.is_empty() => {
                let images = extract(&self.task_keys, tasks, Some(4))?;
                if images.is_empty() {
                    return Err(TokenizerError::MissingKey(format!(
                        "task input matching {:?}",
                        self.task_keys.patterns()
                    )));
                }
                Some(
                    images
                        .into_iter()
                        .map(|t| t.unsqueeze(1))
                        .collect::<candle_core::Result<Vec<_>>>()?,
                )
            }
            _ => None,
        };

        // [b, t, n, h, w, c]
        let enc_inputs = if self.config.early_fusion {
            let stacked = Tensor::cat(&obs_inputs, D::Minus1)?;
            let stacked = match &task_inputs {
                Some(task_inputs) => {
                    let horizon = stacked.dim(1)?;
                    let goal = Tensor::cat(task_inputs, D::Minus1)?.repeat((1, horizon, 1, 1, 1))?;
                    Tensor::cat(&[&stacked, &goal], D::Minus1)?
                }
                None => stacked,
            };
            stacked.unsqueeze(2)?
        } else {
            let cameras = obs_inputs
                .iter()
                .map(|o| o.unsqueeze(2))
                .collect::<candle_core::Result<Vec<_>>>()?;
            let cameras = Tensor::cat(&cameras, 2)?;
            match &task_inputs {
                Some(task_inputs) => {
                    let goals = task_inputs
                        .iter()
                        .map(|g| g.unsqueeze(2))
                        .collect::<candle_core::Result<Vec<_>>>()?;
                    let goals = Tensor::cat(&goals, 2)?;
                    if goals.dim(2)? != cameras.dim(2)? {
                        return Err(invalid_input(format!(
                            "late fusion needs as many goal images as cameras, got {} and {}",
                            goals.dim(2)?,
                            cameras.dim(2)?
                        )));
                    }
                    Tensor::cat(&[&cameras, &goals], 1)?
                }
                None => cameras,
            }
        };

        let (b, t, n, h, w, c) = match enc_inputs.dims() {
            &[b, t, n, h, w, c] => (b, t, n, h, w, c),
            dims => return Err(invalid_input(format!("unexpected stacked image shape {dims:?}"))),
        };
        let images = enc_inputs.reshape((b * t * n, h, w, c))?;

        let conditioning = if self.film_keys.is_empty() {
            None
        } else {
            let tasks = tasks.ok_or_else(|| TokenizerError::MissingKey("task inputs for FiLM conditioning".to_string()))?;
            let film = extract(&self.film_keys, tasks, None)?;
            if film.is_empty() {
                return Err(TokenizerError::MissingKey(format!(
                    "task input matching {:?}",
                    self.film_keys.patterns()
                )));
            }
            let film = film
                .into_iter()
                .map(|f| f.flatten_from(1))
                .collect::<candle_core::Result<Vec<_>>>()?;
            let film = Tensor::cat(&film, D::Minus1)?;
            let k = film.dim(1)?;
            Some(
                film.reshape((b, 1, 1, k))?
                    .broadcast_as((b, t, n, k))?
                    .contiguous()?
                    .reshape((b * t * n, k))?,
            )
        };

        let features = self.encoder.encode(&images, conditioning.as_ref(), train)?;
        let d = features.dim(D::Minus1)?;
        let per_step = features.elem_count() / (b * t * d);
        let tokens = features.reshape((b, t, per_step, d))?;

        match &self.token_learner {
            None => {
                if per_step != self.config.num_tokens {
                    return Err(invalid_input(format!(
                        "visual encoder produced {per_step} tokens per step, expected {}",
                        self.config.num_tokens
                    )));
                }
                Ok(tokens)
            }
            Some(learner) => {
                let tokens = if task_inputs.is_some() {
                    // Split off the goal step and attach it to every observation step.
                    let per_image = per_step / n;
                    let tokens = tokens.reshape((b, t, n, per_image, d))?;
                    let steps = t - 1;
                    let obs_tokens = tokens.narrow(1, 0, steps)?;
                    let goal_tokens = tokens.narrow(1, steps, 1)?.repeat((1, steps, 1, 1, 1))?;
                    Tensor::cat(&[&obs_tokens, &goal_tokens], 2)?.reshape((b, steps, 2 * n * per_image, d))?
                } else {
                    tokens
                };
                learner.forward(&tokens, train)
            }
        }
    }
}
