use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use orca::masks::timestep_pad_mask;
use orca::tokenizer::{
    Encoders, ImageTokenizerConfig, LanguageTokenizerConfig, ModalityTokenizer, TensorDict,
    TokenizerConfig, VisualEncoder,
};
use orca::{BlockTransformer, BlockTransformerConfig, ForwardMode, PrefixGroup, TimestepGroup};

const EMBED: usize = 16;
const IMAGE_TOKENS: usize = 8;

/// Spreads each image's mean pixel over a fixed token grid.
struct MeanPatchEncoder;

impl VisualEncoder for MeanPatchEncoder {
    fn encode(&self, images: &Tensor, _conditioning: Option<&Tensor>, _train: bool) -> orca::tokenizer::Result<Tensor> {
        let n = images.dim(0)?;
        let mean = images.flatten_from(1)?.mean_keepdim(1)?;
        let ramp = Tensor::arange(0f32, (IMAGE_TOKENS * EMBED) as f32, images.device())?
            .reshape((1, IMAGE_TOKENS, EMBED))?
            .affine(1.0 / (IMAGE_TOKENS * EMBED) as f64, 0.0)?;
        Ok(mean.reshape((n, 1, 1))?.broadcast_mul(&ramp)?)
    }

    fn output_dim(&self) -> usize {
        EMBED
    }
}

struct Pipeline {
    _varmap: VarMap,
    image: ModalityTokenizer,
    language: ModalityTokenizer,
    transformer: BlockTransformer,
}

fn pipeline() -> Result<Pipeline> {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);

    let image = ModalityTokenizer::new(
        TokenizerConfig::Image(ImageTokenizerConfig::default()),
        Encoders {
            visual: Some(Box::new(MeanPatchEncoder)),
            ..Encoders::default()
        },
        vb.pp("obs_tokenizer"),
    )?;
    let language = ModalityTokenizer::new(
        TokenizerConfig::Language(LanguageTokenizerConfig {
            num_tokens: 1,
            projection_dim: Some(EMBED),
        }),
        Encoders {
            language_dim: Some(12),
            ..Encoders::default()
        },
        vb.pp("task_tokenizer"),
    )?;
    let config = BlockTransformerConfig {
        num_layers: 2,
        mlp_dim: 32,
        num_attention_heads: 4,
        ..BlockTransformerConfig::default()
    };
    let transformer = BlockTransformer::new(config, EMBED, vb.pp("transformer"))?;
    Ok(Pipeline {
        _varmap: varmap,
        image,
        language,
        transformer,
    })
}

fn run(pipeline: &Pipeline, pixel: f64) -> Result<(Vec<PrefixGroup>, Vec<TimestepGroup>)> {
    let device = Device::Cpu;
    let observations = TensorDict::from([(
        "image_primary".to_string(),
        Tensor::full(pixel as f32, (2, 3, 8, 8, 3), &device)?,
    )]);
    let tasks = TensorDict::from([(
        "language_instruction".to_string(),
        Tensor::arange(0f32, 24f32, &device)?.reshape((2, 12))?,
    )]);

    let task_tokens = pipeline.language.tokenize(&observations, Some(&tasks), false)?;
    let obs_tokens = pipeline.image.tokenize(&observations, Some(&tasks), false)?;

    let prefix = vec![PrefixGroup::new("task", task_tokens, Vec::<String>::new())?];
    let timestep = vec![TimestepGroup::new("obs", obs_tokens, ["task"])?];
    let pad = timestep_pad_mask(&[vec![true; 3], vec![true, true, false]], &device)?;

    Ok(pipeline
        .transformer
        .forward(&prefix, &timestep, &pad, ForwardMode::Eval)?)
}

#[test]
fn tokenized_inputs_flow_through_the_block_transformer() -> Result<()> {
    let pipeline = pipeline()?;
    let (prefix, timestep) = run(&pipeline, 0.5)?;

    assert_eq!(prefix[0].name(), "task");
    assert_eq!(prefix[0].tokens().dims(), &[2, 1, EMBED]);
    assert_eq!(timestep[0].name(), "obs");
    assert_eq!(timestep[0].tokens().dims(), &[2, 3, IMAGE_TOKENS, EMBED]);
    assert!(timestep[0].attends("task"));

    let values = timestep[0].tokens().flatten_all()?.to_vec1::<f32>()?;
    assert!(values.iter().all(|v| v.is_finite()));
    Ok(())
}

#[test]
fn task_tokens_ignore_observations() -> Result<()> {
    let pipeline = pipeline()?;
    let (dim_prefix, dim_timestep) = run(&pipeline, 0.1)?;
    let (bright_prefix, bright_timestep) = run(&pipeline, 0.9)?;

    let task_diff = dim_prefix[0]
        .tokens()
        .sub(bright_prefix[0].tokens())?
        .abs()?
        .flatten_all()?
        .max(0)?
        .to_scalar::<f32>()?;
    assert!(task_diff < 1e-5, "task output moved by {task_diff}");

    let obs_diff = dim_timestep[0]
        .tokens()
        .sub(bright_timestep[0].tokens())?
        .abs()?
        .flatten_all()?
        .max(0)?
        .to_scalar::<f32>()?;
    assert!(obs_diff > 0.0);
    Ok(())
}

#[test]
fn device_selection_honours_force_cpu() -> Result<()> {
    std::env::set_var("CANDLE_FORCE_CPU", "1");
    assert!(orca::setup_device()?.is_cpu());
    Ok(())
}
