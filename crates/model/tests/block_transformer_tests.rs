use std::sync::{Arc, Mutex};

use anyhow::Result;
use attention::dropout::DropoutStream;
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use model::masks::timestep_pad_mask;
use model::{
    BlockTransformer, BlockTransformerConfig, BlockTransformerError, ForwardMode, PrefixGroup,
    SequenceEncoder, TimestepGroup,
};

const EMBED: usize = 16;

fn small_config() -> BlockTransformerConfig {
    BlockTransformerConfig {
        num_layers: 2,
        mlp_dim: 32,
        num_attention_heads: 4,
        dropout_rate: 0.1,
        attention_dropout_rate: 0.1,
    }
}

fn build_transformer(varmap: &VarMap) -> Result<BlockTransformer> {
    let vb = VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu);
    Ok(BlockTransformer::new(small_config(), EMBED, vb)?)
}

fn random_prefix(name: &str, tokens: usize, attends_to: &[&str]) -> Result<PrefixGroup> {
    let t = Tensor::randn(0f32, 1f32, (2, tokens, EMBED), &Device::Cpu)?;
    Ok(PrefixGroup::new(name, t, attends_to.iter().copied())?)
}

fn random_timestep(name: &str, horizon: usize, tokens: usize, attends_to: &[&str]) -> Result<TimestepGroup> {
    let t = Tensor::randn(0f32, 1f32, (2, horizon, tokens, EMBED), &Device::Cpu)?;
    Ok(TimestepGroup::new(name, t, attends_to.iter().copied())?)
}

fn max_abs_diff(a: &Tensor, b: &Tensor) -> Result<f32> {
    Ok(a.sub(b)?.abs()?.flatten_all()?.max(0)?.to_scalar::<f32>()?)
}

fn base_groups() -> Result<(Vec<PrefixGroup>, Vec<TimestepGroup>, Tensor)> {
    let prefix = vec![random_prefix("task", 3, &[])?];
    let timestep = vec![
        random_timestep("obs", 2, 4, &["task"])?,
        random_timestep("action", 2, 1, &["task", "obs"])?,
    ];
    let pad = timestep_pad_mask(&[vec![true, true], vec![true, false]], &Device::Cpu)?;
    Ok((prefix, timestep, pad))
}

#[test]
fn forward_preserves_group_shapes_and_metadata() -> Result<()> {
    let varmap = VarMap::new();
    let transformer = build_transformer(&varmap)?;
    let (prefix, timestep, pad) = base_groups()?;

    let (prefix_out, timestep_out) = transformer.forward(&prefix, &timestep, &pad, ForwardMode::Eval)?;

    assert_eq!(prefix_out.len(), 1);
    assert_eq!(timestep_out.len(), 2);
    assert_eq!(prefix_out[0].name(), "task");
    assert_eq!(prefix_out[0].tokens().dims(), prefix[0].tokens().dims());
    for (before, after) in timestep.iter().zip(&timestep_out) {
        assert_eq!(before.name(), after.name());
        assert_eq!(before.attends_to(), after.attends_to());
        assert_eq!(before.tokens().dims(), after.tokens().dims());
    }
    Ok(())
}

#[test]
fn unreferenced_group_leaves_existing_outputs_unchanged() -> Result<()> {
    let varmap = VarMap::new();
    let transformer = build_transformer(&varmap)?;
    let (prefix, timestep, pad) = base_groups()?;

    let mut extended_prefix = vec![random_prefix("goal", 2, &["task"])?];
    extended_prefix.extend(prefix.iter().cloned());
    let mut extended_timestep = timestep.clone();
    extended_timestep.insert(1, random_timestep("readout", 2, 2, &["task", "obs"])?);

    for mode in [ForwardMode::Eval, ForwardMode::Train { seed: 42 }] {
        let (p_base, t_base) = transformer.forward(&prefix, &timestep, &pad, mode)?;
        let (p_ext, t_ext) = transformer.forward(&extended_prefix, &extended_timestep, &pad, mode)?;

        assert_eq!(max_abs_diff(p_base[0].tokens(), p_ext[1].tokens())?, 0.0);
        assert_eq!(max_abs_diff(t_base[0].tokens(), t_ext[0].tokens())?, 0.0);
        assert_eq!(max_abs_diff(t_base[1].tokens(), t_ext[2].tokens())?, 0.0);
    }
    Ok(())
}

#[test]
fn wide_unreferenced_groups_leave_outputs_bit_identical() -> Result<()> {
    let embed = 64;
    let device = Device::Cpu;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let transformer = BlockTransformer::new(small_config(), embed, vb)?;

    let tokens3 = |n: usize| Tensor::randn(0f32, 1f32, (2, n, embed), &device);
    let tokens4 = |n: usize| Tensor::randn(0f32, 1f32, (2, 3, n, embed), &device);
    let task = PrefixGroup::new("task", tokens3(5)?, Vec::<&str>::new())?;
    let obs = TimestepGroup::new("obs", tokens4(6)?, ["task"])?;
    let action = TimestepGroup::new("action", tokens4(1)?, ["task", "obs"])?;
    let goal = PrefixGroup::new("goal", tokens3(32)?, ["task"])?;
    let readout = TimestepGroup::new("readout", tokens4(24)?, ["task", "obs", "action"])?;
    let pad = timestep_pad_mask(&[vec![true, true, true], vec![true, true, false]], &device)?;

    let prefix = vec![task.clone()];
    let timestep = vec![obs.clone(), action.clone()];
    let extended_prefix = vec![task, goal];
    let extended_timestep = vec![obs, readout, action];

    for mode in [ForwardMode::Eval, ForwardMode::Train { seed: 3 }] {
        let (p_base, t_base) = transformer.forward(&prefix, &timestep, &pad, mode)?;
        let (p_ext, t_ext) = transformer.forward(&extended_prefix, &extended_timestep, &pad, mode)?;

        assert_eq!(max_abs_diff(p_base[0].tokens(), p_ext[0].tokens())?, 0.0, "{mode:?} task");
        assert_eq!(max_abs_diff(t_base[0].tokens(), t_ext[0].tokens())?, 0.0, "{mode:?} obs");
        assert_eq!(max_abs_diff(t_base[1].tokens(), t_ext[2].tokens())?, 0.0, "{mode:?} action");
    }
    Ok(())
}

#[test]
fn train_mode_is_seeded_and_differs_from_eval() -> Result<()> {
    let varmap = VarMap::new();
    let transformer = build_transformer(&varmap)?;
    let (prefix, timestep, pad) = base_groups()?;

    let (_, eval) = transformer.forward(&prefix, &timestep, &pad, ForwardMode::Eval)?;
    let (_, first) = transformer.forward(&prefix, &timestep, &pad, ForwardMode::Train { seed: 7 })?;
    let (_, again) = transformer.forward(&prefix, &timestep, &pad, ForwardMode::Train { seed: 7 })?;
    let (_, other) = transformer.forward(&prefix, &timestep, &pad, ForwardMode::Train { seed: 8 })?;

    assert_eq!(max_abs_diff(first[0].tokens(), again[0].tokens())?, 0.0);
    assert!(max_abs_diff(first[0].tokens(), eval[0].tokens())? > 0.0);
    assert!(max_abs_diff(first[0].tokens(), other[0].tokens())? > 0.0);
    Ok(())
}

#[test]
fn later_steps_do_not_influence_earlier_ones() -> Result<()> {
    let varmap = VarMap::new();
    let transformer = build_transformer(&varmap)?;
    let (prefix, timestep, pad) = base_groups()?;

    // Perturb step 1 of the observation group only.
    let obs = timestep[0].tokens();
    let step0 = obs.narrow(1, 0, 1)?;
    let step1 = (obs.narrow(1, 1, 1)? + 5.0)?;
    let mut perturbed = timestep.clone();
    perturbed[0] = timestep[0].with_tokens(Tensor::cat(&[&step0, &step1], 1)?)?;

    let (p_a, t_a) = transformer.forward(&prefix, &timestep, &pad, ForwardMode::Eval)?;
    let (p_b, t_b) = transformer.forward(&prefix, &perturbed, &pad, ForwardMode::Eval)?;

    assert!(max_abs_diff(p_a[0].tokens(), p_b[0].tokens())? < 1e-5);
    for (a, b) in t_a.iter().zip(&t_b) {
        let a0 = a.tokens().narrow(1, 0, 1)?;
        let b0 = b.tokens().narrow(1, 0, 1)?;
        assert!(max_abs_diff(&a0, &b0)? < 1e-5);
    }
    Ok(())
}

#[test]
fn mismatched_horizons_are_rejected() -> Result<()> {
    let varmap = VarMap::new();
    let transformer = build_transformer(&varmap)?;
    let timestep = vec![
        random_timestep("obs", 2, 1, &[])?,
        random_timestep("action", 3, 1, &["obs"])?,
    ];
    let pad = Tensor::ones((2, 2), DType::U8, &Device::Cpu)?;
    let err = transformer
        .forward(&[], &timestep, &pad, ForwardMode::Eval)
        .unwrap_err();
    assert!(matches!(err, BlockTransformerError::Precondition(_)));
    Ok(())
}

#[test]
fn pad_mask_must_match_batch_and_horizon() -> Result<()> {
    let varmap = VarMap::new();
    let transformer = build_transformer(&varmap)?;
    let timestep = vec![random_timestep("obs", 2, 1, &[])?];

    for pad in [
        Tensor::ones((2, 3), DType::U8, &Device::Cpu)?,
        Tensor::ones((1, 2), DType::U8, &Device::Cpu)?,
        Tensor::ones((2, 2, 1), DType::U8, &Device::Cpu)?,
    ] {
        let err = transformer
            .forward(&[], &timestep, &pad, ForwardMode::Eval)
            .unwrap_err();
        assert!(matches!(err, BlockTransformerError::Precondition(_)), "{err}");
    }
    Ok(())
}

#[test]
fn timestep_groups_are_required() -> Result<()> {
    let varmap = VarMap::new();
    let transformer = build_transformer(&varmap)?;
    let prefix = vec![random_prefix("task", 2, &[])?];
    let pad = Tensor::ones((2, 1), DType::U8, &Device::Cpu)?;
    let err = transformer
        .forward(&prefix, &[], &pad, ForwardMode::Eval)
        .unwrap_err();
    assert!(matches!(err, BlockTransformerError::Precondition(_)));
    Ok(())
}

#[test]
fn embed_width_must_split_across_heads() {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let err = BlockTransformer::new(small_config(), 10, vb).err().unwrap();
    assert!(matches!(err, BlockTransformerError::Config(_)));
}

/// Returns its input and records the mask shape and dropout stream length.
struct RecordingEncoder {
    seen: Arc<Mutex<Vec<(Vec<usize>, Option<usize>)>>>,
}

impl SequenceEncoder for RecordingEncoder {
    fn encode(&self, tokens: &Tensor, mask: &Tensor, dropout: Option<&DropoutStream>) -> model::Result<Tensor> {
        self.seen
            .lock()
            .unwrap()
            .push((mask.dims().to_vec(), dropout.map(DropoutStream::seq_len)));
        Ok(tokens.clone())
    }
}

#[test]
fn injected_encoder_receives_mask_with_head_axis() -> Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let encoder = RecordingEncoder { seen: Arc::clone(&seen) };
    let transformer = BlockTransformer::with_encoder(small_config(), Box::new(encoder))?;
    let (prefix, timestep, pad) = base_groups()?;

    let (_, out) = transformer.forward(&prefix, &timestep, &pad, ForwardMode::Eval)?;
    assert_eq!(max_abs_diff(out[0].tokens(), timestep[0].tokens())?, 0.0);
    transformer.forward(&prefix, &timestep, &pad, ForwardMode::Train { seed: 1 })?;

    let seen = seen.lock().unwrap();
    // 3 prefix tokens + 2 steps of (4 obs + 1 action)
    assert_eq!(seen[0], (vec![2, 4, 13, 13], None));
    assert_eq!(seen[1], (vec![2, 4, 13, 13], Some(13)));
    Ok(())
}
