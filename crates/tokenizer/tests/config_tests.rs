use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use tokenizer::{
    BinType, Encoders, ModalityTokenizer, TensorDict, TokenizerConfig, TokenizerError,
};

#[test]
fn configs_deserialize_by_kind() -> Result<()> {
    let bin: TokenizerConfig =
        serde_json::from_str(r#"{"kind": "bin", "n_bins": 256, "bin_type": "normal"}"#)?;
    match bin {
        TokenizerConfig::Bin(cfg) => {
            assert_eq!(cfg.n_bins, 256);
            assert_eq!(cfg.bin_type, BinType::Normal);
            assert_eq!(cfg.low, 0.0);
            assert_eq!(cfg.high, 1.0);
            assert_eq!(cfg.key, "action");
        }
        other => panic!("expected bin config, got {other:?}"),
    }

    let image: TokenizerConfig = toml::from_str(
        r#"
kind = "image"
early_fusion = false
num_tokens = 16
task_stack_keys = ["image_primary"]

[token_learner]
bottleneck_dim = 64
"#,
    )?;
    match image {
        TokenizerConfig::Image(cfg) => {
            assert!(!cfg.early_fusion);
            assert_eq!(cfg.num_tokens, 16);
            assert_eq!(cfg.obs_stack_keys, vec!["image_.*", "depth_.*"]);
            assert_eq!(cfg.task_stack_keys, vec!["image_primary"]);
            assert_eq!(cfg.token_learner.bottleneck_dim, 64);
            assert_eq!(cfg.token_learner.dropout_rate, 0.1);
        }
        other => panic!("expected image config, got {other:?}"),
    }
    Ok(())
}

#[test]
fn unknown_bin_type_is_rejected_on_load() {
    let err = serde_json::from_str::<TokenizerConfig>(r#"{"kind": "bin", "n_bins": 8, "bin_type": "log"}"#)
        .unwrap_err();
    assert!(err.to_string().contains("not supported"), "{err}");
}

#[test]
fn unknown_kind_is_rejected_on_load() {
    assert!(serde_json::from_str::<TokenizerConfig>(r#"{"kind": "audio"}"#).is_err());
}

#[test]
fn image_tokenizer_needs_a_visual_encoder() {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let config = TokenizerConfig::Image(Default::default());
    let err = ModalityTokenizer::new(config, Encoders::default(), vb).unwrap_err();
    assert!(matches!(err, TokenizerError::UnsupportedConfiguration(_)));
}

#[test]
fn bin_tokenizer_dispatch_reads_its_key() -> Result<()> {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let config: TokenizerConfig = serde_json::from_str(r#"{"kind": "bin", "n_bins": 4}"#)?;
    let tokenizer = ModalityTokenizer::new(config, Encoders::default(), vb)?;
    assert_eq!(tokenizer.kind(), "bin");

    let mut observations = TensorDict::new();
    observations.insert(
        "action".to_string(),
        Tensor::new(&[[0.1f32, 0.6], [0.3, 0.9]], &Device::Cpu)?,
    );
    let tokens = tokenizer.tokenize(&observations, None, false)?;
    assert_eq!(tokens.to_vec2::<u32>()?, vec![vec![0, 2], vec![1, 3]]);

    let err = tokenizer.tokenize(&TensorDict::new(), None, false).unwrap_err();
    assert!(matches!(err, TokenizerError::MissingKey(key) if key == "action"));
    Ok(())
}

#[test]
fn language_dispatch_requires_tasks() -> Result<()> {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let config: TokenizerConfig = serde_json::from_str(r#"{"kind": "language", "projection_dim": 8}"#)?;
    let encoders = Encoders {
        language_dim: Some(12),
        ..Encoders::default()
    };
    let tokenizer = ModalityTokenizer::new(config, encoders, vb)?;

    let mut tasks = TensorDict::new();
    tasks.insert(
        "language_instruction".to_string(),
        Tensor::zeros((3, 12), DType::F32, &Device::Cpu)?,
    );
    let tokens = tokenizer.tokenize(&TensorDict::new(), Some(&tasks), false)?;
    assert_eq!(tokens.dims(), &[3, 1, 8]);
    assert!(tokenizer.tokenize(&TensorDict::new(), None, false).is_err());
    Ok(())
}
