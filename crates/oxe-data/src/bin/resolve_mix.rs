use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use oxe_data::{
    format_mixture, resolve, MixSource, MixtureConfig, ResolveOptions, StaticRegistry,
};

fn main() {
    if let Err(err) = run() {
        eprintln!("resolve-mix failed: {err:#}");
        std::process::exit(1);
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Resolve an Open X-Embodiment dataset mixture", long_about = None)]
struct Args {
    #[arg(
        short,
        long,
        value_name = "PATH",
        conflicts_with_all = ["mix", "registry", "data_dir"],
        help = "Mixture config file (TOML or JSON)"
    )]
    config: Option<PathBuf>,

    #[arg(long, help = "Named mixture: rtx, oxe_franka or oxe_full")]
    mix: Option<String>,

    #[arg(long, value_name = "PATH", help = "Dataset registry file (TOML or JSON)")]
    registry: Option<PathBuf>,

    #[arg(long, value_name = "DIR", help = "Root data directory recorded in every dataset")]
    data_dir: Option<String>,

    #[arg(long, help = "Keep duplicate dataset entries")]
    no_dedup: bool,

    #[arg(long, value_name = "N", help = "Third-person cameras to load per dataset")]
    third_person_cameras: Option<usize>,

    #[arg(long, value_name = "N", help = "Wrist cameras to load per dataset")]
    wrist_cameras: Option<usize>,

    #[arg(long, help = "Do not load depth observations")]
    no_depth: bool,

    #[arg(long, help = "Do not load proprioceptive state")]
    no_proprio: bool,

    #[arg(long, help = "Print the resolved mixture as JSON")]
    json: bool,
}

impl Args {
    fn apply_overrides(&self, options: &mut ResolveOptions) {
        if self.no_dedup {
            options.deduplicate = false;
        }
        if let Some(n) = self.third_person_cameras {
            options.n_third_person_cameras = n;
        }
        if let Some(n) = self.wrist_cameras {
            options.n_wrist_cameras = n;
        }
        if self.no_depth {
            options.load_depth = false;
        }
        if self.no_proprio {
            options.load_proprio = false;
        }
    }

    fn into_config(self) -> Result<MixtureConfig> {
        let mut config = match &self.config {
            Some(path) => MixtureConfig::from_path(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => {
                let (Some(mix), Some(registry), Some(data_dir)) =
                    (self.mix.clone(), self.registry.clone(), self.data_dir.clone())
                else {
                    bail!("either --config or all of --mix, --registry and --data-dir are required");
                };
                let config = MixtureConfig {
                    mix: MixSource::Named(mix),
                    data_dir,
                    registry,
                    options: ResolveOptions::default(),
                };
                config.validate()?;
                config
            }
        };
        self.apply_overrides(&mut config.options);
        Ok(config)
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let json = args.json;
    let config = args.into_config()?;

    let registry = StaticRegistry::from_path(&config.registry)
        .with_context(|| format!("loading registry {}", config.registry.display()))?;
    let entries = config.mix.entries()?;
    let resolved = resolve(&entries, &config.data_dir, &registry, &config.options)?;

    for skipped in &resolved.skipped {
        eprintln!("{skipped}");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
    } else {
        print!("{}", format_mixture(&resolved));
    }
    Ok(())
}
