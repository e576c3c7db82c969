use config::Config;
use lazy_static::lazy_static;
use serde::Deserialize;
use std::{env, path::Path};

/// One entry in the category table the system prompt is rendered from.
#[derive(Debug, Clone, Deserialize)]
pub struct Category {
    pub code: u8,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    pub temperature: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntakeConfig {
    /// Channels processed per request file / batch submission.
    pub chunk_size: usize,
    /// Upper bound on uploads fetched per channel.
    pub max_videos: u32,
    /// Rendered video-title list is truncated to this many chars.
    pub prompt_char_budget: usize,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    model: ModelConfig,
    intake: IntakeConfig,
    categories: Vec<Category>,
}

#[derive(Debug)]
pub struct WorkerConfig {
    pub model: ModelConfig,
    pub intake: IntakeConfig,
    pub categories: Vec<Category>,
}

impl WorkerConfig {
    /// A zero chunk_size would panic `slice::chunks`, so clamp it to 1.
    fn from_file(cfg_file: ConfigFile) -> Self {
        let ConfigFile {
            model,
            mut intake,
            categories,
        } = cfg_file;
        intake.chunk_size = intake.chunk_size.max(1);

        WorkerConfig {
            model,
            intake,
            categories,
        }
    }
}

impl std::fmt::Display for WorkerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Worker Config:\nModel: {:?}\nIntake: {:?}\nCategories:\n{}",
            self.model,
            self.intake,
            self.categories
                .iter()
                .map(|c| format!("{}: {}", c.code, c.content))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}

lazy_static! {
    pub static ref cfg: WorkerConfig = {
        let root = env::var("APP_DIR").unwrap_or_else(|_| {
            let dir =
                env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR or APP_DIR is required");
            let dir = Path::new(&dir).parent().unwrap().display().to_string();
            format!("{}/config", dir)
        });
        let path = format!("{root}/config.toml");
        let cfg_file: ConfigFile = Config::builder()
            .add_source(config::File::with_name(&path))
            .build()
            .expect("config.toml is required")
            .try_deserialize()
            .expect("config.toml is invalid");

        WorkerConfig::from_file(cfg_file)
    };
}
