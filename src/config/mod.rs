#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

pub use toml_config::AppConfig;

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "scholar-pipeline")]
#[command(about = "Generate academic-style documents from web sources with an LLM")]
pub struct CliConfig {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "SCHOLAR_CONFIG")]
    pub config: Option<String>,

    /// Overrides [llm].api_key
    #[arg(long, env = "SCHOLAR_LLM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log process CPU and memory usage during generation")]
    pub monitor: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Start the HTTP API server
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run the document pipeline once and write the result to disk
    Generate {
        /// Free-text description of the document to write
        prompt: String,

        /// Skip topic detection and use this topic
        #[arg(long)]
        topic: Option<String>,

        /// Use these pages as sources instead of searching the web
        #[arg(long = "url")]
        urls: Vec<String>,

        #[arg(long)]
        sections: Option<usize>,

        #[arg(long)]
        language: Option<String>,

        #[arg(short, long)]
        output: Option<String>,
    },
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// 載入 TOML（若有指定）並套用命令列覆寫
    pub fn load_app_config(&self) -> crate::utils::error::Result<AppConfig> {
        let mut app_config = match &self.config {
            Some(path) => AppConfig::from_file(path)?,
            None => AppConfig::from_toml_str("")?,
        };

        if let Some(api_key) = &self.api_key {
            app_config.llm.api_key = api_key.clone();
        }
        if self.monitor {
            app_config.pipeline.monitor = true;
        }
        match &self.command {
            Command::Serve { bind: Some(bind) } => app_config.server.bind = bind.clone(),
            Command::Generate {
                output: Some(output),
                ..
            } => app_config.pipeline.output_path = output.clone(),
            _ => {}
        }

        Ok(app_config)
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generate_command() {
        let cli = CliConfig::try_parse_from([
            "scholar-pipeline",
            "--api-key",
            "secret",
            "generate",
            "Write about urban heat islands",
            "--url",
            "https://example.org/a",
            "--url",
            "https://example.org/b",
            "--output",
            "/tmp/out",
        ])
        .unwrap();

        let config = cli.load_app_config().unwrap();
        assert_eq!(config.llm.api_key, "secret");
        assert_eq!(config.pipeline.output_path, "/tmp/out");
        match cli.command {
            Command::Generate { urls, prompt, .. } => {
                assert_eq!(urls.len(), 2);
                assert!(prompt.contains("heat islands"));
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_serve_bind_override() {
        let cli = CliConfig::try_parse_from(["scholar-pipeline", "serve", "--bind", "0.0.0.0:9000"])
            .unwrap();
        let config = cli.load_app_config().unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
    }
}
