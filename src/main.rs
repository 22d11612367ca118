use clap::Parser;
use scholar_pipeline::core::export::export_bundle;
use scholar_pipeline::core::pipeline_sequence::ProgressReporter;
use scholar_pipeline::domain::model::{DocumentRequest, ProgressStatus};
use scholar_pipeline::domain::ports::Storage;
use scholar_pipeline::utils::error::ErrorSeverity;
use scholar_pipeline::utils::text::slugify;
use scholar_pipeline::utils::{logger, validation::Validate};
use scholar_pipeline::{app, AppConfig, CliConfig, Command, DocumentPipeline, LocalStorage};
use scholar_pipeline::{Result, ScholarError};

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // 先載入配置才知道日誌格式
    let app_config = cli.load_app_config();
    let log_format = app_config
        .as_ref()
        .map(|c| c.monitoring.log_format.clone())
        .unwrap_or_else(|_| "compact".to_string());
    logger::init_logger(&log_format, cli.verbose);

    tracing::info!("Starting scholar-pipeline CLI");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let outcome = match app_config {
        Ok(app_config) => run(cli, app_config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = outcome {
        // 記錄詳細錯誤信息
        tracing::error!(
            "❌ scholar-pipeline failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match e.severity() {
            ErrorSeverity::Low => 4,      // 輸入錯誤
            ErrorSeverity::Medium => 2,   // 上游錯誤，可重試
            ErrorSeverity::High => 1,     // 處理錯誤
            ErrorSeverity::Critical => 3, // 配置或系統錯誤
        };
        std::process::exit(exit_code);
    }
}

async fn run(cli: CliConfig, app_config: AppConfig) -> Result<()> {
    // 驗證配置
    app_config.validate()?;

    if app_config.monitoring_enabled() {
        tracing::info!("🔍 System monitoring enabled");
    }

    match cli.command {
        Command::Serve { .. } => app::serve(&app_config).await,
        Command::Generate {
            prompt,
            topic,
            urls,
            sections,
            language,
            ..
        } => {
            let request = DocumentRequest {
                prompt,
                topic,
                urls,
                language,
                max_sources: None,
                sections,
            };
            generate(&app_config, request).await
        }
    }
}

async fn generate(app_config: &AppConfig, request: DocumentRequest) -> Result<()> {
    let pipeline = DocumentPipeline::from_config(app_config)?;
    let execution_id = uuid::Uuid::new_v4().to_string();

    // 進度直接印到終端
    let (reporter, mut events) = ProgressReporter::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event.status {
                ProgressStatus::Started => {}
                ProgressStatus::Warning => println!("   ⚠️ {}", event.message),
                ProgressStatus::Failed => println!("[{:>3}%] ❌ {}", event.percent, event.message),
                _ => println!("[{:>3}%] {}", event.percent, event.message),
            }
        }
    });

    let outcome = pipeline.run(&execution_id, request, reporter).await;
    printer.await.map_err(|e| ScholarError::ProcessingError {
        message: format!("progress printer failed: {}", e),
    })?;
    let run = outcome?;

    let storage = LocalStorage::new(app_config.pipeline.output_path.clone());
    let slug = slugify(&run.document.title);
    let markdown_path = format!("{}.md", slug);
    let bundle_path = format!("{}.zip", slug);

    storage
        .write_file(&markdown_path, run.document.to_markdown().as_bytes())
        .await?;
    let bundle = export_bundle(&run.document, Some(&run.outline), &run.summaries)?;
    storage.write_file(&bundle_path, &bundle).await?;

    if !run.document.warnings.is_empty() {
        tracing::warn!(
            "⚠️ Document generated with {} warning(s)",
            run.document.warnings.len()
        );
    }

    tracing::info!("✅ Document generated: {}", run.document.title);
    println!("✅ Document generated: {}", run.document.title);
    println!("📁 Output saved to: {}", storage.full_path(&markdown_path));
    println!("📦 Bundle saved to: {}", storage.full_path(&bundle_path));
    Ok(())
}
