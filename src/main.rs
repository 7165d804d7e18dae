use anyhow::{Result, bail};
use api_console::analyzer::EndpointAnalyzer;
use api_console::cli;
use api_console::config::Settings;
use api_console::document::SourceDocument;
use api_console::project::ProjectConfigCache;
use api_console::scan::{self, ScanOptions};
use api_console::server::{self, ServeOptions};
use api_console::session::{Session, SessionOptions};
use clap::Parser;
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "API_CONSOLE_LOG";

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_logging();
    let args = cli::Args::parse();

    match args.command {
        cli::Command::Scan {
            workspace,
            no_ignore,
        } => {
            let settings = Settings::load(&workspace);
            let analyzer = EndpointAnalyzer::from_settings(&settings);
            let reports = scan::scan_workspace(&workspace, &analyzer, ScanOptions::new(no_ignore));
            println!("{}", serde_json::to_string_pretty(&reports)?);
            Ok(())
        }
        cli::Command::Detect {
            file,
            line,
            workspace,
        } => {
            if line == 0 {
                bail!("--line is 1-based");
            }
            let settings = Settings::load(&workspace);
            let analyzer = EndpointAnalyzer::from_settings(&settings);
            let document = SourceDocument::open(&file)?;
            match analyzer.detect_endpoint(&document, line - 1) {
                Ok(endpoint) => println!("{}", serde_json::to_string_pretty(&endpoint)?),
                Err(miss) => println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({ "endpoint": null, "reason": miss.to_string() }))?
                ),
            }
            Ok(())
        }
        cli::Command::BaseUrl { file } => {
            let cache = ProjectConfigCache::new();
            let base_url = cache.resolve_base_url(&file);
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "projectDir": cache.project_dir(&file),
                    "baseUrl": base_url,
                }))?
            );
            Ok(())
        }
        cli::Command::Serve {
            workspace,
            watch,
            no_state,
        } => {
            let session = Arc::new(Session::open(&workspace, SessionOptions { no_state })?);
            server::serve(session, ServeOptions { watch })
        }
    }
}
