//! Plugin host run loop

use extsys_core::PluginManager;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

const HELP_OPTION: &str = "-help";
const VERSION_OPTION: &str = "-version";

/// `-trace <file>` 위치를 로깅 초기화 전에 미리 찾음
pub fn trace_file(plugin_args: &[String]) -> Option<PathBuf> {
    let mut iter = plugin_args.iter().take_while(|a| a.as_str() != "--");
    while let Some(arg) = iter.next() {
        if arg == extsys_core::plugin::TRACE_OPTION {
            return iter.next().map(PathBuf::from);
        }
    }
    None
}

/// 옵션 파싱 → 로드 → 지연 초기화 → (테스트 | 시나리오 | Ctrl-C 대기) → 종료
pub async fn run(
    manager: &PluginManager,
    plugin_args: &[String],
    exit_after_init: bool,
) -> anyhow::Result<()> {
    let app_options = BTreeMap::from([
        (HELP_OPTION.to_string(), false),
        (VERSION_OPTION.to_string(), false),
    ]);
    let parsed = manager.parse_options(plugin_args, &app_options)?;

    if parsed.found_app_options.contains_key(HELP_OPTION) {
        println!("Plugin manager options:");
        print!("{}", manager.format_options(4, 40));
        print!("{}", manager.format_plugin_options(4, 40));
        return Ok(());
    }
    if parsed.found_app_options.contains_key(VERSION_OPTION) {
        print!("{}", manager.format_plugin_versions());
        return Ok(());
    }
    if let Some(path) = &parsed.trace_file {
        info!("Writing trace output to {}", path.display());
    }

    manager.load_plugins().await;
    let errors = manager.all_errors();
    if !errors.is_empty() {
        eprintln!("Some plugins could not be loaded:");
        for error in &errors {
            eprintln!("  {}", error);
        }
    }

    manager.run_delayed_initialize().await;
    let summary = manager.summary();
    info!(
        "{} of {} plugins running ({} with errors)",
        summary.running, summary.total, summary.errors
    );

    let mut failure = None;
    if manager.test_run_requested() {
        let failed = manager.run_tests().await;
        if failed > 0 {
            failure = Some(anyhow::anyhow!("{} tests failed", failed));
        }
    } else if manager.is_scenario_requested() {
        if !manager.run_scenario() {
            failure = Some(anyhow::anyhow!("Scenario did not run successfully"));
        }
        manager.finish_scenario().await;
    } else if !exit_after_init {
        info!("Plugin host running, press Ctrl-C to exit");
        tokio::signal::ctrl_c().await?;
    }

    manager.shutdown().await;
    if let Err(e) = manager.write_settings() {
        warn!("Failed to write plugin settings: {}", e);
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
