//! Built-in plugins
//!
//! 바이너리에 정적으로 링크되는 플러그인. 디스크의 디스크립터 없이 항상 발견됩니다.

use async_trait::async_trait;
use extsys_core::plugin::{PluginTestCase, StaticPlugin};
use extsys_core::{
    Error, Plugin, PluginContext, PluginManager, PoolObjectBuilder, Result, ShutdownFlag,
    ShutdownNotifier,
};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const CORE_METADATA: &str = r#"{
    "name": "Core",
    "version": "0.1.0",
    "compatVersion": "0.1.0",
    "vendor": "extsys",
    "category": "Core",
    "required": true,
    "description": "Host services shared by every plugin",
    "arguments": [
        { "name": "-banner", "parameter": "text", "description": "Banner printed at startup" }
    ]
}"#;

const WELCOME_METADATA: &str = r#"{
    "name": "Welcome",
    "version": "0.1.0",
    "vendor": "extsys",
    "category": "Utilities",
    "description": "Prints the banners registered by other plugins",
    "dependencies": [
        { "name": "Core", "version": "0.1.0" }
    ]
}"#;

/// 오브젝트 풀에 등록되는 확장 지점
pub trait Banner: Send + Sync {
    fn text(&self) -> String;
}

struct TextBanner(String);

impl Banner for TextBanner {
    fn text(&self) -> String {
        self.0.clone()
    }
}

/// 정적 플러그인 등록
pub fn register(manager: &PluginManager) {
    manager.add_static_plugin(StaticPlugin::new(CORE_METADATA, || {
        Arc::new(CorePlugin) as Arc<dyn Plugin>
    }));
    manager.add_static_plugin(StaticPlugin::new(WELCOME_METADATA, || {
        Arc::new(WelcomePlugin) as Arc<dyn Plugin>
    }));
}

// ============================================================================
// Core
// ============================================================================

struct CorePlugin;

#[async_trait]
impl Plugin for CorePlugin {
    async fn initialize(&self, ctx: &PluginContext, arguments: &[String]) -> Result<()> {
        let banner = match arguments {
            [flag, text, ..] if flag == "-banner" => text.clone(),
            _ => format!("extsys {}", env!("CARGO_PKG_VERSION")),
        };
        ctx.add_object(
            PoolObjectBuilder::new("core.banner").with::<dyn Banner>(Arc::new(TextBanner(banner))),
        );
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Welcome
// ============================================================================

struct WelcomePlugin;

#[async_trait]
impl Plugin for WelcomePlugin {
    async fn initialize(&self, _ctx: &PluginContext, _arguments: &[String]) -> Result<()> {
        Ok(())
    }

    async fn extensions_initialized(&self, ctx: &PluginContext) {
        for banner in ctx.object_pool().get_objects::<dyn Banner>() {
            info!("{}", banner.text());
        }
    }

    async fn delayed_initialize(&self, ctx: &PluginContext) -> bool {
        info!("{} objects in the plugin pool", ctx.object_pool().len());
        false
    }

    async fn about_to_shutdown(
        &self,
        _ctx: &PluginContext,
        notifier: ShutdownNotifier,
    ) -> ShutdownFlag {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            notifier.finished();
        });
        ShutdownFlag::Asynchronous
    }

    fn test_cases(&self) -> Vec<PluginTestCase> {
        vec![PluginTestCase::new(
            "testBannerText",
            |tag: Option<&str>| {
                let text = tag.unwrap_or("extsys");
                let banner = TextBanner(text.to_string());
                if banner.text() == text {
                    Ok(())
                } else {
                    Err(Error::Validation(format!("unexpected banner {}", banner.text())))
                }
            },
        )
        .with_data("default")
        .with_data("custom")]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
