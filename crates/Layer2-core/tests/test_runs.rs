//! 테스트 실행 / 로드 순서 / 풀 이벤트 테스트
//!
//! `-test` 로 선택한 테스트 함수 실행, Test 의존성이 로드 순서를 깨지 않는지,
//! 오브젝트 풀 이벤트가 이벤트 버스 히스토리에 남는지 검증합니다.

use async_trait::async_trait;
use extsys_core::plugin::{
    EventType, Plugin, PluginContext, PluginManager, PluginState, PluginTestCase,
    PoolObjectBuilder, StaticPlugin,
};
use extsys_core::{Error, Result};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

const SUITE_JSON: &str = r#"{ "name": "Suite", "version": "1.0.0" }"#;
const BROKEN_JSON: &str = r#"{ "name": "Broken", "version": "1.0.0" }"#;

/// 테스트 케이스 호출을 기록하는 플러그인
struct SuitePlugin {
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Plugin for SuitePlugin {
    async fn initialize(&self, _ctx: &PluginContext, _arguments: &[String]) -> Result<()> {
        Ok(())
    }

    fn test_cases(&self) -> Vec<PluginTestCase> {
        let check_log = self.log.clone();
        let plain_log = self.log.clone();
        vec![
            PluginTestCase::new("check", move |tag: Option<&str>| {
                let tag = tag.unwrap_or("none");
                check_log.lock().push(format!("check({})", tag));
                if tag == "broken" {
                    Err(Error::Validation("broken data".into()))
                } else {
                    Ok(())
                }
            })
            .with_data("alpha")
            .with_data("beta"),
            PluginTestCase::new("plain", move |_tag: Option<&str>| {
                plain_log.lock().push("plain".to_string());
                Ok(())
            }),
            PluginTestCase::new("explode", |_tag: Option<&str>| -> Result<()> {
                panic!("test case exploded")
            }),
        ]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct BrokenPlugin;

#[async_trait]
impl Plugin for BrokenPlugin {
    async fn initialize(&self, _ctx: &PluginContext, _arguments: &[String]) -> Result<()> {
        Err(Error::Plugin("Broken refused to start".into()))
    }

    fn test_cases(&self) -> Vec<PluginTestCase> {
        vec![PluginTestCase::new("never", |_tag: Option<&str>| Ok(()))]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct Idle;

#[async_trait]
impl Plugin for Idle {
    async fn initialize(&self, _ctx: &PluginContext, _arguments: &[String]) -> Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn setup() -> (PluginManager, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let manager = PluginManager::new();
    let suite_log = log.clone();
    manager.add_static_plugin(StaticPlugin::new(SUITE_JSON, move || {
        Arc::new(SuitePlugin {
            log: suite_log.clone(),
        }) as Arc<dyn Plugin>
    }));
    manager.add_static_plugin(StaticPlugin::new(BROKEN_JSON, || {
        Arc::new(BrokenPlugin) as Arc<dyn Plugin>
    }));
    manager.resolve_dependencies();
    (manager, log)
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

async fn run(manager: &PluginManager, options: &[&str]) -> usize {
    manager
        .parse_options(&args(options), &BTreeMap::new())
        .unwrap();
    assert!(manager.test_run_requested());
    manager.load_plugins().await;
    manager.run_tests().await
}

#[tokio::test]
async fn test_selected_function_and_data_tag() {
    let (manager, log) = setup();

    let failed = run(&manager, &["-test", "Suite,check:alpha,plain"]).await;

    assert_eq!(failed, 0);
    assert_eq!(*log.lock(), vec!["check(alpha)", "plain"]);

    let finished = manager
        .event_bus()
        .history_by_type(EventType::TestsFinished);
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].data["failed"], 0);
}

#[tokio::test]
async fn test_data_tags_expand_and_unknown_function_fails() {
    let (manager, log) = setup();

    let failed = run(&manager, &["-test", "Suite,check,missing"]).await;

    assert_eq!(failed, 1);
    assert_eq!(*log.lock(), vec!["check(alpha)", "check(beta)"]);
    let finished = manager
        .event_bus()
        .history_by_type(EventType::TestsFinished);
    assert_eq!(finished[0].data["failed"], 1);
}

#[tokio::test]
async fn test_explicit_tag_failure_is_counted() {
    let (manager, log) = setup();

    let failed = run(&manager, &["-test", "Suite,check:broken"]).await;

    assert_eq!(failed, 1);
    assert_eq!(*log.lock(), vec!["check(broken)"]);
}

#[tokio::test]
async fn test_panicking_case_counts_as_failure() {
    let (manager, log) = setup();

    let failed = run(&manager, &["-test", "Suite"]).await;

    // check(alpha), check(beta), plain 통과 / explode 실패
    assert_eq!(failed, 1);
    assert_eq!(*log.lock(), vec!["check(alpha)", "check(beta)", "plain"]);
    assert_eq!(
        manager.plugin_by_name("Suite").unwrap().state(),
        PluginState::Running
    );
}

#[tokio::test]
async fn test_plugin_not_running_fails_its_tests() {
    let (manager, _log) = setup();

    let failed = run(&manager, &["-test", "Broken"]).await;

    assert_eq!(failed, 1);
    let broken = manager.plugin_by_name("Broken").unwrap();
    assert!(broken.has_error());
    assert_ne!(broken.state(), PluginState::Running);
}

#[tokio::test]
async fn test_test_dependency_does_not_break_required_order() {
    // A 는 B 를 Test 의존성으로 갖고, B 는 A 를 필요로 함
    const A_JSON: &str = r#"{
        "name": "A",
        "version": "1.0.0",
        "dependencies": [{ "name": "B", "version": "1.0.0", "type": "test" }]
    }"#;
    const B_JSON: &str = r#"{
        "name": "B",
        "version": "1.0.0",
        "dependencies": [{ "name": "A", "version": "1.0.0" }]
    }"#;

    let manager = PluginManager::new();
    manager.add_static_plugin(StaticPlugin::new(A_JSON, || Arc::new(Idle) as Arc<dyn Plugin>));
    manager.add_static_plugin(StaticPlugin::new(B_JSON, || Arc::new(Idle) as Arc<dyn Plugin>));
    manager.resolve_dependencies();
    manager
        .parse_options(&args(&["-test", "A"]), &BTreeMap::new())
        .unwrap();

    let queue: Vec<String> = manager
        .load_queue()
        .iter()
        .map(|s| s.name().to_string())
        .collect();
    assert_eq!(queue, vec!["A", "B"]);

    manager.load_plugins().await;
    for name in ["A", "B"] {
        let spec = manager.plugin_by_name(name).unwrap();
        assert!(!spec.has_error(), "{}: {:?}", name, spec.error_string());
        assert_eq!(spec.state(), PluginState::Running);
    }
}

#[tokio::test]
async fn test_pool_events_are_recorded_on_the_bus() {
    let manager = PluginManager::new();

    let id = manager
        .object_pool()
        .add_object(PoolObjectBuilder::new("shared.value").with(Arc::new(7u32)));
    manager.object_pool().remove_object(id);

    let bus = manager.event_bus();
    let added = bus.history_by_type(EventType::ObjectAdded);
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].data["name"], "shared.value");
    assert_eq!(bus.history_by_type(EventType::AboutToRemoveObject).len(), 1);
}
