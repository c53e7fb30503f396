//! Testing - 플러그인 테스트 실행 및 시나리오
//!
//! `-test <plugin>[,func[:data]]` 로 요청된 테스트를 실행하고,
//! `-scenario <id>` 로 요청된 시나리오를 한 번 실행합니다.

use super::spec::{PluginSpec, PluginState, SpecId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

// ============================================================================
// TestSpec
// ============================================================================

/// 테스트 요청 (플러그인 + 선택된 함수 목록)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSpec {
    pub spec: SpecId,

    /// `func` 또는 `func:data` (비어 있으면 전체)
    pub functions: Vec<String>,
}

impl TestSpec {
    pub fn new(spec: SpecId) -> Self {
        Self {
            spec,
            functions: Vec::new(),
        }
    }
}

/// 테스트 실행. 실패한 테스트 수 반환
pub fn run_tests(specs: &[Arc<PluginSpec>], tests: &[TestSpec]) -> usize {
    let mut failed = 0;

    for test in tests {
        let spec = &specs[test.spec.0];
        let Some(plugin) = spec.plugin().filter(|_| spec.state() == PluginState::Running) else {
            warn!("Plugin {} is not running, cannot run its tests", spec.name());
            failed += 1;
            continue;
        };

        let cases = plugin.test_cases();
        let selected: Vec<(String, Option<String>)> = if test.functions.is_empty() {
            cases.iter().map(|c| (c.name.clone(), None)).collect()
        } else {
            test.functions
                .iter()
                .map(|f| match f.split_once(':') {
                    Some((name, data)) => (name.to_string(), Some(data.to_string())),
                    None => (f.clone(), None),
                })
                .collect()
        };

        for (name, data) in selected {
            let Some(case) = cases.iter().find(|c| c.name == name) else {
                warn!("{}: unknown test function {}", spec.name(), name);
                failed += 1;
                continue;
            };

            let tags: Vec<Option<&str>> = match (&data, case.data_tags.is_empty()) {
                (Some(tag), _) => vec![Some(tag.as_str())],
                (None, true) => vec![None],
                (None, false) => case.data_tags.iter().map(|t| Some(t.as_str())).collect(),
            };

            for tag in tags {
                let label = match tag {
                    Some(tag) => format!("{}::{}({})", spec.name(), case.name, tag),
                    None => format!("{}::{}", spec.name(), case.name),
                };
                match catch_unwind(AssertUnwindSafe(|| (case.run)(tag))) {
                    Ok(Ok(())) => info!("PASS   : {}", label),
                    Ok(Err(e)) => {
                        warn!("FAIL!  : {}: {}", label, e);
                        failed += 1;
                    }
                    Err(_) => {
                        warn!("FAIL!  : {}: test panicked", label);
                        failed += 1;
                    }
                }
            }
        }
    }

    info!("Tests finished, {} failed", failed);
    failed
}

// ============================================================================
// Scenarios
// ============================================================================

/// 시나리오 함수 (성공 여부 반환)
pub type ScenarioFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// 시나리오 레지스트리
#[derive(Default)]
pub struct ScenarioRegistry {
    scenarios: Mutex<HashMap<String, ScenarioFn>>,
    requested: Mutex<Option<String>>,
    running: AtomicBool,
    finished: AtomicBool,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 시나리오 등록. 같은 id가 이미 있으면 false
    pub fn register(&self, id: &str, scenario: ScenarioFn) -> bool {
        let mut scenarios = self.scenarios.lock();
        if scenarios.contains_key(id) {
            warn!("Can't register scenario \"{}\" as it's already registered", id);
            return false;
        }
        scenarios.insert(id.to_string(), scenario);
        true
    }

    /// 실행할 시나리오 요청 (한 번만 가능)
    pub fn request(&self, id: &str) -> Result<(), String> {
        let mut requested = self.requested.lock();
        if let Some(existing) = requested.as_ref() {
            return Err(format!(
                "Cannot request scenario \"{}\" as it was already requested.",
                existing
            ));
        }
        *requested = Some(id.to_string());
        Ok(())
    }

    pub fn requested(&self) -> Option<String> {
        self.requested.lock().clone()
    }

    /// 요청된 시나리오 실행
    pub fn run(&self) -> bool {
        if self.finished.load(Ordering::Acquire) {
            warn!("Scenario has already finished. Can't run it again.");
            return false;
        }
        let Some(id) = self.requested() else {
            return false;
        };
        let Some(scenario) = self.scenarios.lock().get(&id).cloned() else {
            warn!("Requested scenario \"{}\" is not registered", id);
            return false;
        };

        info!("Running scenario \"{}\"", id);
        self.running.store(true, Ordering::Release);
        scenario()
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.running.load(Ordering::Acquire) && self.requested().as_deref() == Some(id)
    }

    /// 시나리오 종료 표시. 실행 중이 아니면 false
    pub fn finish(&self) -> bool {
        if !self.running.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.finished.store(true, Ordering::Release);
        true
    }
}
