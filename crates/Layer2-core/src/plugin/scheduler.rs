//! Load Order Scheduler - 로드 순서 계산
//!
//! Resolved 이상 스펙을 의존 대상이 먼저 오도록 정렬합니다 (DFS 후위 순서).
//! 같은 입력이면 항상 같은 순서입니다: 루트는 발견 순서, 자식은 선언 순서로 방문합니다.

use super::metadata::DependencyKind;
use super::spec::{PluginSpec, PluginState, SpecId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// 로드 큐 계산
///
/// Required/Optional 간선은 항상 지켜집니다. Test 간선은 그 순서와 충돌하지 않을 때만
/// 따라갑니다. Required/Optional 순환은 해석 단계에서 이미 제외되었으므로 여기서는
/// 나타나지 않습니다.
pub fn load_queue(specs: &[Arc<PluginSpec>]) -> Vec<SpecId> {
    let mut scheduler = Scheduler {
        specs,
        visited: HashSet::new(),
        on_stack: HashSet::new(),
        queue: Vec::with_capacity(specs.len()),
    };

    for spec in specs {
        scheduler.visit(spec.id());
    }

    debug!(
        "Load queue: {}",
        scheduler
            .queue
            .iter()
            .map(|id| specs[id.0].name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    scheduler.queue
}

struct Scheduler<'a> {
    specs: &'a [Arc<PluginSpec>],
    visited: HashSet<SpecId>,
    on_stack: HashSet<SpecId>,
    queue: Vec<SpecId>,
}

impl Scheduler<'_> {
    fn visit(&mut self, id: SpecId) {
        if self.visited.contains(&id) || self.on_stack.contains(&id) {
            return;
        }
        let spec = &self.specs[id.0];
        if spec.state() < PluginState::Resolved {
            return;
        }

        self.on_stack.insert(id);
        for dep in spec.dependency_specs() {
            if dep.dependency.kind == DependencyKind::Test && self.reaches_stack(dep.spec) {
                debug!(
                    "Ignoring test dependency {} -> {} for load order",
                    spec.name(),
                    self.specs[dep.spec.0].name()
                );
                continue;
            }
            self.visit(dep.spec);
        }
        self.on_stack.remove(&id);

        self.visited.insert(id);
        self.queue.push(id);
    }

    /// `from` 에서 Required/Optional 간선만으로 현재 방문 중인 스펙에 닿는지
    ///
    /// 닿는다면 그 Test 간선을 따르는 순간 방문 중인 스펙이 의존 대상보다 먼저 큐에 들어갑니다.
    fn reaches_stack(&self, from: SpecId) -> bool {
        let mut seen = HashSet::new();
        let mut pending = vec![from];
        while let Some(id) = pending.pop() {
            if self.on_stack.contains(&id) {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            let spec = &self.specs[id.0];
            if spec.state() < PluginState::Resolved {
                continue;
            }
            pending.extend(
                spec.dependency_specs()
                    .into_iter()
                    .filter(|d| d.dependency.kind != DependencyKind::Test)
                    .map(|d| d.spec),
            );
        }
        false
    }
}
