//! Enablement - 활성화 폐포 계산
//!
//! 사용자가 켠 플러그인이 필요로 하는 플러그인을 간접 활성화하고,
//! 의존 관계 질의(누가 나를 필요로 하는가 등)를 제공합니다.
//! 모두 해석이 끝난 그래프(`dependency_specs`) 위에서 동작합니다.

use super::metadata::DependencyKind;
use super::spec::{PluginSpec, SpecId};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// 간접 활성화 재계산
///
/// 실효 활성화된 스펙의 Required 의존성(테스트 대상이면 Test 의존성 포함)을 BFS로 따라가며
/// `enabled_indirectly` 를 설정합니다. 호출할 때마다 처음부터 다시 계산합니다.
pub fn enable_dependencies_indirectly(specs: &[Arc<PluginSpec>], tested: &HashSet<SpecId>) {
    for spec in specs {
        spec.set_enabled_indirectly(false);
    }

    let mut queue: VecDeque<SpecId> = specs
        .iter()
        .filter(|s| s.is_effectively_enabled())
        .map(|s| s.id())
        .collect();

    while let Some(id) = queue.pop_front() {
        let spec = &specs[id.0];
        let under_test = tested.contains(&id);

        for dep in spec.dependency_specs() {
            let follow = match dep.dependency.kind {
                DependencyKind::Required => true,
                DependencyKind::Test => under_test,
                DependencyKind::Optional => false,
            };
            if !follow {
                continue;
            }

            let target = &specs[dep.spec.0];
            if !target.is_effectively_enabled() {
                debug!("{} enabled indirectly by {}", target.name(), spec.name());
                target.set_enabled_indirectly(true);
                queue.push_back(dep.spec);
            }
        }
    }
}

/// `id` 를 켜기 위해 함께 켜야 하는 스펙 (Required + 추천, 자기 자신 제외)
pub fn plugins_to_enable_for_plugin(specs: &[Arc<PluginSpec>], id: SpecId) -> Vec<SpecId> {
    let mut seen = HashSet::from([id]);
    let mut queue = VecDeque::from([id]);
    let mut result = Vec::new();

    while let Some(current) = queue.pop_front() {
        let spec = &specs[current.0];
        let required = spec
            .dependency_specs()
            .into_iter()
            .filter(|d| d.dependency.kind == DependencyKind::Required)
            .map(|d| d.spec);
        let next: Vec<SpecId> = required.chain(spec.recommended_specs()).collect();

        for target in next {
            if seen.insert(target) {
                result.push(target);
                queue.push_back(target);
            }
        }
    }

    result
}

/// `id` 가 (직간접적으로) Required로 의존하는 스펙 (자기 자신 제외)
pub fn plugins_required_by_plugin(specs: &[Arc<PluginSpec>], id: SpecId) -> Vec<SpecId> {
    let mut seen = HashSet::from([id]);
    let mut queue = VecDeque::from([id]);
    let mut result = Vec::new();

    while let Some(current) = queue.pop_front() {
        for dep in specs[current.0].dependency_specs() {
            if dep.dependency.kind == DependencyKind::Required && seen.insert(dep.spec) {
                result.push(dep.spec);
                queue.push_back(dep.spec);
            }
        }
    }

    result
}

/// `id` 를 (직간접적으로) Required로 필요로 하는 스펙 (자기 자신 제외)
///
/// `order` 는 로드 큐 순서이며, 결과도 그 순서를 따릅니다.
pub fn plugins_requiring_plugin(
    specs: &[Arc<PluginSpec>],
    order: &[SpecId],
    id: SpecId,
) -> Vec<SpecId> {
    let mut requiring = HashSet::from([id]);
    let mut result = Vec::new();

    loop {
        let mut changed = false;
        for candidate in order {
            if requiring.contains(candidate) {
                continue;
            }
            if specs[candidate.0].requires_any(&requiring) {
                requiring.insert(*candidate);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    for candidate in order {
        if *candidate != id && requiring.contains(candidate) {
            result.push(*candidate);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::metadata::{PluginDependency, PluginMetaData};
    use crate::plugin::resolver::tests::specs;
    use crate::plugin::resolver::DependencyResolver;
    use crate::plugin::scheduler::load_queue;

    /// Core ← Editor ← Git, Git는 Diff를 추천, Help는 독립
    fn graph() -> Vec<Arc<PluginSpec>> {
        let set = specs(vec![
            PluginMetaData::new("Core", "1.0"),
            PluginMetaData::new("Editor", "1.0").with_dependency(PluginDependency::new("Core", "1.0")),
            PluginMetaData::new("Git", "1.0")
                .with_dependency(PluginDependency::new("Editor", "1.0"))
                .with_recommends("Diff"),
            PluginMetaData::new("Diff", "1.0"),
            PluginMetaData::new("Help", "1.0")
                .with_dependency(PluginDependency::new("Core", "1.0").optional()),
        ]);
        DependencyResolver::new(&set, &HashSet::new()).resolve();
        set
    }

    #[test]
    fn test_enable_closure() {
        let set = graph();
        for spec in &set {
            spec.set_enabled_by_settings(false);
        }
        set[2].set_enabled_by_settings(true);

        enable_dependencies_indirectly(&set, &HashSet::new());

        let enabled: Vec<&str> = set
            .iter()
            .filter(|s| s.is_effectively_enabled())
            .map(|s| s.name())
            .collect();
        assert_eq!(enabled, vec!["Core", "Editor", "Git"]);
        assert!(set[0].is_enabled_indirectly());
        assert!(!set[2].is_enabled_indirectly());
    }

    #[test]
    fn test_enable_closure_recomputes() {
        let set = graph();
        set[0].set_enabled_by_settings(false);
        enable_dependencies_indirectly(&set, &HashSet::new());
        assert!(set[0].is_enabled_indirectly());

        for spec in &set[1..] {
            spec.set_enabled_by_settings(false);
        }
        enable_dependencies_indirectly(&set, &HashSet::new());
        assert!(!set[0].is_enabled_indirectly());
        assert!(!set[0].is_effectively_enabled());
    }

    #[test]
    fn test_plugins_to_enable() {
        let set = graph();
        let ids = plugins_to_enable_for_plugin(&set, SpecId(2));
        assert_eq!(ids, vec![SpecId(1), SpecId(3), SpecId(0)]);
    }

    #[test]
    fn test_required_by_and_requiring() {
        let set = graph();
        assert_eq!(plugins_required_by_plugin(&set, SpecId(2)), vec![SpecId(1), SpecId(0)]);

        let order = load_queue(&set);
        // Help는 Optional이므로 제외
        assert_eq!(
            plugins_requiring_plugin(&set, &order, SpecId(0)),
            vec![SpecId(1), SpecId(2)]
        );
        assert!(plugins_requiring_plugin(&set, &order, SpecId(4)).is_empty());
    }
}
