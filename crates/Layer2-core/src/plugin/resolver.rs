//! Dependency Resolver - 의존성 그래프 해석
//!
//! Read 상태 스펙의 의존성 선언을 실제 스펙에 연결하고 Resolved로 승격합니다.
//! 전체 재계산 방식이라 여러 번 호출해도 같은 결과가 나옵니다.
//!
//! 1. 초기화: Resolved → Read, 해석 단계 에러 제거 (Loaded 이상은 건드리지 않음)
//! 2. 플랫폼 확인
//! 3. 의존성 매칭 (이름 대소문자 무시 + 호환 밴드)
//! 4. 순환 탐지 (Required + Optional 간선)
//! 5. 실패 전파 (고정점까지 반복)
//! 6. 살아남은 스펙 승격

use super::metadata::DependencyKind;
use super::spec::{host_platform_name, PluginErrorKind, PluginSpec, PluginState, ResolvedDependency, SpecId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// 의존성 해석기
pub struct DependencyResolver<'a> {
    specs: &'a [Arc<PluginSpec>],
    tested: &'a HashSet<SpecId>,
}

/// 실패 전파 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Blocked {
    /// 순환에 속하거나 순환에 의존 (Required/Optional 모두 전파)
    Cycle,
    /// 그 외 실패 (Required로만 전파)
    Failed,
}

/// 해석 대기 중인 스펙
struct Candidate {
    deps: Vec<ResolvedDependency>,
    recommends: Vec<SpecId>,
}

impl<'a> DependencyResolver<'a> {
    /// `tested` 에 포함된 스펙만 Test 의존성을 해석합니다.
    pub fn new(specs: &'a [Arc<PluginSpec>], tested: &'a HashSet<SpecId>) -> Self {
        Self { specs, tested }
    }

    /// 전체 해석. Resolved로 승격된 스펙 수 반환
    pub fn resolve(&self) -> usize {
        self.reset();
        self.check_platforms();

        let mut candidates = self.match_dependencies();
        let mut blocked: HashMap<SpecId, Blocked> = HashMap::new();

        for (members, message) in self.find_cycles(&candidates) {
            for id in members {
                self.spec(id)
                    .report_error(PluginErrorKind::DependencyCycle, message.clone());
                blocked.insert(id, Blocked::Cycle);
            }
        }

        self.propagate(&mut candidates, &mut blocked);

        let mut resolved = 0;
        for (id, candidate) in candidates {
            if blocked.contains_key(&id) {
                continue;
            }
            let spec = self.spec(id);
            spec.set_dependency_specs(candidate.deps, candidate.recommends);
            spec.set_state(PluginState::Resolved);
            resolved += 1;
        }

        debug!("Resolved {} of {} plugins", resolved, self.specs.len());
        resolved
    }

    fn spec(&self, id: SpecId) -> &Arc<PluginSpec> {
        &self.specs[id.0]
    }

    // ========================================================================
    // 1-2. 초기화 / 플랫폼
    // ========================================================================

    fn reset(&self) {
        for spec in self.specs {
            match spec.state() {
                PluginState::Read | PluginState::Resolved => {
                    spec.set_state(PluginState::Read);
                    spec.clear_resolution_error();
                    spec.set_dependency_specs(Vec::new(), Vec::new());
                }
                _ => {}
            }
        }
    }

    fn check_platforms(&self) {
        for spec in self.specs {
            if spec.state() == PluginState::Read
                && !spec.has_error()
                && !spec.is_available_for_host_platform()
            {
                spec.report_error(
                    PluginErrorKind::UnsupportedPlatform,
                    format!(
                        "Plugin is not available on this platform ({})",
                        host_platform_name()
                    ),
                );
            }
        }
    }

    // ========================================================================
    // 3. 매칭
    // ========================================================================

    fn match_dependencies(&self) -> Vec<(SpecId, Candidate)> {
        let mut candidates = Vec::new();

        for spec in self.specs {
            if spec.state() != PluginState::Read || spec.has_error() {
                continue;
            }

            let mut deps = Vec::new();
            let mut failures: Vec<(PluginErrorKind, String)> = Vec::new();
            let under_test = self.tested.contains(&spec.id());

            for dep in spec.dependencies() {
                if dep.kind == DependencyKind::Test && !under_test {
                    continue;
                }
                match self.find_provider(spec, &dep.name, &dep.version) {
                    Ok(target) => deps.push(ResolvedDependency {
                        dependency: dep.clone(),
                        spec: target,
                    }),
                    Err((kind, message)) => match dep.kind {
                        DependencyKind::Required => failures.push((kind, message)),
                        _ => debug!("{}: {} dependency not available: {}", spec.name(), dep.kind, message),
                    },
                }
            }

            if let Some((kind, _)) = failures.first() {
                let message = failures
                    .iter()
                    .map(|(_, m)| m.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                spec.report_error(*kind, message);
                continue;
            }

            let recommends = spec
                .metadata()
                .recommends
                .iter()
                .filter_map(|name| self.find_by_name(spec, name))
                .collect();

            candidates.push((spec.id(), Candidate { deps, recommends }));
        }

        candidates
    }

    /// 요구를 만족하는 후보 중 가장 진행된 스펙 (동률이면 선언 순서)
    fn find_provider(
        &self,
        dependent: &PluginSpec,
        name: &str,
        version: &str,
    ) -> Result<SpecId, (PluginErrorKind, String)> {
        let best = self
            .specs
            .iter()
            .filter(|s| s.id() != dependent.id() && s.state() != PluginState::Invalid)
            .filter(|s| s.provides(name, version))
            .min_by_key(|s| (s.has_error(), std::cmp::Reverse(s.state()), s.id()));

        if let Some(found) = best {
            return Ok(found.id());
        }

        let same_name: Vec<_> = self
            .specs
            .iter()
            .filter(|s| s.id() != dependent.id() && s.state() != PluginState::Invalid)
            .filter(|s| s.name().eq_ignore_ascii_case(name))
            .collect();

        if same_name.is_empty() {
            Err((
                PluginErrorKind::MissingRequiredDependency,
                format!("Could not resolve dependency '{}({})'", name, version),
            ))
        } else {
            let available = same_name
                .iter()
                .map(|s| format!("{} (compatible down to {})", s.version(), s.compat_version()))
                .collect::<Vec<_>>()
                .join(", ");
            Err((
                PluginErrorKind::IncompatibleVersion,
                format!(
                    "Could not resolve dependency '{}({})': available version {}",
                    name, version, available
                ),
            ))
        }
    }

    fn find_by_name(&self, dependent: &PluginSpec, name: &str) -> Option<SpecId> {
        self.specs
            .iter()
            .find(|s| {
                s.id() != dependent.id()
                    && s.state() != PluginState::Invalid
                    && s.name().eq_ignore_ascii_case(name)
            })
            .map(|s| s.id())
    }

    // ========================================================================
    // 4. 순환 탐지 (Tarjan SCC)
    // ========================================================================

    fn find_cycles(&self, candidates: &[(SpecId, Candidate)]) -> Vec<(Vec<SpecId>, String)> {
        let edges: HashMap<SpecId, Vec<SpecId>> = candidates
            .iter()
            .map(|(id, c)| {
                let targets = c
                    .deps
                    .iter()
                    .filter(|d| d.dependency.kind != DependencyKind::Test)
                    .map(|d| d.spec)
                    .collect();
                (*id, targets)
            })
            .collect();

        let mut tarjan = Tarjan::new(&edges);
        for (id, _) in candidates {
            tarjan.visit(*id);
        }

        tarjan
            .components
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || edges.get(&scc[0]).is_some_and(|t| t.contains(&scc[0]))
            })
            .map(|mut scc| {
                scc.sort();
                let message = self.cycle_message(&scc, &edges);
                warn!("{}", message.replace('\n', " "));
                (scc, message)
            })
            .collect()
    }

    /// 컴포넌트 안에서 가장 앞선 스펙으로 돌아오는 최단 경로
    fn cycle_message(&self, scc: &[SpecId], edges: &HashMap<SpecId, Vec<SpecId>>) -> String {
        let start = scc[0];
        let members: HashSet<SpecId> = scc.iter().copied().collect();
        let mut previous: HashMap<SpecId, SpecId> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        let mut last = start;

        'search: while let Some(node) = queue.pop_front() {
            for &next in edges.get(&node).into_iter().flatten() {
                if next == start {
                    last = node;
                    break 'search;
                }
                if members.contains(&next) && !previous.contains_key(&next) && next != start {
                    previous.insert(next, node);
                    queue.push_back(next);
                }
            }
        }

        let mut path = vec![start];
        let mut node = last;
        let mut tail = Vec::new();
        while node != start {
            tail.push(node);
            node = previous[&node];
        }
        path.extend(tail.into_iter().rev());
        path.push(start);

        let chain = path
            .iter()
            .map(|id| {
                let spec = self.spec(*id);
                format!("{} ({})", spec.name(), spec.version())
            })
            .collect::<Vec<_>>()
            .join(" depends on\n");
        format!("Circular dependency detected:\n{}", chain)
    }

    // ========================================================================
    // 5. 실패 전파
    // ========================================================================

    fn propagate(
        &self,
        candidates: &mut [(SpecId, Candidate)],
        blocked: &mut HashMap<SpecId, Blocked>,
    ) {
        let alive: HashSet<SpecId> = candidates.iter().map(|(id, _)| *id).collect();

        loop {
            let mut changed = false;

            for (id, candidate) in candidates.iter_mut() {
                if blocked.contains_key(id) {
                    continue;
                }

                let mut reason: Option<(Blocked, SpecId)> = None;
                candidate.deps.retain(|dep| {
                    if reason.is_some() {
                        return true;
                    }
                    let state = if alive.contains(&dep.spec) {
                        blocked.get(&dep.spec).copied()
                    } else if self.is_settled(dep.spec) {
                        None
                    } else {
                        Some(Blocked::Failed)
                    };
                    match (dep.dependency.kind, state) {
                        (_, None) => true,
                        (DependencyKind::Required, Some(kind)) => {
                            reason = Some((kind, dep.spec));
                            true
                        }
                        (DependencyKind::Optional, Some(Blocked::Cycle)) => {
                            reason = Some((Blocked::Cycle, dep.spec));
                            true
                        }
                        // 실패한 Optional/Test 대상은 연결만 끊음
                        _ => false,
                    }
                });

                if let Some((kind, target)) = reason {
                    let dependency = self.spec(target);
                    let message = format!(
                        "Cannot resolve plugin because dependency failed to resolve: {} ({})\nReason: {}",
                        dependency.name(),
                        dependency.version(),
                        dependency.error_string()
                    );
                    let error_kind = match kind {
                        Blocked::Cycle => PluginErrorKind::DependencyCycle,
                        Blocked::Failed => PluginErrorKind::MissingRequiredDependency,
                    };
                    self.spec(*id).report_error(error_kind, message);
                    blocked.insert(*id, kind);
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }
    }
}

impl DependencyResolver<'_> {
    /// 이미 Resolved를 넘어선 정상 스펙
    fn is_settled(&self, id: SpecId) -> bool {
        let (state, has_error) = self.spec(id).status();
        state > PluginState::Resolved && !has_error
    }
}

/// Tarjan 강연결요소
struct Tarjan<'e> {
    edges: &'e HashMap<SpecId, Vec<SpecId>>,
    index: usize,
    indices: HashMap<SpecId, usize>,
    lowlink: HashMap<SpecId, usize>,
    stack: Vec<SpecId>,
    on_stack: HashSet<SpecId>,
    components: Vec<Vec<SpecId>>,
}

impl<'e> Tarjan<'e> {
    fn new(edges: &'e HashMap<SpecId, Vec<SpecId>>) -> Self {
        Self {
            edges,
            index: 0,
            indices: HashMap::new(),
            lowlink: HashMap::new(),
            stack: Vec::new(),
            on_stack: HashSet::new(),
            components: Vec::new(),
        }
    }

    fn visit(&mut self, node: SpecId) {
        if self.indices.contains_key(&node) {
            return;
        }
        self.indices.insert(node, self.index);
        self.lowlink.insert(node, self.index);
        self.index += 1;
        self.stack.push(node);
        self.on_stack.insert(node);

        let targets = self.edges.get(&node).cloned().unwrap_or_default();
        for next in targets {
            // 후보가 아닌 대상은 전파 단계에서 처리
            if !self.edges.contains_key(&next) {
                continue;
            }
            if !self.indices.contains_key(&next) {
                self.visit(next);
                let low = self.lowlink[&node].min(self.lowlink[&next]);
                self.lowlink.insert(node, low);
            } else if self.on_stack.contains(&next) {
                let low = self.lowlink[&node].min(self.indices[&next]);
                self.lowlink.insert(node, low);
            }
        }

        if self.lowlink[&node] == self.indices[&node] {
            let mut component = Vec::new();
            while let Some(member) = self.stack.pop() {
                self.on_stack.remove(&member);
                component.push(member);
                if member == node {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::plugin::metadata::{MetadataReader, PluginDependency, PluginMetaData};

    /// 메타데이터 목록으로 스펙 집합 구성 (id = 인덱스)
    pub(crate) fn specs(metas: Vec<PluginMetaData>) -> Vec<Arc<PluginSpec>> {
        metas
            .into_iter()
            .enumerate()
            .map(|(i, meta)| {
                let spec = MetadataReader::from_metadata(meta, "test").unwrap();
                spec.set_id(SpecId(i));
                Arc::new(spec)
            })
            .collect()
    }

    fn resolve(specs: &[Arc<PluginSpec>]) -> usize {
        DependencyResolver::new(specs, &HashSet::new()).resolve()
    }

    #[test]
    fn test_resolve_chain() {
        let set = specs(vec![
            PluginMetaData::new("Git", "4.2.0")
                .with_dependency(PluginDependency::new("Editor", "4.0.0")),
            PluginMetaData::new("Core", "4.2.0").with_compat_version("4.0.0"),
            PluginMetaData::new("Editor", "4.2.0")
                .with_compat_version("4.0.0")
                .with_dependency(PluginDependency::new("Core", "4.0.0")),
        ]);

        assert_eq!(resolve(&set), 3);
        assert!(set.iter().all(|s| s.state() == PluginState::Resolved));
        assert_eq!(set[0].dependency_specs()[0].spec, SpecId(2));
    }

    #[test]
    fn test_missing_required_vs_optional() {
        let set = specs(vec![
            PluginMetaData::new("A", "1.0").with_dependency(PluginDependency::new("Nope", "1.0")),
            PluginMetaData::new("B", "1.0")
                .with_dependency(PluginDependency::new("Nope", "1.0").optional()),
        ]);

        resolve(&set);
        assert_eq!(set[0].state(), PluginState::Read);
        assert_eq!(set[0].error_kind(), Some(PluginErrorKind::MissingRequiredDependency));
        assert_eq!(set[1].state(), PluginState::Resolved);
        assert!(set[1].dependency_specs().is_empty());
    }

    #[test]
    fn test_incompatible_version() {
        let set = specs(vec![
            PluginMetaData::new("Core", "4.2.0").with_compat_version("4.0.0"),
            PluginMetaData::new("Git", "1.0").with_dependency(PluginDependency::new("Core", "4.5.0")),
        ]);

        resolve(&set);
        assert_eq!(set[1].error_kind(), Some(PluginErrorKind::IncompatibleVersion));
        assert!(set[1].error_string().contains("4.2.0"));
    }

    #[test]
    fn test_cycle_and_dependents_blocked() {
        let set = specs(vec![
            PluginMetaData::new("A", "1.0").with_dependency(PluginDependency::new("B", "1.0")),
            PluginMetaData::new("B", "1.0").with_dependency(PluginDependency::new("A", "1.0")),
            PluginMetaData::new("C", "1.0")
                .with_dependency(PluginDependency::new("A", "1.0").optional()),
            PluginMetaData::new("D", "1.0"),
        ]);

        resolve(&set);
        for spec in &set[0..3] {
            assert_eq!(spec.state(), PluginState::Read);
            assert_eq!(spec.error_kind(), Some(PluginErrorKind::DependencyCycle));
        }
        assert!(set[0].error_string().starts_with("Circular dependency detected:\nA (1.0) depends on\nB (1.0)"));
        assert_eq!(set[3].state(), PluginState::Resolved);
    }

    #[test]
    fn test_self_dependency_is_missing() {
        let set = specs(vec![
            PluginMetaData::new("A", "1.0").with_dependency(PluginDependency::new("A", "1.0")),
        ]);
        resolve(&set);
        assert_eq!(set[0].error_kind(), Some(PluginErrorKind::MissingRequiredDependency));
    }

    #[test]
    fn test_failure_propagates_transitively() {
        let set = specs(vec![
            PluginMetaData::new("A", "1.0").with_dependency(PluginDependency::new("Missing", "1.0")),
            PluginMetaData::new("B", "1.0").with_dependency(PluginDependency::new("A", "1.0")),
            PluginMetaData::new("C", "1.0").with_dependency(PluginDependency::new("B", "1.0")),
            PluginMetaData::new("D", "1.0").with_dependency(PluginDependency::new("B", "1.0").optional()),
        ]);

        resolve(&set);
        assert!(set[..3].iter().all(|s| s.state() == PluginState::Read && s.has_error()));
        assert!(set[2].error_string().contains("B (1.0)"));
        // Optional 대상이 실패하면 연결만 끊고 승격
        assert_eq!(set[3].state(), PluginState::Resolved);
        assert!(set[3].dependency_specs().is_empty());
    }

    #[test]
    fn test_test_dependency_only_when_tested() {
        let set = specs(vec![
            PluginMetaData::new("A", "1.0")
                .with_dependency(PluginDependency::new("Helper", "1.0").test()),
            PluginMetaData::new("Helper", "1.0"),
        ]);

        resolve(&set);
        assert!(set[0].dependency_specs().is_empty());

        let tested = HashSet::from([SpecId(0)]);
        DependencyResolver::new(&set, &tested).resolve();
        assert_eq!(set[0].dependency_specs().len(), 1);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let set = specs(vec![
            PluginMetaData::new("A", "1.0").with_dependency(PluginDependency::new("B", "1.0")),
            PluginMetaData::new("B", "1.0").with_dependency(PluginDependency::new("A", "1.0")),
            PluginMetaData::new("C", "1.0"),
        ]);

        resolve(&set);
        let first: Vec<_> = set.iter().map(|s| (s.state(), s.error())).collect();
        resolve(&set);
        let second: Vec<_> = set.iter().map(|s| (s.state(), s.error())).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_prefers_candidate_further_along() {
        let set = specs(vec![
            PluginMetaData::new("Core", "1.0"),
            PluginMetaData::new("Core", "1.0"),
            PluginMetaData::new("App", "1.0").with_dependency(PluginDependency::new("Core", "1.0")),
        ]);
        set[1].set_state(PluginState::Loaded);

        resolve(&set);
        assert_eq!(set[2].dependency_specs()[0].spec, SpecId(1));
    }

    #[test]
    fn test_recommends_resolved_by_name() {
        let set = specs(vec![
            PluginMetaData::new("A", "1.0").with_recommends("b"),
            PluginMetaData::new("B", "2.0"),
        ]);
        resolve(&set);
        assert_eq!(set[0].recommended_specs(), vec![SpecId(1)]);
    }
}
