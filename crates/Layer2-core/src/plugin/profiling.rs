//! Profiling - 로딩 단계별 시간 측정
//!
//! `-profile` 옵션으로 켜며, 각 플러그인의 단계별 소요 시간을 tracing으로 출력합니다.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// 프로파일러
#[derive(Default)]
pub struct Profiler {
    verbosity: AtomicU32,
    timer: Mutex<Option<Timer>>,
}

struct Timer {
    start: Instant,
    last: Duration,
    totals: HashMap<String, Duration>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 프로파일링 켜기 (여러 번 호출하면 상세도 증가)
    pub fn increase_verbosity(&self) {
        self.verbosity.fetch_add(1, Ordering::Relaxed);
        let mut timer = self.timer.lock();
        if timer.is_none() {
            *timer = Some(Timer {
                start: Instant::now(),
                last: Duration::ZERO,
                totals: HashMap::new(),
            });
        }
    }

    pub fn verbosity(&self) -> u32 {
        self.verbosity.load(Ordering::Relaxed)
    }

    pub fn is_enabled(&self) -> bool {
        self.verbosity() > 0
    }

    /// 단계 기록 (`plugin` 이 있으면 플러그인별 합계에 더함)
    pub fn report(&self, what: &str, plugin: Option<&str>) {
        let mut guard = self.timer.lock();
        let Some(timer) = guard.as_mut() else {
            return;
        };

        let absolute = timer.start.elapsed();
        let elapsed = absolute.saturating_sub(timer.last);
        timer.last = absolute;

        match plugin {
            Some(name) => {
                *timer.totals.entry(name.to_string()).or_default() += elapsed;
                info!(
                    "{:<22} {:<22} {:>8}ms ({:>8}ms)",
                    what,
                    name,
                    absolute.as_millis(),
                    elapsed.as_millis()
                );
            }
            None => info!("{:<45} {:>8}ms", what, absolute.as_millis()),
        }
    }

    /// 플러그인별 합계 (내림차순)
    pub fn totals(&self) -> Vec<(String, Duration)> {
        let guard = self.timer.lock();
        let mut totals: Vec<(String, Duration)> = guard
            .as_ref()
            .map(|t| t.totals.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default();
        totals.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        totals
    }

    /// 합계 요약 출력
    pub fn print_summary(&self) {
        if !self.is_enabled() {
            return;
        }
        let totals = self.totals();
        let total: Duration = totals.iter().map(|(_, d)| *d).sum();
        let total_ms = total.as_secs_f64() * 1000.0;

        info!("Plugin profiling summary:");
        for (name, duration) in &totals {
            let ms = duration.as_secs_f64() * 1000.0;
            let percent = if total_ms > 0.0 { ms * 100.0 / total_ms } else { 0.0 };
            info!("{:<22} {:>8}ms ( {:>5.2}% )", name, duration.as_millis(), percent);
        }
        info!("Total: {}ms", total.as_millis());
    }
}
