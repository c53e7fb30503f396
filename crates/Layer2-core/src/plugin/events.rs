//! Plugin Events - 이벤트 시스템

use super::spec::{PluginErrorKind, PluginState};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use tokio::sync::broadcast;
use tracing::debug;

// ============================================================================
// PluginEvent - 플러그인 이벤트 타입
// ============================================================================

/// 플러그인 이벤트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginEvent {
    /// 이벤트 타입
    pub event_type: EventType,

    /// 이벤트 데이터
    pub data: Value,

    /// 타임스탬프
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// 소스 (이벤트 발생 위치)
    pub source: String,
}

impl PluginEvent {
    /// 새 이벤트 생성
    pub fn new(event_type: EventType, data: Value, source: impl Into<String>) -> Self {
        Self {
            event_type,
            data,
            timestamp: chrono::Utc::now(),
            source: source.into(),
        }
    }

    /// 간단한 이벤트 생성
    pub fn simple(event_type: EventType) -> Self {
        Self::new(event_type, Value::Null, "plugin_manager")
    }
}

/// 이벤트 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // 플러그인 집합 이벤트
    PluginsChanged,
    PluginStateChanged,
    PluginError,

    // 라이프사이클 이벤트
    InitializationDone,
    ShutdownStarted,
    AsynchronousShutdownFinished,
    ShutdownTimeout,

    // 오브젝트 풀 이벤트
    ObjectAdded,
    AboutToRemoveObject,

    // 테스트 / 시나리오 이벤트
    TestsFinished,
    ScenarioFinished,

    // 사용자 정의 이벤트
    Custom,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PluginsChanged => write!(f, "plugins_changed"),
            Self::PluginStateChanged => write!(f, "plugin_state_changed"),
            Self::PluginError => write!(f, "plugin_error"),
            Self::InitializationDone => write!(f, "initialization_done"),
            Self::ShutdownStarted => write!(f, "shutdown_started"),
            Self::AsynchronousShutdownFinished => write!(f, "asynchronous_shutdown_finished"),
            Self::ShutdownTimeout => write!(f, "shutdown_timeout"),
            Self::ObjectAdded => write!(f, "object_added"),
            Self::AboutToRemoveObject => write!(f, "about_to_remove_object"),
            Self::TestsFinished => write!(f, "tests_finished"),
            Self::ScenarioFinished => write!(f, "scenario_finished"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

// ============================================================================
// EventBus - 이벤트 버스 (발행/구독)
// ============================================================================

/// 이벤트 버스 - 이벤트 발행 및 구독 관리
///
/// 히스토리는 동기 락으로 보호되므로 동기 코드(오브젝트 풀 등)도 `emit` 으로
/// 같은 경로를 통해 기록할 수 있습니다.
pub struct EventBus {
    /// 브로드캐스트 채널 발신자
    sender: broadcast::Sender<PluginEvent>,

    /// 이벤트 히스토리 (최근 N개)
    history: RwLock<VecDeque<PluginEvent>>,

    /// 히스토리 최대 크기
    history_size: usize,
}

impl EventBus {
    /// 새 이벤트 버스 생성
    pub fn new() -> Self {
        Self::with_capacity(1024, 100)
    }

    /// 용량 지정하여 생성
    pub fn with_capacity(channel_capacity: usize, history_size: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity);
        Self {
            sender,
            history: RwLock::new(VecDeque::with_capacity(history_size)),
            history_size,
        }
    }

    /// 이벤트 발행
    pub async fn publish(&self, event: PluginEvent) {
        self.emit(event);
    }

    /// 동기 발행: 히스토리에 추가하고 브로드캐스트
    pub fn emit(&self, event: PluginEvent) {
        debug!("Publishing event: {:?}", event.event_type);

        {
            let mut history = self.history.write();
            if history.len() >= self.history_size {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        // 구독자가 없어도 OK
        let _ = self.sender.send(event);
    }

    /// 이벤트 구독 (스트림 반환)
    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.sender.subscribe()
    }

    /// 이벤트 히스토리 조회
    pub fn history(&self) -> Vec<PluginEvent> {
        self.history.read().iter().cloned().collect()
    }

    /// 특정 타입의 이벤트 히스토리 조회
    pub fn history_by_type(&self, event_type: EventType) -> Vec<PluginEvent> {
        self.history
            .read()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// 히스토리 클리어
    pub fn clear_history(&self) {
        self.history.write().clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// 헬퍼 함수
// ============================================================================

/// 플러그인 상태 변경 이벤트 생성
pub fn state_changed_event(plugin: &str, state: PluginState) -> PluginEvent {
    PluginEvent::new(
        EventType::PluginStateChanged,
        serde_json::json!({
            "plugin": plugin,
            "state": state,
        }),
        "plugin_manager",
    )
}

/// 플러그인 에러 이벤트 생성
pub fn plugin_error_event(plugin: &str, kind: PluginErrorKind, message: &str) -> PluginEvent {
    PluginEvent::new(
        EventType::PluginError,
        serde_json::json!({
            "plugin": plugin,
            "kind": kind,
            "message": message,
        }),
        "plugin_manager",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_event_bus() {
        let bus = EventBus::new();

        bus.publish(state_changed_event("Core", PluginState::Loaded))
            .await;
        bus.publish(PluginEvent::simple(EventType::InitializationDone))
            .await;

        // 히스토리 확인
        let history = bus.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].data["state"], "Loaded");

        let done = bus.history_by_type(EventType::InitializationDone);
        assert_eq!(done.len(), 1);

        bus.clear_history();
        assert!(bus.history().is_empty());
    }

    #[test]
    fn test_emit_records_history() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.emit(PluginEvent::simple(EventType::ObjectAdded));

        assert_eq!(bus.history_by_type(EventType::ObjectAdded).len(), 1);
        let event = receiver.try_recv().unwrap();
        assert_eq!(event.event_type, EventType::ObjectAdded);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let bus = EventBus::with_capacity(16, 2);
        bus.publish(PluginEvent::simple(EventType::PluginsChanged)).await;
        bus.publish(PluginEvent::simple(EventType::ShutdownStarted)).await;
        bus.publish(PluginEvent::simple(EventType::ShutdownStarted)).await;

        let history = bus.history();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|e| e.event_type == EventType::ShutdownStarted));
    }

    #[tokio::test]
    async fn test_event_subscribe() {
        let bus = Arc::new(EventBus::new());
        let mut receiver = bus.subscribe();

        // 백그라운드에서 이벤트 발행
        let bus_clone = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
            bus_clone
                .publish(PluginEvent::simple(EventType::ShutdownStarted))
                .await;
        });

        // 이벤트 수신
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type, EventType::ShutdownStarted);
    }
}
