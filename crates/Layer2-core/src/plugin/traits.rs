//! Plugin traits - 핵심 플러그인 인터페이스

use super::events::EventBus;
use super::object_pool::{ObjectId, ObjectPool, PoolObjectBuilder};
use async_trait::async_trait;
use extsys_foundation::Result;
use parking_lot::Mutex;
use std::any::Any;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::oneshot;

// ============================================================================
// PluginContext - 플러그인에 제공되는 컨텍스트
// ============================================================================

/// 플러그인 컨텍스트 - 플러그인이 호스트와 상호작용하는 인터페이스
#[derive(Clone)]
pub struct PluginContext {
    /// 플러그인 이름
    plugin_name: String,

    /// 공유 오브젝트 풀
    object_pool: Arc<ObjectPool>,

    /// 이벤트 버스 (이벤트 발행/구독)
    event_bus: Arc<EventBus>,
}

impl PluginContext {
    /// 새 컨텍스트 생성
    pub fn new(
        plugin_name: impl Into<String>,
        object_pool: Arc<ObjectPool>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            object_pool,
            event_bus,
        }
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    pub fn object_pool(&self) -> &Arc<ObjectPool> {
        &self.object_pool
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// 이 플러그인 소유로 오브젝트 등록
    ///
    /// 플러그인이 삭제될 때 등록의 역순으로 자동 제거됩니다.
    pub fn add_object(&self, object: PoolObjectBuilder) -> ObjectId {
        self.object_pool
            .add_object(object.registrant(self.plugin_name.clone()))
    }

    pub fn remove_object(&self, id: ObjectId) -> bool {
        self.object_pool.remove_object(id)
    }
}

// ============================================================================
// 종료 관련
// ============================================================================

/// `about_to_shutdown` 반환값
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownFlag {
    /// 훅이 반환되면 종료 완료
    Synchronous,

    /// `ShutdownNotifier::finished()` 호출까지 대기
    Asynchronous,
}

/// 비동기 종료 완료 통지
#[derive(Clone)]
pub struct ShutdownNotifier {
    sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl ShutdownNotifier {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// 종료 완료 알림 (두 번째 호출부터는 무시)
    pub fn finished(&self) {
        if let Some(tx) = self.sender.lock().take() {
            let _ = tx.send(());
        }
    }
}

// ============================================================================
// 테스트 케이스
// ============================================================================

/// 테스트 함수 시그니처 (데이터 태그를 받음)
pub type TestFn = Arc<dyn Fn(Option<&str>) -> Result<()> + Send + Sync>;

/// 플러그인이 제공하는 테스트 케이스
#[derive(Clone)]
pub struct PluginTestCase {
    pub name: String,
    pub data_tags: Vec<String>,
    pub run: TestFn,
}

impl PluginTestCase {
    pub fn new(
        name: impl Into<String>,
        run: impl Fn(Option<&str>) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            data_tags: Vec::new(),
            run: Arc::new(run),
        }
    }

    /// 빌더 패턴: 데이터 태그 추가
    pub fn with_data(mut self, tag: impl Into<String>) -> Self {
        self.data_tags.push(tag.into());
        self
    }
}

impl std::fmt::Debug for PluginTestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginTestCase")
            .field("name", &self.name)
            .field("data_tags", &self.data_tags)
            .finish()
    }
}

// ============================================================================
// Plugin Trait - 모든 플러그인이 구현해야 하는 인터페이스
// ============================================================================

/// 플러그인 트레이트
///
/// 훅 호출 순서:
/// 1. `initialize` - 의존성 순서대로 (의존 대상이 먼저)
/// 2. `extensions_initialized` - 로드 순서대로
/// 3. `delayed_initialize` - 로드 순서대로, 이벤트 루프 틱마다 하나씩
/// 4. `about_to_shutdown` - 로드 역순
#[async_trait]
pub trait Plugin: Send + Sync {
    /// 초기화. 에러를 반환하면 플러그인은 Running에 도달하지 못함
    async fn initialize(&self, ctx: &PluginContext, arguments: &[String]) -> Result<()>;

    /// 모든 플러그인의 initialize 이후 호출
    async fn extensions_initialized(&self, _ctx: &PluginContext) {}

    /// 시작 후 지연 초기화. true를 반환하면 다음 틱에 다시 호출됨
    async fn delayed_initialize(&self, _ctx: &PluginContext) -> bool {
        false
    }

    /// 종료 직전 호출
    async fn about_to_shutdown(
        &self,
        _ctx: &PluginContext,
        _notifier: ShutdownNotifier,
    ) -> ShutdownFlag {
        ShutdownFlag::Synchronous
    }

    /// 다른 프로세스에서 전달된 인자 처리
    async fn remote_command(
        &self,
        _ctx: &PluginContext,
        _options: &[String],
        _working_dir: &Path,
        _arguments: &[String],
    ) {
    }

    /// 테스트 케이스 목록
    fn test_cases(&self) -> Vec<PluginTestCase> {
        vec![]
    }

    /// 타입 캐스팅을 위한 헬퍼 (다운캐스팅 지원)
    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestPlugin;

    #[async_trait]
    impl Plugin for TestPlugin {
        async fn initialize(&self, ctx: &PluginContext, _arguments: &[String]) -> Result<()> {
            ctx.add_object(PoolObjectBuilder::new("test.settings").with(Arc::new(7u32)));
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn context() -> PluginContext {
        PluginContext::new("Test", Arc::new(ObjectPool::new()), Arc::new(EventBus::new()))
    }

    #[tokio::test]
    async fn test_default_hooks() {
        let plugin = TestPlugin;
        let ctx = context();
        let (notifier, _rx) = ShutdownNotifier::channel();

        assert!(!plugin.delayed_initialize(&ctx).await);
        assert_eq!(
            plugin.about_to_shutdown(&ctx, notifier).await,
            ShutdownFlag::Synchronous
        );
        assert!(plugin.test_cases().is_empty());
        assert!(plugin.as_any().downcast_ref::<TestPlugin>().is_some());
    }

    #[tokio::test]
    async fn test_context_registers_owned_objects() {
        let plugin = TestPlugin;
        let ctx = context();
        plugin.initialize(&ctx, &[]).await.unwrap();

        let object = ctx.object_pool().get_object_by_name("test.settings").unwrap();
        assert_eq!(object.registrant(), Some("Test"));
        assert_eq!(ctx.object_pool().get_object::<u32>().as_deref(), Some(&7));
    }

    #[tokio::test]
    async fn test_notifier_fires_once() {
        let (notifier, rx) = ShutdownNotifier::channel();
        let clone = notifier.clone();
        notifier.finished();
        clone.finished();
        assert!(rx.await.is_ok());
    }
}
