//! Object Pool - 플러그인 간 공유 오브젝트 레지스트리
//!
//! 플러그인은 자신이 구현한 인터페이스를 풀에 등록하고, 다른 플러그인은 타입으로 조회합니다.
//! 하나의 오브젝트는 여러 "능력(capability)"을 가질 수 있습니다 (`Arc<dyn Trait>` 단위).
//!
//! ```ignore
//! let id = pool.add_object(
//!     PoolObjectBuilder::new("git.vcs")
//!         .with::<dyn VersionControl>(vcs.clone())
//!         .with::<dyn Searchable>(vcs),
//! );
//! let vcs: Option<Arc<dyn VersionControl>> = pool.get_object::<dyn VersionControl>();
//! ```
//!
//! 리스너는 락을 잡지 않은 상태에서 호출되므로 콜백 안에서 풀을 조회해도 됩니다.
//! - 추가: 삽입 후 알림
//! - 제거: 알림 후 삭제 (콜백 시점에는 아직 조회 가능)

use super::events::{EventBus, EventType, PluginEvent};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// 오브젝트 식별자
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "obj-{}", self.0)
    }
}

// ============================================================================
// PoolObject
// ============================================================================

/// 풀에 등록된 오브젝트
pub struct PoolObject {
    id: ObjectId,
    name: String,
    registrant: Option<String>,
    capabilities: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    type_names: Vec<&'static str>,
}

impl PoolObject {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 등록한 플러그인 이름
    pub fn registrant(&self) -> Option<&str> {
        self.registrant.as_deref()
    }

    /// 능력 조회
    pub fn capability<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.capabilities
            .get(&TypeId::of::<T>())
            .and_then(|c| c.downcast_ref::<Arc<T>>())
            .cloned()
    }

    pub fn has_capability<T: ?Sized + 'static>(&self) -> bool {
        self.capabilities.contains_key(&TypeId::of::<T>())
    }

    /// 등록된 능력의 타입 이름 (디버깅용)
    pub fn type_names(&self) -> &[&'static str] {
        &self.type_names
    }
}

impl std::fmt::Debug for PoolObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolObject")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("registrant", &self.registrant)
            .field("types", &self.type_names)
            .finish()
    }
}

/// 오브젝트 빌더
pub struct PoolObjectBuilder {
    name: String,
    registrant: Option<String>,
    capabilities: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    type_names: Vec<&'static str>,
}

impl PoolObjectBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registrant: None,
            capabilities: HashMap::new(),
            type_names: Vec::new(),
        }
    }

    /// 빌더 패턴: 등록 플러그인 지정
    pub fn registrant(mut self, name: impl Into<String>) -> Self {
        self.registrant = Some(name.into());
        self
    }

    /// 빌더 패턴: 능력 추가 (`T` 는 트레이트 오브젝트 가능)
    pub fn with<T: ?Sized + Send + Sync + 'static>(mut self, capability: Arc<T>) -> Self {
        if self
            .capabilities
            .insert(TypeId::of::<T>(), Box::new(capability))
            .is_none()
        {
            self.type_names.push(std::any::type_name::<T>());
        }
        self
    }
}

// ============================================================================
// PoolListener
// ============================================================================

/// 풀 변경 리스너
pub trait PoolListener: Send + Sync {
    fn object_added(&self, _object: &Arc<PoolObject>) {}

    fn about_to_remove_object(&self, _object: &Arc<PoolObject>) {}
}

// ============================================================================
// ObjectPool
// ============================================================================

/// 공유 오브젝트 풀
pub struct ObjectPool {
    objects: RwLock<Vec<Arc<PoolObject>>>,
    listeners: RwLock<Vec<Arc<dyn PoolListener>>>,
    events: Option<Arc<EventBus>>,
    next_id: AtomicU64,
}

impl ObjectPool {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
            events: None,
            next_id: AtomicU64::new(1),
        }
    }

    /// 변경 이벤트를 이벤트 버스로도 발행
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// 리스너 등록
    pub fn subscribe(&self, listener: Arc<dyn PoolListener>) {
        self.listeners.write().push(listener);
    }

    /// 오브젝트 등록
    pub fn add_object(&self, object: PoolObjectBuilder) -> ObjectId {
        let id = ObjectId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if object.capabilities.is_empty() {
            warn!("Object {} ({}) registered without capabilities", object.name, id);
        }
        let object = Arc::new(PoolObject {
            id,
            name: object.name,
            registrant: object.registrant,
            capabilities: object.capabilities,
            type_names: object.type_names,
        });

        {
            let mut objects = self.objects.write();
            if objects.iter().any(|o| !o.name.is_empty() && o.name == object.name) {
                warn!("Object name {} is already in the pool", object.name);
            }
            objects.push(object.clone());
        }
        debug!("Object added: {} ({})", object.name, id);

        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            listener.object_added(&object);
        }
        self.emit(EventType::ObjectAdded, &object);
        id
    }

    /// 오브젝트 제거. 없으면 false
    pub fn remove_object(&self, id: ObjectId) -> bool {
        let Some(object) = self.find(id) else {
            warn!("Trying to remove object {} which is not in the pool", id);
            return false;
        };

        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            listener.about_to_remove_object(&object);
        }
        self.emit(EventType::AboutToRemoveObject, &object);

        let mut objects = self.objects.write();
        let before = objects.len();
        objects.retain(|o| o.id != id);
        let removed = objects.len() != before;
        if removed {
            debug!("Object removed: {} ({})", object.name, id);
        }
        removed
    }

    /// 특정 플러그인이 등록한 오브젝트를 등록 역순으로 제거
    pub fn remove_objects_of(&self, registrant: &str) -> usize {
        let ids: Vec<ObjectId> = self
            .objects
            .read()
            .iter()
            .rev()
            .filter(|o| o.registrant.as_deref() == Some(registrant))
            .map(|o| o.id)
            .collect();

        ids.into_iter().filter(|id| self.remove_object(*id)).count()
    }

    fn find(&self, id: ObjectId) -> Option<Arc<PoolObject>> {
        self.objects.read().iter().find(|o| o.id == id).cloned()
    }

    fn emit(&self, event_type: EventType, object: &PoolObject) {
        if let Some(bus) = &self.events {
            let event = PluginEvent::new(
                event_type,
                serde_json::json!({
                    "id": object.id.0,
                    "name": object.name,
                    "registrant": object.registrant,
                }),
                "object_pool",
            );
            bus.emit(event);
        }
    }

    // ========================================================================
    // 조회
    // ========================================================================

    /// 전체 스냅샷 (등록 순서)
    pub fn all_objects(&self) -> Vec<Arc<PoolObject>> {
        self.objects.read().clone()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// `T` 능력을 가진 첫 오브젝트
    pub fn get_object<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.objects.read().iter().find_map(|o| o.capability::<T>())
    }

    /// `T` 능력 중 조건을 만족하는 첫 오브젝트
    pub fn get_object_by<T, F>(&self, predicate: F) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&T) -> bool,
    {
        self.objects
            .read()
            .iter()
            .filter_map(|o| o.capability::<T>())
            .find(|c| predicate(&**c))
    }

    /// `T` 능력을 가진 모든 오브젝트 (등록 순서)
    pub fn get_objects<T: ?Sized + Send + Sync + 'static>(&self) -> Vec<Arc<T>> {
        self.objects
            .read()
            .iter()
            .filter_map(|o| o.capability::<T>())
            .collect()
    }

    pub fn get_objects_by<T, F>(&self, predicate: F) -> Vec<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&T) -> bool,
    {
        self.objects
            .read()
            .iter()
            .filter_map(|o| o.capability::<T>())
            .filter(|c| predicate(&**c))
            .collect()
    }

    pub fn get_object_by_name(&self, name: &str) -> Option<Arc<PoolObject>> {
        self.objects.read().iter().find(|o| o.name == name).cloned()
    }
}

impl Default for ObjectPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    trait Counter: Send + Sync {
        fn count(&self) -> usize;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    impl Counter for English {
        fn count(&self) -> usize {
            1
        }
    }

    struct Korean;

    impl Greeter for Korean {
        fn greet(&self) -> String {
            "안녕".into()
        }
    }

    struct Fixed(usize);

    impl Counter for Fixed {
        fn count(&self) -> usize {
            self.0
        }
    }

    #[test]
    fn test_lookup_by_capability() {
        let pool = ObjectPool::new();
        let english = Arc::new(English);
        pool.add_object(
            PoolObjectBuilder::new("english")
                .with::<dyn Greeter>(english.clone())
                .with::<dyn Counter>(english),
        );
        pool.add_object(PoolObjectBuilder::new("korean").with::<dyn Greeter>(Arc::new(Korean)));

        assert_eq!(pool.get_object::<dyn Greeter>().unwrap().greet(), "hello");
        assert_eq!(pool.get_objects::<dyn Greeter>().len(), 2);
        assert_eq!(pool.get_objects::<dyn Counter>().len(), 1);

        let korean = pool.get_object_by::<dyn Greeter, _>(|g| g.greet() == "안녕");
        assert!(korean.is_some());
        assert!(pool.get_object::<String>().is_none());
    }

    #[test]
    fn test_remove_object() {
        let pool = ObjectPool::new();
        let id = pool.add_object(PoolObjectBuilder::new("korean").with::<dyn Greeter>(Arc::new(Korean)));

        assert!(pool.remove_object(id));
        assert!(pool.is_empty());
        assert!(!pool.remove_object(id));
    }

    #[derive(Default)]
    struct Recorder {
        log: Mutex<Vec<String>>,
        pool: Mutex<Option<Arc<ObjectPool>>>,
    }

    impl PoolListener for Recorder {
        fn object_added(&self, object: &Arc<PoolObject>) {
            self.log.lock().push(format!("added {}", object.name()));
        }

        fn about_to_remove_object(&self, object: &Arc<PoolObject>) {
            // 제거 직전에는 아직 조회 가능해야 함
            let visible = self
                .pool
                .lock()
                .as_ref()
                .map(|p| p.get_object_by_name(object.name()).is_some())
                .unwrap_or(false);
            self.log.lock().push(format!("removing {} visible={}", object.name(), visible));
        }
    }

    #[test]
    fn test_listener_ordering() {
        let pool = Arc::new(ObjectPool::new());
        let recorder = Arc::new(Recorder::default());
        *recorder.pool.lock() = Some(pool.clone());
        pool.subscribe(recorder.clone());

        let id = pool.add_object(PoolObjectBuilder::new("a").with(Arc::new(1u8)));
        pool.remove_object(id);

        assert_eq!(
            *recorder.log.lock(),
            vec!["added a".to_string(), "removing a visible=true".to_string()]
        );
    }

    #[test]
    fn test_remove_objects_of_registrant() {
        let pool = ObjectPool::new();
        pool.add_object(PoolObjectBuilder::new("a").registrant("Git").with(Arc::new(1u8)));
        pool.add_object(PoolObjectBuilder::new("b").registrant("Core").with(Arc::new(2u8)));
        pool.add_object(PoolObjectBuilder::new("c").registrant("Git").with(Arc::new(3u8)));

        assert_eq!(pool.remove_objects_of("Git"), 2);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.all_objects()[0].name(), "b");
    }

    #[tokio::test]
    async fn test_events_reach_bus_history() {
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe();
        let pool = ObjectPool::new().with_event_bus(bus.clone());

        let id = pool.add_object(PoolObjectBuilder::new("a").registrant("Git").with(Arc::new(1u8)));
        pool.remove_object(id);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, EventType::ObjectAdded);
        assert_eq!(event.data["name"], "a");

        let added = bus.history_by_type(EventType::ObjectAdded);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].data["registrant"], "Git");
        let removed = bus.history_by_type(EventType::AboutToRemoveObject);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].source, "object_pool");
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        let pool = ObjectPool::new();
        let writers = 4;
        let per_writer = 50;

        std::thread::scope(|scope| {
            for w in 0..writers {
                let pool = &pool;
                scope.spawn(move || {
                    let owner = format!("writer-{}", w);
                    for i in 0..per_writer {
                        pool.add_object(
                            PoolObjectBuilder::new(format!("{}-keep-{}", owner, i))
                                .registrant(owner.clone())
                                .with::<dyn Counter>(Arc::new(Fixed(i))),
                        );
                        let temp = pool.add_object(
                            PoolObjectBuilder::new(format!("{}-temp-{}", owner, i))
                                .registrant(owner.clone())
                                .with::<dyn Counter>(Arc::new(Fixed(i))),
                        );
                        assert!(pool.remove_object(temp));
                        assert!(pool.get_object_by_name(&format!("{}-keep-{}", owner, i)).is_some());
                    }
                });
            }
            for _ in 0..2 {
                let pool = &pool;
                scope.spawn(move || {
                    for _ in 0..200 {
                        let snapshot = pool.all_objects();
                        let ids: std::collections::HashSet<ObjectId> =
                            snapshot.iter().map(|o| o.id()).collect();
                        assert_eq!(ids.len(), snapshot.len());
                        let counters = pool.get_objects::<dyn Counter>();
                        assert!(counters.len() <= writers * per_writer * 2);
                    }
                });
            }
        });

        assert_eq!(pool.len(), writers * per_writer);
        assert_eq!(pool.get_objects::<dyn Counter>().len(), writers * per_writer);
        assert!(pool.all_objects().iter().all(|o| o.name().contains("-keep-")));
        assert_eq!(pool.remove_objects_of("writer-0"), per_writer);
        assert_eq!(pool.len(), (writers - 1) * per_writer);
    }
}
