//! Compiled circuit cache
//!
//! Entries are keyed by rendered source text and evicted least recently used
//! first. Concurrent requests for the same source share one compilation;
//! failed compilations are not cached.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::OnceCell;

use crate::compiler::{CircuitCompiler, CompileError, CompiledCircuit, NargoProject};

type Slot = Arc<OnceCell<Arc<CompiledCircuit>>>;

#[derive(Default)]
struct CacheState {
    slots: HashMap<String, Slot>,
    /// Least recently used first
    order: VecDeque<String>,
}

impl CacheState {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }

    fn evict_to(&mut self, capacity: usize) {
        while capacity > 0 && self.order.len() > capacity {
            if let Some(oldest) = self.order.pop_front() {
                tracing::debug!("Evicting compiled circuit from cache");
                self.slots.remove(&oldest);
            }
        }
    }
}

pub struct CompileCache<C> {
    compiler: C,
    capacity: usize,
    state: Mutex<CacheState>,
}

impl<C: CircuitCompiler> CompileCache<C> {
    /// `capacity` of 0 disables eviction
    pub fn new(compiler: C, capacity: usize) -> Self {
        Self {
            compiler,
            capacity,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of cached or in-flight entries
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a finished compilation of `source` is cached
    pub fn contains(&self, source: &str) -> bool {
        self.lock()
            .slots
            .get(source)
            .is_some_and(|slot| slot.initialized())
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.slots.clear();
        state.order.clear();
    }

    /// Return the cached circuit for `project.source`, compiling on a miss
    pub async fn compile(&self, project: &NargoProject) -> Result<Arc<CompiledCircuit>, CompileError> {
        let slot = self.slot(&project.source);

        if let Some(circuit) = slot.get() {
            tracing::debug!("Compiled circuit cache hit ({})", circuit.hash);
            return Ok(circuit.clone());
        }

        let result = slot
            .get_or_try_init(|| async {
                tracing::debug!("Compiled circuit cache miss, compiling");
                let start = Instant::now();
                let circuit = self.compiler.compile(project).await?;
                tracing::info!(
                    "Circuit compiled in {:.2?} ({} bytes)",
                    start.elapsed(),
                    circuit.artifact.len()
                );
                Ok::<_, CompileError>(Arc::new(circuit))
            })
            .await;

        match result {
            Ok(circuit) => Ok(circuit.clone()),
            Err(e) => {
                self.forget_failed(&project.source, &slot);
                Err(e)
            }
        }
    }

    fn slot(&self, source: &str) -> Slot {
        let mut state = self.lock();
        if let Some(slot) = state.slots.get(source).cloned() {
            state.touch(source);
            return slot;
        }

        let slot: Slot = Arc::new(OnceCell::new());
        state.slots.insert(source.to_string(), slot.clone());
        state.order.push_back(source.to_string());
        state.evict_to(self.capacity);
        slot
    }

    fn forget_failed(&self, source: &str, failed: &Slot) {
        let mut state = self.lock();
        let same = state
            .slots
            .get(source)
            .is_some_and(|slot| Arc::ptr_eq(slot, failed) && !slot.initialized());
        if same {
            state.slots.remove(source);
            state.order.retain(|k| k != source);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingCompiler {
        calls: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl CircuitCompiler for CountingCompiler {
        async fn compile(&self, project: &NargoProject) -> Result<CompiledCircuit, CompileError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail_first && n == 0 {
                return Err(CompileError::Failed {
                    package: project.package_name.clone(),
                    stderr: "boom".into(),
                });
            }
            Ok(CompiledCircuit::new(project.clone(), project.source.as_bytes().to_vec()))
        }
    }

    fn project(source: &str) -> NargoProject {
        NargoProject {
            package_name: "zkemail_circuit".into(),
            manifest: String::new(),
            source: source.into(),
        }
    }

    #[tokio::test]
    async fn test_compiles_once_per_source() {
        let cache = CompileCache::new(CountingCompiler::default(), 0);
        let a = cache.compile(&project("fn main() {}")).await.unwrap();
        let b = cache.compile(&project("fn main() {}")).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.compiler().calls.load(Ordering::SeqCst), 1);

        cache.compile(&project("fn main(x: u8) {}")).await.unwrap();
        assert_eq!(cache.compiler().calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_compilation() {
        let cache = CompileCache::new(CountingCompiler::default(), 0);
        let p = project("fn main() {}");
        let (a, b, c) = tokio::join!(cache.compile(&p), cache.compile(&p), cache.compile(&p));
        assert_eq!(a.unwrap(), b.unwrap());
        assert!(c.is_ok());
        assert_eq!(cache.compiler().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let cache = CompileCache::new(
            CountingCompiler {
                fail_first: true,
                ..Default::default()
            },
            0,
        );
        let p = project("fn main() {}");
        assert!(matches!(cache.compile(&p).await, Err(CompileError::Failed { .. })));
        assert!(!cache.contains(&p.source));
        assert!(cache.is_empty());

        assert!(cache.compile(&p).await.is_ok());
        assert!(cache.contains(&p.source));
        assert_eq!(cache.compiler().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = CompileCache::new(CountingCompiler::default(), 2);
        cache.compile(&project("a")).await.unwrap();
        cache.compile(&project("b")).await.unwrap();
        // touch "a" so "b" is the eviction candidate
        cache.compile(&project("a")).await.unwrap();
        cache.compile(&project("c")).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.compiler().calls.load(Ordering::SeqCst), 3);
    }
}
