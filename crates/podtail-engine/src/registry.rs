use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use podtail_logs::TailHandle;

/// Open tails of one run, by target id
///
/// Registering a tail for an id closes the one registered before it.
/// Removal is keyed by generation so a finished tail never unregisters its
/// replacement.
#[derive(Default)]
pub struct TailRegistry {
    tails: Mutex<HashMap<String, (u64, TailHandle)>>,
    next_generation: AtomicU64,
}

impl TailRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` under `id` and return its generation
    pub fn insert(&self, id: String, handle: TailHandle) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let previous = self.tails.lock().insert(id, (generation, handle));
        if let Some((_, previous)) = previous {
            previous.close();
        }
        generation
    }

    /// Unregister `id` if it is still at `generation`
    pub fn remove(&self, id: &str, generation: u64) -> bool {
        let mut tails = self.tails.lock();
        match tails.get(id) {
            Some((current, _)) if *current == generation => {
                tails.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Close and drop every registered tail
    pub fn close_all(&self) {
        let tails: Vec<_> = self.tails.lock().drain().collect();
        for (id, (_, handle)) in tails {
            tracing::debug!(target_id = %id, "closing tail");
            handle.close();
        }
    }

    pub fn len(&self) -> usize {
        self.tails.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podtail_k8s::fake::FakePodApi;
    use podtail_logs::{Output, Palette, Tail, TailContext, TailOptions, Template};
    use podtail_types::Target;
    use std::sync::Arc;

    fn tail(output: &Output) -> Tail {
        let ctx = TailContext {
            options: TailOptions::default(),
            renderer: Arc::new(Template::Raw),
            palette: Arc::new(Palette::default().with_enabled(false)),
            diff_container: false,
            output: output.clone(),
        };
        Tail::new(
            Arc::new(FakePodApi::new()),
            Target::new("node1", "ns", "pod", "app"),
            &ctx,
        )
    }

    #[test]
    fn test_replacing_closes_previous() {
        let (output, _out, err) = Output::buffered();
        let registry = TailRegistry::new();
        let first = tail(&output);
        let second = tail(&output);

        let gen1 = registry.insert("ns/pod/app".to_string(), first.handle());
        let gen2 = registry.insert("ns/pod/app".to_string(), second.handle());

        assert!(first.handle().is_closed());
        assert!(!second.handle().is_closed());
        assert_eq!(err.lines(), ["- ns pod › app"]);

        // stale generation leaves the replacement in place
        assert!(!registry.remove("ns/pod/app", gen1));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove("ns/pod/app", gen2));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_close_all() {
        let (output, _out, _err) = Output::buffered();
        let registry = TailRegistry::new();
        let a = tail(&output);
        registry.insert("a".to_string(), a.handle());
        registry.close_all();

        assert!(a.handle().is_closed());
        assert!(registry.is_empty());
    }
}
