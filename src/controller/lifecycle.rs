//! Turn raw watch events into create / update / delete lifecycle events
//!
//! A `watcher` only reports the current state of an object. The router needs
//! the previous state as well, so the tracker remembers the last object seen
//! per key and pairs it with the next one.

use std::collections::{HashMap, HashSet};

use futures::{future, stream, Stream, StreamExt};
use kube::runtime::{reflector::ObjectRef, watcher};
use kube::Resource;

use super::router::{RoutedEvent, RoutedObject};

/// A lifecycle event with owned objects
#[derive(Clone, Debug, PartialEq)]
pub enum Lifecycle<K> {
    Create(K),
    Update { old: K, new: K },
    Delete(K),
}

impl<K: RoutedObject> Lifecycle<K> {
    /// Borrow as a router event
    pub fn as_routed(&self) -> RoutedEvent<'_> {
        match self {
            Lifecycle::Create(obj) => RoutedEvent::Create(obj),
            Lifecycle::Update { old, new } => RoutedEvent::Update { old, new },
            Lifecycle::Delete(obj) => RoutedEvent::Delete(obj),
        }
    }
}

impl<K> Lifecycle<K> {
    pub fn latest(&self) -> &K {
        match self {
            Lifecycle::Create(obj) | Lifecycle::Delete(obj) => obj,
            Lifecycle::Update { new, .. } => new,
        }
    }
}

/// Last seen state per object, fed from a single watch stream
pub struct LifecycleTracker<K>
where
    K: Resource,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone,
{
    known: HashMap<ObjectRef<K>, K>,
    relisted: Option<HashSet<ObjectRef<K>>>,
}

impl<K> Default for LifecycleTracker<K>
where
    K: Resource,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone,
{
    fn default() -> Self {
        Self {
            known: HashMap::new(),
            relisted: None,
        }
    }
}

impl<K> LifecycleTracker<K>
where
    K: Resource + Clone,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Feed one watch event, returning the lifecycle events it implies.
    ///
    /// A relist (`Init` .. `InitDone`) reports objects it sees again as
    /// updates and emits deletes for remembered objects that did not show up.
    pub fn observe(&mut self, event: watcher::Event<K>) -> Vec<Lifecycle<K>> {
        match event {
            watcher::Event::Apply(obj) => vec![self.apply(obj)],
            watcher::Event::Delete(obj) => {
                self.known.remove(&ObjectRef::from_obj(&obj));
                vec![Lifecycle::Delete(obj)]
            }
            watcher::Event::Init => {
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                if let Some(seen) = self.relisted.as_mut() {
                    seen.insert(ObjectRef::from_obj(&obj));
                }
                vec![self.apply(obj)]
            }
            watcher::Event::InitDone => {
                let Some(seen) = self.relisted.take() else {
                    return Vec::new();
                };
                let gone: Vec<ObjectRef<K>> = self
                    .known
                    .keys()
                    .filter(|key| !seen.contains(*key))
                    .cloned()
                    .collect();
                gone.into_iter()
                    .filter_map(|key| self.known.remove(&key))
                    .map(Lifecycle::Delete)
                    .collect()
            }
        }
    }

    fn apply(&mut self, obj: K) -> Lifecycle<K> {
        match self.known.insert(ObjectRef::from_obj(&obj), obj.clone()) {
            Some(old) => Lifecycle::Update { old, new: obj },
            None => Lifecycle::Create(obj),
        }
    }
}

/// Adapt a watch stream into a stream of lifecycle events.
///
/// Watch errors are passed through so the caller decides how to surface them.
pub fn lifecycle_stream<K, S>(
    events: S,
) -> impl Stream<Item = Result<Lifecycle<K>, watcher::Error>> + Send
where
    K: Resource + Clone + Send + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone + Send,
    S: Stream<Item = Result<watcher::Event<K>, watcher::Error>> + Send,
{
    events
        .scan(LifecycleTracker::new(), |tracker, event| {
            let batch: Vec<Result<Lifecycle<K>, watcher::Error>> = match event {
                Ok(event) => tracker.observe(event).into_iter().map(Ok).collect(),
                Err(err) => vec![Err(err)],
            };
            future::ready(Some(stream::iter(batch)))
        })
        .flatten()
}

/// Whether `metadata.generation` moved between two states of an object
pub fn generation_changed<K: Resource>(old: &K, new: &K) -> bool {
    old.meta().generation != new.meta().generation
}
