//! # Test Doubles
//!
//! [`MockRemote`] is an in-memory remote accessor for exercising the engine without a
//! network. [`RecordingLocks`] is a real keyed coordinator that also remembers the order
//! in which locks were taken and released.
//!
//! ## What the mock can simulate
//!
//! | Behaviour | Knob |
//! |-----------|------|
//! | One-off failure of a call kind | [`MockRemote::fail_next`] |
//! | Long-running operations | [`MockRemote::complete_after_polls`] |
//! | Operations that never finish | [`MockRemote::never_complete`] |
//! | Asynchronous acceptance without a poller | [`MockRemote::accept_without_poller`] |
//! | Secrets redacted on GET | [`MockRemote::with_redaction`] |
//! | Slow calls | [`MockRemote::with_latency`] |
//! | Interleaved read-modify-write | [`MockRemote::track_read_modify_write`] |
//!
//! Every call is appended to a log ([`MockRemote::calls`]) so tests can assert that a
//! rejected operation never reached the remote, or that a write followed a read.
//!
//! ```rust
//! use reconcile_framework::mock::{CallKind, MockRemote};
//! use reconcile_framework::RemoteApi;
//! # use reconcile_framework::id::{IdPattern, ResourceId, Segment};
//! # #[derive(Debug, Clone, PartialEq, Eq, Hash)]
//! # struct ThingId(String);
//! # impl ResourceId for ThingId {
//! #     const KIND: &'static str = "Thing";
//! #     const PATTERN: IdPattern =
//! #         IdPattern::new(&[Segment::Static("things"), Segment::Value("name")]);
//! #     fn from_values(mut v: Vec<String>) -> Self { ThingId(v.remove(0)) }
//! #     fn values(&self) -> Vec<&str> { vec![self.0.as_str()] }
//! # }
//! # impl std::fmt::Display for ThingId {
//! #     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//! #         f.write_str(&self.format_id())
//! #     }
//! # }
//!
//! #[tokio::main]
//! async fn main() {
//!     let remote: MockRemote<String> = MockRemote::new();
//!     let id = ThingId("a".into());
//!
//!     remote.insert(&id, "hello".to_string());
//!     let found = RemoteApi::<ThingId, String>::get(&remote, &id).await.unwrap();
//!
//!     assert_eq!(found.as_deref(), Some("hello"));
//!     assert_eq!(remote.call_count(CallKind::Get), 1);
//! }
//! ```

use crate::error::RemoteError;
use crate::id::ResourceId;
use crate::lock::{KeyedLocks, LockCoordinator, LockHandle, LockKey};
use crate::remote::{PollStatus, Poller, RemoteApi, SecretLister, Submission};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Kinds of remote call the mock records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Get,
    CreateOrUpdate,
    Delete,
    ListSecrets,
}

/// One recorded remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub kind: CallKind,
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Immediate,
    AfterPolls(usize),
    Never,
    AcceptedWithoutPoller,
}

enum Mutation<W> {
    Put(String, W),
    Remove(String),
}

struct State<W> {
    objects: HashMap<String, W>,
    calls: Vec<Call>,
    failures: HashMap<CallKind, VecDeque<RemoteError>>,
    deferred: Vec<(usize, Mutation<W>)>,
    track_rmw: bool,
    open_reads: HashSet<String>,
    overlaps: usize,
}

impl<W> State<W> {
    fn apply(&mut self, mutation: Mutation<W>) {
        match mutation {
            Mutation::Put(key, model) => {
                self.objects.insert(key, model);
            }
            Mutation::Remove(key) => {
                self.objects.remove(&key);
            }
        }
    }

    /// Apply deferred mutations that are due, then age the rest by one read.
    fn age_deferred(&mut self, key: &str) {
        let mut due = Vec::new();
        let mut index = 0;
        while index < self.deferred.len() {
            let target = match &self.deferred[index].1 {
                Mutation::Put(k, _) | Mutation::Remove(k) => k.as_str(),
            };
            if target != key {
                index += 1;
                continue;
            }
            if self.deferred[index].0 == 0 {
                due.push(self.deferred.remove(index).1);
            } else {
                self.deferred[index].0 -= 1;
                index += 1;
            }
        }
        for mutation in due {
            self.apply(mutation);
        }
    }
}

fn key_of<I: ResourceId>(id: &I) -> String {
    id.lock_key().as_str().to_string()
}

/// An in-memory remote accessor.
///
/// `W` is the wire model, `S` the secret type returned by list-secrets.
pub struct MockRemote<W, S = ()> {
    state: Arc<Mutex<State<W>>>,
    completion: Mutex<Completion>,
    latency: Duration,
    redact: Option<fn(&mut W)>,
    secrets_of: Option<fn(&W) -> Vec<S>>,
    _secret: PhantomData<fn() -> S>,
}

impl<W, S> Default for MockRemote<W, S>
where
    W: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<W, S> MockRemote<W, S>
where
    W: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                objects: HashMap::new(),
                calls: Vec::new(),
                failures: HashMap::new(),
                deferred: Vec::new(),
                track_rmw: false,
                open_reads: HashSet::new(),
                overlaps: 0,
            })),
            completion: Mutex::new(Completion::Immediate),
            latency: Duration::ZERO,
            redact: None,
            secrets_of: None,
            _secret: PhantomData,
        }
    }

    /// Strip secrets from GET responses; list-secrets extracts them from the stored model.
    pub fn with_redaction(mut self, redact: fn(&mut W), secrets_of: fn(&W) -> Vec<S>) -> Self {
        self.redact = Some(redact);
        self.secrets_of = Some(secrets_of);
        self
    }

    /// Delay every call, widening race windows.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Count a second GET of an identifier before a write of the first one.
    pub fn track_read_modify_write(self) -> Self {
        self.lock_state().track_rmw = true;
        self
    }

    fn lock_state(&self) -> MutexGuard<'_, State<W>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn completion(&self) -> Completion {
        *self.completion.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_completion(&self, completion: Completion) {
        *self.completion.lock().unwrap_or_else(PoisonError::into_inner) = completion;
    }

    /// Writes and deletes report `InProgress` `polls` times before succeeding.
    pub fn complete_after_polls(&self, polls: usize) {
        self.set_completion(Completion::AfterPolls(polls));
    }

    /// Writes and deletes never finish.
    pub fn never_complete(&self) {
        self.set_completion(Completion::Never);
    }

    /// Writes and deletes return `Accepted` and take effect after one further GET.
    pub fn accept_without_poller(&self) {
        self.set_completion(Completion::AcceptedWithoutPoller);
    }

    pub fn complete_immediately(&self) {
        self.set_completion(Completion::Immediate);
    }

    /// Fail the next call of `kind` with `error`.
    pub fn fail_next(&self, kind: CallKind, error: RemoteError) {
        self.lock_state()
            .failures
            .entry(kind)
            .or_default()
            .push_back(error);
    }

    /// Seed an object without recording a call.
    pub fn insert<I: ResourceId>(&self, id: &I, model: W) {
        self.lock_state().objects.insert(key_of(id), model);
    }

    /// The stored (unredacted) object.
    pub fn stored<I: ResourceId>(&self, id: &I) -> Option<W> {
        self.lock_state().objects.get(&key_of(id)).cloned()
    }

    pub fn contains<I: ResourceId>(&self, id: &I) -> bool {
        self.lock_state().objects.contains_key(&key_of(id))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock_state().calls.clone()
    }

    pub fn call_count(&self, kind: CallKind) -> usize {
        self.lock_state().calls.iter().filter(|c| c.kind == kind).count()
    }

    pub fn clear_calls(&self) {
        self.lock_state().calls.clear();
    }

    /// Number of read-modify-write overlaps observed.
    pub fn overlaps(&self) -> usize {
        self.lock_state().overlaps
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn record(&self, kind: CallKind, key: &str) -> Result<(), RemoteError> {
        let mut state = self.lock_state();
        state.calls.push(Call {
            kind,
            id: key.to_string(),
        });
        match state.failures.get_mut(&kind).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn submit(&self, mutation: Mutation<W>) -> Submission {
        match self.completion() {
            Completion::Immediate => {
                self.lock_state().apply(mutation);
                Submission::Completed
            }
            Completion::AcceptedWithoutPoller => {
                self.lock_state().deferred.push((1, mutation));
                Submission::Accepted
            }
            Completion::AfterPolls(polls) => Submission::Pending(Box::new(MockPoller {
                state: self.state.clone(),
                remaining: Some(polls),
                mutation: Some(mutation),
            })),
            Completion::Never => Submission::Pending(Box::new(MockPoller {
                state: self.state.clone(),
                remaining: None,
                mutation: Some(mutation),
            })),
        }
    }
}

#[async_trait]
impl<I, W, S> RemoteApi<I, W> for MockRemote<W, S>
where
    I: ResourceId,
    W: Clone + Send + Sync + 'static,
    S: Send + Sync + 'static,
{
    async fn get(&self, id: &I) -> Result<Option<W>, RemoteError> {
        let key = key_of(id);
        self.pause().await;
        self.record(CallKind::Get, &key)?;

        let mut state = self.lock_state();
        if state.track_rmw && !state.open_reads.insert(key.clone()) {
            state.overlaps += 1;
        }
        state.age_deferred(&key);
        let mut found = state.objects.get(&key).cloned();
        drop(state);

        if let (Some(model), Some(redact)) = (found.as_mut(), self.redact) {
            redact(model);
        }
        Ok(found)
    }

    async fn create_or_update(&self, id: &I, model: W) -> Result<Submission, RemoteError> {
        let key = key_of(id);
        self.pause().await;
        self.record(CallKind::CreateOrUpdate, &key)?;
        self.lock_state().open_reads.remove(&key);
        Ok(self.submit(Mutation::Put(key, model)))
    }

    async fn delete(&self, id: &I) -> Result<Submission, RemoteError> {
        let key = key_of(id);
        self.pause().await;
        self.record(CallKind::Delete, &key)?;
        let mut state = self.lock_state();
        state.open_reads.remove(&key);
        if !state.objects.contains_key(&key) {
            return Err(RemoteError::NotFound);
        }
        drop(state);
        Ok(self.submit(Mutation::Remove(key)))
    }
}

#[async_trait]
impl<I, W, S> SecretLister<I, S> for MockRemote<W, S>
where
    I: ResourceId,
    W: Clone + Send + Sync + 'static,
    S: Send + Sync + 'static,
{
    async fn list_secrets(&self, id: &I) -> Result<Vec<S>, RemoteError> {
        let key = key_of(id);
        self.pause().await;
        self.record(CallKind::ListSecrets, &key)?;
        let state = self.lock_state();
        let model = state.objects.get(&key).ok_or(RemoteError::NotFound)?;
        Ok(self.secrets_of.map(|extract| extract(model)).unwrap_or_default())
    }
}

struct MockPoller<W> {
    state: Arc<Mutex<State<W>>>,
    remaining: Option<usize>,
    mutation: Option<Mutation<W>>,
}

#[async_trait]
impl<W: Send + 'static> Poller for MockPoller<W> {
    async fn poll(&mut self) -> Result<PollStatus, RemoteError> {
        match self.remaining.as_mut() {
            None => Ok(PollStatus::InProgress),
            Some(0) => {
                if let Some(mutation) = self.mutation.take() {
                    self.state
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .apply(mutation);
                }
                Ok(PollStatus::Succeeded)
            }
            Some(remaining) => {
                *remaining -= 1;
                Ok(PollStatus::InProgress)
            }
        }
    }
}

/// A lock event observed by [`RecordingLocks`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockEvent {
    Acquired(LockKey),
    Released(LockKey),
}

/// Keyed locks that record every acquire and release.
#[derive(Default, Clone)]
pub struct RecordingLocks {
    inner: Arc<KeyedLocks>,
    events: Arc<Mutex<Vec<LockEvent>>>,
}

impl RecordingLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LockEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Keys in the order they were acquired.
    pub fn acquired(&self) -> Vec<LockKey> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LockEvent::Acquired(key) => Some(key),
                LockEvent::Released(_) => None,
            })
            .collect()
    }

    /// True when every acquired lock has been released.
    pub fn all_released(&self) -> bool {
        let mut held: Vec<LockKey> = Vec::new();
        for event in self.events() {
            match event {
                LockEvent::Acquired(key) => held.push(key),
                LockEvent::Released(key) => {
                    if let Some(pos) = held.iter().position(|k| *k == key) {
                        held.remove(pos);
                    }
                }
            }
        }
        held.is_empty()
    }
}

struct ReleaseRecorder {
    handle: Option<LockHandle>,
    events: Arc<Mutex<Vec<LockEvent>>>,
}

impl Drop for ReleaseRecorder {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(LockEvent::Released(handle.key().clone()));
            drop(handle);
        }
    }
}

#[async_trait]
impl LockCoordinator for RecordingLocks {
    async fn acquire(&self, key: &LockKey) -> LockHandle {
        let handle = self.inner.acquire(key).await;
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LockEvent::Acquired(key.clone()));
        LockHandle::new(
            key.clone(),
            ReleaseRecorder {
                handle: Some(handle),
                events: self.events.clone(),
            },
        )
    }
}
