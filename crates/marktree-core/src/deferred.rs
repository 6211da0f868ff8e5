use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde::ser::{SerializeStruct, Serializer};

use crate::error::{OverrideError, panic_message};
use crate::fence::Fallback;
use crate::node::{Element, RenderNode};

type Loader = BoxFuture<'static, Result<RenderNode, OverrideError>>;

/// Timing and placeholder for asynchronously loaded rich blocks.
#[derive(Clone, Debug, PartialEq)]
pub struct DeferredConfig {
    /// Nothing is shown until this much time has passed.
    pub delay: Duration,
    /// A load still pending after this long counts as failed.
    pub timeout: Duration,
    pub placeholder: Box<RenderNode>,
}

impl Default for DeferredConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(200),
            timeout: Duration::from_secs(3),
            placeholder: Box::new(
                Element::new("div")
                    .with_attr("class", "rich-block-loading")
                    .with_child(RenderNode::text("Loading…"))
                    .into(),
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SlotState {
    Pending,
    Loaded(RenderNode),
    Failed(String),
    TimedOut,
}

impl SlotState {
    pub fn is_settled(&self) -> bool {
        !matches!(self, SlotState::Pending)
    }

    fn label(&self) -> &'static str {
        match self {
            SlotState::Pending => "pending",
            SlotState::Loaded(_) => "loaded",
            SlotState::Failed(_) => "failed",
            SlotState::TimedOut => "timed_out",
        }
    }
}

struct DeferredSlot {
    loader: tokio::sync::Mutex<Option<Loader>>,
    state: Mutex<SlotState>,
    created: Instant,
}

/// A pending rich block. The compile pass returns it immediately; the host
/// drives [`DeferredNode::settle`] and swaps the result in when it resolves.
#[derive(Clone)]
pub struct DeferredNode {
    key: String,
    config: DeferredConfig,
    fallback: Fallback,
    slot: Arc<DeferredSlot>,
}

impl DeferredNode {
    pub fn new(key: String, loader: Loader, fallback: Fallback, config: DeferredConfig) -> Self {
        Self {
            key,
            config,
            fallback,
            slot: Arc::new(DeferredSlot {
                loader: tokio::sync::Mutex::new(Some(loader)),
                state: Mutex::new(SlotState::Pending),
                created: Instant::now(),
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn config(&self) -> &DeferredConfig {
        &self.config
    }

    pub fn state(&self) -> SlotState {
        self.lock_state().clone()
    }

    /// Drives the loader to completion and returns the node to mount.
    ///
    /// The timeout counts from node creation. Later calls return the
    /// settled view without polling again.
    pub async fn settle(&self) -> RenderNode {
        let mut loader = self.slot.loader.lock().await;
        if let Some(future) = loader.take() {
            let remaining = self.config.timeout.saturating_sub(self.slot.created.elapsed());
            let outcome = tokio::time::timeout(remaining, AssertUnwindSafe(future).catch_unwind()).await;
            let next = match outcome {
                Ok(Ok(Ok(node))) => SlotState::Loaded(node),
                Ok(Ok(Err(err))) => {
                    tracing::warn!(key = %self.key, error = %err, "rich block load failed; using default render");
                    SlotState::Failed(err.to_string())
                }
                Ok(Err(payload)) => {
                    let err = OverrideError::Panicked(panic_message(&*payload));
                    tracing::warn!(key = %self.key, error = %err, "rich block load failed; using default render");
                    SlotState::Failed(err.to_string())
                }
                Err(_) => {
                    tracing::warn!(key = %self.key, timeout = ?self.config.timeout, "rich block load timed out");
                    SlotState::TimedOut
                }
            };
            *self.lock_state() = next;
        }
        drop(loader);
        self.snapshot()
    }

    /// What the host should show at `now`; `None` means nothing yet.
    pub fn current(&self, now: Instant) -> Option<RenderNode> {
        let elapsed = now.saturating_duration_since(self.slot.created);
        match &*self.lock_state() {
            SlotState::Loaded(node) => Some(node.clone()),
            SlotState::Failed(_) | SlotState::TimedOut => Some(self.fallback.render()),
            SlotState::Pending if elapsed >= self.config.timeout => Some(self.fallback.render()),
            SlotState::Pending if elapsed >= self.config.delay => {
                Some(RenderNode::clone(&self.config.placeholder))
            }
            SlotState::Pending => None,
        }
    }

    /// Loaded node if there is one, otherwise the default render.
    pub fn snapshot(&self) -> RenderNode {
        match &*self.lock_state() {
            SlotState::Loaded(node) => node.clone(),
            _ => self.fallback.render(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SlotState> {
        self.slot.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for DeferredNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredNode")
            .field("key", &self.key)
            .field("state", &self.lock_state().label())
            .finish()
    }
}

impl PartialEq for DeferredNode {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl Serialize for DeferredNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DeferredNode", 4)?;
        state.serialize_field("key", &self.key)?;
        state.serialize_field("state", self.lock_state().label())?;
        state.serialize_field("delay_ms", &(self.config.delay.as_millis() as u64))?;
        state.serialize_field("timeout_ms", &(self.config.timeout.as_millis() as u64))?;
        state.end()
    }
}
