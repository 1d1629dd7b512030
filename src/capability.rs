//! # Capability Probe & Fallback Gate
//!
//! Every optional heavy backend (speech recognition, local generation,
//! speech synthesis) is wrapped in a [`CapabilityHandle`] so that, from the
//! caller's perspective, the capability behaves as a total function: a
//! missing or broken dependency degrades to a deterministic fallback instead
//! of leaving the process in an undefined state.
//!
//! ## State machine:
//! `Unprobed → Available(backend) | Unavailable { reason }`
//!
//! The transition happens eagerly when the handle is constructed. A handle
//! that came up `Unavailable` gets exactly one re-probe on first use, which
//! covers "dependency installed after process start" without paying the
//! failed-load cost on every call.
//!
//! ## Concurrency:
//! The handle exclusively owns its backend instance and serializes all state
//! transitions and `invoke` calls on one async mutex. Local inference
//! backends are not assumed safe for concurrent calls on a single loaded
//! instance, so throughput is traded for correctness here. The same mutex
//! single-flights the probe: concurrent first use awaits one in-flight
//! probe rather than loading the model twice.

use tokio::sync::Mutex;
use tracing::{info, warn};

/// Errors produced by a gated capability call.
///
/// Every failure mode is a checked, enumerable case; nothing is thrown
/// through the gate.
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityError {
    /// The backend never became available; carries the recorded probe reason.
    Unavailable(String),

    /// The backend was loaded but failed during the call; carries the
    /// original backend message.
    Backend(String),
}

impl std::fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityError::Unavailable(reason) => write!(f, "capability unavailable: {}", reason),
            CapabilityError::Backend(msg) => write!(f, "backend error: {}", msg),
        }
    }
}

/// Probe function: attempt to acquire/load the backend once.
///
/// Failures are reported as a human-readable reason string, never a panic.
type ProbeFn<T> = Box<dyn Fn() -> Result<T, String> + Send + Sync>;

enum GateState<T> {
    /// No probe has run yet (only observable before construction finishes).
    Unprobed,

    /// Backend loaded and owned by the handle.
    Available(T),

    /// Probe failed; `retried` records whether the single lazy re-probe has
    /// been spent.
    Unavailable { reason: String, retried: bool },
}

/// Availability-gated owner of one optional backend instance.
pub struct CapabilityHandle<T> {
    name: &'static str,
    probe: ProbeFn<T>,
    state: Mutex<GateState<T>>,
}

impl<T: Send> CapabilityHandle<T> {
    /// Construct the handle and run the probe eagerly, so load failures are
    /// reported at startup rather than on the first request.
    pub async fn new<P>(name: &'static str, probe: P) -> Self
    where
        P: Fn() -> Result<T, String> + Send + Sync + 'static,
    {
        let handle = Self {
            name,
            probe: Box::new(probe),
            state: Mutex::new(GateState::Unprobed),
        };
        {
            let mut state = handle.state.lock().await;
            handle.attempt_probe(&mut state);
        }
        handle
    }

    /// Run the probe and record the outcome as state. Never propagates the
    /// underlying failure; it is logged and converted to `Unavailable`.
    fn attempt_probe(&self, state: &mut GateState<T>) {
        match (self.probe)() {
            Ok(backend) => {
                info!("{}: backend available", self.name);
                *state = GateState::Available(backend);
            }
            Err(reason) => {
                warn!("{}: backend unavailable: {}", self.name, reason);
                let retried = matches!(state, GateState::Unavailable { retried: true, .. });
                *state = GateState::Unavailable { reason, retried };
            }
        }
    }

    /// If the backend is still unavailable, spend the single lazy re-probe.
    fn ensure_ready(&self, state: &mut GateState<T>) {
        match state {
            GateState::Unprobed => self.attempt_probe(state),
            GateState::Unavailable { retried: false, .. } => {
                info!("{}: re-probing backend on first use", self.name);
                self.attempt_probe(state);
                if let GateState::Unavailable { retried, .. } = state {
                    *retried = true;
                }
            }
            _ => {}
        }
    }

    /// Whether the backend is currently loaded.
    pub async fn available(&self) -> bool {
        matches!(&*self.state.lock().await, GateState::Available(_))
    }

    /// The recorded probe reason, when unavailable.
    pub async fn unavailable_reason(&self) -> Option<String> {
        match &*self.state.lock().await {
            GateState::Unavailable { reason, .. } => Some(reason.clone()),
            _ => None,
        }
    }

    /// Run `op` against the backend if it is available, `fallback` otherwise.
    ///
    /// `op` errors are propagated as [`CapabilityError::Backend`] with the
    /// original message attached. `fallback` receives the recorded reason and
    /// must be deterministic and side-effect free on the rest of the system;
    /// backends with no safe fallback surface
    /// [`CapabilityError::Unavailable`] instead of fabricating output.
    ///
    /// The state lock is held for the whole call, serializing access to the
    /// single backend instance.
    pub async fn invoke<R, Op, Fb>(&self, op: Op, fallback: Fb) -> Result<R, CapabilityError>
    where
        Op: FnOnce(&mut T) -> Result<R, String>,
        Fb: FnOnce(&str) -> Result<R, CapabilityError>,
    {
        let mut state = self.state.lock().await;
        self.ensure_ready(&mut state);

        match &mut *state {
            GateState::Available(backend) => op(backend).map_err(CapabilityError::Backend),
            GateState::Unavailable { reason, .. } => fallback(reason),
            GateState::Unprobed => unreachable!("ensure_ready always leaves a probed state"),
        }
    }
}

/// Standard fallback for capabilities that must not fabricate output
/// (speech-to-text, synthesis): surface the reason as an explicit error.
pub fn no_fallback<R>(reason: &str) -> Result<R, CapabilityError> {
    Err(CapabilityError::Unavailable(reason.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeBackend {
        calls: usize,
    }

    #[tokio::test]
    async fn test_available_after_successful_probe() {
        let handle = CapabilityHandle::new("fake", || Ok(FakeBackend { calls: 0 })).await;
        assert!(handle.available().await);
        assert_eq!(handle.unavailable_reason().await, None);

        let out = handle
            .invoke(
                |b| {
                    b.calls += 1;
                    Ok(b.calls)
                },
                no_fallback,
            )
            .await;
        assert_eq!(out, Ok(1));
    }

    #[tokio::test]
    async fn test_failing_probe_never_reaches_backend() {
        let probes = Arc::new(AtomicUsize::new(0));
        let probe_count = probes.clone();
        let handle: CapabilityHandle<FakeBackend> = CapabilityHandle::new("fake", move || {
            probe_count.fetch_add(1, Ordering::SeqCst);
            Err("not installed".to_string())
        })
        .await;

        assert!(!handle.available().await);
        assert_eq!(handle.unavailable_reason().await.as_deref(), Some("not installed"));

        for _ in 0..5 {
            let out = handle
                .invoke(|_b| -> Result<u32, String> { panic!("backend must not run") }, |reason| {
                    Ok(reason.len() as u32)
                })
                .await;
            assert_eq!(out, Ok("not installed".len() as u32));
        }

        // One eager probe at construction plus exactly one lazy retry.
        assert_eq!(probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_probes_once() {
        let probes = Arc::new(AtomicUsize::new(0));
        let probe_count = probes.clone();
        let handle: Arc<CapabilityHandle<FakeBackend>> =
            Arc::new(CapabilityHandle::new("fake", move || {
                probe_count.fetch_add(1, Ordering::SeqCst);
                Err("still missing".to_string())
            })
            .await);
        let after_construction = probes.load(Ordering::SeqCst);

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle
                    .invoke(
                        |_b| -> Result<&'static str, String> { panic!("backend must not run") },
                        |_reason| Ok("fallback"),
                    )
                    .await
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap(), Ok("fallback"));
        }

        // All concurrent callers shared at most one lazy re-probe.
        assert!(probes.load(Ordering::SeqCst) <= after_construction + 1);
    }

    #[tokio::test]
    async fn test_lazy_reprobe_can_recover() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempt_count = attempts.clone();
        let handle = CapabilityHandle::new("fake", move || {
            // Fails at construction, succeeds on the lazy retry.
            if attempt_count.fetch_add(1, Ordering::SeqCst) == 0 {
                Err("warming up".to_string())
            } else {
                Ok(FakeBackend { calls: 0 })
            }
        })
        .await;

        assert!(!handle.available().await);
        let out = handle.invoke(|b| Ok(b.calls), no_fallback).await;
        assert_eq!(out, Ok(0));
        assert!(handle.available().await);
    }

    #[tokio::test]
    async fn test_backend_error_carries_message() {
        let handle = CapabilityHandle::new("fake", || Ok(FakeBackend { calls: 0 })).await;
        let out: Result<(), _> = handle
            .invoke(|_b| Err("inference exploded".to_string()), no_fallback)
            .await;
        assert_eq!(out, Err(CapabilityError::Backend("inference exploded".to_string())));
    }
}
