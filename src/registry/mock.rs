//! Mock connection for testing without live backends.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::sleep;
use tracing::debug;

use crate::context::CallContext;
use crate::errors::DispatchError;

use super::RpcConnection;

/// Scripted behavior for a [`MockConnection`].
#[derive(Debug, Clone)]
enum MockBehavior {
    /// Always succeed with this reply.
    Success(Value),
    /// Always fail with this error.
    Failure(DispatchError),
    /// Fail for the first N calls, then succeed.
    FailThenSucceed {
        failures: u64,
        error: DispatchError,
        reply: Value,
    },
}

/// Connection that generates scripted responses and counts calls.
#[derive(Debug)]
pub struct MockConnection {
    behavior: MockBehavior,
    latency: Duration,
    calls: AtomicU64,
    methods: Mutex<Vec<String>>,
}

impl MockConnection {
    /// A connection that always succeeds with `reply`.
    pub fn success(reply: Value) -> Self {
        Self {
            behavior: MockBehavior::Success(reply),
            latency: Duration::ZERO,
            calls: AtomicU64::new(0),
            methods: Mutex::new(Vec::new()),
        }
    }

    /// A connection that always fails with `error`.
    pub fn failure(error: DispatchError) -> Self {
        Self {
            behavior: MockBehavior::Failure(error),
            latency: Duration::ZERO,
            calls: AtomicU64::new(0),
            methods: Mutex::new(Vec::new()),
        }
    }

    /// A connection failing `failures` times before succeeding with `reply`.
    pub fn fail_then_succeed(failures: u64, error: DispatchError, reply: Value) -> Self {
        Self {
            behavior: MockBehavior::FailThenSucceed {
                failures,
                error,
                reply,
            },
            latency: Duration::ZERO,
            calls: AtomicU64::new(0),
            methods: Mutex::new(Vec::new()),
        }
    }

    /// Add simulated call latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of calls observed so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Methods observed so far, in call order.
    pub fn methods(&self) -> Vec<String> {
        self.methods.lock().unwrap().clone()
    }
}

#[async_trait]
impl RpcConnection for MockConnection {
    async fn call(
        &self,
        ctx: &CallContext,
        method: &str,
        _args: &Value,
        reply: &mut Value,
    ) -> Result<(), DispatchError> {
        let call_no = self.calls.fetch_add(1, Ordering::Relaxed);
        self.methods.lock().unwrap().push(method.to_string());

        if !self.latency.is_zero() {
            ctx.run(async {
                sleep(self.latency).await;
                Ok(())
            })
            .await?;
        }

        match &self.behavior {
            MockBehavior::Success(value) => {
                debug!(method, "mock success");
                *reply = value.clone();
                Ok(())
            }
            MockBehavior::Failure(err) => {
                debug!(method, error = %err, "mock failure");
                Err(err.clone())
            }
            MockBehavior::FailThenSucceed {
                failures,
                error,
                reply: value,
            } => {
                if call_no < *failures {
                    debug!(method, call_no, "mock scripted failure");
                    Err(error.clone())
                } else {
                    *reply = value.clone();
                    Ok(())
                }
            }
        }
    }
}
