use std::{
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::{
    error::{AddChildError, AddChildResult},
    BehaviorNode, Context, NodeBase, NodeStatus, NumChildren, PropertySpec, PropertyValue, Symbol,
};

/// `initialize`, `num_children` and `add_child` for a decorator whose child
/// lives in `child: Option<Box<dyn BehaviorNode>>`.
macro_rules! single_child {
    () => {
        fn initialize(&mut self, context: Arc<Context>) {
            if let Some(child) = self.child.as_mut() {
                child.initialize(context.clone());
            }
            self.base.set_context(context);
        }

        fn num_children(&self) -> NumChildren {
            NumChildren::Finite(1)
        }

        fn add_child(&mut self, child: Box<dyn BehaviorNode>) -> AddChildResult {
            if self.child.is_some() {
                return Err(AddChildError::TooManyNodes);
            }
            self.child = Some(child);
            Ok(())
        }
    };
}

fn millis(ms: i32) -> Duration {
    Duration::from_millis(u64::try_from(ms).unwrap_or(0))
}

/// Retries a failing child with a backoff, all within one tick.
///
/// A child that reports `Running` ends the tick; the next tick starts again
/// from the first attempt.
pub struct RetryNode {
    base: NodeBase,
    child: Option<Box<dyn BehaviorNode>>,
    pub max_retries: i32,
    pub backoff_ms: i32,
    pub exponential_backoff: bool,
}

impl Default for RetryNode {
    fn default() -> Self {
        Self {
            base: NodeBase::new("Retry"),
            child: None,
            max_retries: 3,
            backoff_ms: 100,
            exponential_backoff: true,
        }
    }
}

impl RetryNode {
    pub fn new(max_retries: i32, backoff_ms: i32, exponential_backoff: bool) -> Self {
        Self {
            max_retries,
            backoff_ms,
            exponential_backoff,
            ..Self::default()
        }
    }

    /// Delay after the failed `attempt` (1-based).
    fn backoff(&self, attempt: i32) -> Duration {
        let base = u64::try_from(self.backoff_ms).unwrap_or(0);
        let ms = if self.exponential_backoff {
            let exp = u32::try_from(attempt - 1).unwrap_or(0);
            base.saturating_mul(2u64.saturating_pow(exp))
        } else {
            base
        };
        Duration::from_millis(ms)
    }
}

#[async_trait]
impl BehaviorNode for RetryNode {
    crate::node_base!();
    single_child!();

    fn provided_properties(&self) -> Vec<PropertySpec> {
        vec![
            PropertySpec::int("MaxRetries"),
            PropertySpec::int("BackoffMs"),
            PropertySpec::bool("ExponentialBackoff"),
        ]
    }

    fn set_property(&mut self, key: Symbol, value: PropertyValue) {
        match (key.as_str(), value) {
            ("MaxRetries", PropertyValue::Int(v)) => self.max_retries = v,
            ("BackoffMs", PropertyValue::Int(v)) => self.backoff_ms = v,
            ("ExponentialBackoff", PropertyValue::Bool(v)) => self.exponential_backoff = v,
            _ => (),
        }
    }

    async fn execute(&self) -> NodeStatus {
        let Some(child) = &self.child else {
            return NodeStatus::Failure;
        };

        for attempt in 1..=self.max_retries {
            debug!(node = %self.name(), attempt, max = self.max_retries, "retry attempt");

            match child.execute().await {
                NodeStatus::Success => {
                    debug!(node = %self.name(), attempt, "retry succeeded");
                    return NodeStatus::Success;
                }
                NodeStatus::Running => return NodeStatus::Running,
                NodeStatus::Failure => (),
            }

            if attempt < self.max_retries {
                let delay = self.backoff(attempt);
                debug!(node = %self.name(), delay_ms = delay.as_millis() as u64, "retry backing off");
                tokio::time::sleep(delay).await;
            }
        }

        warn!(node = %self.name(), max = self.max_retries, "retry failed after all attempts");
        NodeStatus::Failure
    }

    async fn abort(&self) {
        if let Some(child) = &self.child {
            child.abort().await;
        }
    }

    async fn reset(&self) {
        if let Some(child) = &self.child {
            child.reset().await;
        }
    }
}

/// Retries the child with a fixed delay until it succeeds or the attempt
/// budget (`NumAttempts`, negative for unlimited) runs out.
pub struct RetryUntilSuccessNode {
    base: NodeBase,
    child: Option<Box<dyn BehaviorNode>>,
    pub num_attempts: i32,
    pub delay_ms: i32,
    current_attempt: AtomicI64,
}

impl Default for RetryUntilSuccessNode {
    fn default() -> Self {
        Self {
            base: NodeBase::new("RetryUntilSuccess"),
            child: None,
            num_attempts: -1,
            delay_ms: 1000,
            current_attempt: AtomicI64::new(0),
        }
    }
}

impl RetryUntilSuccessNode {
    pub fn new(num_attempts: i32, delay_ms: i32) -> Self {
        Self {
            num_attempts,
            delay_ms,
            ..Self::default()
        }
    }

    /// Attempts made since the last terminal status.
    pub fn current_attempt(&self) -> i64 {
        self.current_attempt.load(Ordering::Acquire)
    }

    fn has_attempts_left(&self) -> bool {
        self.num_attempts < 0 || self.current_attempt() < i64::from(self.num_attempts)
    }
}

#[async_trait]
impl BehaviorNode for RetryUntilSuccessNode {
    crate::node_base!();
    single_child!();

    fn provided_properties(&self) -> Vec<PropertySpec> {
        vec![PropertySpec::int("NumAttempts"), PropertySpec::int("DelayMs")]
    }

    fn set_property(&mut self, key: Symbol, value: PropertyValue) {
        match (key.as_str(), value) {
            ("NumAttempts", PropertyValue::Int(v)) => self.num_attempts = v,
            ("DelayMs", PropertyValue::Int(v)) => self.delay_ms = v,
            _ => (),
        }
    }

    async fn execute(&self) -> NodeStatus {
        let Some(child) = &self.child else {
            return NodeStatus::Failure;
        };

        while self.has_attempts_left() {
            let attempt = self.current_attempt.fetch_add(1, Ordering::AcqRel) + 1;
            debug!(node = %self.name(), attempt, "retry-until-success attempt");

            match child.execute().await {
                NodeStatus::Success => {
                    info!(node = %self.name(), attempt, "retry-until-success succeeded");
                    self.current_attempt.store(0, Ordering::Release);
                    return NodeStatus::Success;
                }
                NodeStatus::Running => return NodeStatus::Running,
                NodeStatus::Failure => (),
            }

            if self.has_attempts_left() {
                tokio::time::sleep(millis(self.delay_ms)).await;
            }
        }

        warn!(node = %self.name(), max = self.num_attempts, "retry-until-success gave up");
        self.current_attempt.store(0, Ordering::Release);
        NodeStatus::Failure
    }

    async fn abort(&self) {
        self.current_attempt.store(0, Ordering::Release);
        if let Some(child) = &self.child {
            child.abort().await;
        }
    }

    async fn reset(&self) {
        self.current_attempt.store(0, Ordering::Release);
        if let Some(child) = &self.child {
            child.reset().await;
        }
    }
}

/// Races the child against a timer.
///
/// The child runs as a detached task. When the timer wins, the child is
/// asked to abort and this node reports `Failure` right away; the task itself
/// keeps going until the child winds down on its own.
pub struct TimeoutNode {
    base: NodeBase,
    child: Option<Arc<dyn BehaviorNode>>,
    pub timeout_ms: i32,
}

impl Default for TimeoutNode {
    fn default() -> Self {
        Self {
            base: NodeBase::new("Timeout"),
            child: None,
            timeout_ms: 5000,
        }
    }
}

impl TimeoutNode {
    pub fn new(timeout_ms: i32) -> Self {
        Self {
            timeout_ms,
            ..Self::default()
        }
    }
}

#[async_trait]
impl BehaviorNode for TimeoutNode {
    crate::node_base!();

    fn initialize(&mut self, context: Arc<Context>) {
        match self.child.as_mut().map(Arc::get_mut) {
            Some(Some(child)) => child.initialize(context.clone()),
            Some(None) => warn!(
                node = %self.base.name,
                "child is still held by a detached execution, not re-initialized"
            ),
            None => (),
        }
        self.base.set_context(context);
    }

    fn provided_properties(&self) -> Vec<PropertySpec> {
        vec![PropertySpec::int("TimeoutMs")]
    }

    fn set_property(&mut self, key: Symbol, value: PropertyValue) {
        if let ("TimeoutMs", PropertyValue::Int(v)) = (key.as_str(), value) {
            self.timeout_ms = v;
        }
    }

    fn num_children(&self) -> NumChildren {
        NumChildren::Finite(1)
    }

    fn add_child(&mut self, child: Box<dyn BehaviorNode>) -> AddChildResult {
        if self.child.is_some() {
            return Err(AddChildError::TooManyNodes);
        }
        self.child = Some(Arc::from(child));
        Ok(())
    }

    async fn execute(&self) -> NodeStatus {
        let Some(child) = &self.child else {
            return NodeStatus::Failure;
        };
        debug!(node = %self.name(), timeout_ms = self.timeout_ms, "timeout executing child");

        let detached = child.clone();
        let mut task = tokio::spawn(async move { detached.execute().await });

        tokio::select! {
            joined = &mut task => match joined {
                Ok(status) => {
                    debug!(node = %self.name(), %status, "timeout child completed");
                    status
                }
                Err(e) => {
                    error!(node = %self.name(), error = %e, "timeout child task failed");
                    NodeStatus::Failure
                }
            },
            _ = tokio::time::sleep(millis(self.timeout_ms)) => {
                warn!(node = %self.name(), timeout_ms = self.timeout_ms, "timeout exceeded, aborting child");
                child.abort().await;
                NodeStatus::Failure
            }
        }
    }

    async fn abort(&self) {
        if let Some(child) = &self.child {
            child.abort().await;
        }
    }

    async fn reset(&self) {
        if let Some(child) = &self.child {
            child.reset().await;
        }
    }
}

/// Runs the child at most once per tick, `Count` times (negative for
/// forever).
///
/// With `StopOnFailure` unset a failed iteration still counts toward
/// `Count`.
pub struct RepeatNode {
    base: NodeBase,
    child: Option<Box<dyn BehaviorNode>>,
    pub count: i32,
    pub stop_on_failure: bool,
    current_iteration: AtomicI64,
}

impl Default for RepeatNode {
    fn default() -> Self {
        Self {
            base: NodeBase::new("Repeat"),
            child: None,
            count: -1,
            stop_on_failure: true,
            current_iteration: AtomicI64::new(0),
        }
    }
}

impl RepeatNode {
    pub fn new(count: i32, stop_on_failure: bool) -> Self {
        Self {
            count,
            stop_on_failure,
            ..Self::default()
        }
    }

    /// Iterations completed since the last terminal status.
    pub fn current_iteration(&self) -> i64 {
        self.current_iteration.load(Ordering::Acquire)
    }
}

#[async_trait]
impl BehaviorNode for RepeatNode {
    crate::node_base!();
    single_child!();

    fn provided_properties(&self) -> Vec<PropertySpec> {
        vec![PropertySpec::int("Count"), PropertySpec::bool("StopOnFailure")]
    }

    fn set_property(&mut self, key: Symbol, value: PropertyValue) {
        match (key.as_str(), value) {
            ("Count", PropertyValue::Int(v)) => self.count = v,
            ("StopOnFailure", PropertyValue::Bool(v)) => self.stop_on_failure = v,
            _ => (),
        }
    }

    async fn execute(&self) -> NodeStatus {
        let Some(child) = &self.child else {
            return NodeStatus::Failure;
        };
        if self.count == 0 {
            return NodeStatus::Success;
        }

        match child.execute().await {
            NodeStatus::Running => NodeStatus::Running,
            NodeStatus::Failure if self.stop_on_failure => {
                warn!(
                    node = %self.name(),
                    iteration = self.current_iteration() + 1,
                    "repeat stopped by failure"
                );
                self.current_iteration.store(0, Ordering::Release);
                NodeStatus::Failure
            }
            _ => {
                child.reset().await;
                if self.count < 0 {
                    return NodeStatus::Running;
                }
                let done = self.current_iteration.fetch_add(1, Ordering::AcqRel) + 1;
                if done >= i64::from(self.count) {
                    debug!(node = %self.name(), iterations = done, "repeat completed");
                    self.current_iteration.store(0, Ordering::Release);
                    NodeStatus::Success
                } else {
                    NodeStatus::Running
                }
            }
        }
    }

    async fn abort(&self) {
        self.current_iteration.store(0, Ordering::Release);
        if let Some(child) = &self.child {
            child.abort().await;
        }
    }

    async fn reset(&self) {
        self.current_iteration.store(0, Ordering::Release);
        if let Some(child) = &self.child {
            child.reset().await;
        }
    }
}

/// Swaps `Success` and `Failure`.
pub struct InverterNode {
    base: NodeBase,
    child: Option<Box<dyn BehaviorNode>>,
}

impl Default for InverterNode {
    fn default() -> Self {
        Self {
            base: NodeBase::new("Inverter"),
            child: None,
        }
    }
}

#[async_trait]
impl BehaviorNode for InverterNode {
    crate::node_base!();
    single_child!();

    async fn execute(&self) -> NodeStatus {
        let Some(child) = &self.child else {
            return NodeStatus::Failure;
        };
        match child.execute().await {
            NodeStatus::Running => NodeStatus::Running,
            NodeStatus::Success => NodeStatus::Failure,
            NodeStatus::Failure => NodeStatus::Success,
        }
    }

    async fn abort(&self) {
        if let Some(child) = &self.child {
            child.abort().await;
        }
    }

    async fn reset(&self) {
        if let Some(child) = &self.child {
            child.reset().await;
        }
    }
}

/// Reports `Success` whatever the child's terminal status was.
pub struct SucceederNode {
    base: NodeBase,
    child: Option<Box<dyn BehaviorNode>>,
}

impl Default for SucceederNode {
    fn default() -> Self {
        Self {
            base: NodeBase::new("Succeeder"),
            child: None,
        }
    }
}

#[async_trait]
impl BehaviorNode for SucceederNode {
    crate::node_base!();
    single_child!();

    async fn execute(&self) -> NodeStatus {
        let Some(child) = &self.child else {
            return NodeStatus::Failure;
        };
        match child.execute().await {
            NodeStatus::Running => NodeStatus::Running,
            status => {
                debug!(node = %self.name(), was = %status, "succeeder forcing success");
                NodeStatus::Success
            }
        }
    }

    async fn abort(&self) {
        if let Some(child) = &self.child {
            child.abort().await;
        }
    }

    async fn reset(&self) {
        if let Some(child) = &self.child {
            child.reset().await;
        }
    }
}
