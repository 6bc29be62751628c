use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, trace};

use super::{abort_all, reset_all};
use crate::{
    error::AddChildResult, BehaviorNode, Context, NodeBase, NodeStatus, NumChildren, PropertySpec,
    PropertyValue, Symbol,
};

/// Ticks children in order, remembering the child that returned `Running`
/// so the next tick resumes there instead of starting over.
pub struct SequenceNode {
    base: NodeBase,
    children: Vec<Box<dyn BehaviorNode>>,
    current_child: AtomicUsize,
}

impl Default for SequenceNode {
    fn default() -> Self {
        Self {
            base: NodeBase::new("Sequence"),
            children: vec![],
            current_child: AtomicUsize::new(0),
        }
    }
}

impl SequenceNode {
    /// Index of the child the next tick starts from.
    pub fn cursor(&self) -> usize {
        self.current_child.load(Ordering::Acquire)
    }
}

#[async_trait]
impl BehaviorNode for SequenceNode {
    crate::node_base!();

    fn initialize(&mut self, context: Arc<Context>) {
        for child in &mut self.children {
            child.initialize(context.clone());
        }
        self.base.set_context(context);
    }

    fn num_children(&self) -> NumChildren {
        NumChildren::Infinite
    }

    fn add_child(&mut self, child: Box<dyn BehaviorNode>) -> AddChildResult {
        self.children.push(child);
        Ok(())
    }

    async fn execute(&self) -> NodeStatus {
        let from = self.cursor();
        for (i, child) in self.children.iter().enumerate().skip(from) {
            match child.execute().await {
                NodeStatus::Running => {
                    trace!(node = %self.name(), child = i, "sequence suspended");
                    self.current_child.store(i, Ordering::Release);
                    return NodeStatus::Running;
                }
                NodeStatus::Failure => {
                    self.current_child.store(0, Ordering::Release);
                    return NodeStatus::Failure;
                }
                NodeStatus::Success => (),
            }
        }
        self.current_child.store(0, Ordering::Release);
        NodeStatus::Success
    }

    async fn abort(&self) {
        abort_all(&self.children).await;
    }

    async fn reset(&self) {
        self.current_child.store(0, Ordering::Release);
        reset_all(&self.children).await;
    }
}

/// Ticks children in order until one succeeds. Registered as both
/// `Selector` and `Fallback`.
pub struct SelectorNode {
    base: NodeBase,
    children: Vec<Box<dyn BehaviorNode>>,
    current_child: AtomicUsize,
}

impl Default for SelectorNode {
    fn default() -> Self {
        Self {
            base: NodeBase::new("Selector"),
            children: vec![],
            current_child: AtomicUsize::new(0),
        }
    }
}

impl SelectorNode {
    pub fn cursor(&self) -> usize {
        self.current_child.load(Ordering::Acquire)
    }
}

#[async_trait]
impl BehaviorNode for SelectorNode {
    crate::node_base!();

    fn initialize(&mut self, context: Arc<Context>) {
        for child in &mut self.children {
            child.initialize(context.clone());
        }
        self.base.set_context(context);
    }

    fn num_children(&self) -> NumChildren {
        NumChildren::Infinite
    }

    fn add_child(&mut self, child: Box<dyn BehaviorNode>) -> AddChildResult {
        self.children.push(child);
        Ok(())
    }

    async fn execute(&self) -> NodeStatus {
        let from = self.cursor();
        for (i, child) in self.children.iter().enumerate().skip(from) {
            match child.execute().await {
                NodeStatus::Running => {
                    trace!(node = %self.name(), child = i, "selector suspended");
                    self.current_child.store(i, Ordering::Release);
                    return NodeStatus::Running;
                }
                NodeStatus::Success => {
                    self.current_child.store(0, Ordering::Release);
                    return NodeStatus::Success;
                }
                NodeStatus::Failure => (),
            }
        }
        self.current_child.store(0, Ordering::Release);
        NodeStatus::Failure
    }

    async fn abort(&self) {
        abort_all(&self.children).await;
    }

    async fn reset(&self) {
        self.current_child.store(0, Ordering::Release);
        reset_all(&self.children).await;
    }
}

/// Ticks all children concurrently on every tick. There is no memory of
/// earlier ticks, so children must tolerate being invoked again.
pub struct ParallelNode {
    base: NodeBase,
    children: Vec<Box<dyn BehaviorNode>>,
    pub success_threshold: i32,
    pub failure_threshold: i32,
}

impl Default for ParallelNode {
    fn default() -> Self {
        Self {
            base: NodeBase::new("Parallel"),
            children: vec![],
            success_threshold: 1,
            failure_threshold: 1,
        }
    }
}

impl ParallelNode {
    pub fn new(success_threshold: i32, failure_threshold: i32) -> Self {
        Self {
            success_threshold,
            failure_threshold,
            ..Self::default()
        }
    }
}

#[async_trait]
impl BehaviorNode for ParallelNode {
    crate::node_base!();

    fn initialize(&mut self, context: Arc<Context>) {
        for child in &mut self.children {
            child.initialize(context.clone());
        }
        self.base.set_context(context);
    }

    fn provided_properties(&self) -> Vec<PropertySpec> {
        vec![
            PropertySpec::int("SuccessThreshold"),
            PropertySpec::int("FailureThreshold"),
        ]
    }

    fn set_property(&mut self, key: Symbol, value: PropertyValue) {
        match (key.as_str(), value) {
            ("SuccessThreshold", PropertyValue::Int(v)) => self.success_threshold = v,
            ("FailureThreshold", PropertyValue::Int(v)) => self.failure_threshold = v,
            _ => (),
        }
    }

    fn num_children(&self) -> NumChildren {
        NumChildren::Infinite
    }

    fn add_child(&mut self, child: Box<dyn BehaviorNode>) -> AddChildResult {
        self.children.push(child);
        Ok(())
    }

    async fn execute(&self) -> NodeStatus {
        let results = join_all(self.children.iter().map(|child| child.execute())).await;

        let count = |status: NodeStatus| results.iter().filter(|res| **res == status).count() as i64;
        let successes = count(NodeStatus::Success);
        let failures = count(NodeStatus::Failure);
        debug!(
            node = %self.name(),
            successes,
            failures,
            total = results.len(),
            "parallel tick finished"
        );

        if successes >= i64::from(self.success_threshold) {
            NodeStatus::Success
        } else if failures >= i64::from(self.failure_threshold) {
            NodeStatus::Failure
        } else {
            NodeStatus::Running
        }
    }

    async fn abort(&self) {
        abort_all(&self.children).await;
    }

    async fn reset(&self) {
        reset_all(&self.children).await;
    }
}
