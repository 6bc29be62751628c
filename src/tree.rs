use std::{path::Path, sync::Arc};

use tracing::{debug, info};

use crate::{error::LoadError, parser, BehaviorNode, Context, NodeStatus, Registry};

/// A root node together with the context its nodes share.
///
/// The tree does not drive itself; call [`BehaviorTree::tick`] at whatever
/// rate the application needs.
pub struct BehaviorTree {
    root: Box<dyn BehaviorNode>,
    context: Arc<Context>,
    last_status: Option<NodeStatus>,
    ticks: u64,
}

impl BehaviorTree {
    /// Wraps an already built root and binds it to `context`.
    pub fn new(mut root: Box<dyn BehaviorNode>, context: Arc<Context>) -> Self {
        root.initialize(context.clone());
        Self {
            root,
            context,
            last_status: None,
            ticks: 0,
        }
    }

    pub fn from_xml(
        source: &str,
        registry: &Registry,
        context: Arc<Context>,
    ) -> Result<Self, LoadError> {
        let root = parser::load_xml(source, registry, &context)?;
        Ok(Self::with_loaded_root(root, context))
    }

    pub fn from_file(
        path: impl AsRef<Path>,
        registry: &Registry,
        context: Arc<Context>,
    ) -> Result<Self, LoadError> {
        let root = parser::load_file(path, registry, &context)?;
        Ok(Self::with_loaded_root(root, context))
    }

    fn with_loaded_root(root: Box<dyn BehaviorNode>, context: Arc<Context>) -> Self {
        Self {
            root,
            context,
            last_status: None,
            ticks: 0,
        }
    }

    /// Executes the root once.
    pub async fn tick(&mut self) -> NodeStatus {
        let status = self.root.execute().await;
        self.ticks += 1;
        if self.last_status != Some(status) {
            info!(tree = %self.root.name(), %status, tick = self.ticks, "tree status changed");
        } else {
            debug!(tree = %self.root.name(), %status, tick = self.ticks, "tree ticked");
        }
        self.last_status = Some(status);
        status
    }

    pub async fn abort(&self) {
        info!(tree = %self.root.name(), "aborting tree");
        self.root.abort().await;
    }

    /// Clears all resumption state so the next tick starts from scratch.
    pub async fn reset(&mut self) {
        self.root.reset().await;
        self.last_status = None;
    }

    pub fn root(&self) -> &dyn BehaviorNode {
        self.root.as_ref()
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn last_status(&self) -> Option<NodeStatus> {
        self.last_status
    }

    /// Number of ticks since the tree was created.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}
