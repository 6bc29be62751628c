//! Builds a small tree in code instead of XML and runs it to completion.

use ::behavior_tree_xml::{
    async_trait, node_base, BehaviorNode, BehaviorTree, Context, InverterNode, NodeBase,
    NodeStatus, RetryNode, SelectorNode, SequenceNode, SetBlackboardValueNode, WaitNode,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing_subscriber::EnvFilter;

/// Succeeds once the gripper has been closed.
struct IsGripperClosed {
    base: NodeBase,
}

#[async_trait]
impl BehaviorNode for IsGripperClosed {
    node_base!();

    async fn execute(&self) -> NodeStatus {
        if self.context().get_as::<bool>("GripperClosed") {
            NodeStatus::Success
        } else {
            NodeStatus::Failure
        }
    }
}

/// Closes the gripper, failing on the first try.
struct CloseGripper {
    base: NodeBase,
    jammed: AtomicBool,
}

#[async_trait]
impl BehaviorNode for CloseGripper {
    node_base!();

    async fn execute(&self) -> NodeStatus {
        if self.jammed.swap(false, Ordering::SeqCst) {
            tracing::warn!("gripper jammed");
            return NodeStatus::Failure;
        }
        self.context().set("GripperClosed", true);
        NodeStatus::Success
    }
}

fn add(parent: &mut dyn BehaviorNode, child: impl BehaviorNode + 'static) -> anyhow::Result<()> {
    parent.add_child(Box::new(child))?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    let mut retry = RetryNode::new(3, 50, true);
    add(
        &mut retry,
        CloseGripper {
            base: NodeBase::new("CloseGripper"),
            jammed: AtomicBool::new(true),
        },
    )?;

    let mut grip = SelectorNode::default();
    add(
        &mut grip,
        IsGripperClosed {
            base: NodeBase::new("IsGripperClosed"),
        },
    )?;
    add(&mut grip, retry)?;

    let mut not_closed = InverterNode::default();
    add(
        &mut not_closed,
        IsGripperClosed {
            base: NodeBase::new("IsGripperClosed"),
        },
    )?;

    let mut root = SequenceNode::default();
    add(&mut root, not_closed)?;
    add(&mut root, grip)?;
    add(&mut root, WaitNode::new(300))?;
    add(
        &mut root,
        SetBlackboardValueNode::new("Report", "closed={GripperClosed}", "string"),
    )?;

    let context = Arc::new(Context::default().with_agent("Gripper01", "ResourceHolon"));
    let mut tree = BehaviorTree::new(Box::new(root), context);

    let mut interval = tokio::time::interval(Duration::from_millis(100));
    loop {
        interval.tick().await;
        if tree.tick().await.is_terminal() {
            break;
        }
    }

    tracing::info!(
        status = ?tree.last_status(),
        report = ?tree.context().get::<String>("Report"),
        "done"
    );
    Ok(())
}
