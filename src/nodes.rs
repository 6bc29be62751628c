mod composite;
mod decorator;
mod leaf;

pub use self::{
    composite::{ParallelNode, SelectorNode, SequenceNode},
    decorator::{
        InverterNode, RepeatNode, RetryNode, RetryUntilSuccessNode, SucceederNode, TimeoutNode,
    },
    leaf::{AlwaysSuccessNode, ForceFailureNode, SetBlackboardValueNode, WaitNode},
};

use crate::BehaviorNode;

async fn abort_all(children: &[Box<dyn BehaviorNode>]) {
    for child in children {
        child.abort().await;
    }
}

async fn reset_all(children: &[Box<dyn BehaviorNode>]) {
    for child in children {
        child.reset().await;
    }
}

#[cfg(test)]
mod test;
