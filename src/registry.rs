use std::{collections::HashMap, sync::Arc};

use tracing::debug;

use crate::{
    error::LoadError,
    nodes::{
        AlwaysSuccessNode, ForceFailureNode, InverterNode, ParallelNode, RepeatNode, RetryNode,
        RetryUntilSuccessNode, SelectorNode, SequenceNode, SetBlackboardValueNode, SucceederNode,
        TimeoutNode, WaitNode,
    },
    BehaviorNode,
};

/// Builds a fresh, unconfigured node. Every call must return a new instance.
pub type Constructor = Arc<dyn Fn() -> Box<dyn BehaviorNode> + Send + Sync>;

pub fn boxify<T>(cons: impl Fn() -> T + Send + Sync + 'static) -> Constructor
where
    T: BehaviorNode + 'static,
{
    Arc::new(move || Box::new(cons()))
}

/// Maps XML element names to node constructors.
///
/// Names are matched exactly. Registering a name twice replaces the earlier
/// constructor.
pub struct Registry {
    node_types: HashMap<String, Constructor>,
}

impl Default for Registry {
    fn default() -> Self {
        let mut ret = Self {
            node_types: HashMap::new(),
        };
        ret.register("Sequence", boxify(SequenceNode::default));
        ret.register("Selector", boxify(SelectorNode::default));
        ret.alias("Fallback", "Selector");
        ret.register("Parallel", boxify(ParallelNode::default));
        ret.register("Retry", boxify(RetryNode::default));
        ret.register("RetryUntilSuccess", boxify(RetryUntilSuccessNode::default));
        ret.register("Timeout", boxify(TimeoutNode::default));
        ret.register("Repeat", boxify(RepeatNode::default));
        ret.register("Inverter", boxify(InverterNode::default));
        ret.register("Succeeder", boxify(SucceederNode::default));
        ret.register("Wait", boxify(WaitNode::default));
        ret.register("SetBlackboardValue", boxify(SetBlackboardValueNode::default));
        ret.register("AlwaysSuccess", boxify(AlwaysSuccessNode::default));
        ret.register("ForceFailure", boxify(ForceFailureNode::default));
        ret
    }
}

impl Registry {
    /// A registry without the built-in control nodes.
    pub fn empty() -> Self {
        Self {
            node_types: HashMap::new(),
        }
    }

    pub fn register(&mut self, type_name: impl ToString, constructor: Constructor) {
        let type_name = type_name.to_string();
        debug!(node_type = %type_name, "registered node type");
        self.node_types.insert(type_name, constructor);
    }

    /// Makes `alias` build the same node type as `existing`. Returns false if
    /// `existing` is not registered.
    pub fn alias(&mut self, alias: impl ToString, existing: &str) -> bool {
        let Some(constructor) = self.node_types.get(existing).cloned() else {
            return false;
        };
        self.register(alias, constructor);
        true
    }

    pub fn build(&self, type_name: &str) -> Option<Box<dyn BehaviorNode>> {
        self.node_types
            .get(type_name)
            .map(|constructor| constructor())
    }

    /// Like [`Registry::build`], but reports the known names when the type is
    /// missing.
    pub fn create(&self, type_name: &str) -> Result<Box<dyn BehaviorNode>, LoadError> {
        self.build(type_name)
            .ok_or_else(|| LoadError::UnknownNode {
                name: type_name.to_owned(),
                available: self.registered_names(),
            })
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.node_types.contains_key(type_name)
    }

    /// All registered names in sorted order.
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.node_types.keys().cloned().collect();
        names.sort();
        names
    }
}
