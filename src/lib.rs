//! # behavior-tree-xml
//!
//! A behavior tree runtime for industrial agents, with a loader that builds
//! trees from Groot2 / BehaviorTree.CPP v4 style XML.
//!
//!
//! ## Overview
//!
//! A behavior tree is a tree of nodes that is "ticked" periodically from the
//! root. Every tick returns one of three statuses: `Success`, `Failure` or
//! `Running`. `Running` means "call me again on the next tick", and a node
//! that returns it resumes where it left off.
//!
//! Composite nodes (`Sequence`, `Selector`/`Fallback`, `Parallel`) combine the
//! results of several children, decorators (`Retry`, `RetryUntilSuccess`,
//! `Timeout`, `Repeat`, `Inverter`, `Succeeder`) wrap exactly one child, and
//! leaves do the actual work. Domain specific leaves are registered by the
//! application.
//!
//! All nodes of one tree share a [`Context`], a blackboard of values keyed
//! by name.
//!
//!
//! ## How to define your own node
//!
//! Implement [`BehaviorNode`] on a type that embeds a [`NodeBase`].
//! `execute` takes `&self`, so state that changes between ticks lives in
//! atomics or locks.
//!
//! ```rust
//! use behavior_tree_xml::*;
//!
//! #[derive(Default)]
//! struct CheckReadyState {
//!     base: NodeBase,
//!     module_name: String,
//! }
//!
//! #[async_trait]
//! impl BehaviorNode for CheckReadyState {
//!     node_base!();
//!
//!     fn provided_properties(&self) -> Vec<PropertySpec> {
//!         vec![PropertySpec::string("ModuleName")]
//!     }
//!
//!     fn set_property(&mut self, key: Symbol, value: PropertyValue) {
//!         if let ("ModuleName", PropertyValue::String(v)) = (key.as_str(), value) {
//!             self.module_name = v;
//!         }
//!     }
//!
//!     async fn execute(&self) -> NodeStatus {
//!         let key = format!("module_{}_ready", self.module_name);
//!         if self.context().get_as::<bool>(&key) {
//!             NodeStatus::Success
//!         } else {
//!             NodeStatus::Failure
//!         }
//!     }
//! }
//! ```
//!
//! The properties declared by `provided_properties` are what the XML loader
//! fills from element attributes. Attribute names may be written in kebab or
//! snake case; `module-name` and `module_name` both bind to `ModuleName`.
//!
//!
//! ## Loading a tree from XML
//!
//! Register your leaves, seed the context, and compile.
//!
//! ```rust
//! # use behavior_tree_xml::*;
//! # use std::sync::Arc;
//! # #[derive(Default)]
//! # struct CheckReadyState { base: NodeBase }
//! # #[async_trait]
//! # impl BehaviorNode for CheckReadyState {
//! #     node_base!();
//! #     async fn execute(&self) -> NodeStatus { NodeStatus::Success }
//! # }
//! let source = r#"
//! <root BTCPP_format="4" main_tree_to_execute="Init">
//!   <BehaviorTree ID="Init">
//!     <Sequence>
//!       <RetryUntilSuccess num_attempts="5" delay-ms="200">
//!         <CheckReadyState module_name="{MachineName}"/>
//!       </RetryUntilSuccess>
//!       <SubTree ID="Idle" name="IdleAfterInit"/>
//!     </Sequence>
//!   </BehaviorTree>
//!   <BehaviorTree ID="Idle">
//!     <Wait delay_ms="1000"/>
//!   </BehaviorTree>
//! </root>
//! "#;
//!
//! let mut registry = Registry::default();
//! registry.register("CheckReadyState", boxify(CheckReadyState::default));
//!
//! let context = Arc::new(Context::default());
//! context.set("MachineName", "ScrewingStation".to_owned());
//!
//! let root = load_xml(source, &registry, &context).unwrap();
//! assert_eq!(root.name(), "Sequence");
//! ```
//!
//! `{MachineName}` in an attribute is replaced by the context value at load
//! time. Nodes can resolve placeholders at tick time with
//! [`Context::resolve_placeholders`], which also understands
//! `{config.Section.Key}` paths into the configuration tree stored by
//! [`Context::with_config`].
//!
//! A `SubTree` element is replaced by a copy of the referenced tree. Subtrees
//! that refer to themselves, directly or indirectly, are rejected when the
//! tree is loaded.
//!
//!
//! ## Driving the tree
//!
//! The crate does not own a tick loop. The application ticks the root at
//! its own rate until it reports a terminal status:
//!
//! ```rust,no_run
//! # use behavior_tree_xml::*;
//! # async fn drive(mut tree: BehaviorTree) {
//! let mut interval = tokio::time::interval(std::time::Duration::from_millis(100));
//! loop {
//!     interval.tick().await;
//!     if tree.tick().await != NodeStatus::Running {
//!         break;
//!     }
//! }
//! # }
//! ```
//!
//!
//! ## Cancellation is advisory
//!
//! `abort()` is a request, not preemption. When a `Timeout` expires it calls
//! `abort()` on its child and reports `Failure`, but the child's execution
//! continues as a detached task until the child itself decides to stop. Leaf
//! authors that start long operations should watch for the abort and wind
//! down; ignoring it is legal.
//!
//! `Retry` and `RetryUntilSuccess` wait out their backoff inside a single
//! tick, so one tick of these nodes can take as long as all delays combined.
//! `Repeat` and `Wait` are tick based and never block.
//!
//! `Parallel` has no memory: every tick re-runs all of its children, so they
//! must be cheap to invoke repeatedly.

mod context;
pub mod error;
mod nodes;
pub mod parser;
mod property;
mod registry;
mod symbol;
mod tree;

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

pub use crate::context::{stringify, Blackboard, BlackboardEntry, Context, FromBlackboard};
pub use crate::nodes::{
    AlwaysSuccessNode, ForceFailureNode, InverterNode, ParallelNode, RepeatNode, RetryNode,
    RetryUntilSuccessNode, SelectorNode, SequenceNode, SetBlackboardValueNode, SucceederNode,
    TimeoutNode, WaitNode,
};
pub use crate::symbol::Symbol;
pub use crate::tree::BehaviorTree;
pub use crate::{
    error::{AddChildError, AddChildResult, LoadError},
    parser::{load, load_file, load_xml, parse_file, TreeSource},
    property::{to_pascal_case, PropertySpec, PropertyType, PropertyValue},
    registry::{boxify, Constructor, Registry},
};
pub use ::async_trait::async_trait;
pub use ::once_cell::sync::Lazy;

#[derive(PartialEq, Eq, Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub enum NodeStatus {
    Success,
    Failure,
    /// The node should keep running in the next tick
    Running,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl Display for NodeStatus {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        let s = match self {
            Self::Success => "Success",
            Self::Failure => "Failure",
            Self::Running => "Running",
        };
        fmt.write_str(s)
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum NumChildren {
    Finite(usize),
    Infinite,
}

/// State every node carries: its display name and the shared context.
#[derive(Debug, Clone)]
pub struct NodeBase {
    name: String,
    context: Arc<Context>,
}

impl NodeBase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            context: Arc::default(),
        }
    }

    pub fn set_context(&mut self, context: Arc<Context>) {
        self.context = context;
    }
}

impl Default for NodeBase {
    fn default() -> Self {
        Self::new("")
    }
}

#[async_trait]
pub trait BehaviorNode: Send + Sync {
    fn base(&self) -> &NodeBase;

    fn base_mut(&mut self) -> &mut NodeBase;

    fn name(&self) -> &str {
        &self.base().name
    }

    fn set_name(&mut self, name: String) {
        self.base_mut().name = name;
    }

    fn context(&self) -> &Arc<Context> {
        &self.base().context
    }

    /// Binds the shared context. Nodes with children forward it.
    fn initialize(&mut self, context: Arc<Context>) {
        self.base_mut().set_context(context);
    }

    /// The properties the loader may set from XML attributes.
    fn provided_properties(&self) -> Vec<PropertySpec> {
        vec![]
    }

    /// Called by the loader with a value already converted to the type
    /// declared in [`BehaviorNode::provided_properties`].
    fn set_property(&mut self, _key: Symbol, _value: PropertyValue) {}

    fn num_children(&self) -> NumChildren {
        NumChildren::Finite(0)
    }

    fn add_child(&mut self, _child: Box<dyn BehaviorNode>) -> AddChildResult {
        Err(AddChildError::TooManyNodes)
    }

    /// One tick.
    async fn execute(&self) -> NodeStatus;

    /// Asks a running node to stop as soon as practical. Advisory only.
    async fn abort(&self) {}

    /// Puts all resumption state back to its initial value.
    async fn reset(&self) {}
}

/// Implements [`BehaviorNode::base`] and [`BehaviorNode::base_mut`] for a
/// node whose [`NodeBase`] lives in the field `base` (or the given field).
#[macro_export]
macro_rules! node_base {
    () => {
        $crate::node_base!(base);
    };
    ($field: ident) => {
        fn base(&self) -> &$crate::NodeBase {
            &self.$field
        }

        fn base_mut(&mut self) -> &mut $crate::NodeBase {
            &mut self.$field
        }
    };
}
