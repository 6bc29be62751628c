use std::{path::Path, sync::Arc};

use tracing::{debug, info, trace, warn};

use super::xml_parser::{parse_file, TreeSource, XmlElement};
use crate::{
    error::LoadError, property::to_pascal_case, BehaviorNode, Context, NumChildren, PropertyValue,
    Registry,
};

/// Instantiate the main behavior tree of a parsed document.
///
/// Every node is initialized with `context`, and attribute values have
/// `{Key}` placeholders replaced by context values before they are converted.
/// `SubTree` elements are expanded in place; each reference gets its own copy
/// of the referenced tree.
pub fn load(
    tree_source: &TreeSource,
    registry: &Registry,
    context: &Arc<Context>,
) -> Result<Box<dyn BehaviorNode>, LoadError> {
    let root = &tree_source.root;
    if !root.name.eq_ignore_ascii_case("root") {
        return Err(LoadError::InvalidRoot(root.name.to_owned()));
    }

    if let Some(format) = root.attribute("BTCPP_format") {
        if format != "4" {
            warn!(btcpp_format = format, "unexpected BTCPP_format, version 4 is recommended");
        }
    }

    let main_name = root
        .attribute("main_tree_to_execute")
        .filter(|name| !name.is_empty());
    if main_name.is_none() {
        warn!("main_tree_to_execute attribute is missing, using the first BehaviorTree");
    }

    let main = match main_name.and_then(|name| {
        root.elements("BehaviorTree")
            .find(|tree| tree.attribute("ID") == Some(name))
    }) {
        Some(tree) => tree,
        None => {
            let tree = root.elements("BehaviorTree").next().ok_or_else(|| {
                LoadError::MissingTree {
                    available: root.children.iter().map(|el| el.name.to_owned()).collect(),
                }
            })?;
            if let Some(name) = main_name {
                warn!(requested = name, "main tree not found, using the first BehaviorTree");
            }
            tree
        }
    };
    let main_id = main.attribute("ID").unwrap_or("UnnamedTree");
    info!(tree = main_id, "loading behavior tree");

    let root_element = main
        .children
        .first()
        .ok_or_else(|| LoadError::EmptyTree(main_id.to_owned()))?;

    let loader = Loader {
        registry,
        context,
        trees: TreeIndex::new(root),
    };
    let top = TreeStack {
        name: main_id,
        parent: None,
    };
    let ret = loader.load_node(root_element, &top)?;

    info!(tree = main_id, "behavior tree loaded");
    Ok(ret)
}

/// Parse and instantiate a tree document held in memory.
pub fn load_xml(
    source: &str,
    registry: &Registry,
    context: &Arc<Context>,
) -> Result<Box<dyn BehaviorNode>, LoadError> {
    let tree_source = parse_document(source)?;
    load(&tree_source, registry, context)
}

/// Read, parse and instantiate a tree document.
pub fn load_file(
    path: impl AsRef<Path>,
    registry: &Registry,
    context: &Arc<Context>,
) -> Result<Box<dyn BehaviorNode>, LoadError> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_owned(),
        source,
    })?;
    info!(path = %path.display(), "read behavior tree file");
    load_xml(&source, registry, context)
}

fn parse_document(source: &str) -> Result<TreeSource, LoadError> {
    match parse_file(source) {
        Ok(("", tree_source)) => Ok(tree_source),
        Ok((rest, _)) => Err(parse_error(
            source,
            rest,
            "unexpected content after the root element",
        )),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
            Err(parse_error(source, e.input, e.code.description()))
        }
        Err(nom::Err::Incomplete(_)) => Err(parse_error(source, "", "unexpected end of document")),
    }
}

/// `rest` must be a suffix of `source`.
fn parse_error(source: &str, rest: &str, message: &str) -> LoadError {
    let offset = source.len() - rest.len();
    LoadError::Parse {
        line: source[..offset].matches('\n').count() + 1,
        message: message.to_owned(),
    }
}

/// `BehaviorTree` definitions by ID. IDs compare case-insensitively and a
/// later definition replaces an earlier one.
struct TreeIndex<'a, 'src> {
    trees: Vec<(&'a str, &'a XmlElement<'src>)>,
}

impl<'a, 'src> TreeIndex<'a, 'src> {
    fn new(root: &'a XmlElement<'src>) -> Self {
        let mut trees: Vec<(&'a str, &'a XmlElement<'src>)> = vec![];
        for tree in root.elements("BehaviorTree") {
            let Some(id) = tree.attribute("ID").filter(|id| !id.trim().is_empty()) else {
                continue;
            };
            match trees
                .iter_mut()
                .find(|(existing, _)| existing.eq_ignore_ascii_case(id))
            {
                Some(slot) => {
                    warn!(id, "duplicate BehaviorTree ID, using the last definition");
                    *slot = (id, tree);
                }
                None => trees.push((id, tree)),
            }
        }
        Self { trees }
    }

    fn get(&self, id: &str) -> Option<&'a XmlElement<'src>> {
        self.trees
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(id))
            .map(|(_, tree)| *tree)
    }

    fn ids(&self) -> Vec<String> {
        self.trees.iter().map(|(id, _)| (*id).to_owned()).collect()
    }
}

/// A mechanism to detect infinite recursion. It is a linked list in call stack.
/// You can traverse the link back to enumerate all the subtree names that are
/// being expanded and check if a subtree name to be inserted is already there.
///
/// Subtrees are expanded eagerly, so a subtree that refers to itself, directly
/// or through others, would expand forever.
struct TreeStack<'a> {
    name: &'a str,
    parent: Option<&'a TreeStack<'a>>,
}

impl<'a> TreeStack<'a> {
    fn find(&self, name: &str) -> bool {
        if self.name.eq_ignore_ascii_case(name) {
            true
        } else if let Some(parent) = self.parent {
            parent.find(name)
        } else {
            false
        }
    }

    /// "Main → A → B → `next`"
    fn path_to(&self, next: &str) -> String {
        let mut names = vec![next];
        let mut frame = Some(self);
        while let Some(current) = frame {
            names.push(current.name);
            frame = current.parent;
        }
        names.reverse();
        names.join(" → ")
    }
}

struct Loader<'a, 'src> {
    registry: &'a Registry,
    context: &'a Arc<Context>,
    trees: TreeIndex<'a, 'src>,
}

impl<'a, 'src> Loader<'a, 'src> {
    fn load_node(
        &self,
        element: &XmlElement,
        stack: &TreeStack,
    ) -> Result<Box<dyn BehaviorNode>, LoadError> {
        if element.name.eq_ignore_ascii_case("SubTree") {
            return self.expand_subtree(element, stack);
        }

        let mut node = self.registry.create(element.name)?;
        let name = element.attribute("name").unwrap_or(element.name);
        trace!(node_type = element.name, name, "creating node");
        node.set_name(name.to_owned());
        node.initialize(self.context.clone());
        bind_properties(node.as_mut(), element);

        match node.num_children() {
            NumChildren::Infinite => (),
            NumChildren::Finite(0) => {
                if !element.children.is_empty() {
                    warn!(
                        node = name,
                        count = element.children.len(),
                        "node takes no children, ignoring child elements"
                    );
                }
                return Ok(node);
            }
            NumChildren::Finite(expected) => {
                if element.children.len() != expected {
                    return Err(LoadError::ChildCount {
                        node: name.to_owned(),
                        ty: element.name.to_owned(),
                        expected,
                        found: element.children.len(),
                    });
                }
            }
        }

        for child in &element.children {
            let child_node = self.load_node(child, stack)?;
            node.add_child(child_node)
                .map_err(|e| LoadError::AddChildError(e, element.name.to_owned()))?;
        }

        Ok(node)
    }

    fn expand_subtree(
        &self,
        element: &XmlElement,
        stack: &TreeStack,
    ) -> Result<Box<dyn BehaviorNode>, LoadError> {
        let id = element
            .attribute("ID")
            .or_else(|| element.attribute("id"))
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(LoadError::MissingSubtreeId)?;

        if stack.find(id) {
            return Err(LoadError::SubtreeCycle {
                path: stack.path_to(id),
            });
        }

        let tree = self
            .trees
            .get(id)
            .ok_or_else(|| LoadError::SubtreeNotFound {
                id: id.to_owned(),
                available: self.trees.ids(),
            })?;
        let root = tree
            .children
            .first()
            .ok_or_else(|| LoadError::EmptyTree(id.to_owned()))?;

        if element
            .children
            .iter()
            .any(|child| child.name.eq_ignore_ascii_case("remap"))
        {
            warn!(subtree = id, "SubTree remapping is not supported, remap elements are ignored");
        }

        let mut root = root.clone();
        if let Some(name) = element.attribute("name").filter(|name| !name.trim().is_empty()) {
            root.set_attribute("name", name);
        }
        debug!(subtree = id, "expanding SubTree");

        let frame = TreeStack {
            name: id,
            parent: Some(stack),
        };
        self.load_node(&root, &frame)
    }
}

/// Sets the node's declared properties from the element's attributes.
/// Attributes without a matching property and values that fail to convert
/// are logged and skipped.
fn bind_properties(node: &mut dyn BehaviorNode, element: &XmlElement) {
    let specs = node.provided_properties();
    for attr in &element.attributes {
        if attr.name == "name" {
            continue;
        }
        let key = to_pascal_case(attr.name);
        let Some(spec) = specs.iter().find(|spec| spec.key == key.as_str()) else {
            trace!(node = %node.name(), attribute = attr.name, "no property for attribute");
            continue;
        };

        let text = node.context().insert_context_values(&attr.value);
        match PropertyValue::parse(spec, &text) {
            Ok(value) => {
                trace!(node = %node.name(), property = %spec.key, value = %text, "property set");
                node.set_property(spec.key, value);
            }
            Err(e) => warn!(node = %node.name(), error = %e, "failed to set property"),
        }
    }
}
