//! Arbitrary-depth item tree for manually ordered lists.
//!
//! # Responsibility
//! - Parse and emit the legacy nested-array text form.
//! - Apply structural edits (indent, move, remove with promotion).
//! - Reconcile the tree against the live set of item identifiers.
//!
//! # Invariants
//! - Slot 0 is the synthetic root (`"-1"`, indent -1); it is never exposed.
//! - Every reachable node has `indent == parent.indent + 1`.
//! - An identifier appears at most once.
//! - Edits that would put a node under itself are rejected as no-ops.
//!
//! Detached slots stay in the arena but leave the index; the arena is
//! rebuilt on every parse.

use log::warn;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Identifier of the synthetic root in the serialized form.
pub const ROOT_ID: &str = "-1";

const ROOT: usize = 0;

/// Errors produced while parsing the nested-array text.
#[derive(Debug)]
pub enum TreeParseError {
    /// Text is not valid JSON.
    Json(serde_json::Error),
    /// Top-level value is not an array.
    NotAnArray,
    /// Element is neither an identifier nor a non-empty array.
    InvalidElement,
    /// Identifier is blank.
    EmptyId,
    /// Identifier collides with the root marker.
    ReservedId,
    /// Identifier appears twice.
    DuplicateId(String),
}

impl Display for TreeParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(err) => write!(f, "tree is not valid json: {err}"),
            Self::NotAnArray => write!(f, "tree must be a json array"),
            Self::InvalidElement => write!(f, "tree element must be an identifier or array"),
            Self::EmptyId => write!(f, "tree identifier must not be empty"),
            Self::ReservedId => write!(f, "tree identifier `{ROOT_ID}` is reserved"),
            Self::DuplicateId(id) => write!(f, "tree identifier appears twice: {id}"),
        }
    }
}

impl Error for TreeParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for TreeParseError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Destination of [`NestedTreeModel::move_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveTarget<'a> {
    /// Directly before this node, in its sibling list.
    Before(&'a str),
    /// Last top-level node.
    EndOfList,
}

/// Read-only view of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeView<'a> {
    pub id: &'a str,
    pub indent: i32,
    /// `None` for top-level nodes.
    pub parent: Option<&'a str>,
}

#[derive(Debug, Clone)]
struct Node {
    id: String,
    parent: Option<usize>,
    indent: i32,
    children: Vec<usize>,
}

/// Nested tree of item identifiers backed by an index arena.
#[derive(Debug, Clone)]
pub struct NestedTreeModel {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
}

impl Default for NestedTreeModel {
    fn default() -> Self {
        Self::new()
    }
}

impl NestedTreeModel {
    /// Creates an empty tree holding only the root.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                id: ROOT_ID.to_string(),
                parent: None,
                indent: -1,
                children: Vec::new(),
            }],
            index: HashMap::new(),
        }
    }

    /// Parses the nested-array text form.
    ///
    /// # Errors
    /// - Returns [`TreeParseError`] on malformed input; no partial tree is
    ///   ever returned.
    pub fn try_parse(text: &str) -> Result<Self, TreeParseError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Array(elements) = value else {
            return Err(TreeParseError::NotAnArray);
        };
        let mut tree = Self::new();
        tree.build_children(ROOT, &elements)?;
        Ok(tree)
    }

    /// Builds a tree from the stored text, degrading to an empty tree.
    ///
    /// Absent, blank and `"null"` input are treated as "never ordered".
    pub fn build_from_serialized(text: Option<&str>) -> Self {
        match text.map(str::trim) {
            None | Some("") | Some("null") => Self::new(),
            Some(text) => match Self::try_parse(text) {
                Ok(tree) => tree,
                Err(err) => {
                    warn!("event=tree_parse module=nested_tree status=error error={err}");
                    Self::new()
                }
            },
        }
    }

    /// Emits the compact nested-array text, headed by the root marker.
    pub fn serialize(&self) -> String {
        let mut top = vec![Value::String(ROOT_ID.to_string())];
        top.extend(self.serialize_children(ROOT));
        Value::Array(top).to_string()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Depth of a node; unknown identifiers report 0.
    pub fn indent_of(&self, id: &str) -> i32 {
        self.lookup(id).map_or(0, |idx| self.nodes[idx].indent)
    }

    /// Parent identifier, `None` for top-level or unknown nodes.
    pub fn parent_of(&self, id: &str) -> Option<&str> {
        let idx = self.lookup(id)?;
        match self.nodes[idx].parent {
            Some(ROOT) | None => None,
            Some(parent) => Some(self.nodes[parent].id.as_str()),
        }
    }

    /// Children of `parent` in order; `None` lists top-level nodes.
    pub fn children_of(&self, parent: Option<&str>) -> Vec<&str> {
        let idx = match parent {
            None => ROOT,
            Some(id) => match self.lookup(id) {
                Some(idx) => idx,
                None => return Vec::new(),
            },
        };
        self.nodes[idx]
            .children
            .iter()
            .map(|child| self.nodes[*child].id.as_str())
            .collect()
    }

    /// Identifiers in display (pre-order) order.
    pub fn ordered_ids(&self) -> Vec<&str> {
        self.nodes().into_iter().map(|view| view.id).collect()
    }

    /// Node views in display (pre-order) order.
    pub fn nodes(&self) -> Vec<NodeView<'_>> {
        let mut views = Vec::with_capacity(self.len());
        self.walk_descendants(ROOT, |view| views.push(view));
        views
    }

    /// True when `desc` equals `ancestor` or sits anywhere below it.
    pub fn is_descendant_of(&self, desc: &str, ancestor: &str) -> bool {
        match (self.lookup(desc), self.lookup(ancestor)) {
            (Some(desc), Some(ancestor)) => self.is_descendant_idx(desc, ancestor),
            _ => false,
        }
    }

    /// Inserts a new top-level node before every other node.
    ///
    /// Returns false for known, blank or reserved identifiers.
    pub fn insert_at_front(&mut self, id: &str) -> bool {
        if id.is_empty() || id == ROOT_ID || self.contains(id) {
            return false;
        }
        let idx = self.push_node(id.to_string(), ROOT);
        self.nodes[ROOT].children.insert(0, idx);
        true
    }

    /// Brings the tree in line with the live identifier set.
    ///
    /// Missing identifiers are inserted at the front in the order supplied,
    /// so the last one supplied ends up first. Nodes absent from the set are
    /// removed with their children promoted in place. Returns whether the
    /// tree changed.
    pub fn reconcile<I, S>(&mut self, active: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut changed = false;
        let mut live = HashSet::new();
        for id in active {
            let id = id.as_ref();
            live.insert(id.to_string());
            if !self.contains(id) && self.insert_at_front(id) {
                changed = true;
            }
        }

        let stale: Vec<String> = self
            .ordered_ids()
            .into_iter()
            .filter(|id| !live.contains(*id))
            .map(str::to_string)
            .collect();
        for id in stale {
            changed |= self.remove_node(&id);
        }
        changed
    }

    /// Indents (`delta > 0`) or outdents (`delta < 0`) one node.
    ///
    /// Indenting makes the node the last child of its preceding sibling;
    /// outdenting places it right after its parent. Returns whether the
    /// tree changed.
    pub fn indent(&mut self, id: &str, delta: i32) -> bool {
        let Some(idx) = self.lookup(id) else {
            return false;
        };
        let Some(parent) = self.nodes[idx].parent else {
            return false;
        };
        let Some(position) = self.position_in(parent, idx) else {
            return false;
        };

        if delta > 0 {
            if position == 0 {
                return false;
            }
            let new_parent = self.nodes[parent].children[position - 1];
            self.detach(idx);
            let end = self.nodes[new_parent].children.len();
            self.attach(idx, new_parent, end);
            true
        } else if delta < 0 {
            if parent == ROOT {
                return false;
            }
            let Some(grandparent) = self.nodes[parent].parent else {
                return false;
            };
            let Some(parent_position) = self.position_in(grandparent, parent) else {
                return false;
            };
            self.detach(idx);
            self.attach(idx, grandparent, parent_position + 1);
            true
        } else {
            false
        }
    }

    /// Moves a node (with its subtree) before another node or to the end.
    ///
    /// Returns false when either node is unknown, when `before` is the node
    /// itself or one of its descendants, or when nothing would change.
    pub fn move_to(&mut self, id: &str, target: MoveTarget<'_>) -> bool {
        let Some(idx) = self.lookup(id) else {
            return false;
        };
        match target {
            MoveTarget::EndOfList => {
                if self.nodes[ROOT].children.last() == Some(&idx) {
                    return false;
                }
                self.detach(idx);
                let end = self.nodes[ROOT].children.len();
                self.attach(idx, ROOT, end);
                true
            }
            MoveTarget::Before(before) => {
                let Some(before_idx) = self.lookup(before) else {
                    return false;
                };
                if self.is_descendant_idx(before_idx, idx) {
                    return false;
                }
                let Some(new_parent) = self.nodes[before_idx].parent else {
                    return false;
                };
                let siblings = &self.nodes[new_parent].children;
                let already_there = siblings
                    .windows(2)
                    .any(|pair| pair[0] == idx && pair[1] == before_idx);
                if already_there {
                    return false;
                }
                self.detach(idx);
                let Some(position) = self.position_in(new_parent, before_idx) else {
                    return false;
                };
                self.attach(idx, new_parent, position);
                true
            }
        }
    }

    /// Moves a node under `parent` (top level when `None`) at `index`.
    ///
    /// `index` is clamped to the new sibling count. Rejected when the new
    /// parent is the node or one of its descendants.
    pub fn move_under(&mut self, id: &str, parent: Option<&str>, index: usize) -> bool {
        let Some(idx) = self.lookup(id) else {
            return false;
        };
        let new_parent = match parent {
            None => ROOT,
            Some(parent) => match self.lookup(parent) {
                Some(parent_idx) => parent_idx,
                None => return false,
            },
        };
        if self.is_descendant_idx(new_parent, idx) {
            return false;
        }
        if self.nodes[idx].parent == Some(new_parent)
            && self.position_in(new_parent, idx) == Some(index)
        {
            return false;
        }
        self.detach(idx);
        self.attach(idx, new_parent, index);
        true
    }

    /// Appends a node as the last child of `sibling`'s parent.
    pub fn move_to_parent_of(&mut self, id: &str, sibling: &str) -> bool {
        let (Some(idx), Some(sibling_idx)) = (self.lookup(id), self.lookup(sibling)) else {
            return false;
        };
        let Some(new_parent) = self.nodes[sibling_idx].parent else {
            return false;
        };
        if self.is_descendant_idx(new_parent, idx) {
            return false;
        }
        self.detach(idx);
        let end = self.nodes[new_parent].children.len();
        self.attach(idx, new_parent, end);
        true
    }

    /// Removes one node, promoting its children into its former slot.
    pub fn remove_node(&mut self, id: &str) -> bool {
        let Some(idx) = self.index.remove(id) else {
            return false;
        };
        let Some((parent, position)) = self.detach(idx) else {
            return false;
        };
        let children = std::mem::take(&mut self.nodes[idx].children);
        for (offset, child) in children.into_iter().enumerate() {
            self.attach(child, parent, position + offset);
        }
        true
    }

    /// Visits strict descendants of `id` in pre-order.
    pub fn apply_to_descendants<F>(&self, id: &str, visitor: F)
    where
        F: FnMut(NodeView<'_>),
    {
        if let Some(idx) = self.lookup(id) {
            self.walk_descendants(idx, visitor);
        }
    }

    fn lookup(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    fn view(&self, idx: usize) -> NodeView<'_> {
        let node = &self.nodes[idx];
        NodeView {
            id: node.id.as_str(),
            indent: node.indent,
            parent: match node.parent {
                Some(ROOT) | None => None,
                Some(parent) => Some(self.nodes[parent].id.as_str()),
            },
        }
    }

    fn walk_descendants<'t, F>(&'t self, idx: usize, mut visitor: F)
    where
        F: FnMut(NodeView<'t>),
    {
        let mut stack: Vec<usize> = self.nodes[idx].children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            visitor(self.view(current));
            stack.extend(self.nodes[current].children.iter().rev().copied());
        }
    }

    fn is_descendant_idx(&self, desc: usize, ancestor: usize) -> bool {
        let mut cursor = Some(desc);
        let mut steps = 0;
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.nodes.len() {
                return false;
            }
            cursor = self.nodes[current].parent;
        }
        false
    }

    fn position_in(&self, parent: usize, child: usize) -> Option<usize> {
        self.nodes[parent]
            .children
            .iter()
            .position(|candidate| *candidate == child)
    }

    fn push_node(&mut self, id: String, parent: usize) -> usize {
        let idx = self.nodes.len();
        self.index.insert(id.clone(), idx);
        self.nodes.push(Node {
            id,
            parent: Some(parent),
            indent: self.nodes[parent].indent + 1,
            children: Vec::new(),
        });
        idx
    }

    /// Unlinks a node from its parent; returns the former slot.
    fn detach(&mut self, idx: usize) -> Option<(usize, usize)> {
        let parent = self.nodes[idx].parent.take()?;
        let position = self.position_in(parent, idx)?;
        self.nodes[parent].children.remove(position);
        Some((parent, position))
    }

    fn attach(&mut self, idx: usize, parent: usize, position: usize) {
        let siblings = &mut self.nodes[parent].children;
        let position = position.min(siblings.len());
        siblings.insert(position, idx);
        self.nodes[idx].parent = Some(parent);
        self.refresh_indents(idx);
    }

    fn refresh_indents(&mut self, idx: usize) {
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            let indent = self.nodes[current]
                .parent
                .map_or(-1, |parent| self.nodes[parent].indent + 1);
            self.nodes[current].indent = indent;
            stack.extend(self.nodes[current].children.iter().copied());
        }
    }

    fn build_children(&mut self, parent: usize, elements: &[Value]) -> Result<(), TreeParseError> {
        for element in elements.iter().skip(1) {
            match element {
                Value::Array(subtree) => {
                    let head = subtree.first().ok_or(TreeParseError::InvalidElement)?;
                    let idx = self.add_parsed(parent, element_id(head)?)?;
                    self.build_children(idx, subtree)?;
                }
                leaf => {
                    self.add_parsed(parent, element_id(leaf)?)?;
                }
            }
        }
        Ok(())
    }

    fn add_parsed(&mut self, parent: usize, id: String) -> Result<usize, TreeParseError> {
        if self.contains(&id) {
            return Err(TreeParseError::DuplicateId(id));
        }
        let idx = self.push_node(id, parent);
        self.nodes[parent].children.push(idx);
        Ok(idx)
    }

    fn serialize_children(&self, idx: usize) -> Vec<Value> {
        self.nodes[idx]
            .children
            .iter()
            .map(|child| {
                let node = &self.nodes[*child];
                if node.children.is_empty() {
                    Value::String(node.id.clone())
                } else {
                    let mut branch = vec![Value::String(node.id.clone())];
                    branch.extend(self.serialize_children(*child));
                    Value::Array(branch)
                }
            })
            .collect()
    }
}

fn element_id(value: &Value) -> Result<String, TreeParseError> {
    let id = match value {
        Value::String(text) => text.clone(),
        Value::Number(number) if number.is_i64() || number.is_u64() => number.to_string(),
        _ => return Err(TreeParseError::InvalidElement),
    };
    if id.is_empty() {
        return Err(TreeParseError::EmptyId);
    }
    if id == ROOT_ID {
        return Err(TreeParseError::ReservedId);
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::{MoveTarget, NestedTreeModel, TreeParseError};

    fn tree(text: &str) -> NestedTreeModel {
        NestedTreeModel::try_parse(text).unwrap()
    }

    #[test]
    fn parse_computes_indents_top_down() {
        let model = tree(r#"["-1","A",["B",["C","D"]]]"#);
        assert_eq!(model.ordered_ids(), vec!["A", "B", "C", "D"]);
        assert_eq!(model.indent_of("A"), 0);
        assert_eq!(model.indent_of("B"), 0);
        assert_eq!(model.indent_of("C"), 1);
        assert_eq!(model.indent_of("D"), 2);
        assert_eq!(model.parent_of("D"), Some("C"));
        assert_eq!(model.parent_of("A"), None);
    }

    #[test]
    fn parse_rejects_duplicates_and_bad_shapes() {
        assert!(matches!(
            NestedTreeModel::try_parse(r#"["-1","A",["B","A"]]"#),
            Err(TreeParseError::DuplicateId(id)) if id == "A"
        ));
        assert!(matches!(
            NestedTreeModel::try_parse(r#"{"a":1}"#),
            Err(TreeParseError::NotAnArray)
        ));
        assert!(matches!(
            NestedTreeModel::try_parse(r#"["-1",[]]"#),
            Err(TreeParseError::InvalidElement)
        ));
        assert!(matches!(
            NestedTreeModel::try_parse(r#"["-1","-1"]"#),
            Err(TreeParseError::ReservedId)
        ));
    }

    #[test]
    fn malformed_text_degrades_to_empty_tree() {
        let model = NestedTreeModel::build_from_serialized(Some(r#"["-1","A",["B""#));
        assert!(model.is_empty());
        assert_eq!(model.serialize(), r#"["-1"]"#);
        assert!(NestedTreeModel::build_from_serialized(Some("null")).is_empty());
        assert!(NestedTreeModel::build_from_serialized(None).is_empty());
    }

    #[test]
    fn numeric_identifiers_are_read_as_text() {
        let model = tree(r#"["-1",12,[34,56]]"#);
        assert_eq!(model.serialize(), r#"["-1","12",["34","56"]]"#);
    }

    #[test]
    fn indent_first_child_and_outdent_top_level_are_noops() {
        let mut model = tree(r#"["-1","A","B"]"#);
        assert!(!model.indent("A", 1));
        assert!(!model.indent("A", -1));
        assert!(!model.indent("B", 0));
        assert!(model.indent("B", 1));
        assert_eq!(model.serialize(), r#"["-1",["A","B"]]"#);
        assert!(model.indent("B", -1));
        assert_eq!(model.serialize(), r#"["-1","A","B"]"#);
    }

    #[test]
    fn outdent_lands_right_after_former_parent() {
        let mut model = tree(r#"["-1",["A","B","C"],"D"]"#);
        assert!(model.indent("B", -1));
        assert_eq!(model.serialize(), r#"["-1",["A","C"],"B","D"]"#);
        assert_eq!(model.indent_of("B"), 0);
    }

    #[test]
    fn move_before_own_descendant_is_rejected() {
        let mut model = tree(r#"["-1",["A",["B","C"]],"D"]"#);
        assert!(!model.move_to("A", MoveTarget::Before("C")));
        assert!(!model.move_to("A", MoveTarget::Before("A")));
        assert!(model.move_to("D", MoveTarget::Before("C")));
        assert_eq!(model.serialize(), r#"["-1",["A",["B","D","C"]]]"#);
        assert_eq!(model.indent_of("D"), 2);
    }

    #[test]
    fn move_later_sibling_uses_index_after_detach() {
        let mut model = tree(r#"["-1","A","B","C","D"]"#);
        assert!(model.move_to("A", MoveTarget::Before("D")));
        assert_eq!(model.ordered_ids(), vec!["B", "C", "A", "D"]);
        assert!(!model.move_to("A", MoveTarget::Before("D")));
        assert!(model.move_to("B", MoveTarget::EndOfList));
        assert_eq!(model.ordered_ids(), vec!["C", "A", "D", "B"]);
    }

    #[test]
    fn move_to_parent_of_appends_under_sibling_parent() {
        let mut model = tree(r#"["-1",["A","B"],"C"]"#);
        assert!(model.move_to_parent_of("C", "B"));
        assert_eq!(model.serialize(), r#"["-1",["A","B","C"]]"#);
        assert!(!model.move_to_parent_of("A", "C"));
    }

    #[test]
    fn descendants_are_visited_in_preorder() {
        let model = tree(r#"["-1",["A",["B","C"],"D"],"E"]"#);
        let mut seen = Vec::new();
        model.apply_to_descendants("A", |node| seen.push((node.id.to_string(), node.indent)));
        assert_eq!(
            seen,
            vec![
                ("B".to_string(), 1),
                ("C".to_string(), 2),
                ("D".to_string(), 1)
            ]
        );
        assert!(model.is_descendant_of("C", "A"));
        assert!(model.is_descendant_of("A", "A"));
        assert!(!model.is_descendant_of("E", "A"));
    }
}
