//! Arena-backed expression/statement tree.
//!
//! The source system builds this tree with raw pointers and in-place parent
//! rewiring (§9 "Operator tree construction"). We give nodes stable identity
//! via an arena of `NodeId`s instead of pointers, so the same rotation logic
//! can mutate `parent`/`children` links safely without unsafe code or
//! lifetime gymnastics.

use crate::op::OperatorType;
use crate::token::Token;

pub type NodeId = usize;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    LeafToken,
    Operator(OperatorType),
    /// `children[0]` is the callee identifier, `children[1..]` the argument
    /// expressions in source order. Attached directly to an identifier leaf
    /// by the primary-expression parser, never produced by precedence
    /// climbing, so it gets its own kind rather than overloading `Operator`.
    Call,
    /// `children[0]` is the base expression, `children[1]` the index
    /// expression.
    Index,
    /// `children[0]` is the object expression, `children[1]` is a leaf
    /// holding the member-name token.
    Member,
}

#[derive(Debug)]
pub struct TreeNode {
    pub kind: NodeKind,
    pub token: Token,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl TreeNode {
    /// The left child of an operator node, by convention `children[0]`.
    pub fn left(&self) -> Option<NodeId> {
        self.children.get(0).copied()
    }

    /// The right child of a binary operator node, `children[1]`.
    pub fn right(&self) -> Option<NodeId> {
        self.children.get(1).copied()
    }

    pub fn op_type(&self) -> Option<OperatorType> {
        match self.kind {
            NodeKind::Operator(op) => Some(op),
            NodeKind::LeafToken | NodeKind::Call | NodeKind::Index | NodeKind::Member => None,
        }
    }
}

/// Owns every node ever allocated during a single compilation. Nodes are
/// never removed, only rewired, which keeps `NodeId`s stable for the
/// lifetime of the arena.
#[derive(Debug, Default)]
pub struct Arena {
    nodes: Vec<TreeNode>,
}

impl Arena {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn alloc(&mut self, kind: NodeKind, token: Token) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(TreeNode {
            kind,
            token,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn get(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut TreeNode {
        &mut self.nodes[id]
    }

    /// Appends `child` to `parent`'s children and sets `child`'s parent link.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent].children.push(child);
        self.nodes[child].parent = Some(parent);
    }

    /// Replaces the full child list of `parent` with `child` at position 0,
    /// fixing up the displaced children's parent links to point at whatever
    /// new parent the caller subsequently attaches them under. Used by the
    /// precedence-climbing rotation, which rewires children directly rather
    /// than appending.
    pub fn set_left(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child].parent = Some(parent);
        if self.nodes[parent].children.is_empty() {
            self.nodes[parent].children.push(child);
        } else {
            self.nodes[parent].children[0] = child;
        }
    }

    pub fn set_right(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child].parent = Some(parent);
        match self.nodes[parent].children.len() {
            0 => panic!("set_right called before a left child exists"),
            1 => self.nodes[parent].children.push(child),
            _ => self.nodes[parent].children[1] = child,
        }
    }
}
