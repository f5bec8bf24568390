//! Rendering graphs as Mermaid flowcharts and DOT digraphs.
use std::collections::VecDeque;
use std::fmt::{self, Display};

use jflow_ast::{Ast, Type};
use rustc_hash::FxHashSet;

use crate::cfg::block::{BlockId, BlockKind, SpecialBlockKind};
use crate::cfg::graph::{block_id, raw, ControlFlowGraph};
use crate::cfg::node::NodeDisplay;

pub trait DirectedGraph {
    type Node: Copy;

    fn num_nodes(&self) -> usize;

    fn node(&self, index: usize) -> Self::Node;

    fn index(&self, node: Self::Node) -> usize;
}

pub trait StartNode: DirectedGraph {
    fn start_node(&self) -> Self::Node;
}

pub trait Successors: DirectedGraph {
    fn successors(&self, node: Self::Node) -> Vec<Self::Node>;
}

#[derive(Debug, Default)]
pub enum MermaidNodeShape {
    #[default]
    Rectangle,
    Stadium,
    Rhombus,
}

impl MermaidNodeShape {
    fn open_close(&self) -> (&'static str, &'static str) {
        match self {
            Self::Rectangle => ("[", "]"),
            Self::Stadium => ("([", "])"),
            Self::Rhombus => ("{", "}"),
        }
    }
}

pub struct MermaidNode {
    shape: MermaidNodeShape,
    content: String,
}

impl MermaidNode {
    pub fn with_content(content: String) -> Self {
        Self {
            shape: MermaidNodeShape::default(),
            content,
        }
    }

    #[must_use]
    pub fn with_shape(mut self, shape: MermaidNodeShape) -> Self {
        self.shape = shape;
        self
    }

    fn mermaid_write_quoted_str(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
        let mut parts = value.split('"');
        if let Some(v) = parts.next() {
            write!(f, "{v}")?;
        }
        for v in parts {
            write!(f, "#quot;{v}")?;
        }
        Ok(())
    }
}

impl Display for MermaidNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (open, close) = self.shape.open_close();
        write!(f, "{open}\"")?;
        if self.content.is_empty() {
            write!(f, "empty")?;
        } else {
            MermaidNode::mermaid_write_quoted_str(f, &self.content)?;
        }
        write!(f, "\"{close}")
    }
}

#[derive(Debug, Default)]
pub enum MermaidEdgeKind {
    #[default]
    Arrow,
    DottedArrow,
}

impl Display for MermaidEdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MermaidEdgeKind::Arrow => write!(f, "-->"),
            MermaidEdgeKind::DottedArrow => write!(f, "-..->"),
        }
    }
}

#[derive(Debug, Default)]
pub struct MermaidEdge {
    kind: MermaidEdgeKind,
    content: String,
}

impl MermaidEdge {
    pub fn labeled(kind: MermaidEdgeKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }
}

impl Display for MermaidEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.content.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}|\"{}\"|", self.kind, self.content)
        }
    }
}

pub trait MermaidGraph: DirectedGraph + Successors {
    fn draw_node(&self, node: Self::Node) -> MermaidNode;

    fn draw_edges(&self, node: Self::Node) -> impl Iterator<Item = (Self::Node, MermaidEdge)> {
        self.successors(node)
            .into_iter()
            .map(|idx| (idx, MermaidEdge::default()))
    }

    fn draw_graph(&self) -> String {
        let mut graph = Vec::new();

        // Begin mermaid graph.
        graph.push("flowchart TD".to_string());

        // Draw nodes
        let num_nodes = self.num_nodes();
        for idx in 0..num_nodes {
            let node = self.node(idx);
            graph.push(format!("\tnode{}{}", idx, &self.draw_node(node)));
        }

        // Draw edges
        for idx in 0..num_nodes {
            graph.extend(
                self.draw_edges(self.node(idx))
                    .map(|(end, edge)| format!("\tnode{}{}node{}", idx, edge, self.index(end))),
            );
        }
        graph.join("\n")
    }
}

/// A DOT digraph of the blocks reachable from the start node.
pub trait DotGraph: StartNode + Successors {
    /// The text shown inside `node`, with `\l` line breaks.
    fn dot_label(&self, node: Self::Node) -> String;

    /// Extra attributes placed before the label, e.g. `shape=oval `.
    fn dot_shape(&self, _node: Self::Node) -> &'static str {
        ""
    }

    fn dot_edges(&self, node: Self::Node) -> Vec<(Self::Node, Option<String>)> {
        self.successors(node)
            .into_iter()
            .map(|successor| (successor, None))
            .collect()
    }

    fn draw_dot(&self) -> String {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();

        let start = self.start_node();
        let mut visited = FxHashSet::default();
        let mut worklist = VecDeque::from([start]);
        visited.insert(self.index(start));

        while let Some(node) = worklist.pop_front() {
            let idx = self.index(node);
            nodes.push(format!(
                "    {idx} [{}label=\"{}\",];",
                self.dot_shape(node),
                self.dot_label(node)
            ));
            for (successor, label) in self.dot_edges(node) {
                let end = self.index(successor);
                match label {
                    Some(label) => edges.push(format!("    {idx} -> {end} [label=\"{label}\"];")),
                    None => edges.push(format!("    {idx} -> {end};")),
                }
                if visited.insert(end) {
                    worklist.push_back(successor);
                }
            }
        }

        let mut graph = vec!["digraph {".to_string(), "    node [shape=rectangle];".to_string(), String::new()];
        graph.extend(nodes);
        graph.push(String::new());
        graph.extend(edges);
        graph.push("}\n".to_string());
        graph.join("\n")
    }
}

impl DirectedGraph for ControlFlowGraph {
    type Node = BlockId;

    fn num_nodes(&self) -> usize {
        self.num_blocks()
    }

    fn node(&self, index: usize) -> Self::Node {
        block_id(index)
    }

    fn index(&self, node: Self::Node) -> usize {
        raw(node) as usize
    }
}

impl StartNode for ControlFlowGraph {
    fn start_node(&self) -> Self::Node {
        self.entry()
    }
}

impl Successors for ControlFlowGraph {
    fn successors(&self, node: Self::Node) -> Vec<Self::Node> {
        ControlFlowGraph::successors(self, node).to_vec()
    }
}

/// A graph together with the tree it was built from, which is needed to
/// print local variable names.
pub struct CfgWithAst<'a> {
    cfg: &'a ControlFlowGraph,
    ast: &'a Ast,
}

impl<'a> CfgWithAst<'a> {
    pub fn new(cfg: &'a ControlFlowGraph, ast: &'a Ast) -> Self {
        Self { cfg, ast }
    }

    fn node_lines(&self, block: BlockId) -> impl Iterator<Item = NodeDisplay<'a>> + '_ {
        self.cfg
            .block(block)
            .nodes()
            .iter()
            .map(|node| NodeDisplay::new(self.cfg, self.ast, *node))
    }

    /// Outgoing edges with their labels: the branch taken or the exception
    /// type.
    fn labeled_edges(&self, block: BlockId) -> Vec<(BlockId, Option<String>)> {
        match &self.cfg.block(block).kind {
            BlockKind::Conditional(conditional) => conditional
                .then_successor
                .map(|then| (then, Some("then".to_string())))
                .into_iter()
                .chain(
                    conditional
                        .else_successor
                        .map(|other| (other, Some("else".to_string()))),
                )
                .collect(),
            BlockKind::Exceptional(exceptional) => exceptional
                .successor
                .map(|successor| (successor, None))
                .into_iter()
                .chain(exceptional.exceptional_successors.iter().flat_map(|(cause, targets)| {
                    let name = exception_name(cause);
                    targets
                        .iter()
                        .map(move |target| (*target, Some(name.clone())))
                }))
                .collect(),
            BlockKind::Regular(_) | BlockKind::Special(_) => self
                .cfg
                .successors(block)
                .into_iter()
                .map(|successor| (successor, None))
                .collect(),
        }
    }

    fn block_text(&self, block: BlockId, annotation: Option<String>) -> String {
        let kind = &self.cfg.block(block).kind;
        let mut content = self
            .node_lines(block)
            .map(|line| {
                let name = line.kind_name();
                format!("{line}   [ {name} ]").replace('"', "\\\"")
            })
            .collect::<Vec<_>>()
            .join("\\n");

        let centered = content.is_empty();
        if centered {
            match kind {
                BlockKind::Special(special) => content.push_str(match special.kind {
                    SpecialBlockKind::Entry => "<entry>",
                    SpecialBlockKind::Exit => "<exit>",
                    SpecialBlockKind::ExceptionalExit => "<exceptional-exit>",
                }),
                BlockKind::Conditional(_) => return String::new(),
                BlockKind::Regular(_) | BlockKind::Exceptional(_) => return "?? empty ??".to_string(),
            }
        }

        if let Some(annotation) = annotation {
            content = format!("{annotation}\\n~~~~~~~~~\\n{content}");
        }
        if !centered {
            content.push_str("\\n");
        }
        content.replace("\\n", "\\l")
    }
}

fn exception_name(cause: &Type) -> String {
    let name = cause.to_string();
    if name.starts_with("java.lang.") {
        name.replace("java.lang.", "")
    } else {
        name
    }
}

impl DirectedGraph for CfgWithAst<'_> {
    type Node = BlockId;

    fn num_nodes(&self) -> usize {
        self.cfg.num_nodes()
    }

    fn node(&self, index: usize) -> Self::Node {
        DirectedGraph::node(self.cfg, index)
    }

    fn index(&self, node: Self::Node) -> usize {
        self.cfg.index(node)
    }
}

impl StartNode for CfgWithAst<'_> {
    fn start_node(&self) -> Self::Node {
        self.cfg.start_node()
    }
}

impl Successors for CfgWithAst<'_> {
    fn successors(&self, node: Self::Node) -> Vec<Self::Node> {
        Successors::successors(self.cfg, node)
    }
}

impl MermaidGraph for CfgWithAst<'_> {
    fn draw_node(&self, node: Self::Node) -> MermaidNode {
        match &self.cfg.block(node).kind {
            BlockKind::Special(special) => MermaidNode::with_content(
                match special.kind {
                    SpecialBlockKind::Entry => "entry",
                    SpecialBlockKind::Exit => "exit",
                    SpecialBlockKind::ExceptionalExit => "exceptional exit",
                }
                .to_string(),
            )
            .with_shape(MermaidNodeShape::Stadium),
            BlockKind::Conditional(_) => MermaidNode::with_content("branch".to_string())
                .with_shape(MermaidNodeShape::Rhombus),
            BlockKind::Regular(_) | BlockKind::Exceptional(_) => {
                let lines: Vec<String> = self.node_lines(node).map(|line| line.to_string()).collect();
                MermaidNode::with_content(lines.join("\n"))
            }
        }
    }

    fn draw_edges(&self, node: Self::Node) -> impl Iterator<Item = (Self::Node, MermaidEdge)> {
        let exceptional = self.cfg.block(node).kind.is_exceptional();
        self.labeled_edges(node)
            .into_iter()
            .map(move |(target, label)| match label {
                Some(label) if exceptional => {
                    (target, MermaidEdge::labeled(MermaidEdgeKind::DottedArrow, label))
                }
                Some(label) => (target, MermaidEdge::labeled(MermaidEdgeKind::Arrow, label)),
                None => (target, MermaidEdge::default()),
            })
    }
}

impl DotGraph for CfgWithAst<'_> {
    fn dot_label(&self, node: Self::Node) -> String {
        self.block_text(node, None)
    }

    fn dot_shape(&self, node: Self::Node) -> &'static str {
        dot_shape(&self.cfg.block(node).kind)
    }

    fn dot_edges(&self, node: Self::Node) -> Vec<(Self::Node, Option<String>)> {
        self.labeled_edges(node)
    }
}

fn dot_shape(kind: &BlockKind) -> &'static str {
    match kind {
        BlockKind::Conditional(_) => "shape=polygon sides=8 ",
        BlockKind::Special(_) => "shape=oval ",
        BlockKind::Regular(_) | BlockKind::Exceptional(_) => "",
    }
}

/// A DOT rendering with a per-block annotation, such as the state a
/// dataflow analysis computed at the block's entry.
pub struct CfgWithStates<'a, F> {
    inner: CfgWithAst<'a>,
    state: F,
}

impl<'a, F> CfgWithStates<'a, F>
where
    F: Fn(BlockId) -> Option<String>,
{
    pub fn new(cfg: &'a ControlFlowGraph, ast: &'a Ast, state: F) -> Self {
        Self {
            inner: CfgWithAst::new(cfg, ast),
            state,
        }
    }
}

impl<F> DirectedGraph for CfgWithStates<'_, F> {
    type Node = BlockId;

    fn num_nodes(&self) -> usize {
        self.inner.num_nodes()
    }

    fn node(&self, index: usize) -> Self::Node {
        self.inner.node(index)
    }

    fn index(&self, node: Self::Node) -> usize {
        self.inner.index(node)
    }
}

impl<F> StartNode for CfgWithStates<'_, F> {
    fn start_node(&self) -> Self::Node {
        self.inner.start_node()
    }
}

impl<F> Successors for CfgWithStates<'_, F> {
    fn successors(&self, node: Self::Node) -> Vec<Self::Node> {
        self.inner.successors(node)
    }
}

impl<F> DotGraph for CfgWithStates<'_, F>
where
    F: Fn(BlockId) -> Option<String>,
{
    fn dot_label(&self, node: Self::Node) -> String {
        self.inner.block_text(node, (self.state)(node))
    }

    fn dot_shape(&self, node: Self::Node) -> &'static str {
        self.inner.dot_shape(node)
    }

    fn dot_edges(&self, node: Self::Node) -> Vec<(Self::Node, Option<String>)> {
        self.inner.dot_edges(node)
    }
}

#[cfg(test)]
mod tests {
    use jflow_ast::{Ast, AstBuilder, BinaryOp, ClassTable, Type};

    use crate::cfg::graph::raw;
    use crate::{build_cfg, CfgSettings, ControlFlowGraph};

    use super::*;

    /// `int x = 0; if (x == 0) { x = 1; } return x;`
    fn reassign_if_zero() -> (Ast, ControlFlowGraph) {
        let mut builder = AstBuilder::new();
        let x = builder.local("x", Type::INT);
        let zero = builder.int(0);
        let decl = builder.var_decl(x, Some(zero));
        let x_ref = builder.local_ref(x);
        let zero = builder.int(0);
        let condition = builder.binary(BinaryOp::Eq, x_ref, zero);
        let x_ref = builder.local_ref(x);
        let one = builder.int(1);
        let assign = builder.assign(x_ref, one);
        let assign = builder.expr_stmt(assign);
        let then_stmt = builder.block(vec![assign]);
        let if_stmt = builder.if_stmt(condition, then_stmt, None);
        let x_ref = builder.local_ref(x);
        let ret = builder.return_stmt(Some(x_ref));
        let code = builder.block(vec![decl, if_stmt, ret]);
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let cfg = build_cfg(&ast, &table, code, &CfgSettings::default()).unwrap();
        (ast, cfg)
    }

    #[test]
    fn mermaid() {
        let (ast, cfg) = reassign_if_zero();
        let output = CfgWithAst::new(&cfg, &ast).draw_graph();
        insta::assert_snapshot!(output, @r#"
flowchart TD
	node0(["entry"])
	node1["int x
0
x = 0
x
0
(x == 0)"]
	node2{"branch"}
	node3["x
1
x = 1"]
	node4["x
return x"]
	node5(["exit"])
	node6(["exceptional exit"])
	node0-->node1
	node1-->node2
	node2-->|"then"|node3
	node2-->|"else"|node4
	node3-->node4
	node4-->node5
"#);
    }

    #[test]
    fn dot() {
        let (ast, cfg) = reassign_if_zero();
        let output = CfgWithAst::new(&cfg, &ast).draw_dot();
        insta::assert_snapshot!(output, @r#"
digraph {
    node [shape=rectangle];

    0 [shape=oval label="<entry>",];
    1 [label="int x   [ VariableDeclaration ]\l0   [ Literal ]\lx = 0   [ Assignment ]\lx   [ LocalVariable ]\l0   [ Literal ]\l(x == 0)   [ Binary ]\l",];
    2 [shape=polygon sides=8 label="",];
    3 [label="x   [ LocalVariable ]\l1   [ Literal ]\lx = 1   [ Assignment ]\l",];
    4 [label="x   [ LocalVariable ]\lreturn x   [ Return ]\l",];
    5 [shape=oval label="<exit>",];

    0 -> 1;
    1 -> 2;
    2 -> 3 [label="then"];
    2 -> 4 [label="else"];
    3 -> 4;
    4 -> 5;
}
"#);
    }

    #[test]
    fn dot_with_states() {
        let (ast, cfg) = reassign_if_zero();
        let exit = cfg.regular_exit();
        let output = CfgWithStates::new(&cfg, &ast, |block| {
            (block == exit).then(|| format!("reached {}", raw(block)))
        })
        .draw_dot();
        assert!(output.contains(r#"5 [shape=oval label="reached 5\l~~~~~~~~~\l<exit>",];"#));
        assert!(output.contains(r#"2 [shape=polygon sides=8 label="",];"#));
    }

    #[test]
    fn exceptional_edges_are_dotted() {
        let mut builder = AstBuilder::new();
        let e = builder.parameter("e", Type::class_type("java.lang.IllegalStateException"));
        let e_ref = builder.local_ref(e);
        let code = builder.throw_stmt(e_ref);
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let cfg = build_cfg(&ast, &table, code, &CfgSettings::default()).unwrap();
        let output = CfgWithAst::new(&cfg, &ast).draw_graph();
        assert!(output.contains("-..->|\"IllegalStateException\"|"), "{output}");
    }
}
