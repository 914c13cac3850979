use nalgebra::{Vector3, Vector6};

use crate::{
    datatypes::{DofMask, ElementId, NodeId},
    mapping::Vocabulary,
};

/// A literal argument of a target command
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Comment(String),
    /// A verbatim script line, e.g. the runtime import
    Raw(String),
    Wipe,
    Model {
        ndm: usize,
        ndf: usize,
    },
    Node {
        id: NodeId,
        coords: Vector3<f64>,
    },
    Material {
        command: String,
        model: String,
        tag: u32,
        params: Vec<f64>,
    },
    Section {
        command: String,
        model: String,
        tag: u32,
        params: Vec<f64>,
    },
    GeomTransf {
        kind: String,
        tag: u32,
        vecxz: Vector3<f64>,
    },
    Element {
        id: ElementId,
        target: String,
        nodes: Vec<NodeId>,
        args: Vec<Arg>,
    },
    Fix {
        node: NodeId,
        mask: DofMask,
    },
    TimeSeries {
        kind: String,
        tag: u32,
    },
    Pattern {
        kind: String,
        tag: u32,
        series: u32,
    },
    Load {
        node: NodeId,
        components: Vector6<f64>,
    },
    Analysis {
        command: String,
        args: Vec<Arg>,
    },
}

/// Script blocks, in output order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Header,
    Model,
    Nodes,
    Materials,
    Sections,
    Elements,
    Boundaries,
    Loads,
    Analysis,
}

impl BlockKind {
    pub const ORDER: [BlockKind; 9] = [
        BlockKind::Header,
        BlockKind::Model,
        BlockKind::Nodes,
        BlockKind::Materials,
        BlockKind::Sections,
        BlockKind::Elements,
        BlockKind::Boundaries,
        BlockKind::Loads,
        BlockKind::Analysis,
    ];

    /// Section-header comment for the block. The header block is titled by
    /// the vocabulary instead.
    pub fn title(&self) -> &'static str {
        match self {
            BlockKind::Header => "Header",
            BlockKind::Model => "Model",
            BlockKind::Nodes => "Nodes",
            BlockKind::Materials => "Materials",
            BlockKind::Sections => "Sections",
            BlockKind::Elements => "Elements",
            BlockKind::Boundaries => "Boundary conditions",
            BlockKind::Loads => "Loads",
            BlockKind::Analysis => "Analysis",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    pub commands: Vec<Command>,
}

/// The translated model: ordered blocks plus the vocabulary to spell them in
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSequence {
    pub vocabulary: Vocabulary,
    pub blocks: Vec<Block>,
}

impl CommandSequence {
    pub fn block(&self, kind: BlockKind) -> Option<&Block> {
        self.blocks.iter().find(|block| block.kind == kind)
    }

    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.blocks.iter().flat_map(|block| block.commands.iter())
    }
}
