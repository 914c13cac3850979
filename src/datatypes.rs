use indexmap::{IndexMap, IndexSet};
use nalgebra::{Vector3, Vector6};

pub type NodeId = u32;
pub type ElementId = u32;

/// Number of degrees of freedom per node: three translations, three rotations
pub const DOF: usize = 6;

/// Names of sets and materials are case-insensitive in the input format.
pub fn name_key(name: &str) -> String {
    name.trim().to_ascii_uppercase()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub coords: Vector3<f64>,
    pub line: usize,
}

macro_rules! element_types {
    ($($variant:ident),+ $(,)?) => {
        /// Element type tags known to the parser.
        ///
        /// Whether a known tag actually converts is decided by the mapping
        /// tables; anything else lands in `Unsupported` and never converts.
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        #[allow(clippy::upper_case_acronyms)]
        pub enum ElementType {
            $($variant,)+
            Unsupported(String),
        }

        impl ElementType {
            /// Parses an element `type=` parameter, ignoring case
            pub fn from_tag(tag: &str) -> ElementType {
                let tag = tag.trim().to_ascii_uppercase();
                match tag.as_str() {
                    $(stringify!($variant) => ElementType::$variant,)+
                    _ => ElementType::Unsupported(tag),
                }
            }

            /// The canonical upper-case tag of this element type
            pub fn tag(&self) -> &str {
                match self {
                    $(ElementType::$variant => stringify!($variant),)+
                    ElementType::Unsupported(tag) => tag.as_str(),
                }
            }
        }
    };
}

element_types!(
    T2D2, T2D3, T3D2, T3D3, B21, B31, B31R, B32, B33, S3, S3R, S4, S4R, S4R5, S8R, STRI3, STRI65,
    C3D4, C3D6, C3D8, C3D8H, C3D8I, C3D8R, C3D10, C3D15, C3D20, C3D20R, M3D3, M3D4, M3D4R,
    M3D6, M3D8,
);

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub id: ElementId,
    pub element_type: ElementType,
    pub nodes: Vec<NodeId>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeSet {
    pub name: String,
    pub nodes: IndexSet<NodeId>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementSet {
    pub name: String,
    pub elements: IndexSet<ElementId>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterialKind {
    LinearElastic,
    Unsupported(String),
}

impl MaterialKind {
    /// The key used in the material model map
    pub fn tag(&self) -> &str {
        match self {
            MaterialKind::LinearElastic => "ELASTIC",
            MaterialKind::Unsupported(tag) => tag.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub kind: MaterialKind,
    pub youngs_modulus: Option<f64>,
    pub poisson_ratio: Option<f64>,
    pub density: Option<f64>,
    pub line: usize,
}

impl Material {
    pub fn new(name: &str, line: usize) -> Material {
        Material {
            name: name.to_string(),
            kind: MaterialKind::LinearElastic,
            youngs_modulus: None,
            poisson_ratio: None,
            density: None,
            line,
        }
    }
}

/// Beam cross-section constants, in the order of a general beam section
/// data line: `A, I11, I12, I22, J`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeamProperties {
    pub area: Option<f64>,
    pub i11: Option<f64>,
    pub i12: Option<f64>,
    pub i22: Option<f64>,
    pub torsion: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SectionKind {
    Shell { thickness: Option<f64> },
    Solid,
    Truss { area: f64 },
    Beam(BeamProperties),
}

impl SectionKind {
    /// The key used in the section map
    pub fn tag(&self) -> &'static str {
        match self {
            SectionKind::Shell { .. } => "SHELL",
            SectionKind::Solid => "SOLID",
            SectionKind::Truss { .. } => "TRUSS",
            SectionKind::Beam(_) => "BEAM",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub elset: String,
    pub material: String,
    pub kind: SectionKind,
    pub line: usize,
}

/// Target of a boundary condition or a load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRef {
    Node(NodeId),
    Set(String),
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRef::Node(id) => write!(f, "node {id}"),
            NodeRef::Set(name) => write!(f, "node set {name}"),
        }
    }
}

/// Fixed degrees of freedom of a node, one bit per DOF (bit 0 is DOF 1)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DofMask(u8);

impl DofMask {
    pub const ALL: DofMask = DofMask(0b11_1111);

    /// Fixes every DOF in `first..=last` (1-based). Out of range DOFs are ignored.
    pub fn range(first: usize, last: usize) -> DofMask {
        let mut mask = DofMask::default();
        for dof in first..=last {
            mask = mask.with(dof);
        }
        mask
    }

    pub fn from_dofs(dofs: &[usize]) -> DofMask {
        dofs.iter().fold(DofMask::default(), |mask, dof| mask.with(*dof))
    }

    pub fn with(self, dof: usize) -> DofMask {
        if (1..=DOF).contains(&dof) {
            DofMask(self.0 | (1 << (dof - 1)))
        } else {
            self
        }
    }

    pub fn union(self, other: DofMask) -> DofMask {
        DofMask(self.0 | other.0)
    }

    pub fn is_fixed(&self, dof: usize) -> bool {
        (1..=DOF).contains(&dof) && self.0 & (1 << (dof - 1)) != 0
    }

    /// One flag per DOF, 1 for fixed and 0 for free
    pub fn flags(&self) -> [u8; DOF] {
        let mut flags = [0; DOF];
        for (i, flag) in flags.iter_mut().enumerate() {
            *flag = self.is_fixed(i + 1) as u8;
        }
        flags
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryCondition {
    pub target: NodeRef,
    pub mask: DofMask,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Load {
    pub target: NodeRef,
    /// Fx, Fy, Fz, Mx, My, Mz
    pub components: Vector6<f64>,
    pub line: usize,
}

/// Something the parser tolerated instead of failing on
#[derive(Debug, Clone, PartialEq)]
pub enum ParseNote {
    SkippedSection { keyword: String, line: usize },
    IgnoredMagnitude { line: usize, value: f64 },
}

/// A parsed finite element model. Every collection keeps definition order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    pub nodes: IndexMap<NodeId, Node>,
    pub elements: IndexMap<ElementId, Element>,
    /// Keyed by [`name_key`]
    pub node_sets: IndexMap<String, NodeSet>,
    /// Keyed by [`name_key`]
    pub element_sets: IndexMap<String, ElementSet>,
    /// Keyed by [`name_key`]
    pub materials: IndexMap<String, Material>,
    pub sections: Vec<Section>,
    pub boundaries: Vec<BoundaryCondition>,
    pub loads: Vec<Load>,
    pub notes: Vec<ParseNote>,
}

impl Model {
    pub fn node_set(&self, name: &str) -> Option<&NodeSet> {
        self.node_sets.get(&name_key(name))
    }

    pub fn element_set(&self, name: &str) -> Option<&ElementSet> {
        self.element_sets.get(&name_key(name))
    }

    pub fn material(&self, name: &str) -> Option<&Material> {
        self.materials.get(&name_key(name))
    }

    /// Returns the node set called `name`, creating an empty one if needed
    pub fn node_set_mut(&mut self, name: &str, line: usize) -> &mut NodeSet {
        self.node_sets
            .entry(name_key(name))
            .or_insert_with(|| NodeSet {
                name: name.trim().to_string(),
                nodes: IndexSet::new(),
                line,
            })
    }

    /// Returns the element set called `name`, creating an empty one if needed
    pub fn element_set_mut(&mut self, name: &str, line: usize) -> &mut ElementSet {
        self.element_sets
            .entry(name_key(name))
            .or_insert_with(|| ElementSet {
                name: name.trim().to_string(),
                elements: IndexSet::new(),
                line,
            })
    }

    /// Resolves a boundary or load target into existing node ids
    ///
    /// # Arguments
    /// * `target` - A node id or node set name
    ///
    /// # Returns
    /// The node ids in set order, or `None` if the target does not name at
    /// least one node and only existing nodes
    pub fn resolve_nodes(&self, target: &NodeRef) -> Option<Vec<NodeId>> {
        match target {
            NodeRef::Node(id) => self.nodes.contains_key(id).then(|| vec![*id]),
            NodeRef::Set(name) => {
                let set = self.node_set(name)?;
                if set.nodes.is_empty() || set.nodes.iter().any(|id| !self.nodes.contains_key(id)) {
                    return None;
                }
                Some(set.nodes.iter().copied().collect())
            }
        }
    }

    /// Number of elements per source type tag, in order of first appearance
    pub fn element_type_counts(&self) -> IndexMap<String, usize> {
        let mut counts: IndexMap<String, usize> = IndexMap::new();
        for element in self.elements.values() {
            *counts.entry(element.element_type.tag().to_string()).or_default() += 1;
        }
        counts
    }

    pub fn skipped_sections(&self) -> impl Iterator<Item = (&str, usize)> {
        self.notes.iter().filter_map(|note| match note {
            ParseNote::SkippedSection { keyword, line } => Some((keyword.as_str(), *line)),
            _ => None,
        })
    }
}
