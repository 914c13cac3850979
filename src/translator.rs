use std::collections::{HashMap, HashSet};
use std::fmt;

use indexmap::IndexMap;
use nalgebra::Vector6;
use tracing::{info, warn};

use crate::{
    commands::{Arg, Block, BlockKind, Command, CommandSequence},
    datatypes::{
        name_key, DofMask, Element, ElementId, Material, Model, NodeId, NodeRef, SectionKind,
    },
    error::ConversionError,
    mapping::{ElementArgs, ElementSpec, Lookup, MappingTables, Property},
};

/// A non-fatal problem found during translation
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    UnmappedElement {
        element: ElementId,
        element_type: String,
    },
    UnmappedMaterial {
        material: String,
        kind: String,
    },
    DefaultedProperty {
        owner: String,
        property: &'static str,
        value: f64,
    },
    MissingSection {
        element: ElementId,
    },
    /// A section whose material produced no material command
    UnboundMaterial {
        section: u32,
        material: String,
    },
    /// An element whose template needs a section tag, bound to a section
    /// that produced no fitting section command
    MismatchedSection {
        element: ElementId,
        section: u32,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::UnmappedElement {
                element,
                element_type,
            } => write!(
                f,
                "element {element} of type {element_type} has no target equivalent and was skipped"
            ),
            Warning::UnmappedMaterial { material, kind } => write!(
                f,
                "material {material} of kind {kind} has no target equivalent"
            ),
            Warning::DefaultedProperty {
                owner,
                property,
                value,
            } => write!(f, "{owner} has no {property}, using {value:?}"),
            Warning::MissingSection { element } => {
                write!(f, "element {element} is not in any section's element set")
            }
            Warning::UnboundMaterial { section, material } => write!(
                f,
                "section {section} uses material {material}, which has no material command"
            ),
            Warning::MismatchedSection { element, section } => write!(
                f,
                "element {element} refers to section {section}, which has no fitting section command"
            ),
        }
    }
}

/// What to do with elements whose type has no mapping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnmappedPolicy {
    /// Emit a comment and a warning, and leave the element out
    #[default]
    Skip,
    /// Fail the conversion
    Fail,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvertOptions {
    pub unmapped: UnmappedPolicy,
}

/// Translates a model with the builtin tables and default options
pub fn convert(model: &Model) -> Result<(CommandSequence, Vec<Warning>), ConversionError> {
    convert_with(model, MappingTables::builtin(), &ConvertOptions::default())
}

/// Translates a model into an ordered command sequence
///
/// # Arguments
/// * `model` - A parsed model
/// * `tables` - The mapping tables to translate through
/// * `options` - Translation options
///
/// # Returns
/// The command sequence and every warning raised, in the order raised. No
/// partial sequence is returned on error.
pub fn convert_with(
    model: &Model,
    tables: &MappingTables,
    options: &ConvertOptions,
) -> Result<(CommandSequence, Vec<Warning>), ConversionError> {
    let mut translator = Translator::new(model, tables, options);

    let mut blocks = Vec::with_capacity(BlockKind::ORDER.len());
    for kind in BlockKind::ORDER {
        let commands = match kind {
            BlockKind::Header => translator.header(),
            BlockKind::Model => translator.model_init(),
            BlockKind::Nodes => translator.nodes(),
            BlockKind::Materials => translator.materials(),
            BlockKind::Sections => translator.sections()?,
            BlockKind::Elements => translator.elements()?,
            BlockKind::Boundaries => translator.boundaries()?,
            BlockKind::Loads => translator.loads()?,
            BlockKind::Analysis => translator.analysis(),
        };
        blocks.push(Block { kind, commands });
    }

    for warning in &translator.warnings {
        warn!("{warning}");
    }
    info!(
        "translated {} nodes and {} elements with {} warnings",
        model.nodes.len(),
        model.elements.len(),
        translator.warnings.len()
    );

    let sequence = CommandSequence {
        vocabulary: tables.vocabulary.clone(),
        blocks,
    };
    Ok((sequence, translator.warnings))
}

/// Template values for one material or section. Each missing property
/// defaults once per owner, with a warning.
struct Properties<'m> {
    owner: String,
    material: &'m Material,
    section: Option<&'m SectionKind>,
    defaulted: Vec<Property>,
}

impl<'m> Properties<'m> {
    fn new(owner: String, material: &'m Material, section: Option<&'m SectionKind>) -> Self {
        Properties {
            owner,
            material,
            section,
            defaulted: Vec::new(),
        }
    }

    fn given(&self, property: Property) -> Option<f64> {
        match (property, self.section) {
            (Property::YoungsModulus, _) => self.material.youngs_modulus,
            (Property::PoissonRatio, _) => self.material.poisson_ratio,
            (Property::Density, _) => self.material.density,
            (Property::Thickness, Some(SectionKind::Shell { thickness })) => *thickness,
            (Property::Area, Some(SectionKind::Truss { area })) => Some(*area),
            (Property::Area, Some(SectionKind::Beam(beam))) => beam.area,
            (Property::Iz, Some(SectionKind::Beam(beam))) => beam.i11,
            (Property::Iy, Some(SectionKind::Beam(beam))) => beam.i22,
            (Property::Torsion, Some(SectionKind::Beam(beam))) => beam.torsion,
            _ => None,
        }
    }

    fn value(&mut self, property: Property, warnings: &mut Vec<Warning>) -> f64 {
        if property == Property::ShearModulus {
            let youngs_modulus = self.value(Property::YoungsModulus, warnings);
            let poisson_ratio = self.value(Property::PoissonRatio, warnings);
            if 1.0 + poisson_ratio <= 0.0 {
                return self.fall_back(property, 0.0, warnings);
            }
            return youngs_modulus / (2.0 * (1.0 + poisson_ratio));
        }

        match self.given(property) {
            Some(value) => value,
            None => self.fall_back(property, property.default_value(), warnings),
        }
    }

    fn fall_back(&mut self, property: Property, value: f64, warnings: &mut Vec<Warning>) -> f64 {
        if !self.defaulted.contains(&property) {
            self.defaulted.push(property);
            warnings.push(Warning::DefaultedProperty {
                owner: self.owner.clone(),
                property: property.name(),
                value,
            });
        }
        value
    }

    fn values(&mut self, params: &[Property], warnings: &mut Vec<Warning>) -> Vec<f64> {
        params.iter().map(|p| self.value(*p, warnings)).collect()
    }
}

struct Translator<'a> {
    model: &'a Model,
    tables: &'a MappingTables,
    options: &'a ConvertOptions,
    /// Tags of materials that produced commands, by material key
    material_tags: HashMap<String, u32>,
    /// Index into `model.sections` of the first section holding each element
    element_sections: HashMap<ElementId, usize>,
    /// Sections already warned about a defaulted truss area
    defaulted_areas: HashSet<usize>,
    warnings: Vec<Warning>,
}

impl<'a> Translator<'a> {
    fn new(model: &'a Model, tables: &'a MappingTables, options: &'a ConvertOptions) -> Self {
        let mut element_sections = HashMap::new();
        for (index, section) in model.sections.iter().enumerate() {
            if let Some(set) = model.element_set(&section.elset) {
                for id in &set.elements {
                    element_sections.entry(*id).or_insert(index);
                }
            }
        }

        Translator {
            model,
            tables,
            options,
            material_tags: HashMap::new(),
            element_sections,
            defaulted_areas: HashSet::new(),
            warnings: Vec::new(),
        }
    }

    fn header(&self) -> Vec<Command> {
        vec![
            Command::Comment(format!("mapping tables {}", self.tables.version)),
            Command::Raw(self.tables.vocabulary.import.clone()),
        ]
    }

    fn model_init(&self) -> Vec<Command> {
        vec![
            Command::Wipe,
            Command::Model {
                ndm: self.tables.vocabulary.ndm,
                ndf: self.tables.vocabulary.ndf,
            },
        ]
    }

    fn nodes(&self) -> Vec<Command> {
        let mut ids: Vec<NodeId> = self.model.nodes.keys().copied().collect();
        ids.sort_unstable();

        ids.iter()
            .map(|id| Command::Node {
                id: *id,
                coords: self.model.nodes[id].coords,
            })
            .collect()
    }

    /// Material tags count up from 1 over the materials that map
    fn materials(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();

        for (key, material) in &self.model.materials {
            let templates = match self.tables.material(&material.kind) {
                Lookup::Mapped(t) => t,
                Lookup::Unmapped => {
                    self.warnings.push(Warning::UnmappedMaterial {
                        material: material.name.clone(),
                        kind: material.kind.tag().to_string(),
                    });
                    continue;
                }
            };

            let tag = self.material_tags.len() as u32 + 1;
            self.material_tags.insert(key.clone(), tag);

            let mut properties = Properties::new(format!("material {}", material.name), material, None);
            for template in templates {
                commands.push(Command::Material {
                    command: template.command.clone(),
                    model: template.model.clone(),
                    tag,
                    params: properties.values(&template.params, &mut self.warnings),
                });
            }
        }

        commands
    }

    /// Section tags follow definition order, starting at 1
    fn sections(&mut self) -> Result<Vec<Command>, ConversionError> {
        let model = self.model;
        let mut commands = Vec::new();

        for (index, section) in model.sections.iter().enumerate() {
            let tag = index as u32 + 1;

            let material = match model.material(&section.material) {
                Some(m) => m,
                None => {
                    return Err(ConversionError::UndefinedReference {
                        entity: "material",
                        name: section.material.clone(),
                    })
                }
            };
            if model.element_set(&section.elset).is_none() {
                return Err(ConversionError::UndefinedReference {
                    entity: "element set",
                    name: section.elset.clone(),
                });
            }

            let material_tag = self.material_tags.get(&name_key(&section.material)).copied();
            if material_tag.is_none() {
                self.warnings.push(Warning::UnboundMaterial {
                    section: tag,
                    material: material.name.clone(),
                });
            }

            match self.tables.section(&section.kind) {
                Lookup::Mapped(templates) => {
                    let mut properties = Properties::new(
                        format!("section {tag}"),
                        material,
                        Some(&section.kind),
                    );
                    for template in templates {
                        commands.push(Command::Section {
                            command: template.command.clone(),
                            model: template.model.clone(),
                            tag,
                            params: properties.values(&template.params, &mut self.warnings),
                        });
                    }
                }
                Lookup::Unmapped => {
                    let kind = section.kind.tag().to_ascii_lowercase();
                    commands.push(Command::Comment(match material_tag {
                        Some(m) => format!(
                            "{kind} section {tag}: element set {} uses material {m} ({})",
                            section.elset, material.name
                        ),
                        None => format!(
                            "{kind} section {tag}: element set {} uses unmapped material {}",
                            section.elset, material.name
                        ),
                    }));
                }
            }
        }

        let needs_transf = model.elements.values().any(|element| {
            self.tables
                .element(&element.element_type)
                .mapped()
                .is_some_and(|spec| spec.args == ElementArgs::Beam)
        });
        if needs_transf {
            let transf = &self.tables.geom_transf;
            commands.push(Command::GeomTransf {
                kind: transf.kind.clone(),
                tag: transf.tag,
                vecxz: transf.vecxz,
            });
        }

        Ok(commands)
    }

    fn elements(&mut self) -> Result<Vec<Command>, ConversionError> {
        let model = self.model;
        let tables = self.tables;
        let mut ids: Vec<ElementId> = model.elements.keys().copied().collect();
        ids.sort_unstable();

        let mut commands = Vec::with_capacity(ids.len());
        for id in ids {
            let element = &model.elements[&id];

            if let Some(missing) = element.nodes.iter().find(|n| !model.nodes.contains_key(*n)) {
                return Err(ConversionError::UndefinedReference {
                    entity: "node",
                    name: missing.to_string(),
                });
            }

            let spec = match tables.element(&element.element_type) {
                Lookup::Mapped(spec) => spec,
                Lookup::Unmapped => {
                    let element_type = element.element_type.tag().to_string();
                    if self.options.unmapped == UnmappedPolicy::Fail {
                        return Err(ConversionError::UnmappedElement {
                            element: id,
                            element_type,
                        });
                    }
                    commands.push(Command::Comment(format!(
                        "element {id}: type {element_type} has no target equivalent, skipped"
                    )));
                    self.warnings.push(Warning::UnmappedElement {
                        element: id,
                        element_type,
                    });
                    continue;
                }
            };

            if element.nodes.len() != spec.arity {
                return Err(ConversionError::Arity {
                    element: id,
                    element_type: element.element_type.tag().to_string(),
                    expected: spec.arity,
                    actual: element.nodes.len(),
                });
            }

            commands.push(Command::Element {
                id,
                target: spec.target.clone(),
                nodes: element.nodes.clone(),
                args: self.element_args(element, spec),
            });
        }

        Ok(commands)
    }

    /// Trailing arguments for an element, drawn from its section
    ///
    /// # Arguments
    /// * `element` - The element being translated
    /// * `spec` - The element's mapping
    ///
    /// # Returns
    /// The arguments following the node ids. Empty when the model has no
    /// sections at all.
    fn element_args(&mut self, element: &Element, spec: &ElementSpec) -> Vec<Arg> {
        let model = self.model;

        let index = match self.element_sections.get(&element.id) {
            Some(index) => *index,
            None => {
                self.warnings.push(Warning::MissingSection {
                    element: element.id,
                });
                if model.sections.is_empty() {
                    return Vec::new();
                }
                model
                    .sections
                    .iter()
                    .position(|section| self.section_fits(&section.kind, spec))
                    .unwrap_or(0)
            }
        };

        let section = &model.sections[index];
        let section_tag = index as i64 + 1;
        if !self.section_fits(&section.kind, spec) {
            self.warnings.push(Warning::MismatchedSection {
                element: element.id,
                section: section_tag as u32,
            });
        }
        let material_tag = self
            .material_tags
            .get(&name_key(&section.material))
            .map(|tag| Arg::Int(*tag as i64));

        match spec.args {
            ElementArgs::Section => vec![Arg::Int(section_tag)],
            ElementArgs::Material => material_tag.into_iter().collect(),
            ElementArgs::AreaMaterial => {
                let area = match &section.kind {
                    SectionKind::Truss { area } => Some(*area),
                    SectionKind::Beam(beam) => beam.area,
                    _ => None,
                };
                let area = area.unwrap_or_else(|| {
                    if self.defaulted_areas.insert(index) {
                        self.warnings.push(Warning::DefaultedProperty {
                            owner: format!("section {section_tag}"),
                            property: Property::Area.name(),
                            value: 1.0,
                        });
                    }
                    1.0
                });

                std::iter::once(Arg::Float(area)).chain(material_tag).collect()
            }
            ElementArgs::Beam => vec![
                Arg::Int(section_tag),
                Arg::Int(self.tables.geom_transf.tag as i64),
            ],
        }
    }

    /// Whether a section can supply what an element's template draws from it.
    /// Templates taking a section tag need a section command of the same
    /// family; the others only read the material and area.
    fn section_fits(&self, kind: &SectionKind, spec: &ElementSpec) -> bool {
        match spec.args {
            ElementArgs::Section | ElementArgs::Beam => {
                self.tables.section(kind).mapped().is_some()
                    && matches!(kind, SectionKind::Beam(_)) == (spec.args == ElementArgs::Beam)
            }
            ElementArgs::Material | ElementArgs::AreaMaterial => true,
        }
    }

    fn resolve(&self, target: &NodeRef) -> Result<Vec<NodeId>, ConversionError> {
        match self.model.resolve_nodes(target) {
            Some(nodes) => Ok(nodes),
            None => Err(match target {
                NodeRef::Node(id) => ConversionError::UndefinedReference {
                    entity: "node",
                    name: id.to_string(),
                },
                NodeRef::Set(name) => ConversionError::UndefinedReference {
                    entity: "node set",
                    name: name.clone(),
                },
            }),
        }
    }

    /// One fix per node, with every mask that touches the node merged
    fn boundaries(&self) -> Result<Vec<Command>, ConversionError> {
        let mut masks: IndexMap<NodeId, DofMask> = IndexMap::new();
        for boundary in &self.model.boundaries {
            for node in self.resolve(&boundary.target)? {
                let mask = masks.entry(node).or_default();
                *mask = mask.union(boundary.mask);
            }
        }

        Ok(masks
            .into_iter()
            .map(|(node, mask)| Command::Fix { node, mask })
            .collect())
    }

    /// One load per node, with every load on the node summed
    fn loads(&self) -> Result<Vec<Command>, ConversionError> {
        let mut totals: IndexMap<NodeId, Vector6<f64>> = IndexMap::new();
        for load in &self.model.loads {
            for node in self.resolve(&load.target)? {
                *totals.entry(node).or_insert_with(Vector6::zeros) += load.components;
            }
        }

        if totals.is_empty() {
            return Ok(Vec::new());
        }

        let pattern = &self.tables.load_pattern;
        let mut commands = vec![
            Command::TimeSeries {
                kind: pattern.time_series.clone(),
                tag: pattern.tag,
            },
            Command::Pattern {
                kind: pattern.pattern.clone(),
                tag: pattern.tag,
                series: pattern.tag,
            },
        ];
        commands.extend(
            totals
                .into_iter()
                .map(|(node, components)| Command::Load { node, components }),
        );

        Ok(commands)
    }

    fn analysis(&self) -> Vec<Command> {
        self.tables
            .analysis
            .iter()
            .map(|step| Command::Analysis {
                command: step.command.clone(),
                args: step.args.clone(),
            })
            .collect()
    }
}
