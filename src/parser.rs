use nalgebra::{Vector3, Vector6};
use tracing::{debug, info};

use crate::{
    datatypes::{
        name_key, BeamProperties, BoundaryCondition, DofMask, Element, ElementType, Load,
        Material, MaterialKind, Model, Node, NodeId, NodeRef, ParseNote, Section, SectionKind,
        DOF,
    },
    error::{ParseError, ParseErrorKind},
};

/// Cross-section shapes understood on beam section directives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeamShape {
    /// `A, I11, I12, I22, J`
    General,
    /// `a, b`
    Rectangular,
    /// `r`
    Circular,
    Other,
}

/// What the data records after a directive line mean.
///
/// Each directive produces a new context from the previous one, and each
/// data record is read under the current context, which may hand back a
/// different context for the records that follow.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionContext {
    /// Before the first directive
    Limbo,
    Node {
        nset: Option<String>,
    },
    Element {
        element_type: ElementType,
        elset: Option<String>,
    },
    NodeSet {
        name: String,
        generate: bool,
    },
    ElementSet {
        name: String,
        generate: bool,
    },
    /// Material keys are [`name_key`]s
    Material {
        key: String,
    },
    Elastic {
        key: String,
    },
    Density {
        key: String,
    },
    SectionData {
        index: usize,
        shape: Option<BeamShape>,
    },
    Boundary,
    Cload,
    /// Records are read and dropped. An open material stays open.
    Discard {
        material: Option<String>,
    },
}

impl SectionContext {
    /// The material that `*Elastic` or `*Density` would attach to
    pub fn open_material(&self) -> Option<&str> {
        match self {
            SectionContext::Material { key }
            | SectionContext::Elastic { key }
            | SectionContext::Density { key } => Some(key),
            SectionContext::Discard { material } => material.as_deref(),
            _ => None,
        }
    }
}

/// A keyword line such as `*Element, type=S4R, elset=Plate`
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    /// Upper case, single spaced, without the marker
    pub keyword: String,
    /// The keyword as written, for error messages
    pub label: String,
    params: Vec<(String, Option<String>)>,
}

impl Directive {
    pub fn parse(line: &str) -> Directive {
        let mut parts = line.split(',');
        let head = parts.next().unwrap_or_default().trim();

        let keyword = head
            .trim_start_matches('*')
            .split_whitespace()
            .collect::<Vec<&str>>()
            .join(" ")
            .to_ascii_uppercase();

        let params = parts
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| match part.split_once('=') {
                Some((key, value)) => (
                    key.trim().to_string(),
                    Some(value.trim().trim_matches('"').to_string()),
                ),
                None => (part.to_string(), None),
            })
            .collect();

        Directive {
            keyword,
            label: head.to_string(),
            params,
        }
    }

    /// Value of a `name=value` parameter, ignoring case of the name
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, value)| value.as_deref())
            .filter(|value| !value.is_empty())
    }

    /// Whether a bare flag such as `generate` is present
    pub fn flag(&self, name: &str) -> bool {
        self.params
            .iter()
            .any(|(key, value)| value.is_none() && key.eq_ignore_ascii_case(name))
    }

    fn required(&self, name: &'static str) -> Result<&str, ParseErrorKind> {
        self.param(name)
            .ok_or(ParseErrorKind::MissingParameter(name))
    }
}

/// A comma separated data line, possibly joined from continuation lines
#[derive(Debug, Clone, PartialEq)]
pub struct Record<'a> {
    /// Line the record starts on
    pub line: usize,
    fields: Vec<&'a str>,
}

impl<'a> Record<'a> {
    pub fn new(line: usize, text: &'a str) -> Record<'a> {
        Record {
            line,
            fields: text.split(',').map(str::trim).collect(),
        }
    }

    /// A record ending in a comma carries on into the next data line
    fn continues(&self) -> bool {
        self.fields.len() > 1 && self.fields.last() == Some(&"")
    }

    fn extend(&mut self, text: &'a str) {
        self.fields.pop();
        self.fields.extend(text.split(',').map(str::trim));
    }

    /// Drops the empty field left by a trailing comma
    fn finish(&mut self) {
        if self.continues() {
            self.fields.pop();
        }
    }

    fn len(&self) -> usize {
        self.fields.len()
    }

    fn is_blank(&self, index: usize) -> bool {
        self.fields.get(index).map_or(true, |field| field.is_empty())
    }

    fn at_most(&self, expected: usize) -> Result<(), ParseErrorKind> {
        if self.fields.len() > expected {
            return Err(ParseErrorKind::TooManyFields {
                expected,
                found: self.fields.len(),
            });
        }
        Ok(())
    }

    pub fn text(&self, index: usize) -> Result<&'a str, ParseErrorKind> {
        match self.fields.get(index) {
            Some(&field) if !field.is_empty() => Ok(field),
            _ => Err(ParseErrorKind::MissingField { index }),
        }
    }

    /// A positive integer id
    pub fn id(&self, index: usize) -> Result<u32, ParseErrorKind> {
        let text = self.text(index)?;
        match text.parse::<u32>() {
            Ok(id) if id > 0 => Ok(id),
            _ => Err(ParseErrorKind::InvalidField {
                index,
                value: text.to_string(),
            }),
        }
    }

    pub fn float(&self, index: usize) -> Result<f64, ParseErrorKind> {
        let text = self.text(index)?;
        match text.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(ParseErrorKind::InvalidField {
                index,
                value: text.to_string(),
            }),
        }
    }

    pub fn optional_float(&self, index: usize) -> Result<Option<f64>, ParseErrorKind> {
        if self.is_blank(index) {
            return Ok(None);
        }
        self.float(index).map(Some)
    }
}

fn is_skippable(line: &str) -> bool {
    line.is_empty() || line.starts_with("**")
}

/// Parses an input deck into a validated model
///
/// # Arguments
/// * `text` - The full contents of the input file
///
/// # Returns
/// The model, with every cross reference resolved. No partial model is
/// returned on failure.
pub fn parse(text: &str) -> Result<Model, ParseError> {
    let mut model = Model::default();
    let mut context = SectionContext::Limbo;
    let mut section = String::from("(no section)");
    let mut lines = text.lines().enumerate().peekable();

    while let Some((index, raw)) = lines.next() {
        let line = raw.trim();
        if is_skippable(line) {
            continue;
        }
        let line_no = index + 1;

        if line.starts_with('*') {
            let directive = Directive::parse(line);
            section = directive.label.clone();
            context = enter_section(&context, &directive, line_no, &mut model)
                .map_err(|kind| ParseError::new(line_no, &section, kind))?;
            continue;
        }

        let mut record = Record::new(line_no, line);
        while record.continues() {
            match lines.peek() {
                Some(&(_, next)) if is_skippable(next.trim()) => {
                    lines.next();
                }
                Some(&(_, next)) if !next.trim().starts_with('*') => {
                    record.extend(next.trim());
                    lines.next();
                }
                _ => break,
            }
        }
        record.finish();

        context = read_record(context, &record, &mut model)
            .map_err(|kind| ParseError::new(line_no, &section, kind))?;
    }

    resolve_references(&model)?;

    info!(
        "loaded {} nodes, {} elements and {} materials",
        model.nodes.len(),
        model.elements.len(),
        model.materials.len()
    );

    Ok(model)
}

/// Computes the context a directive line opens
///
/// # Arguments
/// * `previous` - The context in force before the directive
/// * `directive` - The parsed directive line
/// * `line` - The directive's line number
/// * `model` - The model under construction
fn enter_section(
    previous: &SectionContext,
    directive: &Directive,
    line: usize,
    model: &mut Model,
) -> Result<SectionContext, ParseErrorKind> {
    match directive.keyword.as_str() {
        "NODE" => {
            let nset = directive.param("nset").map(str::to_string);
            if let Some(name) = &nset {
                model.node_set_mut(name, line);
            }
            Ok(SectionContext::Node { nset })
        }
        "ELEMENT" => {
            let element_type = ElementType::from_tag(directive.required("type")?);
            let elset = directive.param("elset").map(str::to_string);
            if let Some(name) = &elset {
                model.element_set_mut(name, line);
            }
            Ok(SectionContext::Element {
                element_type,
                elset,
            })
        }
        "NSET" => {
            let name = directive.required("nset")?.to_string();
            model.node_set_mut(&name, line);
            Ok(SectionContext::NodeSet {
                name,
                generate: directive.flag("generate"),
            })
        }
        "ELSET" => {
            let name = directive.required("elset")?.to_string();
            model.element_set_mut(&name, line);
            Ok(SectionContext::ElementSet {
                name,
                generate: directive.flag("generate"),
            })
        }
        "MATERIAL" => {
            let name = directive.required("name")?;
            let key = name_key(name);
            if model.materials.contains_key(&key) {
                return Err(ParseErrorKind::DuplicateName {
                    entity: "material",
                    name: name.to_string(),
                });
            }
            model.materials.insert(key.clone(), Material::new(name, line));
            Ok(SectionContext::Material { key })
        }
        "ELASTIC" => {
            let key = previous
                .open_material()
                .ok_or(ParseErrorKind::OutOfContext("*Elastic"))?
                .to_string();

            match directive.param("type") {
                Some(kind) if !kind.eq_ignore_ascii_case("ISOTROPIC") => {
                    if let Some(material) = model.materials.get_mut(&key) {
                        material.kind =
                            MaterialKind::Unsupported(format!("ELASTIC/{}", kind.to_ascii_uppercase()));
                    }
                    Ok(SectionContext::Discard {
                        material: Some(key),
                    })
                }
                _ => Ok(SectionContext::Elastic { key }),
            }
        }
        "DENSITY" => {
            let key = previous
                .open_material()
                .ok_or(ParseErrorKind::OutOfContext("*Density"))?
                .to_string();
            Ok(SectionContext::Density { key })
        }
        "SHELL SECTION" | "SOLID SECTION" | "BEAM SECTION" | "BEAM GENERAL SECTION" => {
            open_section(directive, line, model)
        }
        "BOUNDARY" => Ok(SectionContext::Boundary),
        "CLOAD" => Ok(SectionContext::Cload),
        _ => {
            debug!(keyword = %directive.label, line, "skipping unsupported section");
            model.notes.push(ParseNote::SkippedSection {
                keyword: directive.label.clone(),
                line,
            });
            Ok(SectionContext::Discard {
                material: previous.open_material().map(str::to_string),
            })
        }
    }
}

fn open_section(
    directive: &Directive,
    line: usize,
    model: &mut Model,
) -> Result<SectionContext, ParseErrorKind> {
    let elset = directive.required("elset")?.to_string();
    let material = directive.required("material")?.to_string();

    let (kind, shape) = match directive.keyword.as_str() {
        "SHELL SECTION" => (SectionKind::Shell { thickness: None }, None),
        "SOLID SECTION" => (SectionKind::Solid, None),
        _ => {
            let shape = match directive.param("section").map(str::to_ascii_uppercase) {
                None => BeamShape::General,
                Some(shape) => match shape.as_str() {
                    "GENERAL" => BeamShape::General,
                    "RECT" => BeamShape::Rectangular,
                    "CIRC" => BeamShape::Circular,
                    _ => BeamShape::Other,
                },
            };
            (SectionKind::Beam(BeamProperties::default()), Some(shape))
        }
    };

    model.sections.push(Section {
        elset,
        material,
        kind,
        line,
    });

    Ok(SectionContext::SectionData {
        index: model.sections.len() - 1,
        shape,
    })
}

/// Reads one data record under `context`
///
/// # Returns
/// The context for the next record
fn read_record(
    context: SectionContext,
    record: &Record,
    model: &mut Model,
) -> Result<SectionContext, ParseErrorKind> {
    match context {
        SectionContext::Limbo | SectionContext::Discard { .. } => {}
        // *Material carries no data lines of its own
        SectionContext::Material { .. } => {}
        SectionContext::Node { ref nset } => read_node(record, nset.as_deref(), model)?,
        SectionContext::Element {
            ref element_type,
            ref elset,
        } => read_element(record, element_type, elset.as_deref(), model)?,
        SectionContext::NodeSet { ref name, generate } => {
            let ids = read_ids(record, generate)?;
            model.node_set_mut(name, record.line).nodes.extend(ids);
        }
        SectionContext::ElementSet { ref name, generate } => {
            let ids = read_ids(record, generate)?;
            model.element_set_mut(name, record.line).elements.extend(ids);
        }
        // Only the first line counts; later ones are temperature tables
        SectionContext::Elastic { key } => {
            read_elastic(record, &key, model)?;
            return Ok(SectionContext::Discard {
                material: Some(key),
            });
        }
        SectionContext::Density { key } => {
            read_density(record, &key, model)?;
            return Ok(SectionContext::Discard {
                material: Some(key),
            });
        }
        SectionContext::SectionData { index, shape } => {
            read_section(record, index, shape, model)?;
            return Ok(SectionContext::Discard { material: None });
        }
        SectionContext::Boundary => read_boundary(record, model)?,
        SectionContext::Cload => read_cload(record, model)?,
    }

    Ok(context)
}

fn read_node(record: &Record, nset: Option<&str>, model: &mut Model) -> Result<(), ParseErrorKind> {
    record.at_most(4)?;
    let id = record.id(0)?;

    let mut coords: Vector3<f64> = Vector3::zeros();
    coords[0] = record.float(1)?;
    for axis in 1..3 {
        coords[axis] = record.optional_float(axis + 1)?.unwrap_or(0.0);
    }

    if model.nodes.contains_key(&id) {
        return Err(ParseErrorKind::DuplicateId { entity: "node", id });
    }
    model.nodes.insert(
        id,
        Node {
            id,
            coords,
            line: record.line,
        },
    );

    if let Some(name) = nset {
        model.node_set_mut(name, record.line).nodes.insert(id);
    }

    Ok(())
}

fn read_element(
    record: &Record,
    element_type: &ElementType,
    elset: Option<&str>,
    model: &mut Model,
) -> Result<(), ParseErrorKind> {
    let id = record.id(0)?;
    record.text(1)?;
    let nodes = (1..record.len())
        .map(|i| record.id(i))
        .collect::<Result<Vec<NodeId>, ParseErrorKind>>()?;

    if model.elements.contains_key(&id) {
        return Err(ParseErrorKind::DuplicateId {
            entity: "element",
            id,
        });
    }
    model.elements.insert(
        id,
        Element {
            id,
            element_type: element_type.clone(),
            nodes,
            line: record.line,
        },
    );

    if let Some(name) = elset {
        model.element_set_mut(name, record.line).elements.insert(id);
    }

    Ok(())
}

/// Most ids a single `generate` record may expand to
pub const MAX_GENERATED_IDS: u32 = 10_000_000;

/// Reads a set data line: either a list of ids, or `first, last[, step]`
/// under `generate`
fn read_ids(record: &Record, generate: bool) -> Result<Vec<u32>, ParseErrorKind> {
    if !generate {
        return (0..record.len()).map(|i| record.id(i)).collect();
    }

    record.at_most(3)?;
    let first = record.id(0)?;
    let last = record.id(1)?;
    let step = if record.is_blank(2) { 1 } else { record.id(2)? };

    if first > last || (last - first) / step >= MAX_GENERATED_IDS {
        return Err(ParseErrorKind::InvalidValue {
            what: "generate range",
            value: format!("{first} to {last} by {step}"),
        });
    }

    Ok((first..=last).step_by(step as usize).collect())
}

fn read_elastic(record: &Record, key: &str, model: &mut Model) -> Result<(), ParseErrorKind> {
    record.at_most(3)?;
    let youngs_modulus = record.float(0)?;
    if youngs_modulus <= 0.0 {
        return Err(ParseErrorKind::InvalidValue {
            what: "Young's modulus",
            value: youngs_modulus.to_string(),
        });
    }
    let poisson_ratio = record.optional_float(1)?;

    if let Some(material) = model.materials.get_mut(key) {
        material.youngs_modulus = Some(youngs_modulus);
        material.poisson_ratio = poisson_ratio;
    }
    Ok(())
}

fn read_density(record: &Record, key: &str, model: &mut Model) -> Result<(), ParseErrorKind> {
    record.at_most(2)?;
    let density = record.float(0)?;
    if let Some(material) = model.materials.get_mut(key) {
        material.density = Some(density);
    }
    Ok(())
}

fn positive(value: f64, what: &'static str) -> Result<f64, ParseErrorKind> {
    if value <= 0.0 {
        return Err(ParseErrorKind::InvalidValue {
            what,
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn read_section(
    record: &Record,
    index: usize,
    shape: Option<BeamShape>,
    model: &mut Model,
) -> Result<(), ParseErrorKind> {
    let kind = match &model.sections[index].kind {
        SectionKind::Shell { .. } => SectionKind::Shell {
            thickness: Some(positive(record.float(0)?, "shell thickness")?),
        },
        // The data line of a solid section is only meaningful for trusses
        SectionKind::Solid | SectionKind::Truss { .. } => match record.optional_float(0)? {
            Some(area) => SectionKind::Truss {
                area: positive(area, "cross-section area")?,
            },
            None => SectionKind::Solid,
        },
        SectionKind::Beam(_) => {
            SectionKind::Beam(beam_properties(record, shape.unwrap_or(BeamShape::General))?)
        }
    };

    model.sections[index].kind = kind;
    Ok(())
}

/// Computes section constants for a beam cross-section
///
/// # Arguments
/// * `record` - The first data line of the beam section
/// * `shape` - The `section=` parameter of the directive
///
/// # Returns
/// The section constants. Values the shape does not determine are `None`.
fn beam_properties(record: &Record, shape: BeamShape) -> Result<BeamProperties, ParseErrorKind> {
    let properties = match shape {
        BeamShape::General => BeamProperties {
            area: record.optional_float(0)?,
            i11: record.optional_float(1)?,
            i12: record.optional_float(2)?,
            i22: record.optional_float(3)?,
            torsion: record.optional_float(4)?,
        },
        BeamShape::Rectangular => {
            let a = positive(record.float(0)?, "rectangle width")?;
            let b = positive(record.float(1)?, "rectangle height")?;
            let (long, short) = if a >= b { (a, b) } else { (b, a) };
            let ratio = short / long;

            BeamProperties {
                area: Some(a * b),
                i11: Some(a * b.powi(3) / 12.0),
                i12: Some(0.0),
                i22: Some(b * a.powi(3) / 12.0),
                torsion: Some(
                    long * short.powi(3) * (1.0 / 3.0 - 0.21 * ratio * (1.0 - ratio.powi(4) / 12.0)),
                ),
            }
        }
        BeamShape::Circular => {
            let r = positive(record.float(0)?, "circle radius")?;
            let inertia = std::f64::consts::PI * r.powi(4) / 4.0;

            BeamProperties {
                area: Some(std::f64::consts::PI * r.powi(2)),
                i11: Some(inertia),
                i12: Some(0.0),
                i22: Some(inertia),
                torsion: Some(2.0 * inertia),
            }
        }
        BeamShape::Other => BeamProperties::default(),
    };

    Ok(properties)
}

/// A node id, or a node set name when the field is not an integer
fn node_ref(record: &Record, index: usize) -> Result<NodeRef, ParseErrorKind> {
    let text = record.text(index)?;
    match text.parse::<u32>() {
        Ok(0) => Err(ParseErrorKind::InvalidField {
            index,
            value: text.to_string(),
        }),
        Ok(id) => Ok(NodeRef::Node(id)),
        Err(_) => Ok(NodeRef::Set(text.to_string())),
    }
}

fn dof(record: &Record, index: usize) -> Result<usize, ParseErrorKind> {
    let text = record.text(index)?;
    match text.parse::<usize>() {
        Ok(dof) if (1..=DOF).contains(&dof) => Ok(dof),
        Ok(_) => Err(ParseErrorKind::InvalidValue {
            what: "degree of freedom",
            value: text.to_string(),
        }),
        Err(_) => Err(ParseErrorKind::InvalidField {
            index,
            value: text.to_string(),
        }),
    }
}

/// DOFs fixed by the named boundary condition types
fn named_boundary(name: &str) -> Option<DofMask> {
    let dofs: &[usize] = match name.to_ascii_uppercase().as_str() {
        "ENCASTRE" => &[1, 2, 3, 4, 5, 6],
        "PINNED" => &[1, 2, 3],
        "XSYMM" => &[1, 5, 6],
        "YSYMM" => &[2, 4, 6],
        "ZSYMM" => &[3, 4, 5],
        "XASYMM" => &[2, 3, 4],
        "YASYMM" => &[1, 3, 5],
        "ZASYMM" => &[1, 2, 6],
        _ => return None,
    };
    Some(DofMask::from_dofs(dofs))
}

fn read_boundary(record: &Record, model: &mut Model) -> Result<(), ParseErrorKind> {
    record.at_most(4)?;
    let target = node_ref(record, 0)?;
    let kind = record.text(1)?;

    let mask = if kind.parse::<usize>().is_ok() {
        let first = dof(record, 1)?;
        let last = if record.is_blank(2) { first } else { dof(record, 2)? };
        if first > last {
            return Err(ParseErrorKind::InvalidValue {
                what: "DOF range",
                value: format!("{first} to {last}"),
            });
        }

        if let Some(value) = record.optional_float(3)? {
            if value != 0.0 {
                model.notes.push(ParseNote::IgnoredMagnitude {
                    line: record.line,
                    value,
                });
            }
        }

        DofMask::range(first, last)
    } else {
        record.at_most(2)?;
        match named_boundary(kind) {
            Some(mask) => mask,
            None => {
                return Err(ParseErrorKind::InvalidField {
                    index: 1,
                    value: kind.to_string(),
                })
            }
        }
    };

    model.boundaries.push(BoundaryCondition {
        target,
        mask,
        line: record.line,
    });
    Ok(())
}

fn read_cload(record: &Record, model: &mut Model) -> Result<(), ParseErrorKind> {
    record.at_most(3)?;
    let target = node_ref(record, 0)?;
    let dof = dof(record, 1)?;
    let magnitude = record.float(2)?;

    let mut components: Vector6<f64> = Vector6::zeros();
    components[dof - 1] = magnitude;

    model.loads.push(Load {
        target,
        components,
        line: record.line,
    });
    Ok(())
}

fn undefined(line: usize, section: &str, entity: &'static str, name: String) -> ParseError {
    ParseError::new(
        line,
        section,
        ParseErrorKind::UndefinedReference { entity, name },
    )
}

fn undefined_target(line: usize, section: &str, target: &NodeRef) -> ParseError {
    match target {
        NodeRef::Node(id) => undefined(line, section, "node", id.to_string()),
        NodeRef::Set(name) => undefined(line, section, "node set", name.clone()),
    }
}

/// Second pass: every id and name referenced anywhere must resolve
fn resolve_references(model: &Model) -> Result<(), ParseError> {
    for element in model.elements.values() {
        if let Some(missing) = element.nodes.iter().find(|id| !model.nodes.contains_key(*id)) {
            return Err(undefined(element.line, "*Element", "node", missing.to_string()));
        }
    }

    for set in model.node_sets.values() {
        if let Some(missing) = set.nodes.iter().find(|id| !model.nodes.contains_key(*id)) {
            return Err(undefined(set.line, "*Nset", "node", missing.to_string()));
        }
    }

    for set in model.element_sets.values() {
        if let Some(missing) = set
            .elements
            .iter()
            .find(|id| !model.elements.contains_key(*id))
        {
            return Err(undefined(set.line, "*Elset", "element", missing.to_string()));
        }
    }

    for section in &model.sections {
        let label = match section.kind {
            SectionKind::Shell { .. } => "*Shell Section",
            SectionKind::Solid | SectionKind::Truss { .. } => "*Solid Section",
            SectionKind::Beam(_) => "*Beam Section",
        };
        if model.material(&section.material).is_none() {
            return Err(undefined(section.line, label, "material", section.material.clone()));
        }
        if model.element_set(&section.elset).is_none() {
            return Err(undefined(section.line, label, "element set", section.elset.clone()));
        }
    }

    for boundary in &model.boundaries {
        if model.resolve_nodes(&boundary.target).is_none() {
            return Err(undefined_target(boundary.line, "*Boundary", &boundary.target));
        }
    }

    for load in &model.loads {
        if model.resolve_nodes(&load.target).is_none() {
            return Err(undefined_target(load.line, "*Cload", &load.target));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const PLATE: &str = "**
** Sample Abaqus input file for testing
**
*Node
1, 0.0, 0.0, 0.0
2, 10.0, 0.0, 0.0
3, 10.0, 10.0, 0.0
4, 0.0, 10.0, 0.0
*Element, type=S4R
1, 1, 2, 3, 4
*Material, name=Steel
*Elastic
210000.0, 0.3
*Density
7.85e-9
*Shell Section, elset=AllElements, material=Steel
0.01
*Elset, elset=AllElements
1
*Boundary
1, 1, 6, 0.0
2, 1, 6, 0.0
*Cload
4, 3, -1000.0
";

    fn parse_err(text: &str) -> ParseError {
        parse(text).unwrap_err()
    }

    #[test]
    fn parses_plate_model() {
        let model = parse(PLATE).unwrap();

        assert_eq!(model.nodes.len(), 4);
        assert_eq!(model.nodes[&3].coords, Vector3::new(10.0, 10.0, 0.0));

        let element = &model.elements[&1];
        assert_eq!(element.element_type, ElementType::S4R);
        assert_eq!(element.nodes, vec![1, 2, 3, 4]);

        let steel = model.material("steel").unwrap();
        assert_eq!(steel.name, "Steel");
        assert_eq!(steel.kind, MaterialKind::LinearElastic);
        assert_eq!(steel.youngs_modulus, Some(210000.0));
        assert_eq!(steel.poisson_ratio, Some(0.3));
        assert_eq!(steel.density, Some(7.85e-9));

        assert_eq!(model.sections.len(), 1);
        assert_eq!(model.sections[0].kind, SectionKind::Shell { thickness: Some(0.01) });
        assert_eq!(model.sections[0].elset, "AllElements");
        assert_eq!(model.sections[0].material, "Steel");

        assert_eq!(model.boundaries.len(), 2);
        assert_eq!(model.boundaries[0].target, NodeRef::Node(1));
        assert_eq!(model.boundaries[0].mask, DofMask::ALL);

        assert_eq!(model.loads.len(), 1);
        assert_eq!(model.loads[0].target, NodeRef::Node(4));
        assert_eq!(model.loads[0].components[2], -1000.0);

        assert!(model.notes.is_empty());
    }

    #[rstest]
    #[case("*Node")]
    #[case("*NODE")]
    #[case("*node")]
    #[case("  *Node  ")]
    fn keywords_ignore_case(#[case] keyword: &str) {
        let model = parse(&format!("{keyword}\n1, 1.0, 2.0, 3.0\n")).unwrap();
        assert_eq!(model.nodes[&1].coords, Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn keywords_normalize_inner_whitespace() {
        let text = "*Node\n1, 0, 0, 0\n*Element, TYPE=s4r, ELSET=Plate\n1, 1, 1, 1, 1\n\
                    *Material, NAME=steel\n*Elastic\n1.0\n*SHELL   SECTION, Elset=PLATE, Material=STEEL\n0.5\n";
        let model = parse(text).unwrap();
        assert_eq!(model.sections[0].kind, SectionKind::Shell { thickness: Some(0.5) });
        assert!(model.element_set("plate").unwrap().elements.contains(&1));
    }

    #[test]
    fn missing_coordinates_default_to_zero() {
        let model = parse("*Node\n5, 2.5\n6, 1.0, 2.0\n").unwrap();
        assert_eq!(model.nodes[&5].coords, Vector3::new(2.5, 0.0, 0.0));
        assert_eq!(model.nodes[&6].coords, Vector3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn invalid_field_reports_line_and_index() {
        let err = parse_err("*Node\n1, 0.0, 0.0, 0.0\n2, 0.0, abc, 0.0\n");
        assert_eq!(err.line, 3);
        assert_eq!(err.section, "*Node");
        assert_eq!(
            err.kind,
            ParseErrorKind::InvalidField {
                index: 2,
                value: "abc".into()
            }
        );
    }

    #[rstest]
    #[case("*Node\n1, 0, 0, 0, 0\n", ParseErrorKind::TooManyFields { expected: 4, found: 5 })]
    #[case("*Node\n1\n", ParseErrorKind::MissingField { index: 1 })]
    #[case("*Node\n0, 0, 0, 0\n", ParseErrorKind::InvalidField { index: 0, value: "0".into() })]
    #[case("*Element\n1, 1, 2\n", ParseErrorKind::MissingParameter("type"))]
    #[case("*Nset\n1\n", ParseErrorKind::MissingParameter("nset"))]
    #[case("*Elastic\n200000, 0.3\n", ParseErrorKind::OutOfContext("*Elastic"))]
    #[case("*Node\n1, 0, 0, 0\n*Density\n7800\n", ParseErrorKind::OutOfContext("*Density"))]
    fn malformed_input_is_rejected(#[case] text: &str, #[case] kind: ParseErrorKind) {
        assert_eq!(parse_err(text).kind, kind);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = parse_err("*Node\n7, 0, 0, 0\n7, 1, 0, 0\n");
        assert_eq!(err.line, 3);
        assert_eq!(
            err.kind,
            ParseErrorKind::DuplicateId {
                entity: "node",
                id: 7
            }
        );

        let err = parse_err("*Node\n1, 0, 0, 0\n*Element, type=T3D2\n1, 1, 1\n*Element, type=B31\n1, 1, 1\n");
        assert_eq!(err.section, "*Element");
        assert_eq!(
            err.kind,
            ParseErrorKind::DuplicateId {
                entity: "element",
                id: 1
            }
        );
    }

    #[test]
    fn duplicate_material_names_ignore_case() {
        let err = parse_err("*Material, name=Steel\n*Material, name=STEEL\n");
        assert_eq!(err.line, 2);
        assert_eq!(
            err.kind,
            ParseErrorKind::DuplicateName {
                entity: "material",
                name: "STEEL".into()
            }
        );
    }

    #[test]
    fn non_positive_modulus_is_rejected() {
        let err = parse_err("*Material, name=Steel\n*Elastic\n-1.0, 0.3\n");
        assert_eq!(err.line, 3);
        assert!(matches!(err.kind, ParseErrorKind::InvalidValue { what: "Young's modulus", .. }));
    }

    #[test]
    fn references_may_point_forward() {
        let text = "*Shell Section, elset=Plate, material=Steel\n0.1\n\
                    *Elset, elset=Plate\n1\n\
                    *Element, type=S3\n1, 1, 2, 3\n\
                    *Boundary\nBase, ENCASTRE\n\
                    *Nset, nset=Base\n1, 2\n\
                    *Node\n1, 0, 0, 0\n2, 1, 0, 0\n3, 0, 1, 0\n\
                    *Material, name=Steel\n*Elastic\n200000.0, 0.3\n";
        let model = parse(text).unwrap();
        assert_eq!(model.elements.len(), 1);
        assert_eq!(model.resolve_nodes(&model.boundaries[0].target), Some(vec![1, 2]));
    }

    #[test]
    fn undefined_node_in_element_is_rejected() {
        let err = parse_err("*Element, type=T3D2\n1, 1, 2\n*Node\n1, 0, 0, 0\n");
        assert_eq!(err.line, 2);
        assert_eq!(err.section, "*Element");
        assert_eq!(
            err.kind,
            ParseErrorKind::UndefinedReference {
                entity: "node",
                name: "2".into()
            }
        );
    }

    #[rstest]
    #[case("*Boundary\nMissing, 1, 3\n", "*Boundary", "node set", "Missing")]
    #[case("*Boundary\n9, 1, 3\n", "*Boundary", "node", "9")]
    #[case("*Cload\n9, 2, 10.0\n", "*Cload", "node", "9")]
    #[case("*Nset, nset=Empty\n*Cload\nEmpty, 2, 10.0\n", "*Cload", "node set", "Empty")]
    #[case("*Elset, elset=Top\n3\n", "*Elset", "element", "3")]
    #[case("*Solid Section, elset=Top, material=Steel\n", "*Solid Section", "material", "Steel")]
    fn unresolved_targets_are_rejected(
        #[case] tail: &str,
        #[case] section: &str,
        #[case] entity: &'static str,
        #[case] name: &str,
    ) {
        let err = parse_err(&format!("*Node\n1, 0, 0, 0\n{tail}"));
        assert_eq!(err.section, section);
        assert_eq!(
            err.kind,
            ParseErrorKind::UndefinedReference {
                entity,
                name: name.into()
            }
        );
    }

    #[test]
    fn unknown_directive_only() {
        let model = parse("*Heading\nJob title, with a comma\n").unwrap();
        assert!(model.nodes.is_empty());
        assert!(model.elements.is_empty());
        assert_eq!(
            model.notes,
            vec![ParseNote::SkippedSection {
                keyword: "*Heading".into(),
                line: 1
            }]
        );
    }

    #[test]
    fn skipped_sections_consume_their_data() {
        let text = "*Node\n1, 0, 0, 0\n*Step\n*Static\n1., 1., 1e-05, 1.\n*Boundary\n1, PINNED\n*End Step\n";
        let model = parse(text).unwrap();
        let skipped: Vec<(&str, usize)> = model.skipped_sections().collect();
        assert_eq!(skipped, vec![("*Step", 3), ("*Static", 4), ("*End Step", 8)]);
        assert_eq!(model.boundaries.len(), 1);
    }

    #[test]
    fn unsupported_material_behaviour_keeps_material_open() {
        let text = "*Material, name=Steel\n*Plastic\n250., 0.\n300., 0.1\n*Elastic\n200000.0, 0.3\n*Density\n7.8e-9\n";
        let model = parse(text).unwrap();
        let steel = model.material("Steel").unwrap();
        assert_eq!(steel.youngs_modulus, Some(200000.0));
        assert_eq!(steel.density, Some(7.8e-9));
        assert_eq!(model.notes.len(), 1);
    }

    #[test]
    fn anisotropic_elasticity_marks_material_unsupported() {
        let text = "*Material, name=Wood\n*Elastic, type=ENGINEERING CONSTANTS\n1, 2, 3, 4, 5, 6, 7, 8\n9\n";
        let model = parse(text).unwrap();
        let wood = model.material("wood").unwrap();
        assert_eq!(
            wood.kind,
            MaterialKind::Unsupported("ELASTIC/ENGINEERING CONSTANTS".into())
        );
        assert_eq!(wood.youngs_modulus, None);
    }

    #[test]
    fn records_continue_after_trailing_comma() {
        let mut text = String::from("*Node\n");
        for id in 1..=20 {
            text.push_str(&format!("{id}, {id}.0, 0.0, 0.0\n"));
        }
        text.push_str("*Element, type=C3D20\n1, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10,\n** midside nodes\n11, 12, 13, 14, 15, 16, 17, 18, 19, 20\n");

        let model = parse(&text).unwrap();
        let element = &model.elements[&1];
        assert_eq!(element.nodes, (1..=20).collect::<Vec<u32>>());
        assert_eq!(element.line, 23);
    }

    #[test]
    fn trailing_comma_before_directive_is_dropped() {
        let model = parse("*Node\n1, 0, 0, 0\n2, 1, 0, 0\n*Nset, nset=Ends\n1, 2,\n*Boundary\nEnds, 1\n").unwrap();
        let ends = model.node_set("ends").unwrap();
        assert_eq!(ends.nodes.iter().copied().collect::<Vec<u32>>(), vec![1, 2]);
    }

    #[test]
    fn generated_sets() {
        let mut text = String::from("*Node\n");
        for id in 1..=9 {
            text.push_str(&format!("{id}, 0, 0, 0\n"));
        }
        text.push_str("*Nset, nset=Odd, generate\n1, 9, 2\n*Nset, nset=All, generate\n1, 9\n");

        let model = parse(&text).unwrap();
        let odd: Vec<u32> = model.node_set("odd").unwrap().nodes.iter().copied().collect();
        assert_eq!(odd, vec![1, 3, 5, 7, 9]);
        assert_eq!(model.node_set("all").unwrap().nodes.len(), 9);

        let err = parse_err("*Nset, nset=Bad, generate\n9, 1\n");
        assert!(matches!(err.kind, ParseErrorKind::InvalidValue { what: "generate range", .. }));
    }

    #[rstest]
    #[case("1, 4294967295")]
    #[case("1, 10000001")]
    #[case("5, 4294967295, 2")]
    fn oversized_generate_ranges_are_rejected(#[case] data: &str) {
        let err = parse_err(&format!("*Nset, nset=Huge, generate\n{data}\n"));
        assert_eq!(err.line, 2);
        assert!(matches!(err.kind, ParseErrorKind::InvalidValue { what: "generate range", .. }));
    }

    #[test]
    fn generate_ranges_up_to_the_limit_expand() {
        let last = MAX_GENERATED_IDS * 3 - 2;
        let text = format!("1, {last}, 3");
        let record = Record::new(1, &text);
        let ids = read_ids(&record, true).unwrap();
        assert_eq!(ids.len(), MAX_GENERATED_IDS as usize);
        assert_eq!(ids.last(), Some(&last));
    }

    #[test]
    fn repeated_sets_append_and_directive_params_add_members() {
        let text = "*Node, nset=Row\n1, 0, 0, 0\n2, 1, 0, 0\n*Element, type=T3D2, elset=Bars\n1, 1, 2\n\
                    *Nset, nset=ROW\n1\n*Elset, elset=bars\n1\n";
        let model = parse(text).unwrap();
        assert_eq!(model.node_sets.len(), 1);
        assert_eq!(model.node_set("Row").unwrap().nodes.len(), 2);
        assert_eq!(model.element_set("Bars").unwrap().elements.len(), 1);
    }

    #[rstest]
    #[case("ENCASTRE", [1, 1, 1, 1, 1, 1])]
    #[case("pinned", [1, 1, 1, 0, 0, 0])]
    #[case("XSYMM", [1, 0, 0, 0, 1, 1])]
    #[case("YSYMM", [0, 1, 0, 1, 0, 1])]
    #[case("ZSYMM", [0, 0, 1, 1, 1, 0])]
    #[case("XASYMM", [0, 1, 1, 1, 0, 0])]
    #[case("YASYMM", [1, 0, 1, 0, 1, 0])]
    #[case("ZASYMM", [1, 1, 0, 0, 0, 1])]
    #[case("1, 3", [1, 1, 1, 0, 0, 0])]
    #[case("4", [0, 0, 0, 1, 0, 0])]
    #[case("5, 6, 0.0", [0, 0, 0, 0, 1, 1])]
    fn boundary_masks(#[case] data: &str, #[case] flags: [u8; 6]) {
        let model = parse(&format!("*Node\n1, 0, 0, 0\n*Boundary\n1, {data}\n")).unwrap();
        assert_eq!(model.boundaries[0].mask.flags(), flags);
    }

    #[rstest]
    #[case("1, 0", "degree of freedom")]
    #[case("1, 7", "degree of freedom")]
    #[case("1, 4, 2", "DOF range")]
    fn boundary_dofs_are_checked(#[case] data: &str, #[case] what: &str) {
        let err = parse_err(&format!("*Node\n1, 0, 0, 0\n*Boundary\n{data}\n"));
        match err.kind {
            ParseErrorKind::InvalidValue { what: found, .. } => assert_eq!(found, what),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unknown_boundary_type_is_an_invalid_field() {
        let err = parse_err("*Node\n1, 0, 0, 0\n*Boundary\n1, CLAMPED\n");
        assert_eq!(
            err.kind,
            ParseErrorKind::InvalidField {
                index: 1,
                value: "CLAMPED".into()
            }
        );
    }

    #[test]
    fn prescribed_displacements_are_noted() {
        let model = parse("*Node\n1, 0, 0, 0\n*Boundary\n1, 2, 2, 0.5\n").unwrap();
        assert_eq!(
            model.notes,
            vec![ParseNote::IgnoredMagnitude {
                line: 4,
                value: 0.5
            }]
        );
    }

    #[test]
    fn solid_section_area_makes_a_truss() {
        let text = "*Node\n1, 0, 0, 0\n2, 1, 0, 0\n*Element, type=T3D2, elset=Bars\n1, 1, 2\n\
                    *Element, type=C3D4, elset=Block\n2, 1, 2, 1, 2\n\
                    *Material, name=Steel\n*Elastic\n200000.0, 0.3\n\
                    *Solid Section, elset=Bars, material=Steel\n0.25\n\
                    *Solid Section, elset=Block, material=Steel\n";
        let model = parse(text).unwrap();
        assert_eq!(model.sections[0].kind, SectionKind::Truss { area: 0.25 });
        assert_eq!(model.sections[1].kind, SectionKind::Solid);
    }

    #[test]
    fn beam_sections() {
        let text = "*Node\n1, 0, 0, 0\n2, 1, 0, 0\n*Element, type=B31, elset=Beam\n1, 1, 2\n\
                    *Material, name=Steel\n*Elastic\n200000.0, 0.3\n\
                    *Beam Section, elset=Beam, material=Steel\n0.01, 0.001\n\
                    *Beam Section, elset=Beam, material=Steel, section=RECT\n2.0, 2.0\n0.0, 0.0, -1.0\n\
                    *Beam General Section, elset=Beam, material=Steel, section=CIRC\n1.0\n";
        let model = parse(text).unwrap();

        let general = BeamProperties {
            area: Some(0.01),
            i11: Some(0.001),
            ..BeamProperties::default()
        };
        assert_eq!(model.sections[0].kind, SectionKind::Beam(general));

        let SectionKind::Beam(rect) = &model.sections[1].kind else {
            panic!("expected a beam section");
        };
        assert_eq!(rect.area, Some(4.0));
        assert!((rect.i11.unwrap() - 4.0 / 3.0).abs() < 1e-12);
        assert_eq!(rect.i11, rect.i22);
        assert!((rect.torsion.unwrap() - 2.253_333_333_333_333).abs() < 1e-9);

        let SectionKind::Beam(circ) = &model.sections[2].kind else {
            panic!("expected a beam section");
        };
        assert!((circ.area.unwrap() - std::f64::consts::PI).abs() < 1e-12);
        assert!((circ.torsion.unwrap() - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn directive_parameters() {
        let directive = Directive::parse("*Nset, NSET=\"Left Edge\", Generate, instance=");
        assert_eq!(directive.keyword, "NSET");
        assert_eq!(directive.label, "*Nset");
        assert_eq!(directive.param("nset"), Some("Left Edge"));
        assert!(directive.flag("generate"));
        assert_eq!(directive.param("instance"), None);
        assert!(!directive.flag("instance"));
    }
}
