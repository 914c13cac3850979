//! Static lookup tables from source entity kinds to target commands.
//!
//! The tables are plain data: the builtin set is embedded from
//! `tables/opensees.json` and parsed once per process, and a replacement
//! document with the same schema can be loaded from disk. Renaming a target
//! command only ever touches the JSON.

use std::path::Path;
use std::sync::LazyLock;

use indexmap::IndexMap;
use json::JsonValue;
use nalgebra::Vector3;

use crate::{
    commands::Arg,
    datatypes::{ElementType, MaterialKind, SectionKind},
    error::{ConverterError, TableError},
};

const BUILTIN_TABLES: &str = include_str!("../tables/opensees.json");

static BUILTIN: LazyLock<MappingTables> = LazyLock::new(|| {
    MappingTables::from_json_str(BUILTIN_TABLES).expect("embedded mapping tables are valid")
});

/// Result of a table lookup. `Unmapped` is not an error; callers decide.
#[derive(Debug, PartialEq)]
pub enum Lookup<'a, T: ?Sized> {
    Mapped(&'a T),
    Unmapped,
}

impl<'a, T: ?Sized> Lookup<'a, T> {
    pub fn mapped(self) -> Option<&'a T> {
        match self {
            Lookup::Mapped(spec) => Some(spec),
            Lookup::Unmapped => None,
        }
    }
}

impl<'a, T: ?Sized> From<Option<&'a T>> for Lookup<'a, T> {
    fn from(value: Option<&'a T>) -> Self {
        match value {
            Some(spec) => Lookup::Mapped(spec),
            None => Lookup::Unmapped,
        }
    }
}

/// Target command names and model dimensions
#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    pub title: String,
    pub import: String,
    pub wipe: String,
    pub model: String,
    pub node: String,
    pub element: String,
    pub fix: String,
    pub load: String,
    pub geom_transf: String,
    pub time_series: String,
    pub pattern: String,
    pub ndm: usize,
    pub ndf: usize,
}

/// Trailing arguments a target element command takes after its node ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementArgs {
    /// `secTag`
    Section,
    /// `matTag`
    Material,
    /// `A, matTag`
    AreaMaterial,
    /// `secTag, transfTag`
    Beam,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementSpec {
    pub target: String,
    pub arity: usize,
    /// 1 for line, 2 for surface, 3 for volume elements
    pub dimension: u8,
    pub args: ElementArgs,
}

/// Named physical quantities a material or section template can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    YoungsModulus,
    PoissonRatio,
    Density,
    ShearModulus,
    Thickness,
    Area,
    Iz,
    Iy,
    Torsion,
}

impl Property {
    fn from_name(name: &str) -> Option<Property> {
        Some(match name {
            "E" => Property::YoungsModulus,
            "nu" => Property::PoissonRatio,
            "rho" => Property::Density,
            "G" => Property::ShearModulus,
            "thickness" => Property::Thickness,
            "A" => Property::Area,
            "Iz" => Property::Iz,
            "Iy" => Property::Iy,
            "J" => Property::Torsion,
            _ => return None,
        })
    }

    /// The value used when a model leaves the property out
    pub fn default_value(&self) -> f64 {
        match self {
            Property::Thickness => 1.0,
            _ => 0.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Property::YoungsModulus => "Young's modulus",
            Property::PoissonRatio => "Poisson's ratio",
            Property::Density => "density",
            Property::ShearModulus => "shear modulus",
            Property::Thickness => "thickness",
            Property::Area => "area",
            Property::Iz => "Iz",
            Property::Iy => "Iy",
            Property::Torsion => "torsion constant",
        }
    }

    /// Whether a material alone determines this value
    pub fn is_material(&self) -> bool {
        matches!(
            self,
            Property::YoungsModulus
                | Property::PoissonRatio
                | Property::Density
                | Property::ShearModulus
        )
    }
}

/// One target command emitted for a material or section
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub command: String,
    pub model: String,
    pub params: Vec<Property>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeomTransfSpec {
    pub kind: String,
    pub tag: u32,
    pub vecxz: Vector3<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadPatternSpec {
    pub time_series: String,
    pub pattern: String,
    pub tag: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisStep {
    pub command: String,
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MappingTables {
    pub version: String,
    pub vocabulary: Vocabulary,
    elements: IndexMap<String, ElementSpec>,
    materials: IndexMap<String, Vec<Template>>,
    sections: IndexMap<String, Vec<Template>>,
    pub geom_transf: GeomTransfSpec,
    pub load_pattern: LoadPatternSpec,
    pub analysis: Vec<AnalysisStep>,
}

impl MappingTables {
    /// The tables embedded in the crate, parsed on first use
    pub fn builtin() -> &'static MappingTables {
        &BUILTIN
    }

    /// Loads a table document from disk
    ///
    /// # Arguments
    /// * `path` - Path to a JSON document with the builtin table schema
    pub fn from_file(path: &Path) -> Result<MappingTables, ConverterError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(source) => {
                return Err(ConverterError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        Ok(MappingTables::from_json_str(&contents)?)
    }

    /// Parses a table document
    ///
    /// # Arguments
    /// * `contents` - The JSON text
    ///
    /// # Returns
    /// The tables, or the first schema violation found
    pub fn from_json_str(contents: &str) -> Result<MappingTables, TableError> {
        let root = match json::parse(contents) {
            Ok(r) => r,
            Err(err) => return Err(TableError::Json(err.to_string())),
        };

        let vocabulary = parse_vocabulary(field(&root, "", "vocabulary")?)?;

        let mut elements = IndexMap::new();
        for (tag, spec) in object(&root, "", "elements")?.entries() {
            let path = format!("elements.{tag}");
            elements.insert(tag.trim().to_ascii_uppercase(), parse_element_spec(spec, &path)?);
        }

        let mut materials = IndexMap::new();
        for (kind, templates) in object(&root, "", "materials")?.entries() {
            let path = format!("materials.{kind}");
            let templates = parse_templates(templates, &path)?;
            if let Some(param) = templates
                .iter()
                .flat_map(|t| t.params.iter())
                .find(|p| !p.is_material())
            {
                return Err(TableError::Invalid {
                    path,
                    reason: format!("{} is not a material property", param.name()),
                });
            }
            materials.insert(kind.trim().to_ascii_uppercase(), templates);
        }

        let mut sections = IndexMap::new();
        for (kind, templates) in object(&root, "", "sections")?.entries() {
            let path = format!("sections.{kind}");
            sections.insert(
                kind.trim().to_ascii_uppercase(),
                parse_templates(templates, &path)?,
            );
        }

        let transf = field(&root, "", "geom_transf")?;
        let geom_transf = GeomTransfSpec {
            kind: string(transf, "geom_transf", "kind")?,
            tag: tag(transf, "geom_transf", "tag")?,
            vecxz: vector3(field(transf, "geom_transf", "vecxz")?, "geom_transf.vecxz")?,
        };

        let pattern = field(&root, "", "load_pattern")?;
        let load_pattern = LoadPatternSpec {
            time_series: string(pattern, "load_pattern", "time_series")?,
            pattern: string(pattern, "load_pattern", "pattern")?,
            tag: tag(pattern, "load_pattern", "tag")?,
        };

        let steps = field(&root, "", "analysis")?;
        if !steps.is_array() {
            return Err(invalid("analysis", "expected an array"));
        }
        let mut analysis = Vec::new();
        for (i, step) in steps.members().enumerate() {
            let path = format!("analysis[{i}]");
            let mut args = Vec::new();
            for (j, arg) in field(step, &path, "args")?.members().enumerate() {
                args.push(literal(arg, &format!("{path}.args[{j}]"))?);
            }
            analysis.push(AnalysisStep {
                command: string(step, &path, "command")?,
                args,
            });
        }

        Ok(MappingTables {
            version: string(&root, "", "version")?,
            vocabulary,
            elements,
            materials,
            sections,
            geom_transf,
            load_pattern,
            analysis,
        })
    }

    pub fn element(&self, element_type: &ElementType) -> Lookup<'_, ElementSpec> {
        match element_type {
            ElementType::Unsupported(_) => Lookup::Unmapped,
            known => self.elements.get(known.tag()).into(),
        }
    }

    pub fn material(&self, kind: &MaterialKind) -> Lookup<'_, [Template]> {
        self.materials.get(kind.tag()).map(Vec::as_slice).into()
    }

    pub fn section(&self, kind: &SectionKind) -> Lookup<'_, [Template]> {
        self.sections.get(kind.tag()).map(Vec::as_slice).into()
    }
}

fn invalid(path: &str, reason: &str) -> TableError {
    TableError::Invalid {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn field<'a>(value: &'a JsonValue, path: &str, key: &str) -> Result<&'a JsonValue, TableError> {
    let child = &value[key];
    if child.is_null() {
        return Err(TableError::Missing(join(path, key)));
    }
    Ok(child)
}

fn object<'a>(value: &'a JsonValue, path: &str, key: &str) -> Result<&'a JsonValue, TableError> {
    let child = field(value, path, key)?;
    if !child.is_object() {
        return Err(invalid(&join(path, key), "expected an object"));
    }
    Ok(child)
}

fn string(value: &JsonValue, path: &str, key: &str) -> Result<String, TableError> {
    match field(value, path, key)?.as_str() {
        Some(s) => Ok(s.to_string()),
        None => Err(invalid(&join(path, key), "expected a string")),
    }
}

fn count(value: &JsonValue, path: &str, key: &str) -> Result<usize, TableError> {
    match field(value, path, key)?.as_usize() {
        Some(n) if n > 0 => Ok(n),
        _ => Err(invalid(&join(path, key), "expected a positive integer")),
    }
}

fn tag(value: &JsonValue, path: &str, key: &str) -> Result<u32, TableError> {
    match field(value, path, key)?.as_u32() {
        Some(n) if n > 0 => Ok(n),
        _ => Err(invalid(&join(path, key), "expected a positive integer")),
    }
}

fn vector3(value: &JsonValue, path: &str) -> Result<Vector3<f64>, TableError> {
    let components: Vec<f64> = value.members().filter_map(JsonValue::as_f64).collect();
    if !value.is_array() || components.len() != 3 || value.len() != 3 {
        return Err(invalid(path, "expected three numbers"));
    }
    Ok(Vector3::new(components[0], components[1], components[2]))
}

/// Numbers written without a fraction or negative exponent become integers
fn literal(value: &JsonValue, path: &str) -> Result<Arg, TableError> {
    if let Some(s) = value.as_str() {
        return Ok(Arg::Str(s.to_string()));
    }
    match value {
        JsonValue::Number(number) => {
            let (_, _, exponent) = number.as_parts();
            let float = value.as_f64().unwrap_or_default();
            if exponent >= 0 && float.abs() < 1e15 {
                Ok(Arg::Int(float as i64))
            } else {
                Ok(Arg::Float(float))
            }
        }
        _ => Err(invalid(path, "expected a string or a number")),
    }
}

fn parse_vocabulary(value: &JsonValue) -> Result<Vocabulary, TableError> {
    let path = "vocabulary";
    Ok(Vocabulary {
        title: string(value, path, "title")?,
        import: string(value, path, "import")?,
        wipe: string(value, path, "wipe")?,
        model: string(value, path, "model")?,
        node: string(value, path, "node")?,
        element: string(value, path, "element")?,
        fix: string(value, path, "fix")?,
        load: string(value, path, "load")?,
        geom_transf: string(value, path, "geom_transf")?,
        time_series: string(value, path, "time_series")?,
        pattern: string(value, path, "pattern")?,
        ndm: count(value, path, "ndm")?,
        ndf: count(value, path, "ndf")?,
    })
}

fn parse_element_spec(value: &JsonValue, path: &str) -> Result<ElementSpec, TableError> {
    let args = match string(value, path, "args")?.as_str() {
        "section" => ElementArgs::Section,
        "material" => ElementArgs::Material,
        "area_material" => ElementArgs::AreaMaterial,
        "beam" => ElementArgs::Beam,
        other => {
            return Err(invalid(
                &join(path, "args"),
                &format!("unknown argument template {other:?}"),
            ))
        }
    };

    let dimension = count(value, path, "dimension")?;
    if dimension > 3 {
        return Err(invalid(&join(path, "dimension"), "expected 1, 2 or 3"));
    }

    Ok(ElementSpec {
        target: string(value, path, "target")?,
        arity: count(value, path, "arity")?,
        dimension: dimension as u8,
        args,
    })
}

fn parse_templates(value: &JsonValue, path: &str) -> Result<Vec<Template>, TableError> {
    if !value.is_array() {
        return Err(invalid(path, "expected an array of command templates"));
    }

    let mut templates = Vec::new();
    for (i, template) in value.members().enumerate() {
        let path = format!("{path}[{i}]");
        let mut params = Vec::new();
        for param in field(template, &path, "params")?.members() {
            let name = param.as_str().unwrap_or_default();
            match Property::from_name(name) {
                Some(p) => params.push(p),
                None => {
                    return Err(invalid(
                        &join(&path, "params"),
                        &format!("unknown property {name:?}"),
                    ))
                }
            }
        }
        templates.push(Template {
            command: string(template, &path, "command")?,
            model: string(template, &path, "model")?,
            params,
        });
    }
    Ok(templates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::BeamProperties;
    use rstest::rstest;

    #[rstest]
    #[case(ElementType::T3D2, "Truss", 2, 1, ElementArgs::AreaMaterial)]
    #[case(ElementType::B31, "elasticBeamColumn", 2, 1, ElementArgs::Beam)]
    #[case(ElementType::S4R, "ShellMITC4", 4, 2, ElementArgs::Section)]
    #[case(ElementType::S3, "ShellDKGT", 3, 2, ElementArgs::Section)]
    #[case(ElementType::C3D8R, "stdBrick", 8, 3, ElementArgs::Material)]
    #[case(ElementType::C3D10, "TenNodeTetrahedron", 10, 3, ElementArgs::Material)]
    fn builtin_element_map(
        #[case] element_type: ElementType,
        #[case] target: &str,
        #[case] arity: usize,
        #[case] dimension: u8,
        #[case] args: ElementArgs,
    ) {
        let spec = MappingTables::builtin()
            .element(&element_type)
            .mapped()
            .unwrap();
        assert_eq!(spec.target, target);
        assert_eq!(spec.arity, arity);
        assert_eq!(spec.dimension, dimension);
        assert_eq!(spec.args, args);
    }

    #[rstest]
    #[case(ElementType::C3D20)]
    #[case(ElementType::M3D4)]
    #[case(ElementType::Unsupported("CPS4".to_string()))]
    fn builtin_element_map_leaves_gaps(#[case] element_type: ElementType) {
        assert_eq!(
            MappingTables::builtin().element(&element_type),
            Lookup::Unmapped
        );
    }

    #[test]
    fn builtin_material_and_section_maps() {
        let tables = MappingTables::builtin();

        let elastic = tables
            .material(&MaterialKind::LinearElastic)
            .mapped()
            .unwrap();
        assert_eq!(elastic[0].command, "nDMaterial");
        assert_eq!(elastic[0].model, "ElasticIsotropic");
        assert_eq!(
            elastic[0].params,
            vec![
                Property::YoungsModulus,
                Property::PoissonRatio,
                Property::Density
            ]
        );
        assert_eq!(
            tables.material(&MaterialKind::Unsupported("ORTHOTROPIC".into())),
            Lookup::Unmapped
        );

        assert!(tables
            .section(&SectionKind::Shell { thickness: None })
            .mapped()
            .is_some());
        assert!(tables
            .section(&SectionKind::Beam(BeamProperties::default()))
            .mapped()
            .is_some());
        assert_eq!(tables.section(&SectionKind::Solid), Lookup::Unmapped);
    }

    #[test]
    fn builtin_analysis_template() {
        let tables = MappingTables::builtin();
        let commands: Vec<&str> = tables.analysis.iter().map(|s| s.command.as_str()).collect();
        assert_eq!(
            commands,
            vec![
                "constraints",
                "numberer",
                "system",
                "test",
                "algorithm",
                "integrator",
                "analysis",
                "analyze"
            ]
        );
        assert_eq!(
            tables.analysis[3].args,
            vec![
                Arg::Str("NormDispIncr".into()),
                Arg::Float(1.0e-6),
                Arg::Int(10)
            ]
        );
        assert_eq!(
            tables.analysis[5].args,
            vec![Arg::Str("LoadControl".into()), Arg::Float(1.0)]
        );
        assert_eq!(tables.vocabulary.ndm, 3);
        assert_eq!(tables.vocabulary.ndf, 6);
    }

    #[test]
    fn renamed_commands_come_from_the_document() {
        let renamed = BUILTIN_TABLES
            .replace("\"node\": \"node\"", "\"node\": \"ops.node\"")
            .replace("\"Truss\"", "\"CorotTruss\"");
        let tables = MappingTables::from_json_str(&renamed).unwrap();
        assert_eq!(tables.vocabulary.node, "ops.node");
        assert_eq!(
            tables.element(&ElementType::T2D2).mapped().unwrap().target,
            "CorotTruss"
        );
    }

    #[rstest]
    #[case("{", "not valid JSON")]
    #[case("{}", "missing field vocabulary")]
    fn malformed_documents_are_rejected(#[case] document: &str, #[case] message: &str) {
        let err = MappingTables::from_json_str(document).unwrap_err();
        assert!(err.to_string().contains(message), "{err}");
    }

    #[test]
    fn unknown_properties_are_rejected() {
        let broken = BUILTIN_TABLES.replace("\"params\": [\"E\"]", "\"params\": [\"yield\"]");
        let err = MappingTables::from_json_str(&broken).unwrap_err();
        assert!(err.to_string().contains("unknown property"), "{err}");

        let misplaced = BUILTIN_TABLES.replace("\"params\": [\"E\"]", "\"params\": [\"thickness\"]");
        let err = MappingTables::from_json_str(&misplaced).unwrap_err();
        assert!(err.to_string().contains("not a material property"), "{err}");
    }
}
