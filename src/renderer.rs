use crate::{
    commands::{Arg, BlockKind, Command, CommandSequence},
    mapping::Vocabulary,
};

/// Renders a command sequence as script text
///
/// # Arguments
/// * `sequence` - The translated command sequence
///
/// # Returns
/// The script. Each block is a `#` title line followed by its commands, blocks
/// are separated by a blank line, and the text ends with a single newline.
pub fn render(sequence: &CommandSequence) -> String {
    let vocabulary = &sequence.vocabulary;
    let mut out = String::new();

    for (i, block) in sequence.blocks.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }

        let title = match block.kind {
            BlockKind::Header => vocabulary.title.as_str(),
            kind => kind.title(),
        };
        out.push_str(&format!("# {title}\n"));

        for command in &block.commands {
            out.push_str(&render_command(command, vocabulary));
            out.push('\n');
        }
    }

    out
}

/// Shortest round-trip form, always with a decimal point or exponent
pub fn format_float(value: f64) -> String {
    if value == 0.0 {
        return "0.0".to_string();
    }
    format!("{value:?}")
}

/// A single-quoted string literal
pub fn quote(text: &str) -> String {
    let escaped = text.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

fn format_arg(arg: &Arg) -> String {
    match arg {
        Arg::Int(value) => value.to_string(),
        Arg::Float(value) => format_float(*value),
        Arg::Str(text) => quote(text),
    }
}

fn call(name: &str, args: Vec<String>) -> String {
    format!("{name}({})", args.join(", "))
}

fn render_command(command: &Command, vocabulary: &Vocabulary) -> String {
    match command {
        Command::Comment(text) => format!("# {text}"),
        Command::Raw(line) => line.clone(),
        Command::Wipe => call(&vocabulary.wipe, vec![]),
        Command::Model { ndm, ndf } => call(
            &vocabulary.model,
            vec![
                quote("basic"),
                quote("-ndm"),
                ndm.to_string(),
                quote("-ndf"),
                ndf.to_string(),
            ],
        ),
        Command::Node { id, coords } => {
            let mut args = vec![id.to_string()];
            args.extend(coords.iter().take(vocabulary.ndm).map(|c| format_float(*c)));
            call(&vocabulary.node, args)
        }
        Command::Material {
            command,
            model,
            tag,
            params,
        }
        | Command::Section {
            command,
            model,
            tag,
            params,
        } => {
            let mut args = vec![quote(model), tag.to_string()];
            args.extend(params.iter().map(|p| format_float(*p)));
            call(command, args)
        }
        Command::GeomTransf { kind, tag, vecxz } => {
            let mut args = vec![quote(kind), tag.to_string()];
            args.extend(vecxz.iter().map(|c| format_float(*c)));
            call(&vocabulary.geom_transf, args)
        }
        Command::Element {
            id,
            target,
            nodes,
            args,
        } => {
            let mut all = vec![quote(target), id.to_string()];
            all.extend(nodes.iter().map(|n| n.to_string()));
            all.extend(args.iter().map(format_arg));
            call(&vocabulary.element, all)
        }
        Command::Fix { node, mask } => {
            let mut args = vec![node.to_string()];
            args.extend(mask.flags().iter().take(vocabulary.ndf).map(|f| f.to_string()));
            call(&vocabulary.fix, args)
        }
        Command::TimeSeries { kind, tag } => {
            call(&vocabulary.time_series, vec![quote(kind), tag.to_string()])
        }
        Command::Pattern { kind, tag, series } => call(
            &vocabulary.pattern,
            vec![quote(kind), tag.to_string(), series.to_string()],
        ),
        Command::Load { node, components } => {
            let mut args = vec![node.to_string()];
            args.extend(
                components
                    .iter()
                    .take(vocabulary.ndf)
                    .map(|c| format_float(*c)),
            );
            call(&vocabulary.load, args)
        }
        Command::Analysis { command, args } => call(command, args.iter().map(format_arg).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parser::parse, translator::convert};
    use rstest::rstest;

    const TRUSS: &str = "*Node
1, 0.0, 0.0, 0.0
2, 10.0, 0.0, 0.0
*Element, type=T3D2
1, 1, 2
*Boundary
1, 1, 6
";

    fn translate(text: &str) -> CommandSequence {
        convert(&parse(text).unwrap()).unwrap().0
    }

    #[test]
    fn renders_fixed_truss() {
        let expected = "# OpenSeesPy model translated from Abaqus input
# mapping tables openseespy-1
from openseespy.opensees import *

# Model
wipe()
model('basic', '-ndm', 3, '-ndf', 6)

# Nodes
node(1, 0.0, 0.0, 0.0)
node(2, 10.0, 0.0, 0.0)

# Materials

# Sections

# Elements
element('Truss', 1, 1, 2)

# Boundary conditions
fix(1, 1, 1, 1, 1, 1, 1)

# Loads

# Analysis
constraints('Plain')
numberer('Plain')
system('BandGeneral')
test('NormDispIncr', 1e-6, 10)
algorithm('Newton')
integrator('LoadControl', 1.0)
analysis('Static')
analyze(1)
";
        assert_eq!(render(&translate(TRUSS)), expected);
    }

    #[test]
    fn renders_materials_sections_and_loads() {
        let text = "*Node
1, 0.0, 0.0, 0.0
2, 10.0, 0.0, 0.0
3, 10.0, 10.0, 0.0
4, 0.0, 10.0, 0.0
*Element, type=S4R, elset=Plate
1, 1, 2, 3, 4
*Material, name=Steel
*Elastic
210000.0, 0.3
*Density
7.85e-9
*Shell Section, elset=Plate, material=Steel
0.01
*Cload
4, 3, -1000.0
";
        let script = render(&translate(text));

        assert!(script.contains(
            "# Materials\nnDMaterial('ElasticIsotropic', 1, 210000.0, 0.3, 7.85e-9)\nuniaxialMaterial('Elastic', 1, 210000.0)\n"
        ));
        assert!(script.contains(
            "# Sections\nsection('ElasticMembranePlateSection', 1, 210000.0, 0.3, 0.01, 7.85e-9)\n"
        ));
        assert!(script.contains("element('ShellMITC4', 1, 1, 2, 3, 4, 1)\n"));
        assert!(script.contains(
            "# Loads\ntimeSeries('Linear', 1)\npattern('Plain', 1, 1)\nload(4, 0.0, 0.0, -1000.0, 0.0, 0.0, 0.0)\n"
        ));
    }

    #[test]
    fn dimensions_limit_coordinates_and_dofs() {
        let mut sequence = translate(TRUSS);
        sequence.vocabulary.ndm = 2;
        sequence.vocabulary.ndf = 3;

        let script = render(&sequence);
        assert!(script.contains("node(2, 10.0, 0.0)\n"));
        assert!(script.contains("fix(1, 1, 1, 1)\n"));
    }

    #[test]
    fn command_names_come_from_the_vocabulary() {
        let mut sequence = translate(TRUSS);
        sequence.vocabulary.node = "ops.node".to_string();
        sequence.vocabulary.fix = "ops.fix".to_string();

        let script = render(&sequence);
        assert!(script.contains("ops.node(1, 0.0, 0.0, 0.0)\n"));
        assert!(script.contains("ops.fix(1, 1, 1, 1, 1, 1, 1)\n"));
    }

    #[test]
    fn rendering_is_repeatable() {
        let sequence = translate(TRUSS);
        assert_eq!(render(&sequence), render(&sequence.clone()));
        assert!(render(&sequence).ends_with("analyze(1)\n"));
    }

    #[rstest]
    #[case(0.0, "0.0")]
    #[case(-0.0, "0.0")]
    #[case(10.0, "10.0")]
    #[case(-1000.0, "-1000.0")]
    #[case(0.3, "0.3")]
    #[case(7.85e-9, "7.85e-9")]
    #[case(1e21, "1e21")]
    fn floats(#[case] value: f64, #[case] expected: &str) {
        assert_eq!(format_float(value), expected);
    }

    #[rstest]
    #[case("Truss", "'Truss'")]
    #[case("it's", "'it\\'s'")]
    #[case("a\\b", "'a\\\\b'")]
    fn quoting(#[case] text: &str, #[case] expected: &str) {
        assert_eq!(quote(text), expected);
    }
}
