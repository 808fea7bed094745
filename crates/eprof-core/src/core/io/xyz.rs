use super::traits::StructureFile;
use crate::core::models::atom::Atom;
use crate::core::models::element::{Element, ElementParseError};
use crate::core::models::structure::{Cell, Structure, StructureError};
use nalgebra::{Matrix3, Point3};
use std::io::{self, BufRead, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XyzError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse { line: usize, kind: XyzParseErrorKind },
    #[error("Invalid structure: {0}")]
    Structure(#[from] StructureError),
}

#[derive(Debug, Error)]
pub enum XyzParseErrorKind {
    #[error("Missing or invalid atom count")]
    InvalidAtomCount,
    #[error("File ended after {found} of {expected} atoms")]
    Truncated { expected: usize, found: usize },
    #[error("Atom line needs an element and three coordinates")]
    ShortAtomLine,
    #[error("Invalid coordinate '{0}'")]
    InvalidFloat(String),
    #[error(transparent)]
    Element(#[from] ElementParseError),
    #[error("Lattice must contain 9 numbers")]
    InvalidLattice,
    #[error("pbc must contain 3 of T/F")]
    InvalidPbc,
}

/// Extended XYZ: plain XYZ whose comment line holds `key=value` pairs, of which
/// `Lattice="..."` (nine numbers, row-major lattice vectors) and `pbc="T T T"` are used.
pub struct ExtXyzFile;

impl StructureFile for ExtXyzFile {
    type Error = XyzError;

    fn read_from(reader: &mut impl BufRead) -> Result<Structure, Self::Error> {
        let mut lines = reader.lines();

        let count_line = lines.next().transpose()?.unwrap_or_default();
        let count: usize = count_line.trim().parse().map_err(|_| XyzError::Parse {
            line: 1,
            kind: XyzParseErrorKind::InvalidAtomCount,
        })?;

        let comment = lines.next().transpose()?.unwrap_or_default();
        let properties = parse_comment(&comment);

        let mut atoms = Vec::with_capacity(count);
        for index in 0..count {
            let line_no = index + 3;
            let Some(line) = lines.next().transpose()? else {
                return Err(XyzError::Parse {
                    line: line_no,
                    kind: XyzParseErrorKind::Truncated {
                        expected: count,
                        found: index,
                    },
                });
            };
            atoms.push(parse_atom_line(&line).map_err(|kind| XyzError::Parse {
                line: line_no,
                kind,
            })?);
        }

        let lattice = properties
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("lattice"))
            .map(|(_, v)| parse_lattice(v))
            .transpose()
            .map_err(|kind| XyzError::Parse { line: 2, kind })?;

        let Some(matrix) = lattice else {
            return Ok(Structure::new(atoms));
        };

        let pbc = properties
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("pbc"))
            .map(|(_, v)| parse_pbc(v))
            .transpose()
            .map_err(|kind| XyzError::Parse { line: 2, kind })?
            .unwrap_or([true; 3]);

        Ok(Structure::periodic(atoms, Cell::new(matrix)?, pbc))
    }

    fn write_to(structure: &Structure, writer: &mut impl Write) -> Result<(), Self::Error> {
        writeln!(writer, "{}", structure.len())?;
        if let Some(cell) = structure.cell() {
            let lattice = cell
                .rows()
                .iter()
                .flatten()
                .map(|v| format!("{v:.8}"))
                .collect::<Vec<_>>()
                .join(" ");
            let pbc = structure
                .pbc()
                .iter()
                .map(|&p| if p { "T" } else { "F" })
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(
                writer,
                "Lattice=\"{lattice}\" Properties=species:S:1:pos:R:3 pbc=\"{pbc}\""
            )?;
        } else {
            writeln!(writer, "Properties=species:S:1:pos:R:3")?;
        }
        for atom in structure.atoms() {
            let p = &atom.position;
            writeln!(
                writer,
                "{:<2} {:>16.8} {:>16.8} {:>16.8}",
                atom.element, p.x, p.y, p.z
            )?;
        }
        Ok(())
    }
}

fn parse_atom_line(line: &str) -> Result<Atom, XyzParseErrorKind> {
    let mut fields = line.split_whitespace();
    let (Some(symbol), Some(x), Some(y), Some(z)) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(XyzParseErrorKind::ShortAtomLine);
    };
    let element: Element = symbol.parse()?;
    let coord = |s: &str| {
        s.parse::<f64>()
            .map_err(|_| XyzParseErrorKind::InvalidFloat(s.to_string()))
    };
    Ok(Atom::new(element, Point3::new(coord(x)?, coord(y)?, coord(z)?)))
}

/// Splits `key=value key2="quoted value"` pairs. Bare words become keys with empty values.
fn parse_comment(comment: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut chars = comment.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }
        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| !c.is_whitespace() && *c != '=') {
            key.push(c);
        }
        let mut value = String::new();
        if chars.next_if_eq(&'=').is_some() {
            if chars.next_if_eq(&'"').is_some() {
                for c in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                    value.push(c);
                }
            } else {
                while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                    value.push(c);
                }
            }
        }
        pairs.push((key, value));
    }
    pairs
}

fn parse_lattice(value: &str) -> Result<Matrix3<f64>, XyzParseErrorKind> {
    let numbers = value
        .split_whitespace()
        .map(|s| s.parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| XyzParseErrorKind::InvalidLattice)?;
    if numbers.len() != 9 {
        return Err(XyzParseErrorKind::InvalidLattice);
    }
    Ok(Matrix3::from_row_slice(&numbers))
}

fn parse_pbc(value: &str) -> Result<[bool; 3], XyzParseErrorKind> {
    let flags = value
        .split_whitespace()
        .map(|s| match s {
            "T" | "True" | "true" | "1" => Ok(true),
            "F" | "False" | "false" | "0" => Ok(false),
            _ => Err(XyzParseErrorKind::InvalidPbc),
        })
        .collect::<Result<Vec<_>, _>>()?;
    flags.try_into().map_err(|_| XyzParseErrorKind::InvalidPbc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const PERIODIC: &str = "2\n\
        Lattice=\"4.0 0.0 0.0 0.0 4.0 0.0 0.0 0.0 20.0\" Properties=species:S:1:pos:R:3 pbc=\"T T F\"\n\
        Au 0.0 0.0 10.0\n\
        O  2.0 2.0 12.5\n";

    #[test]
    fn reads_lattice_and_pbc_from_comment() {
        let s = ExtXyzFile::read_from(&mut Cursor::new(PERIODIC)).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.pbc(), [true, true, false]);
        let cell = s.cell().unwrap();
        assert!((cell.volume() - 320.0).abs() < 1e-9);
        assert_eq!(s.atoms()[1].element, Element::O);
        assert_eq!(s.atoms()[1].position, Point3::new(2.0, 2.0, 12.5));
    }

    #[test]
    fn plain_xyz_has_no_cell() {
        let s = ExtXyzFile::read_from(&mut Cursor::new("1\nwater fragment\nH 0 0 1\n")).unwrap();
        assert!(s.cell().is_none());
        assert_eq!(s.pbc(), [false; 3]);
    }

    #[test]
    fn written_file_reads_back() {
        let original = ExtXyzFile::read_from(&mut Cursor::new(PERIODIC)).unwrap();
        let mut buffer = Vec::new();
        ExtXyzFile::write_to(&original, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("2\nLattice=\"4.00000000 0.00000000"));
        assert!(text.contains("pbc=\"T T F\""));

        let back = ExtXyzFile::read_from(&mut Cursor::new(text)).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn truncated_file_reports_line() {
        let err = ExtXyzFile::read_from(&mut Cursor::new("3\n\nH 0 0 0\n")).unwrap_err();
        assert!(matches!(
            err,
            XyzError::Parse {
                line: 4,
                kind: XyzParseErrorKind::Truncated { expected: 3, found: 1 }
            }
        ));
    }

    #[test]
    fn unknown_element_is_rejected() {
        let err = ExtXyzFile::read_from(&mut Cursor::new("1\n\nXx 0 0 0\n")).unwrap_err();
        assert!(matches!(
            err,
            XyzError::Parse { line: 3, kind: XyzParseErrorKind::Element(_) }
        ));
    }

    #[test]
    fn degenerate_lattice_is_rejected() {
        let text = "1\nLattice=\"1 0 0 0 1 0 0 0 0\"\nH 0 0 0\n";
        let err = ExtXyzFile::read_from(&mut Cursor::new(text)).unwrap_err();
        assert!(matches!(err, XyzError::Structure(_)));
    }

    #[test]
    fn comment_parser_handles_quotes_and_bare_words() {
        let pairs = parse_comment("a=1 b=\"x y\" flag");
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "x y".to_string()),
                ("flag".to_string(), String::new()),
            ]
        );
    }
}
