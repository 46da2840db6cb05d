//! Scheme command parsing.
//!
//! A scheme is a string of one-letter commands. Blanks are ignored, `+` and
//! `-` set the direction of the next parameter adjustment, digits select the
//! smoothing kind and parentheses group commands into a loop.

use std::fmt;

use tracing::debug;

use crate::algo::smooth::SmoothingKind;

/// Direction of a parameter adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Increase (the default, or after `+`).
    #[default]
    Up,
    /// Decrease (after `-`).
    Down,
}

/// One scheme command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `A`: area-pull weight.
    AreaPull(Direction),
    /// `D`: squash the worst element.
    Delete,
    /// `E`: stop and keep the mesh.
    Exit,
    /// `F`: relaxation factor.
    Relaxation(Direction),
    /// `I`: smoothing iteration cap.
    Iterations(Direction),
    /// `J`: convergence tolerance.
    Tolerance(Direction),
    /// `N`: add a necklace.
    Necklace,
    /// `O`: start over with the default scheme.
    Original,
    /// `Q`: abandon the region.
    Quit,
    /// `R`: restructure sweep.
    Restructure,
    /// `S`: smooth with the selected kind.
    Smooth,
    /// `T`: add tucks at the widest boundary corner.
    Tuck,
    /// `V`: squash angle threshold.
    SmallAngle(Direction),
    /// `W`: restructure the worst element only.
    RestructureWorst,
    /// `Y`: isoparametric weight.
    IsoWeight(Direction),
    /// `Z`: process the next hole.
    Hole,
    /// `1`..`7`: select the smoothing kind.
    Select(SmoothingKind),
    /// `( ... )`: repeat while any command inside changes the mesh.
    Group(Vec<Command>),
    /// An unknown character.
    Illegal(char),
}

impl Command {
    /// Whether running the command can change the mesh topology in a way
    /// that keeps a loop group going.
    pub fn can_be_active(&self) -> bool {
        matches!(
            self,
            Command::Delete
                | Command::Restructure
                | Command::RestructureWorst
                | Command::Tuck
                | Command::Hole
                | Command::Group(_)
        )
    }
}

fn sign(d: Direction) -> &'static str {
    match d {
        Direction::Up => "+",
        Direction::Down => "-",
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::AreaPull(d) => write!(f, "{}A", sign(*d)),
            Command::Delete => f.write_str("D"),
            Command::Exit => f.write_str("E"),
            Command::Relaxation(d) => write!(f, "{}F", sign(*d)),
            Command::Iterations(d) => write!(f, "{}I", sign(*d)),
            Command::Tolerance(d) => write!(f, "{}J", sign(*d)),
            Command::Necklace => f.write_str("N"),
            Command::Original => f.write_str("O"),
            Command::Quit => f.write_str("Q"),
            Command::Restructure => f.write_str("R"),
            Command::Smooth => f.write_str("S"),
            Command::Tuck => f.write_str("T"),
            Command::SmallAngle(d) => write!(f, "{}V", sign(*d)),
            Command::RestructureWorst => f.write_str("W"),
            Command::IsoWeight(d) => write!(f, "{}Y", sign(*d)),
            Command::Hole => f.write_str("Z"),
            Command::Select(kind) => write!(f, "{}", kind.digit()),
            Command::Group(inner) => {
                f.write_str("(")?;
                for c in inner {
                    write!(f, "{}", c)?;
                }
                f.write_str(")")
            }
            Command::Illegal(c) => write!(f, "{}", c),
        }
    }
}

/// Parse a command string (without the leading shape letter).
///
/// Parsing never fails: unknown characters and a stray `)` become
/// [`Command::Illegal`], and an unclosed group ends with the string.
pub fn parse_commands(text: &str) -> Vec<Command> {
    parse_group(&mut text.chars(), 0)
}

fn parse_group(chars: &mut std::str::Chars<'_>, depth: usize) -> Vec<Command> {
    let mut out = Vec::new();
    let mut pending = Direction::Up;
    while let Some(c) = chars.next() {
        let command = match c.to_ascii_uppercase() {
            c if c.is_whitespace() => continue,
            '+' => {
                pending = Direction::Up;
                continue;
            }
            '-' => {
                pending = Direction::Down;
                continue;
            }
            '(' => Command::Group(parse_group(chars, depth + 1)),
            ')' if depth > 0 => return out,
            'A' => Command::AreaPull(std::mem::take(&mut pending)),
            'D' => Command::Delete,
            'E' => Command::Exit,
            'F' => Command::Relaxation(std::mem::take(&mut pending)),
            'I' => Command::Iterations(std::mem::take(&mut pending)),
            'J' => Command::Tolerance(std::mem::take(&mut pending)),
            'N' => Command::Necklace,
            'O' => Command::Original,
            'Q' => Command::Quit,
            'R' => Command::Restructure,
            'S' => Command::Smooth,
            'T' => Command::Tuck,
            'V' => Command::SmallAngle(std::mem::take(&mut pending)),
            'W' => Command::RestructureWorst,
            'Y' => Command::IsoWeight(std::mem::take(&mut pending)),
            'Z' => Command::Hole,
            d => match d.to_digit(10).and_then(SmoothingKind::from_digit) {
                Some(kind) => Command::Select(kind),
                None => Command::Illegal(c),
            },
        };
        out.push(command);
    }
    if depth > 0 {
        debug!("unclosed command group closed at end of scheme");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let cmds = parse_commands("r s e");
        assert_eq!(cmds, vec![Command::Restructure, Command::Smooth, Command::Exit]);
    }

    #[test]
    fn test_sign_applies_to_next_parameter() {
        let cmds = parse_commands("-S F +I J");
        assert_eq!(
            cmds,
            vec![
                Command::Smooth,
                Command::Relaxation(Direction::Down),
                Command::Iterations(Direction::Up),
                Command::Tolerance(Direction::Up),
            ]
        );
    }

    #[test]
    fn test_groups_nest() {
        let cmds = parse_commands("(R(W)S)3");
        assert_eq!(
            cmds,
            vec![
                Command::Group(vec![
                    Command::Restructure,
                    Command::Group(vec![Command::RestructureWorst]),
                    Command::Smooth,
                ]),
                Command::Select(SmoothingKind::CentroidInversePush),
            ]
        );
        assert_eq!(cmds[0].to_string(), "(R(W)S)");
    }

    #[test]
    fn test_illegal_characters() {
        let cmds = parse_commands("X)8S");
        assert_eq!(
            cmds,
            vec![
                Command::Illegal('X'),
                Command::Illegal(')'),
                Command::Illegal('8'),
                Command::Smooth,
            ]
        );
    }

    #[test]
    fn test_unclosed_group() {
        let cmds = parse_commands("(RS");
        assert_eq!(cmds, vec![Command::Group(vec![Command::Restructure, Command::Smooth])]);
    }
}
