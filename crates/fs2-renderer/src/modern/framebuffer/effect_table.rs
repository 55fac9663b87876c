//! Effect table parser
//!
//! Reads `post_processing.tbl`:
//!
//! ```text
//! #Effects
//! $Name: saturation
//! $Uniform: saturation
//! $Define: FLAG_SATURATION
//! $AlwaysOn: false
//! $Default: 1.0
//! $Div: 100
//! $Add: 0
//! #Ship Effects
//! $Name: FS2 Ship select
//! $Shader Effect: 1
//! $Disables Rendering: false
//! $Invert timer: false
//! #Light Shafts
//! $AlwaysOn: false
//! $Density: 0.5
//! $Falloff: 1.0
//! $Weight: 0.02
//! $Intensity: 0.5
//! $Sample Number: 50
//! #End
//! ```
//!
//! Every section but `#End` is optional. `;` and `//` start comments.

use std::fmt;

use super::effects::{PostEffect, ShipEffect};
use super::light_shafts::LightShaftParams;

/// Longest name kept from the table, in bytes; longer names are cut.
pub const NAME_LENGTH: usize = 31;

/// A malformed effect table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableParseError {
    /// 1-based line of the offending token (last line for an early end).
    pub line: usize,
    pub message: String,
}

impl TableParseError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self { line, message: message.into() }
    }
}

impl fmt::Display for TableParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for TableParseError {}

/// Everything one table declares, in table order.
#[derive(Debug, Clone, Default)]
pub struct EffectTable {
    pub effects: Vec<PostEffect>,
    pub ship_effects: Vec<ShipEffect>,
    /// `None` when the table has no `#Light Shafts` section.
    pub light_shafts: Option<LightShaftParams>,
}

struct Parser<'a> {
    lines: Vec<(usize, &'a str)>,
    pos: usize,
}

fn strip_comment(line: &str) -> &str {
    let cut = [line.find(';'), line.find("//")].into_iter().flatten().min();
    match cut {
        Some(i) => &line[..i],
        None => line,
    }
}

fn starts_with_token(line: &str, token: &str) -> bool {
    line.len() >= token.len() && line.as_bytes()[..token.len()].eq_ignore_ascii_case(token.as_bytes())
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        let lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, strip_comment(l).trim()))
            .filter(|(_, l)| !l.is_empty())
            .collect();
        Self { lines, pos: 0 }
    }

    fn peek(&self) -> Option<&'a str> {
        self.lines.get(self.pos).map(|(_, l)| *l)
    }

    fn line_no(&self) -> usize {
        self.lines
            .get(self.pos)
            .or_else(|| self.lines.last())
            .map_or(1, |(n, _)| *n)
    }

    fn error(&self, message: impl Into<String>) -> TableParseError {
        TableParseError::new(self.line_no(), message)
    }

    fn at(&self, token: &str) -> bool {
        self.peek().map_or(false, |l| starts_with_token(l, token))
    }

    fn optional(&mut self, token: &str) -> bool {
        if self.at(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume `token` and return the rest of its line.
    fn required(&mut self, token: &str) -> Result<&'a str, TableParseError> {
        match self.peek() {
            Some(l) if starts_with_token(l, token) => {
                self.pos += 1;
                Ok(l[token.len()..].trim())
            }
            Some(l) => Err(self.error(format!("expected '{}', found '{}'", token, l))),
            None => Err(self.error(format!("expected '{}', found end of table", token))),
        }
    }

    fn name(&mut self, token: &str) -> Result<String, TableParseError> {
        let mut value = self.required(token)?;
        if value.len() > NAME_LENGTH {
            let mut end = NAME_LENGTH;
            while !value.is_char_boundary(end) {
                end -= 1;
            }
            value = &value[..end];
        }
        Ok(value.to_string())
    }

    fn boolean(&mut self, token: &str) -> Result<bool, TableParseError> {
        let value = self.required(token)?;
        match value.to_ascii_uppercase().as_str() {
            "YES" | "TRUE" | "1" => Ok(true),
            "NO" | "FALSE" | "0" => Ok(false),
            _ => Err(TableParseError::new(self.lines[self.pos - 1].0, format!("'{}' is not a boolean", value))),
        }
    }

    fn float(&mut self, token: &str) -> Result<f32, TableParseError> {
        let value = self.required(token)?;
        value
            .parse::<f32>()
            .map_err(|_| TableParseError::new(self.lines[self.pos - 1].0, format!("'{}' is not a number", value)))
    }

    fn int(&mut self, token: &str) -> Result<i32, TableParseError> {
        let value = self.required(token)?;
        value
            .parse::<i32>()
            .map_err(|_| TableParseError::new(self.lines[self.pos - 1].0, format!("'{}' is not an integer", value)))
    }

    /// True at `$Name:`; false at one of `ends`; error otherwise.
    fn more_records(&self, ends: &[&str]) -> Result<bool, TableParseError> {
        if self.at("$Name:") {
            return Ok(true);
        }
        if ends.iter().any(|e| self.at(e)) {
            return Ok(false);
        }
        match self.peek() {
            Some(l) => Err(self.error(format!("expected '$Name:' or one of {:?}, found '{}'", ends, l))),
            None => Err(self.error("unexpected end of table, expected '#End'")),
        }
    }
}

/// Parse a whole table. Nothing is kept from a table that fails.
pub fn parse(text: &str) -> Result<EffectTable, TableParseError> {
    let mut p = Parser::new(text);
    let mut table = EffectTable::default();

    if p.optional("#Effects") {
        while p.more_records(&["#Ship Effects", "#Light Shafts", "#End"])? {
            let name = p.name("$Name:")?;
            let uniform_name = p.name("$Uniform:")?;
            let define_name = p.name("$Define:")?;
            let always_on = p.boolean("$AlwaysOn:")?;
            let default_intensity = p.float("$Default:")?;
            let div = p.float("$Div:")?;
            let add = p.float("$Add:")?;
            if div == 0.0 {
                return Err(TableParseError::new(p.lines[p.pos - 1].0, format!("effect '{}' has a zero divisor", name)));
            }
            table.effects.push(PostEffect::new(name, uniform_name, define_name, always_on, default_intensity, div, add));
        }
    }

    if p.optional("#Ship Effects") {
        while p.more_records(&["#Light Shafts", "#End"])? {
            let name = p.name("$Name:")?;
            let shader_effect = p.int("$Shader Effect:")?;
            let disables_rendering = p.boolean("$Disables Rendering:")?;
            let invert_timer = p.boolean("$Invert timer:")?;
            table.ship_effects.push(ShipEffect { name, shader_effect, disables_rendering, invert_timer });
        }
    }

    if p.optional("#Light Shafts") {
        let on = p.boolean("$AlwaysOn:")?;
        let density = p.float("$Density:")?;
        let falloff = p.float("$Falloff:")?;
        let weight = p.float("$Weight:")?;
        let intensity = p.float("$Intensity:")?;
        let samples = p.int("$Sample Number:")?;
        if samples < 1 {
            return Err(TableParseError::new(p.lines[p.pos - 1].0, "light shaft sample number must be positive"));
        }
        table.light_shafts = Some(LightShaftParams {
            on,
            density,
            falloff,
            weight,
            intensity,
            sample_count: samples as u32,
        });
    }

    p.required("#End")?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = "\
; test table
#Effects
$Name: saturation          ; grey it out
$Uniform: saturation
$Define: FLAG_SATURATION
$AlwaysOn: no
$Default: 1.0
$Div: 100
$Add: 0
$Name: noise
$Uniform: noise_amount
$Define: FLAG_DISTORT_NOISE
$AlwaysOn: YES
$Default: 0
$Div: 20000
$Add: 0
#Ship Effects
// loadout
$Name: FS2 Ship select
$Shader Effect: 1
$Disables Rendering: false
$Invert timer: TRUE
#Light Shafts
$AlwaysOn: 1
$Density: 0.6
$Falloff: 0.98
$Weight: 0.03
$Intensity: 0.25
$Sample Number: 40
#End
";

    #[test]
    fn test_parse_full_table() {
        let table = parse(FULL).unwrap();
        assert_eq!(table.effects.len(), 2);
        assert_eq!(table.effects[0].name, "saturation");
        assert!(!table.effects[0].always_on);
        assert!(table.effects[1].always_on);
        assert_eq!(table.effects[1].div, 20000.0);

        assert_eq!(table.ship_effects.len(), 1);
        assert_eq!(table.ship_effects[0].shader_effect, 1);
        assert!(table.ship_effects[0].invert_timer);

        let ls = table.light_shafts.unwrap();
        assert!(ls.on);
        assert_eq!(ls.sample_count, 40);
        assert_eq!(ls.falloff, 0.98);
    }

    #[test]
    fn test_sections_are_optional() {
        let table = parse("#End\n").unwrap();
        assert!(table.effects.is_empty());
        assert!(table.light_shafts.is_none());

        let table = parse("#Light Shafts\n$AlwaysOn: no\n$Density: 0.5\n$Falloff: 1\n$Weight: 0.02\n$Intensity: 0.5\n$Sample Number: 50\n#End").unwrap();
        assert!(table.light_shafts.is_some());
    }

    #[test]
    fn test_missing_end() {
        let err = parse("#Effects\n").unwrap_err();
        assert!(err.message.contains("#End"));
    }

    #[test]
    fn test_bad_values_report_line() {
        let text = "#Effects\n$Name: a\n$Uniform: a\n$Define: A\n$AlwaysOn: maybe\n";
        let err = parse(text).unwrap_err();
        assert_eq!(err.line, 5);
        assert!(err.message.contains("maybe"));

        let text = "#Ship Effects\n$Name: x\n$Shader Effect: two\n";
        assert_eq!(parse(text).unwrap_err().line, 3);
    }

    #[test]
    fn test_out_of_order_field() {
        let text = "#Effects\n$Name: a\n$Define: A\n";
        let err = parse(text).unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.contains("$Uniform:"));
    }

    #[test]
    fn test_long_name_truncated() {
        let long = "x".repeat(40);
        let text = format!("#Ship Effects\n$Name: {}\n$Shader Effect: 2\n$Disables Rendering: no\n$Invert timer: no\n#End", long);
        let table = parse(&text).unwrap();
        assert_eq!(table.ship_effects[0].name.len(), NAME_LENGTH);
    }

    #[test]
    fn test_comment_stripping() {
        assert_eq!(strip_comment("$Div: 100 ; note"), "$Div: 100 ");
        assert_eq!(strip_comment("$Div: 100 // note ; more"), "$Div: 100 ");
        assert_eq!(strip_comment("plain"), "plain");
    }
}
