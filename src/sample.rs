use std::fmt;

/// One training/scoring example: a binary label and a sparse feature
/// vector. Indices are not deduplicated or sorted — duplicates are summed
/// implicitly by the kernels' accumulation, matching the original format.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    pub y: u32,
    pub x: Vec<(u32, f32)>,
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.y)?;
        for (idx, val) in &self.x {
            write!(f, " {}:{}", idx, val)?;
        }
        Ok(())
    }
}

/// Parses libsvm-style lines (`y idx:val idx:val ...`) into `Sample`s using
/// a byte-level scanner and `lexical-core` for the decimal-to-float
/// conversion, avoiding any per-field heap allocation. Malformed input is
/// undiagnosed — the scanner trusts the input is well-formed, matching the
/// original parser's lack of validation.
pub struct SampleParser;

impl SampleParser {
    pub fn parse(line: &[u8]) -> Sample {
        let mut fields = line.split(|&b| b == b' ').filter(|f| !f.is_empty());

        let y = fields
            .next()
            .map(parse_u32)
            .unwrap_or(0);

        let mut x = Vec::new();
        for field in fields {
            if let Some(colon) = field.iter().position(|&b| b == b':') {
                let idx = parse_u32(&field[..colon]);
                let val = parse_f32(&field[colon + 1..]);
                x.push((idx, val));
            }
        }

        Sample { y, x }
    }
}

fn parse_u32(bytes: &[u8]) -> u32 {
    lexical_core::parse(bytes).unwrap_or(0)
}

fn parse_f32(bytes: &[u8]) -> f32 {
    lexical_core::parse(bytes).unwrap_or(0.0)
}
