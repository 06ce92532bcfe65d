//! Base64 VLQ as used by the source map `mappings` field.

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn digit_value(b: u8) -> Option<i64> {
    match b {
        b'A'..=b'Z' => Some((b - b'A') as i64),
        b'a'..=b'z' => Some((b - b'a') as i64 + 26),
        b'0'..=b'9' => Some((b - b'0') as i64 + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        _ => None,
    }
}

pub fn encode(value: i64, out: &mut String) {
    let mut v: u64 = if value < 0 {
        ((-value as u64) << 1) | 1
    } else {
        (value as u64) << 1
    };
    loop {
        let mut digit = (v & 31) as usize;
        v >>= 5;
        if v > 0 {
            digit |= 32;
        }
        out.push(ALPHABET[digit] as char);
        if v == 0 {
            break;
        }
    }
}

/// Original position a generated column maps back to. All fields absolute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Original {
    pub source: u32,
    pub line: u32,
    pub column: u32,
    pub name: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub gen_column: u32,
    /// `None` for one-field segments that map to nothing.
    pub original: Option<Original>,
}

/// Decode a `mappings` string into absolute segments, one `Vec` per generated line.
pub fn decode_mappings(mappings: &str) -> Result<Vec<Vec<Segment>>, String> {
    let mut lines = vec![Vec::new()];
    let (mut source, mut line, mut column, mut name) = (0i64, 0i64, 0i64, 0i64);
    let mut gen_column = 0i64;
    let mut fields: Vec<i64> = Vec::with_capacity(5);
    let (mut value, mut shift) = (0i64, 0u32);

    let bytes = mappings.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b',' || b == b';' {
            if shift != 0 {
                return Err(format!("truncated value at offset {i}"));
            }
            push_segment(
                &mut lines,
                &mut fields,
                &mut gen_column,
                (&mut source, &mut line, &mut column, &mut name),
            )?;
            if b == b';' {
                lines.push(Vec::new());
                gen_column = 0;
            }
            continue;
        }

        let digit = digit_value(b).ok_or_else(|| format!("invalid character at offset {i}"))?;
        if shift > 60 {
            return Err(format!("value too large at offset {i}"));
        }
        value += (digit & 31) << shift;
        if digit & 32 != 0 {
            shift += 5;
        } else {
            let negative = value & 1 == 1;
            value >>= 1;
            fields.push(if negative { -value } else { value });
            value = 0;
            shift = 0;
        }
    }
    if shift != 0 {
        return Err("truncated value at end of mappings".to_string());
    }
    push_segment(
        &mut lines,
        &mut fields,
        &mut gen_column,
        (&mut source, &mut line, &mut column, &mut name),
    )?;
    Ok(lines)
}

fn push_segment(
    lines: &mut [Vec<Segment>],
    fields: &mut Vec<i64>,
    gen_column: &mut i64,
    state: (&mut i64, &mut i64, &mut i64, &mut i64),
) -> Result<(), String> {
    if fields.is_empty() {
        return Ok(());
    }
    let (source, line, column, name) = state;
    *gen_column += fields[0];

    let original = match fields.len() {
        1 => None,
        4 | 5 => {
            *source += fields[1];
            *line += fields[2];
            *column += fields[3];
            let named = if fields.len() == 5 {
                *name += fields[4];
                Some(non_negative(*name)?)
            } else {
                None
            };
            Some(Original {
                source: non_negative(*source)?,
                line: non_negative(*line)?,
                column: non_negative(*column)?,
                name: named,
            })
        }
        n => return Err(format!("segment with {n} fields")),
    };

    if let Some(current) = lines.last_mut() {
        current.push(Segment {
            gen_column: non_negative(*gen_column)?,
            original,
        });
    }
    fields.clear();
    Ok(())
}

fn non_negative(v: i64) -> Result<u32, String> {
    u32::try_from(v).map_err(|_| format!("position {v} out of range"))
}
