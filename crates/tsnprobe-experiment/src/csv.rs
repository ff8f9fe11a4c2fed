//! Minimal CSV reading and writing.
//!
//! Covers what the data-plane tools, perf scripts and experiment profiles
//! produce: comma separators, optional double-quoted fields with `""`
//! escapes, `\n` or `\r\n` line endings. Quoted fields may not span lines.

use std::fmt::Write as _;

/// Split CSV text into records. Blank lines are skipped.
pub fn parse(text: &str) -> Result<Vec<Vec<String>>, String> {
    let mut records = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            continue;
        }
        let record = parse_line(line).map_err(|reason| format!("line {}: {reason}", idx + 1))?;
        records.push(record);
    }
    Ok(records)
}

fn parse_line(line: &str) -> Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.chars().peekable();
    let mut quoted = false;
    let mut at_field_start = true;

    while let Some(c) = chars.next() {
        if quoted {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => quoted = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            ',' => {
                fields.push(std::mem::take(&mut field));
                at_field_start = true;
                continue;
            }
            '"' if at_field_start => quoted = true,
            _ => field.push(c),
        }
        at_field_start = false;
    }

    if quoted {
        return Err("unterminated quoted field".to_string());
    }
    fields.push(field);
    Ok(fields)
}

/// Append one record, quoting fields that need it.
pub fn write_record<S: AsRef<str>>(out: &mut String, fields: &[S]) {
    for (idx, field) in fields.iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        let field = field.as_ref();
        if field.contains([',', '"', '\n', '\r']) {
            let _ = write!(out, "\"{}\"", field.replace('"', "\"\""));
        } else {
            out.push_str(field);
        }
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_records() {
        let rows = parse("a,b,c\n1,2,3\n").unwrap();
        assert_eq!(rows, vec![vec!["a", "b", "c"], vec!["1", "2", "3"]]);
    }

    #[test]
    fn crlf_and_blank_lines() {
        let rows = parse("x,y\r\n\r\n1,2\r\n").unwrap();
        assert_eq!(rows, vec![vec!["x", "y"], vec!["1", "2"]]);
    }

    #[test]
    fn quoted_fields() {
        let rows = parse(r#"name,"with, comma","say ""hi""",,"#).unwrap();
        assert_eq!(rows[0], vec!["name", "with, comma", r#"say "hi""#, "", ""]);
    }

    #[test]
    fn unterminated_quote_is_error() {
        let err = parse("ok\n\"broken,1\n").unwrap_err();
        assert!(err.starts_with("line 2"), "{err}");
    }

    #[test]
    fn writer_quotes_only_when_needed() {
        let mut out = String::new();
        write_record(&mut out, &["1", "a,b", "q\""]);
        assert_eq!(out, "1,\"a,b\",\"q\"\"\"\n");
        assert_eq!(parse(&out).unwrap()[0], vec!["1", "a,b", "q\""]);
    }
}
