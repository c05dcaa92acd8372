//! Utilities to scan method/field descriptors

use crate::error::{Error, Result};

/// Split a method descriptor like `(I[Ljava/lang/String;D)V` into the list
/// of argument type descriptors and the return type descriptor.
pub fn parse_method_descriptor(descriptor: &str) -> Result<(Vec<String>, String)> {
    let inner = descriptor
        .strip_prefix('(')
        .and_then(|rest| rest.split_once(')'))
        .ok_or_else(|| Error::format_error(format!("invalid method descriptor: {}", descriptor)))?;
    let (args_str, return_str) = inner;

    let mut args = Vec::new();
    let mut rest = args_str;
    while !rest.is_empty() {
        let len = type_descriptor_length(rest)?;
        args.push(rest[..len].to_string());
        rest = &rest[len..];
    }
    if return_str.is_empty() {
        return Err(Error::format_error(format!(
            "missing return type in descriptor: {}",
            descriptor
        )));
    }
    Ok((args, return_str.to_string()))
}

/// Length in characters of the first type descriptor in `s`
fn type_descriptor_length(s: &str) -> Result<usize> {
    let mut chars = s.char_indices();
    let mut depth = 0usize;
    loop {
        let (idx, c) = chars
            .next()
            .ok_or_else(|| Error::format_error(format!("truncated type descriptor: {}", s)))?;
        match c {
            '[' => depth += 1,
            'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' => return Ok(idx + 1),
            'L' => {
                let end = s[idx..]
                    .find(';')
                    .ok_or_else(|| Error::format_error(format!("unterminated class type: {}", s)))?;
                return Ok(idx + end + 1);
            }
            _ => {
                return Err(Error::format_error(format!(
                    "unexpected character '{}' in type descriptor: {}",
                    c, s
                )))
            }
        }
        // arbitrary but finite array depth
        if depth > 255 {
            return Err(Error::format_error("array type too deep"));
        }
    }
}

/// Number of local-variable slots a value of the given type occupies
pub fn slot_width(type_descriptor: &str) -> usize {
    match type_descriptor {
        "J" | "D" => 2,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_argument_descriptors() {
        let (args, ret) = parse_method_descriptor("(I[Ljava/lang/String;D)V").expect("descriptor");
        assert_eq!(args, vec!["I", "[Ljava/lang/String;", "D"]);
        assert_eq!(ret, "V");
    }

    #[test]
    fn no_arguments() {
        let (args, ret) = parse_method_descriptor("()Ljava/lang/Object;").expect("descriptor");
        assert!(args.is_empty());
        assert_eq!(ret, "Ljava/lang/Object;");
    }

    #[test]
    fn rejects_malformed_descriptors() {
        assert!(parse_method_descriptor("I)V").is_err());
        assert!(parse_method_descriptor("(Q)V").is_err());
        assert!(parse_method_descriptor("(I)").is_err());
    }

    #[test]
    fn slot_widths() {
        assert_eq!(slot_width("J"), 2);
        assert_eq!(slot_width("D"), 2);
        assert_eq!(slot_width("I"), 1);
        assert_eq!(slot_width("[J"), 1);
    }
}
