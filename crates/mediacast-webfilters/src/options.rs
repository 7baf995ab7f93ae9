//! Tokenizer for transcoder option strings.

/// Split an option string into arguments the way a shell would.
///
/// Whitespace separates arguments. Single quotes group text literally;
/// double quotes group it but still honor backslash escapes. Outside
/// single quotes a backslash makes the next character literal. An
/// unterminated quote runs to the end of the input.
pub fn parse_options(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_arg = true;
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    current.push(q);
                }
            }
            '"' => {
                in_arg = true;
                while let Some(q) = chars.next() {
                    match q {
                        '"' => break,
                        '\\' => {
                            if let Some(esc) = chars.next() {
                                current.push(esc);
                            }
                        }
                        _ => current.push(q),
                    }
                }
            }
            '\\' => {
                in_arg = true;
                if let Some(esc) = chars.next() {
                    current.push(esc);
                }
            }
            c if c.is_whitespace() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            _ => {
                in_arg = true;
                current.push(c);
            }
        }
    }

    if in_arg {
        args.push(current);
    }
    args
}
