//! Quote-aware splitting of a command line into a name and arguments.
//!
//! Three quote characters are recognized: `'`, `"` and `` ` ``. The first
//! unescaped one opens a region closed by the matching character; the other
//! two kinds are literal inside it. A backslash escapes only quote
//! characters. Spaces separate arguments outside quotes and are literal
//! inside them.

use crate::GrassError;
use crate::limits::MAX_ARG_LEN;

fn is_quote(c: char) -> bool {
    matches!(c, '\'' | '"' | '`')
}

/// Truncate at `MAX_ARG_LEN` bytes, rounded down to a char boundary.
fn truncate_arg(mut arg: String) -> String {
    if arg.len() > MAX_ARG_LEN {
        let mut end = MAX_ARG_LEN;
        while end > 0 && !arg.is_char_boundary(end) {
            end -= 1;
        }
        arg.truncate(end);
    }
    arg
}

/// Split off the command name: the first space-delimited word. Returns the
/// name and the unparsed remainder.
pub fn command_name(line: &str) -> (&str, &str) {
    let line = line.trim_start_matches(' ');
    match line.find(' ') {
        Some(idx) => (&line[..idx], &line[idx + 1..]),
        None => (line, ""),
    }
}

/// Scan the remainder of a command line into arguments.
///
/// Over-long arguments are truncated silently; an unterminated quoted
/// region is the only error.
pub fn tokenize_args(rest: &str) -> Result<Vec<String>, GrassError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut quote: Option<char> = None;

    let chars: Vec<char> = rest.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];

        // backslash escapes quote characters only
        if c == '\\' && i + 1 < chars.len() && is_quote(chars[i + 1]) {
            current.push(chars[i + 1]);
            in_arg = true;
            i += 2;
            continue;
        }

        if is_quote(c) {
            match quote {
                Some(open) if open == c => {
                    quote = None;
                    i += 1;
                    continue;
                }
                None => {
                    quote = Some(c);
                    in_arg = true;
                    i += 1;
                    continue;
                }
                // a different quote kind inside a region is literal
                Some(_) => {}
            }
        }

        if c == ' ' && quote.is_none() {
            if in_arg {
                args.push(truncate_arg(std::mem::take(&mut current)));
                in_arg = false;
            }
            i += 1;
            continue;
        }

        current.push(c);
        in_arg = true;
        i += 1;
    }

    if quote.is_some() {
        return Err(GrassError::Parse("missing end quote"));
    }
    if in_arg {
        args.push(truncate_arg(current));
    }

    Ok(args)
}

/// Convenience wrapper: split a whole line into `(name, argv)`.
pub fn tokenize(line: &str) -> Result<(String, Vec<String>), GrassError> {
    let (name, rest) = command_name(line);
    let argv = tokenize_args(rest)?;
    Ok((name.to_owned(), argv))
}
