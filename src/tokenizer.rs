//! Quote-aware command argument tokenizer
//!
//! Splits the remainder of a slash command into arguments while letting
//! multi-word device names survive, e.g.
//! `/turnon "Living Room" light2` -> `["Living Room", "light2"]`.

/// Tokenize a raw command string after stripping `prefix`.
///
/// Returns an empty list when `raw` does not start with `prefix`. Single and
/// double quotes group words; a quote character seen inside the *other* quote
/// type is a literal. Quotes do not nest and there is no escape character.
///
/// An unterminated quote still flushes the accumulated partial token; this
/// mirrors observed upstream behavior and is asserted in the tests below.
pub fn tokenize(raw: &str, prefix: &str) -> Vec<String> {
    let Some(args) = raw.strip_prefix(prefix) else {
        return Vec::new();
    };
    let args = args.trim();
    if args.is_empty() {
        return Vec::new();
    }

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quote_char = ' ';

    for ch in args.chars() {
        match ch {
            '"' | '\'' => {
                if !in_quotes {
                    in_quotes = true;
                    quote_char = ch;
                } else if ch == quote_char {
                    in_quotes = false;
                    flush(&mut tokens, &mut current);
                } else {
                    current.push(ch);
                }
            }
            ' ' if !in_quotes => {
                flush(&mut tokens, &mut current);
            }
            _ => current.push(ch),
        }
    }

    flush(&mut tokens, &mut current);
    tokens
}

fn flush(tokens: &mut Vec<String>, current: &mut String) {
    let token = current.trim();
    if !token.is_empty() {
        tokens.push(token.to_string());
    }
    current.clear();
}

/// Join tokens back into a command-argument string, quoting tokens that
/// contain spaces. Used when echoing interpreted arguments back to the user.
pub fn join_quoted(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|t| {
            if t.contains(' ') {
                format!("\"{t}\"")
            } else {
                t.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(raw: &str, prefix: &str) -> Vec<String> {
        tokenize(raw, prefix)
    }

    #[test]
    fn test_plain_split() {
        assert_eq!(
            toks("/turnon light1 light2", "/turnon "),
            vec!["light1", "light2"]
        );
    }

    #[test]
    fn test_double_quoted_name() {
        assert_eq!(
            toks("/turnon \"Living Room\" light2", "/turnon "),
            vec!["Living Room", "light2"]
        );
    }

    #[test]
    fn test_single_quoted_name() {
        assert_eq!(toks("/turnon 'Apple TV'", "/turnon "), vec!["Apple TV"]);
    }

    #[test]
    fn test_prefix_must_match_exactly() {
        // "/turnon" without the trailing space does not match "/turnon "
        assert_eq!(toks("/turnon", "/turnon "), Vec::<String>::new());
    }

    #[test]
    fn test_empty_args() {
        assert_eq!(toks("/turnon    ", "/turnon "), Vec::<String>::new());
    }

    #[test]
    fn test_consecutive_spaces_no_empty_tokens() {
        assert_eq!(toks("/turnon a   b", "/turnon "), vec!["a", "b"]);
    }

    #[test]
    fn test_mismatched_quote_is_literal() {
        // A single quote inside double quotes passes through as text
        assert_eq!(
            toks("/turnon \"it's here\"", "/turnon "),
            vec!["it's here"]
        );
    }

    #[test]
    fn test_unterminated_quote_flushes_partial_token() {
        // Observed upstream behavior, not necessarily desired: the partial
        // token accumulated inside an unterminated quote is kept.
        assert_eq!(
            toks("/turnon \"Living Room", "/turnon "),
            vec!["Living Room"]
        );
    }

    #[test]
    fn test_empty_quoted_token_dropped() {
        assert_eq!(toks("/turnon \"\" light", "/turnon "), vec!["light"]);
    }

    #[test]
    fn test_empty_prefix_tokenizes_whole_string() {
        assert_eq!(toks("a \"b c\"", ""), vec!["a", "b c"]);
    }

    #[test]
    fn test_round_trip_without_spaces() {
        // Re-tokenizing the joined output reproduces the list when no token
        // contains a space
        let tokens = vec!["light1".to_string(), "light2".to_string()];
        let joined = join_quoted(&tokens);
        assert_eq!(toks(&joined, ""), tokens);
    }

    #[test]
    fn test_round_trip_requotes_spaced_tokens() {
        let tokens = vec!["Living Room".to_string(), "light2".to_string()];
        let joined = join_quoted(&tokens);
        assert_eq!(joined, "\"Living Room\" light2");
        assert_eq!(toks(&joined, ""), tokens);
    }
}
