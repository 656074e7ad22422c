use proc_macro::{Delimiter, TokenStream, TokenTree};

/// Splits a `TokenStream` into comma-separated arguments.
///
/// Each argument is returned as a `Vec<TokenTree>`.
/// Commas at the top level are used as separators.
pub(crate) fn split_args(input: TokenStream) -> Vec<Vec<TokenTree>> {
    let mut args = Vec::new();
    let mut current = Vec::new();

    for token in input {
        match &token {
            TokenTree::Punct(p) if p.as_char() == ',' => {
                if !current.is_empty() {
                    args.push(current);
                    current = Vec::new();
                }
            }
            _ => current.push(token),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

/// Converts a slice of tokens into a Rust source string.
///
/// Consecutive identifiers are separated by a space so they do not merge
/// (e.g. `foo bar` vs `foobar`).
pub(crate) fn tokens_to_string(tokens: &[TokenTree]) -> String {
    let mut out = String::new();
    let mut prev_was_ident = false;

    for t in tokens {
        let s = t.to_string();

        let needs_space = prev_was_ident && matches!(t, TokenTree::Ident(_));

        if needs_space {
            out.push(' ');
        }

        out.push_str(&s);
        prev_was_ident = matches!(t, TokenTree::Ident(_));
    }

    out
}

/// Turns `key = value, ...` attribute options into builder calls.
///
/// Returns the chained calls (e.g. `.poll_batch_limit(64)`) or a message
/// describing the first invalid option.
pub(crate) fn builder_calls(attr: TokenStream) -> Result<String, String> {
    let mut calls = String::new();

    for option in split_args(attr) {
        let text = tokens_to_string(&option);

        let Some((key, value)) = text.split_once('=') else {
            return Err(format!("expected `key = value`, found `{text}`"));
        };

        let key = key.trim();
        let value = value.trim();

        if value.parse::<u64>().is_err() {
            return Err(format!("`{key}` expects an integer, found `{value}`"));
        }

        match key {
            "poll_batch_limit" | "microtask_budget" => {
                calls.push_str(&format!(".{key}({value})"));
            }
            "min_interval_ms" => {
                calls.push_str(&format!(
                    ".min_interval(::std::time::Duration::from_millis({value}))"
                ));
            }
            other => return Err(format!("unknown option `{other}`")),
        }
    }

    Ok(calls)
}

/// Removes the function's parameter list and returns the name of its only
/// parameter, if it has one.
///
/// The parameter receives the loop's `Handle`.
pub(crate) fn take_handle_param(tokens: &mut [TokenTree]) -> Result<Option<String>, String> {
    let Some(fn_pos) = tokens
        .iter()
        .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "fn"))
    else {
        return Err("expected a function".to_string());
    };

    let Some(offset) = tokens[fn_pos..].iter().position(
        |t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Parenthesis),
    ) else {
        return Err("expected a parameter list".to_string());
    };
    let pos = fn_pos + offset;

    let params = match &tokens[pos] {
        TokenTree::Group(g) => split_args(g.stream()),
        _ => return Ok(None),
    };

    let name = match params.as_slice() {
        [] => None,
        [param] => {
            let colon = param
                .iter()
                .position(|t| matches!(t, TokenTree::Punct(p) if p.as_char() == ':'));

            match colon {
                Some(colon) if colon > 0 => Some(tokens_to_string(&param[..colon])),
                _ => return Err("expected `name: Handle`".to_string()),
            }
        }
        _ => return Err("only a single `Handle` parameter is supported".to_string()),
    };

    tokens[pos] = TokenTree::Group(proc_macro::Group::new(
        Delimiter::Parenthesis,
        TokenStream::new(),
    ));

    Ok(name)
}

/// Emits a `compile_error!` carrying `message`.
pub(crate) fn compile_error(message: &str) -> TokenStream {
    format!("compile_error!({message:?});")
        .parse()
        .unwrap_or_default()
}
