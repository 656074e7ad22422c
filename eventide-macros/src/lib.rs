mod utils;

use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

/// What the generated code does when the loop fails.
enum OnFailure {
    Exit,
    Panic,
}

/// Rewrites `item` so that its body runs with an event loop, which is
/// driven to completion afterwards.
fn expand(attr: TokenStream, item: TokenStream, on_failure: OnFailure) -> TokenStream {
    let mut tokens: Vec<TokenTree> = item.into_iter().collect();

    let calls = match utils::builder_calls(attr) {
        Ok(calls) => calls,
        Err(message) => return utils::compile_error(&message),
    };

    let handle = match utils::take_handle_param(&mut tokens) {
        Ok(handle) => handle,
        Err(message) => return utils::compile_error(&message),
    };

    let Some(pos) = tokens
        .iter()
        .rposition(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace))
    else {
        return utils::compile_error("expected a function body");
    };

    let block = match &tokens[pos] {
        TokenTree::Group(g) => g.stream().to_string(),
        _ => return utils::compile_error("expected a function body"),
    };

    let binding = match handle {
        Some(name) => format!("let {name}: ::eventide::Handle = __event_loop.handle();"),
        None => String::new(),
    };

    let failure = match on_failure {
        OnFailure::Exit => {
            "::std::eprintln!(\"event loop failed: {}\", err);\n::std::process::exit(1);"
        }
        OnFailure::Panic => "::std::panic!(\"event loop failed: {}\", err);",
    };

    let new_block = format!(
        "{{
            let __event_loop = ::eventide::LoopBuilder::new(){calls}.build();
            {binding}
            #[allow(clippy::let_unit_value)]
            let __value = {{ {block} }};
            if let ::std::result::Result::Err(err) = __event_loop.run() {{
                {failure}
            }}
            __value
        }}"
    );

    let Ok(stream) = new_block.parse::<TokenStream>() else {
        return utils::compile_error("failed to expand the function body");
    };

    tokens[pos] = TokenTree::Group(Group::new(Delimiter::Brace, stream));
    tokens.into_iter().collect()
}

/// Runs `main` on a fresh event loop.
///
/// The body runs first, as the loop's "main script"; the loop is then
/// run until it has no more work. A failing loop prints the error and
/// exits with status 1.
///
/// The function may take one `Handle` parameter, and the attribute
/// accepts `poll_batch_limit`, `microtask_budget` and `min_interval_ms`.
///
/// ```rust,ignore
/// #[eventide::main(poll_batch_limit = 64)]
/// fn main(handle: eventide::Handle) {
///     handle.set_timeout(|| println!("tick"), 10).unwrap();
/// }
/// ```
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, OnFailure::Exit)
}

/// Like [`main`], for tests: a failing loop fails the test.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let expanded = expand(attr, item, OnFailure::Panic);

    let test_attr: TokenStream = "#[::core::prelude::v1::test]".parse().unwrap_or_default();
    let mut result: Vec<TokenTree> = test_attr.into_iter().collect();
    result.extend(expanded);

    result.into_iter().collect()
}
