use proc_macro::TokenStream;

mod progress;

/// Attaches an indicatif progress spinner to an instrumented function's span.
///
/// Arguments:
/// - `message = <expr>`: spinner text while the span is open.
/// - `finished = <expr>`: text left behind when the span closes.
/// - `failed = <expr>` (optional, `async fn` returning `Result` only): replaces the
///   finished text when the function returns `Err`.
///
/// The function's `#[instrument]` attribute gains a `progress = true` field so the
/// indicatif layer picks the span up; one is added when missing.
#[proc_macro_attribute]
pub fn progress(attr: TokenStream, item: TokenStream) -> TokenStream {
    progress::expand(attr, item)
}
