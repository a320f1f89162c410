// Assemble reply text from decoded tokens: cut at the first EOS marker,
// join with spaces, then stitch subword pieces back together when the
// model emits them.
pub fn detokenize<S: AsRef<str>>(tokens: &[S], eos: &str, subword_delimiter: Option<&str>) -> String {
    let cut = tokens
        .iter()
        .position(|t| t.as_ref() == eos)
        .unwrap_or(tokens.len());
    let mut reply = tokens[..cut]
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ");
    if let Some(delim) = subword_delimiter {
        if !delim.is_empty() {
            reply = reply.replace(&format!("{delim} "), "");
        }
    }
    reply
}
