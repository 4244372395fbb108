//! Response rendering for the console.
//!
//! An `RSP` envelope carries an `original`/`response` pair, each a scalar or
//! a sequence. The pairing rules:
//!
//! - scalar/scalar: one labelled section with one line
//! - scalar/list: one label grouping every response line
//! - list/scalar: the scalar rendered once per label
//! - list/list: element-wise pairing; extras beyond the shorter side dropped

use crate::bus::envelope::FieldValue;

/// One labelled block: the label, a ruler, the lines, a trailing blank line.
pub fn section<I, S>(label: &str, lines: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    out.push_str(label);
    out.push('\n');
    out.extend(std::iter::repeat_n('=', label.chars().count()));
    out.push('\n');
    for line in lines {
        out.push_str(line.as_ref());
        out.push('\n');
    }
    out.push('\n');
    out
}

pub fn render_response(original: &FieldValue, response: &FieldValue) -> String {
    match (original, response) {
        (FieldValue::Text(label), FieldValue::Text(line)) => section(label, [line]),
        (FieldValue::Text(label), FieldValue::List(lines)) => section(label, lines),
        (FieldValue::List(labels), FieldValue::Text(line)) => labels
            .iter()
            .map(|label| section(label, [line]))
            .collect(),
        (FieldValue::List(labels), FieldValue::List(lines)) => labels
            .iter()
            .zip(lines)
            .map(|(label, line)| section(label, [line]))
            .collect(),
    }
}

/// Notice shown when a command is forwarded with no bound context.
pub fn no_context_notice() -> &'static str {
    "\nNo context set! Use `contexts` to list stored contexts and `context <name>` to bind one.\n"
}
