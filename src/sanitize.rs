//! Cleanup of generated text before it is sent to the chat surface.
//!
//! The model sometimes emits code fences with single quotes instead of
//! backticks (`'''` for ```` ``` ````, or a stray `'` inside an open fence),
//! which renders as plain text in the client. This pass repairs both.

/// Repair malformed code-fence markup in generated text.
///
/// Triple single-quotes become triple backticks everywhere; single quotes are
/// swapped for backticks only inside backtick-delimited spans, so apostrophes
/// in normal prose are left alone. Idempotent.
pub fn fix_code_block(text: &str) -> String {
    let text = text.replace("'''", "```");

    let mut segments: Vec<String> = text.split('`').map(str::to_owned).collect();
    for (i, segment) in segments.iter_mut().enumerate() {
        // Odd segments sit between a pair of backticks.
        if i % 2 == 1 {
            *segment = segment.replace('\'', "`");
        }
    }

    segments.join("`")
}
