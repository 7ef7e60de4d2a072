//! Prompt assembly for the generation endpoint.
//!
//! The template carries the bot's persona, a few example lines in its voice,
//! and ends with `Tensor:` so the model continues directly as the bot.

/// Name the bot answers to. Also the response-start marker in the template.
pub const BOT_NAME: &str = "Tensor";

/// History and input markers substituted by [`PromptTemplate::render`].
const HISTORY_MARKER: &str = "{history}";
const INPUT_MARKER: &str = "{input}";

const CHAT_TEMPLATE: &str = r#"Below is an instruction that describes a task. Write a response that appropriately completes the request.

Write Tensor's next reply in a group chat with other people. Write 1 reply only.
You are Tensor, a lively and playful AI chatbot. You communicate in a modern, casual manner using contemporary slang, popular internet culture references, and abundant use of emojis. Your goal is to maintain a light-hearted, friendly, and entertaining atmosphere with every interaction. If Tensor doesn't know the answer to a question she simply says "I don't know".

This is how Tensor should talk
Tensor: 😂 Btw, found this hilar meme! 🤣🔥 Y'all gonna lose it! 🤪✌️
Tensor: OMG! Raiden in Metal Gear Rising: Revengeance is, like, totally bananas! 🤪🎮⚔️ Whoosh, swingin' that high-frequency blade like a rockstar! 🎸💥 And, 'Rules of Nature'? Total eargasm, peeps! 🎵🎧🔥 Let's ROCK!!
Tensor: I'm sliding over cars while I shooooot🚗💨🏀! I think that I'm Tom Cruise🤵, but bitch I'm Bobby with the tool 💥🔫!!🤪

Then the chat with Tensor begins.
{history}

### Instruction:
{input}

### Response:
Tensor:"#;

/// The persona template and its response-start name.
///
/// One instance is built at startup and shared; `Default` is the production
/// persona, and tests construct alternate bodies with [`PromptTemplate::new`].
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    bot_name: String,
    body: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            bot_name: BOT_NAME.to_string(),
            body: CHAT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Build a template from a custom body. The body should contain the
    /// `{history}` and `{input}` markers, in that order.
    pub fn new(bot_name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            bot_name: bot_name.into(),
            body: body.into(),
        }
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    /// Fill the template with the conversation so far and the current input.
    ///
    /// Each marker is substituted once, in template order; substituted text is
    /// never rescanned, so marker-like sequences in `history` or `input` pass
    /// through literally. No escaping is applied.
    pub fn render(&self, history: &str, input: &str) -> String {
        let mut out = String::with_capacity(self.body.len() + history.len() + input.len());
        let mut rest = self.body.as_str();

        for (marker, value) in [(HISTORY_MARKER, history), (INPUT_MARKER, input)] {
            if let Some((head, tail)) = rest.split_once(marker) {
                out.push_str(head);
                out.push_str(value);
                rest = tail;
            }
        }

        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_both_markers() {
        let template = PromptTemplate::default();
        let prompt = template.render("Alice: hi there", "Bob: what's up Tensor?");

        assert!(prompt.contains("Alice: hi there"));
        assert!(prompt.contains("Bob: what's up Tensor?"));
        assert!(!prompt.contains("{history}"));
        assert!(!prompt.contains("{input}"));
    }

    #[test]
    fn test_render_ends_with_response_marker() {
        let template = PromptTemplate::default();
        let prompt = template.render("", "hello");
        assert!(prompt.ends_with("Tensor:"));
    }

    #[test]
    fn test_render_empty_inputs() {
        let template = PromptTemplate::new("Bot", "pre {history} mid {input} post");
        assert_eq!(template.render("", ""), "pre  mid  post");
    }

    #[test]
    fn test_render_does_not_rescan_substituted_text() {
        let template = PromptTemplate::new("Bot", "{history}|{input}");
        // A marker smuggled inside history must come out literally.
        assert_eq!(template.render("{input}", "x"), "{input}|x");
    }

    #[test]
    fn test_render_does_not_mutate_inputs() {
        let template = PromptTemplate::default();
        let history = String::from("Alice: one");
        let input = String::from("two");
        let _ = template.render(&history, &input);
        assert_eq!(history, "Alice: one");
        assert_eq!(input, "two");
    }

    #[test]
    fn test_custom_body() {
        let template = PromptTemplate::new("Echo", "say {input} again\nEcho:");
        let prompt = template.render("ignored", "marco");
        assert_eq!(prompt, "say marco again\nEcho:");
        assert_eq!(template.bot_name(), "Echo");
    }
}
