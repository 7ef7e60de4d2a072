//! The reply pipeline: render the prompt, call the generator, hand back the
//! cleaned-up text.

use tracing::debug;

use crate::kobold::{Error, KoboldClient};
use crate::template::PromptTemplate;

/// One-call facade over template + generation client.
///
/// Holds no conversation state; the caller owns the history.
pub struct ChatEngine {
    template: PromptTemplate,
    client: KoboldClient,
}

impl ChatEngine {
    pub fn new(template: PromptTemplate, client: KoboldClient) -> Self {
        Self { template, client }
    }

    pub fn bot_name(&self) -> &str {
        self.template.bot_name()
    }

    /// Produce the bot's reply for the given history and input.
    ///
    /// The generated text comes back already stripped of stop sequences and
    /// fence-repaired; errors from the remote call propagate unchanged.
    pub async fn respond(
        &self,
        history: &str,
        input: &str,
        stop: Option<&[String]>,
    ) -> Result<String, Error> {
        let prompt = self.template.render(history, input);
        debug!("prompt is {} chars", prompt.len());
        self.client.generate(&prompt, stop).await
    }
}
