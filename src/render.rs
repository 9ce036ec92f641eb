// Chat-message rendering contract.
//
// The pipeline produces messages; how a frontend draws them is its own
// business. Error-style output is plain text, success-style output is a
// code block.

/// A user-facing message produced by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Error-style plain text.
    Plain(String),
    /// Success-style preformatted output.
    CodeBlock(String),
}

impl Message {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain(text.into())
    }

    pub fn code(text: impl Into<String>) -> Self {
        Self::CodeBlock(text.into())
    }

    /// The raw text regardless of style.
    pub fn text(&self) -> &str {
        match self {
            Self::Plain(text) | Self::CodeBlock(text) => text,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Plain(_))
    }
}

/// Renders messages for a particular frontend.
pub trait Render {
    fn render(&self, message: &Message) -> String;
}

/// Renderer for the terminal: code blocks become fenced text.
pub struct TerminalRenderer;

impl Render for TerminalRenderer {
    fn render(&self, message: &Message) -> String {
        match message {
            Message::Plain(text) => text.clone(),
            Message::CodeBlock(text) => format!("```\n{text}\n```"),
        }
    }
}
