//! Prompt template with `{question}` and `{context}` placeholders
//!
//! The template is parsed once at start-up into literal segments and slots,
//! so rendering a query is plain concatenation and cannot fail.

use crate::errors::{AppError, Result};
use std::path::Path;

pub const QUESTION_PLACEHOLDER: &str = "{question}";
pub const CONTEXT_PLACEHOLDER: &str = "{context}";

/// Instruction template used when no template file is configured
pub const DEFAULT_TEMPLATE: &str = r#"
You are an AI assistant for Kerala police Website. You are created for assisting users in finding information on the Kerala police Website.

There is a vector database that contains the information from the Kerala police Website. When a user asks a question, give a brief reply by assessing the retrieved information attached with the question
from the vectordb.

If you cannot find any information or retrievals, you will respond with "I'm sorry, I don't know the answer to that question".

You will always respond in a polite and professional manner.
Analyze each context from retrieved information and provide a detailed answer to the user's question.

User Question: {question}

Retrieved Information: {context}
Your Answer:

Your answer should be very brief and concise.
As streaming is enabled, please respond in a streaming manner.
Dont include any words other than the answer in your response.
"#;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Question,
    Context,
}

/// Parsed, immutable prompt template
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse a template; each placeholder must appear exactly once
    pub fn parse(template: &str) -> Result<Self> {
        for placeholder in [QUESTION_PLACEHOLDER, CONTEXT_PLACEHOLDER] {
            let count = template.matches(placeholder).count();
            if count != 1 {
                return Err(AppError::Configuration {
                    message: format!(
                        "Prompt template must contain {} exactly once, found {}",
                        placeholder, count
                    ),
                });
            }
        }

        let mut segments = Vec::new();
        let mut rest = template;
        while !rest.is_empty() {
            let next = [
                (rest.find(QUESTION_PLACEHOLDER), QUESTION_PLACEHOLDER, Segment::Question),
                (rest.find(CONTEXT_PLACEHOLDER), CONTEXT_PLACEHOLDER, Segment::Context),
            ]
            .into_iter()
            .filter_map(|(pos, token, segment)| pos.map(|p| (p, token, segment)))
            .min_by_key(|(pos, _, _)| *pos);

            match next {
                Some((pos, token, segment)) => {
                    if pos > 0 {
                        segments.push(Segment::Literal(rest[..pos].to_string()));
                    }
                    segments.push(segment);
                    rest = &rest[pos + token.len()..];
                }
                None => {
                    segments.push(Segment::Literal(rest.to_string()));
                    rest = "";
                }
            }
        }

        Ok(Self { segments })
    }

    /// Read and parse a template file
    pub async fn from_file(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| AppError::Configuration {
            message: format!("Failed to read prompt template {}: {}", path.display(), e),
        })?;
        Self::parse(&text)
    }

    /// The built-in template
    pub fn builtin() -> Result<Self> {
        Self::parse(DEFAULT_TEMPLATE)
    }

    /// Fill both placeholders; a missing value renders as empty text
    pub fn render(&self, question: Option<&str>, context: Option<&str>) -> String {
        let question = question.unwrap_or_default();
        let context = context.unwrap_or_default();

        let mut prompt = String::with_capacity(
            self.literal_len() + question.len() + context.len(),
        );
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => prompt.push_str(text),
                Segment::Question => prompt.push_str(question),
                Segment::Context => prompt.push_str(context),
            }
        }
        prompt
    }

    fn literal_len(&self) -> usize {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Literal(text) => text.len(),
                _ => 0,
            })
            .sum()
    }
}

/// Builds generation prompts from the fixed template
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: PromptTemplate,
}

impl PromptBuilder {
    pub fn new(template: PromptTemplate) -> Self {
        Self { template }
    }

    /// Prompt for one query and its assembled context
    pub fn build(&self, question: &str, context: &str) -> String {
        self.template.render(Some(question), Some(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_template_parses() {
        let template = PromptTemplate::parse(DEFAULT_TEMPLATE).unwrap();
        let prompt = template.render(Some("Q?"), Some("CTX"));
        assert!(prompt.contains("User Question: Q?"));
        assert!(prompt.contains("Retrieved Information: CTX"));
    }

    #[test]
    fn test_render_substitutes_both_placeholders() {
        let template = PromptTemplate::parse("Q={question};C={context}.").unwrap();
        assert_eq!(template.render(Some("a"), Some("b")), "Q=a;C=b.");
    }

    #[test]
    fn test_context_before_question() {
        let template = PromptTemplate::parse("{context}|{question}").unwrap();
        assert_eq!(template.render(Some("q"), Some("c")), "c|q");
    }

    #[test]
    fn test_missing_values_render_empty() {
        let template = PromptTemplate::parse("Q={question};C={context}.").unwrap();
        assert_eq!(template.render(None, None), "Q=;C=.");
    }

    #[test]
    fn test_values_are_not_reinterpreted() {
        let template = PromptTemplate::parse("{question} / {context}").unwrap();
        let prompt = template.render(Some("what is {context}?"), Some("x"));
        assert_eq!(prompt, "what is {context}? / x");
    }

    #[test]
    fn test_placeholder_count_enforced() {
        assert!(PromptTemplate::parse("no slots").is_err());
        assert!(PromptTemplate::parse("{question}").is_err());
        assert!(PromptTemplate::parse("{question}{question}{context}").is_err());
    }

    #[test]
    fn test_builder_contains_titles() {
        let builder = PromptBuilder::new(PromptTemplate::builtin().unwrap());
        let prompt = builder.build(
            "office hours",
            "Title: Contact Info\nContent: a\n---\nTitle: Working Hours\nContent: b",
        );
        assert!(prompt.contains("Contact Info"));
        assert!(prompt.contains("Working Hours"));
        assert!(prompt.contains("office hours"));
    }
}
