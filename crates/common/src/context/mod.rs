//! Grounding context and prompt construction
//!
//! Both steps are pure and deterministic: the same passages and question
//! always yield the same context and prompt.

mod assembler;
mod prompt;

pub use assembler::{
    AssembledContext, ContextAssembler, ContextAssemblerConfig, MISSING_TITLE, PASSAGE_SEPARATOR,
};
pub use prompt::{
    PromptBuilder, PromptTemplate, CONTEXT_PLACEHOLDER, DEFAULT_TEMPLATE, QUESTION_PLACEHOLDER,
};
