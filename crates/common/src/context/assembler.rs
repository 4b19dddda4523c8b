//! Context assembler - renders retrieved passages into one grounding block
//!
//! Blocks keep the index's rank order and are joined by a fixed separator.
//! An optional character cap drops whole trailing blocks rather than cutting
//! one mid-way, except when the top-ranked block alone is over the cap.

use crate::retrieval::RetrievedPassage;
use serde::Serialize;

/// Separator placed between rendered passages
pub const PASSAGE_SEPARATOR: &str = "\n---\n";

/// Title rendered for passages stored without one
pub const MISSING_TITLE: &str = "N/A";

/// Grounding text for one query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssembledContext {
    pub text: String,
    /// Passages that made it into `text`, counted from the top rank
    pub passages_used: usize,
    /// Whether the cap removed or cut anything
    pub truncated: bool,
}

/// Context assembler configuration
#[derive(Debug, Clone, Default)]
pub struct ContextAssemblerConfig {
    /// Character cap on the assembled text (None = unbounded)
    pub max_chars: Option<usize>,
}

impl ContextAssemblerConfig {
    /// Build from the `max_context_chars` setting, where 0 means unbounded
    pub fn from_max_chars(max_chars: usize) -> Self {
        Self {
            max_chars: (max_chars > 0).then_some(max_chars),
        }
    }
}

/// Pure passages-to-text renderer
#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    config: ContextAssemblerConfig,
}

impl ContextAssembler {
    /// Create a new context assembler
    pub fn new(config: ContextAssemblerConfig) -> Self {
        Self { config }
    }

    /// Render one passage as a `Title:`/`Content:` block
    pub fn render_passage(passage: &RetrievedPassage) -> String {
        let title = if passage.title.trim().is_empty() {
            MISSING_TITLE
        } else {
            passage.title.as_str()
        };
        format!("Title: {}\nContent: {}", title, passage.content)
    }

    /// Assemble passages in the order given
    pub fn assemble(&self, passages: &[RetrievedPassage]) -> AssembledContext {
        let mut text = String::new();
        let mut used_chars = 0usize;
        let mut passages_used = 0usize;
        let mut truncated = false;

        for passage in passages {
            let block = Self::render_passage(passage);
            let separator_chars = if passages_used == 0 { 0 } else { PASSAGE_SEPARATOR.chars().count() };
            let block_chars = block.chars().count();

            if let Some(max) = self.config.max_chars {
                if used_chars + separator_chars + block_chars > max {
                    if passages_used == 0 {
                        text = block.chars().take(max).collect();
                        passages_used = 1;
                    }
                    truncated = true;
                    break;
                }
            }

            if passages_used > 0 {
                text.push_str(PASSAGE_SEPARATOR);
            }
            text.push_str(&block);
            used_chars += separator_chars + block_chars;
            passages_used += 1;
        }

        AssembledContext {
            text,
            passages_used,
            truncated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn office_hours_passages() -> Vec<RetrievedPassage> {
        vec![
            RetrievedPassage::new("Contact Info", "Call the front desk."),
            RetrievedPassage::new("Working Hours", "Open 10am to 5pm."),
        ]
    }

    #[test]
    fn test_blocks_joined_in_rank_order() {
        let assembler = ContextAssembler::default();
        let context = assembler.assemble(&office_hours_passages());

        assert_eq!(
            context.text,
            "Title: Contact Info\nContent: Call the front desk.\n---\nTitle: Working Hours\nContent: Open 10am to 5pm."
        );
        assert_eq!(context.passages_used, 2);
        assert!(!context.truncated);
    }

    #[test]
    fn test_order_is_never_resorted() {
        let assembler = ContextAssembler::default();
        let mut passages = office_hours_passages();
        passages.reverse();
        let context = assembler.assemble(&passages);
        assert!(context.text.starts_with("Title: Working Hours"));
    }

    #[test]
    fn test_assembly_is_idempotent() {
        let assembler = ContextAssembler::default();
        let passages = office_hours_passages();
        assert_eq!(assembler.assemble(&passages), assembler.assemble(&passages));
    }

    #[test]
    fn test_blank_title_renders_placeholder() {
        let block = ContextAssembler::render_passage(&RetrievedPassage::new("  ", "body"));
        assert_eq!(block, "Title: N/A\nContent: body");
    }

    #[test]
    fn test_title_rendered_as_stored() {
        let block = ContextAssembler::render_passage(&RetrievedPassage::new(" Working Hours ", "body"));
        assert_eq!(block, "Title:  Working Hours \nContent: body");
    }

    #[test]
    fn test_empty_input() {
        let context = ContextAssembler::default().assemble(&[]);
        assert_eq!(context.text, "");
        assert_eq!(context.passages_used, 0);
    }

    #[test]
    fn test_cap_drops_whole_trailing_blocks() {
        let passages = office_hours_passages();
        let first = ContextAssembler::render_passage(&passages[0]);
        let assembler = ContextAssembler::new(ContextAssemblerConfig {
            max_chars: Some(first.chars().count() + 5),
        });

        let context = assembler.assemble(&passages);
        assert_eq!(context.text, first);
        assert_eq!(context.passages_used, 1);
        assert!(context.truncated);
    }

    #[test]
    fn test_cap_cuts_oversized_first_block() {
        let assembler = ContextAssembler::new(ContextAssemblerConfig::from_max_chars(10));
        let context = assembler.assemble(&[RetrievedPassage::new("Événement", "long body text")]);
        assert_eq!(context.text.chars().count(), 10);
        assert_eq!(context.text, "Title: Évé");
        assert!(context.truncated);
    }

    #[test]
    fn test_zero_cap_means_unbounded() {
        assert!(ContextAssemblerConfig::from_max_chars(0).max_chars.is_none());
    }
}
