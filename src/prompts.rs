//! Prompts sent to remote vision and chat models.
//!
//! Every prompt lives here so behaviour changes are made in one place and
//! unit tests can inspect prompts without a live model. Callers can
//! override the OCR prompt via [`crate::config::ExtractionConfig::system_prompt`].

use crate::document::SummaryStyle;

/// Default system prompt for transcribing a scanned page image.
pub const OCR_SYSTEM_PROMPT: &str = r#"You are an OCR and document layout engine for scanned educational material in any language, including Arabic, English and French.

Transcribe the page image into clean GitHub-flavored Markdown.

1. LANGUAGE
   - Detect the language(s) on the page automatically
   - Keep right-to-left scripts right-to-left; use <div align="right"> where needed
   - Never translate

2. FIDELITY
   - Transcribe text exactly as it appears; do not correct spelling
   - Keep diacritics, punctuation, bullets, numbered lists and paragraphs
   - Replace unreadable text with [Unreadable]

3. STRUCTURE
   - Use ## headings for section or question numbers
   - Convert tabular data and multiple-choice options to GFM tables
   - Use borderless HTML <table> markup only for multi-column layouts

4. MATHEMATICS
   - Write every formula in LaTeX: $inline$ and $$display$$
   - Copy formulas symbol for symbol; never simplify or rename variables
   - Mark theorems, lemmas, definitions and proofs in bold, e.g. **Theorem 1:**

5. IGNORE
   - Page numbers, bindings, stains and background marks

6. OUTPUT FORMAT
   - Output ONLY the Markdown content
   - Do NOT wrap in ```markdown fences
   - Do NOT add commentary, answers or explanations"#;

/// Instruction for a multi-paragraph study summary.
pub const SUMMARY_PROMPT: &str = r#"You are an expert at summarizing academic and educational documents.

Read the Markdown document below and write a detailed, comprehensive summary of it.

Guidelines:
- Write several paragraphs in a logical order
- Explain the key points, important definitions and concepts
- Do not include headings or page numbers
- Do not use bullets or numbering; write in paragraph form
- Make the result easy to study from

Return only clean, properly spaced Markdown."#;

/// Instruction for question/answer flashcards.
pub const FLASHCARDS_PROMPT: &str = r#"You are an expert at turning academic and educational documents into study flashcards.

Read the Markdown document below and write flashcards covering its key definitions, results and concepts.

Guidelines:
- One flashcard per concept, in the order the concepts appear
- Format each card as:
  **Q:** question
  **A:** answer
- Separate cards with a blank line
- Keep answers short and self-contained

Return only clean Markdown."#;

/// Appended to every summarization prompt.
///
/// Formula spans are replaced with tokens such as `⟦F0⟧` before the request;
/// the model must pass them through untouched so they can be restored.
pub const PLACEHOLDER_INSTRUCTION: &str = r#"The document contains tokens of the form ⟦F0⟧, ⟦F1⟧, … that stand for mathematical formulas and code.
Copy each token you refer to exactly as written, including the brackets. Never rewrite, translate, merge or explain a token."#;

/// Build the full summarization instruction for a style and target language.
///
/// With no language the model is told to keep the document's own language.
pub fn summary_instruction(style: SummaryStyle, language: Option<&str>) -> String {
    let base = match style {
        SummaryStyle::Summary => SUMMARY_PROMPT,
        SummaryStyle::Flashcards => FLASHCARDS_PROMPT,
    };
    let language_line = match language.map(str::trim).filter(|l| !l.is_empty()) {
        Some(lang) => format!("Write the output in {lang}."),
        None => "Write the output in the same language as the document.".to_string(),
    };
    format!("{base}\n\n{PLACEHOLDER_INSTRUCTION}\n\n{language_line}")
}

/// Wrap the (placeholder-protected) document as the user turn.
pub fn summary_user_message(source_name: &str, markdown: &str) -> String {
    format!("Document: {source_name}\n\n{markdown}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ocr_prompt_asks_for_latex_and_no_fences() {
        assert!(OCR_SYSTEM_PROMPT.contains("$inline$"));
        assert!(OCR_SYSTEM_PROMPT.contains("Do NOT wrap"));
    }

    #[test]
    fn instruction_defaults_to_source_language() {
        let p = summary_instruction(SummaryStyle::Summary, None);
        assert!(p.contains("same language as the document"));
        assert!(p.contains("⟦F0⟧"));
    }

    #[test]
    fn instruction_names_target_language() {
        let p = summary_instruction(SummaryStyle::Flashcards, Some("French"));
        assert!(p.contains("Write the output in French."));
        assert!(p.contains("**Q:**"));
    }

    #[test]
    fn blank_language_treated_as_absent() {
        let p = summary_instruction(SummaryStyle::Summary, Some("  "));
        assert!(p.contains("same language as the document"));
    }
}
