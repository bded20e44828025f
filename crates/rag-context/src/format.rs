//! Final rendering of assembled candidates into either XML-like
//! structured markup or Markdown-like marked-up text.

use rag_core::RetrievalResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CitationStyle {
    Inline,
    Footnote,
    Header,
}

#[derive(Debug, Clone)]
pub struct StructuredFormatConfig {
    pub root_tag: String,
    pub source_tag: String,
    pub pretty_print: bool,
    pub include_scores: bool,
}

impl Default for StructuredFormatConfig {
    fn default() -> Self {
        Self {
            root_tag: "context".to_string(),
            source_tag: "source".to_string(),
            pretty_print: true,
            include_scores: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MarkdownFormatConfig {
    pub citation_style: CitationStyle,
    pub include_scores: bool,
    pub separator: String,
}

impl Default for MarkdownFormatConfig {
    fn default() -> Self {
        Self {
            citation_style: CitationStyle::Inline,
            include_scores: false,
            separator: "\n\n".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FormatConfig {
    Structured(StructuredFormatConfig),
    Markdown(MarkdownFormatConfig),
}

impl Default for FormatConfig {
    fn default() -> Self {
        FormatConfig::Structured(StructuredFormatConfig::default())
    }
}

pub fn render(candidates: &[RetrievalResult], config: &FormatConfig) -> String {
    match config {
        FormatConfig::Structured(c) => render_structured(candidates, c),
        FormatConfig::Markdown(c) => render_markdown(candidates, c),
    }
}

fn render_structured(candidates: &[RetrievalResult], config: &StructuredFormatConfig) -> String {
    let (newline, indent) = if config.pretty_print { ("\n", "  ") } else { ("", "") };
    let mut out = format!("<{}>", config.root_tag);

    for (i, candidate) in candidates.iter().enumerate() {
        out.push_str(newline);
        out.push_str(indent);
        out.push('<');
        out.push_str(&config.source_tag);
        out.push_str(&format!(" id=\"{}\"", escape_attr(&candidate.id)));
        if let Some(source) = candidate.chunk.source() {
            out.push_str(&format!(" file=\"{}\"", escape_attr(source)));
        }
        if let Some(location) = candidate.chunk.metadata.get("location").and_then(|v| v.as_str()) {
            out.push_str(&format!(" location=\"{}\"", escape_attr(location)));
        }
        if let Some(section) = candidate.chunk.metadata.get("section").and_then(|v| v.as_str()) {
            out.push_str(&format!(" section=\"{}\"", escape_attr(section)));
        }
        if config.include_scores {
            out.push_str(&format!(" score=\"{}\"", candidate.score));
        }
        let _ = i;
        out.push('>');
        out.push_str(&escape_text(&candidate.chunk.content));
        out.push_str("</");
        out.push_str(&config.source_tag);
        out.push('>');
    }

    out.push_str(newline);
    out.push_str(&format!("</{}>", config.root_tag));
    out
}

fn render_markdown(candidates: &[RetrievalResult], config: &MarkdownFormatConfig) -> String {
    let mut body_parts = Vec::with_capacity(candidates.len());
    let mut footnotes = Vec::new();

    for (i, candidate) in candidates.iter().enumerate() {
        let n = i + 1;
        let source_label = candidate.chunk.source().unwrap_or("unknown").to_string();
        let score_suffix = if config.include_scores {
            format!(" (score: {:.3})", candidate.score)
        } else {
            String::new()
        };

        let part = match config.citation_style {
            CitationStyle::Inline => {
                format!("**[{n}]** {} *({source_label})*{score_suffix}", candidate.chunk.content)
            }
            CitationStyle::Footnote => {
                footnotes.push(format!("[{n}]: {source_label}{score_suffix}"));
                format!("{} [{n}]", candidate.chunk.content)
            }
            CitationStyle::Header => {
                format!("### Source {n}: {source_label}{score_suffix}\n\n{}", candidate.chunk.content)
            }
        };
        body_parts.push(part);
    }

    let mut out = body_parts.join(&config.separator);
    if config.citation_style == CitationStyle::Footnote && !footnotes.is_empty() {
        out.push_str(&config.separator);
        out.push_str("**Sources:**\n");
        out.push_str(&footnotes.join("\n"));
    }
    out
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;").replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_core::Chunk;

    fn result(id: &str, content: &str) -> RetrievalResult {
        RetrievalResult {
            id: id.to_string(),
            chunk: Chunk::new(id, content),
            score: 0.5,
            scores: None,
            dense_rank: None,
            sparse_rank: None,
            confidence: None,
        }
    }

    #[test]
    fn structured_escapes_special_characters() {
        let out = render_structured(
            &[result("a", "<tag> & \"quoted\"")],
            &StructuredFormatConfig::default(),
        );
        assert!(out.contains("&lt;tag&gt; &amp; \"quoted\""));
    }

    #[test]
    fn structured_empty_input_emits_empty_root() {
        let out = render_structured(&[], &StructuredFormatConfig::default());
        assert_eq!(out, "<context>\n</context>");
    }

    #[test]
    fn markdown_footnote_style_lists_sources() {
        let out = render_markdown(
            &[result("a", "body text")],
            &MarkdownFormatConfig { citation_style: CitationStyle::Footnote, ..Default::default() },
        );
        assert!(out.contains("**Sources:**"));
        assert!(out.contains("[1]"));
    }

    #[test]
    fn markdown_header_style_emits_heading_per_chunk() {
        let out = render_markdown(
            &[result("a", "body text")],
            &MarkdownFormatConfig { citation_style: CitationStyle::Header, ..Default::default() },
        );
        assert!(out.starts_with("### Source 1:"));
    }
}
