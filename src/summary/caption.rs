use std::fmt::Write;

use super::Summary;

const ELLIPSIS: &str = "...";

/// Renders the message sent alongside a slide image.
///
/// The output never exceeds `max_chars` characters; longer captions are cut
/// and end in `...`.
pub fn build_caption(summary: &Summary, max_chars: usize, change_score: f64) -> String {
    let mut out = String::new();

    if !summary.title.is_empty() {
        out.push_str("Título: ");
        out.push_str(&summary.title);
        out.push('\n');
    }

    if !summary.bullets.is_empty() {
        out.push_str("\nPuntos:\n");
        for bullet in &summary.bullets {
            out.push_str("• ");
            out.push_str(bullet);
            out.push('\n');
        }
    }

    if !summary.keywords.is_empty() {
        out.push_str("\nPalabras clave: ");
        out.push_str(&summary.keywords.join(", "));
        out.push('\n');
    }

    let _ = write!(out, "\nCambio: {:.1}%", change_score * 100.0);

    truncate_chars(out, max_chars)
}

fn truncate_chars(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }
    // Config validation rejects limits this small.
    if max_chars <= ELLIPSIS.len() {
        return ".".repeat(max_chars);
    }

    let mut cut: String = text.chars().take(max_chars - ELLIPSIS.len()).collect();
    cut.push_str(ELLIPSIS);
    cut
}
