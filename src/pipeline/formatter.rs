//! HTML digest formatting.

use std::path::Path;

use crate::auth::consent::escape_html;

/// Build the HTML body of a digest email from the translated summary and the
/// generated illustration.
pub fn format_digest(subject: &str, summary: &str, image_path: &Path) -> String {
    let paragraphs: String = summary
        .split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .map(|p| format!("    <p>{}</p>\n", escape_html(p.trim())))
        .collect();

    format!(
        "<html>\n  <body>\n    <h2>{subject}</h2>\n    \
         <img src=\"{image}\" alt=\"Illustration\" width=\"512\" />\n{paragraphs}  </body>\n</html>\n",
        subject = escape_html(subject),
        image = image_path.display(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_digest_includes_summary_and_image() {
        let html = format_digest(
            "This week in Rust",
            "First story.\n\nSecond story.",
            &PathBuf::from("data/images/m1.png"),
        );

        assert!(html.contains("<h2>This week in Rust</h2>"));
        assert!(html.contains("data/images/m1.png"));
        assert!(html.contains("<p>First story.</p>"));
        assert!(html.contains("<p>Second story.</p>"));
    }

    #[test]
    fn test_format_digest_escapes_content() {
        let html = format_digest(
            "<script>alert(1)</script>",
            "a & b",
            &PathBuf::from("x.png"),
        );

        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("a &amp; b"));
    }
}
