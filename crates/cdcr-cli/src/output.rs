use std::io::Write;

use cdcr_core::{BatchOutcome, ClusterMap, FileFailure, FileMentions, FilterOutcome};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn heading(w: &mut dyn Write, text: &str, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{}", text.bold().underline())
    } else {
        writeln!(w, "{}", text)?;
        writeln!(w, "{}", "=".repeat(text.chars().count()))
    }
}

/// Print the mentions found in each file.
pub fn print_file_mentions(
    w: &mut dyn Write,
    file_mentions: &FileMentions,
    color: ColorMode,
) -> std::io::Result<()> {
    heading(w, "Mentions by file", color)?;
    for (filename, mentions) in file_mentions {
        if color.enabled() {
            writeln!(w, "{} ({})", filename.cyan(), mentions.len())?;
        } else {
            writeln!(w, "{} ({})", filename, mentions.len())?;
        }
        if mentions.is_empty() {
            writeln!(w, "  (no mentions)")?;
        } else {
            writeln!(w, "  {}", mentions.join(", "))?;
        }
    }
    writeln!(w)?;
    Ok(())
}

/// Print each cluster with its mentions.
pub fn print_clusters(
    w: &mut dyn Write,
    clusters: &ClusterMap,
    color: ColorMode,
) -> std::io::Result<()> {
    heading(w, "Clusters", color)?;
    if clusters.is_empty() {
        writeln!(w, "(no clusters)")?;
    }
    // Labels are numeric strings; list them in numeric order.
    let mut labels: Vec<&String> = clusters.keys().collect();
    labels.sort_by_key(|label| label.parse::<usize>().unwrap_or(usize::MAX));
    for label in labels {
        let mentions = &clusters[label];
        let tag = format!("[{}]", label);
        if color.enabled() {
            writeln!(w, "{} {}", tag.green().bold(), mentions.join(" | "))?;
        } else {
            writeln!(w, "{} {}", tag, mentions.join(" | "))?;
        }
    }
    writeln!(w)?;
    Ok(())
}

/// Print files that could not be processed.
pub fn print_failures(
    w: &mut dyn Write,
    failures: &[FileFailure],
    color: ColorMode,
) -> std::io::Result<()> {
    if failures.is_empty() {
        return Ok(());
    }
    heading(w, "Failed files", color)?;
    for failure in failures {
        let line = format!("{} [{}]: {}", failure.filename, failure.code, failure.message);
        if color.enabled() {
            writeln!(w, "{}", line.red())?;
        } else {
            writeln!(w, "{}", line)?;
        }
    }
    writeln!(w)?;
    Ok(())
}

/// Print the one-line batch summary.
pub fn print_summary(
    w: &mut dyn Write,
    outcome: &BatchOutcome,
    color: ColorMode,
) -> std::io::Result<()> {
    let summary = format!(
        "{} files, {} mentions, {} clusters",
        outcome.processed.len(),
        outcome.mention_count(),
        outcome.clusters.len()
    );
    if color.enabled() {
        write!(w, "{}", summary.bold())?;
    } else {
        write!(w, "{}", summary)?;
    }
    if !outcome.failures.is_empty() {
        let failed = format!(", {} failed", outcome.failures.len());
        if color.enabled() {
            write!(w, "{}", failed.red())?;
        } else {
            write!(w, "{}", failed)?;
        }
    }
    writeln!(w)?;
    Ok(())
}

/// Print the result of a filter query.
pub fn print_filter_result(
    w: &mut dyn Write,
    value: &str,
    outcome: &FilterOutcome,
    color: ColorMode,
) -> std::io::Result<()> {
    heading(w, &format!("Mentions matching \"{}\"", value), color)?;
    if outcome.filtered_mentions.is_empty() {
        writeln!(w, "(no matches)")?;
    } else {
        for mention in &outcome.filtered_mentions {
            writeln!(w, "  {}", mention)?;
        }
    }
    writeln!(w)?;

    if !outcome.filtered_files.is_empty() {
        heading(w, "Files", color)?;
        for (filename, mentions) in &outcome.filtered_files {
            if color.enabled() {
                writeln!(w, "{}: {}", filename.cyan(), mentions.len())?;
            } else {
                writeln!(w, "{}: {}", filename, mentions.len())?;
            }
        }
        writeln!(w)?;
    }

    writeln!(w, "Total matches: {}", outcome.mention_count)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn render(f: impl FnOnce(&mut dyn Write) -> std::io::Result<()>) -> String {
        let mut buf: Vec<u8> = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn clusters_listed_in_numeric_order() {
        let clusters: ClusterMap = (0..12)
            .map(|i| (i.to_string(), strings(&[&format!("m{i}")])))
            .collect();
        let text = render(|w| print_clusters(w, &clusters, ColorMode(false)));
        let pos = |needle: &str| text.find(needle).unwrap();
        assert!(pos("[2] m2") < pos("[10] m10"));
    }

    #[test]
    fn summary_mentions_failures() {
        let mut outcome = BatchOutcome::default();
        outcome.processed = strings(&["a.pdf"]);
        outcome.file_mentions.insert("a.pdf".into(), strings(&["Paris", "Rome"]));
        outcome.clusters.insert("0".into(), strings(&["Paris", "Rome"]));
        outcome.failures.push(FileFailure {
            filename: "b.pdf".into(),
            code: "document_read_error".into(),
            message: "could not read document".into(),
        });
        let text = render(|w| print_summary(w, &outcome, ColorMode(false)));
        assert_eq!(text, "1 files, 2 mentions, 1 clusters, 1 failed\n");
    }

    #[test]
    fn filter_result_without_matches() {
        let text = render(|w| {
            print_filter_result(w, "zzz", &FilterOutcome::default(), ColorMode(false))
        });
        assert!(text.contains("(no matches)"));
        assert!(text.ends_with("Total matches: 0\n"));
    }

    #[test]
    fn file_mentions_plain_output() {
        let mut files = FileMentions::new();
        files.insert("a.pdf".into(), strings(&["Apple Inc.", "Steve Jobs"]));
        files.insert("b.pdf".into(), Vec::new());
        let text = render(|w| print_file_mentions(w, &files, ColorMode(false)));
        assert!(text.contains("a.pdf (2)\n  Apple Inc., Steve Jobs\n"));
        assert!(text.contains("b.pdf (0)\n  (no mentions)\n"));
    }
}
