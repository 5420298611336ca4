//! SVG flamegraph generation using inferno.
//!
//! Folded stacks carry exclusive milliseconds as their weight, so the
//! width of a frame is the time spent in it and its callees.

use crate::aggregator::{CollapsedStack, EdgeMap, FunctionTable};
use crate::utils::error::FlamegraphError;
use inferno::flamegraph::{self, Options};
use log::info;

/// Flamegraph configuration
#[derive(Debug, Clone)]
pub struct FlamegraphConfig {
    pub title: String,
    pub width: usize,
}

impl Default for FlamegraphConfig {
    fn default() -> Self {
        Self {
            title: "Flash Trace Profile".to_string(),
            width: 1200,
        }
    }
}

impl FlamegraphConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }
}

/// Generate an SVG flamegraph from collapsed stacks
///
/// **Public** - main entry point for flamegraph rendering
///
/// # Errors
/// * `FlamegraphError::EmptyStacks` - no stack has a non-zero weight
/// * `FlamegraphError::GenerationFailed` - inferno failed to render
pub fn generate_flamegraph(
    stacks: &[CollapsedStack],
    config: Option<&FlamegraphConfig>,
) -> Result<Vec<u8>, FlamegraphError> {
    // inferno fails on input without samples
    let lines: Vec<String> = stacks
        .iter()
        .filter(|stack| stack.weight > 0)
        .map(CollapsedStack::to_line)
        .collect();
    if lines.is_empty() {
        return Err(FlamegraphError::EmptyStacks);
    }

    let config = config.cloned().unwrap_or_default();
    info!("Generating flamegraph with {} stacks", lines.len());

    let mut opts = Options::default();
    opts.title = config.title;
    opts.count_name = "ms".to_string();
    opts.image_width = Some(config.width);

    let mut svg = Vec::new();
    flamegraph::from_lines(&mut opts, lines.iter().map(String::as_str), &mut svg)
        .map_err(|e| FlamegraphError::GenerationFailed(e.to_string()))?;

    info!("Flamegraph generated successfully ({} bytes)", svg.len());
    Ok(svg)
}

/// Render the heaviest edges and functions as a text table
pub fn generate_text_summary(edges: &EdgeMap, functions: &FunctionTable, max_lines: usize) -> String {
    let total_ms = edges.root().map_or(0.0, |root| root.inclusive_time_ms());
    let percent = |ms: f64| {
        if total_ms > 0.0 {
            ms / total_ms * 100.0
        } else {
            0.0
        }
    };

    let mut lines = Vec::new();
    lines.push(format!("  Total root time: {:.1} ms", total_ms));
    lines.push(String::new());
    lines.push("  HEAVIEST EDGES".to_string());
    lines.push(format!(
        "  {:<50} {:>8} {:>12} {:>7}",
        "Edge", "Calls", "Time (ms)", "%"
    ));
    lines.push(format!("  {}", "-".repeat(80)));

    let heaviest = edges.heaviest(max_lines + 1);
    for (key, stats) in heaviest.iter().filter(|(key, _)| key.contains("==>")).take(max_lines) {
        lines.push(format!(
            "  {:<50} {:>8} {:>12.1} {:>6.1}%",
            truncate_left(key, 50),
            stats.call_count,
            stats.inclusive_time_ms(),
            percent(stats.inclusive_time_ms())
        ));
    }

    if !functions.is_empty() {
        lines.push(String::new());
        lines.push("  HOTTEST FUNCTIONS (exclusive time)".to_string());
        lines.push(format!(
            "  {:<50} {:>8} {:>12} {:>7}",
            "Function", "Calls", "Self (ms)", "%"
        ));
        lines.push(format!("  {}", "-".repeat(80)));

        for (name, stats) in functions.hottest(max_lines) {
            let self_ms = stats.total_exclusive_time as f64;
            lines.push(format!(
                "  {:<50} {:>8} {:>12.1} {:>6.1}%",
                truncate_left(name, 50),
                stats.calls,
                self_ms,
                percent(self_ms)
            ));
        }
    }

    if edges.len() > max_lines + 1 {
        lines.push(String::new());
        lines.push(format!(
            "   (Showing top {} of {} report entries)",
            max_lines,
            edges.len()
        ));
    }

    lines.join("\n")
}

/// Keep the tail of `text`, which holds the callee
fn truncate_left(text: &str, width: usize) -> String {
    let count = text.chars().count();
    if count <= width {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - (width - 3)).collect();
    format!("...{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stacks() -> Vec<CollapsedStack> {
        vec![
            CollapsedStack::new("main();A;B".to_string(), 4),
            CollapsedStack::new("main();A".to_string(), 2),
        ]
    }

    #[test]
    fn test_generate_flamegraph() {
        let config = FlamegraphConfig::new().with_title("Session 1");
        let svg = generate_flamegraph(&stacks(), Some(&config)).unwrap();
        let svg = String::from_utf8(svg).unwrap();

        assert!(svg.contains("<svg"));
        assert!(svg.contains("Session 1"));
    }

    #[test]
    fn test_empty_stacks_rejected() {
        assert!(matches!(
            generate_flamegraph(&[], None),
            Err(FlamegraphError::EmptyStacks)
        ));

        let zero = vec![CollapsedStack::new("main();A".to_string(), 0)];
        assert!(matches!(
            generate_flamegraph(&zero, None),
            Err(FlamegraphError::EmptyStacks)
        ));
    }

    #[test]
    fn test_render_failure_message() {
        let err = FlamegraphError::GenerationFailed("ill-formed XML".to_string());
        assert_eq!(err.to_string(), "Failed to generate flamegraph: ill-formed XML");
    }

    #[test]
    fn test_text_summary_lists_edges() {
        let mut edges = EdgeMap::new();
        edges.record_call(None, "A", 10_000_000);
        edges.record_call(Some("A"), "B", 4_000_000);

        let text = generate_text_summary(&edges, &FunctionTable::new(), 10);
        assert!(text.contains("Total root time: 10.0 ms"));
        assert!(text.contains("main()==>A"));
        assert!(text.contains("A==>B"));
        assert!(text.contains("40.0%"));
        assert!(!text.contains("HOTTEST FUNCTIONS"));
    }

    #[test]
    fn test_truncate_left_keeps_tail() {
        assert_eq!(truncate_left("short", 10), "short");
        assert_eq!(truncate_left("abcdefghij", 8), "...fghij");
    }
}
