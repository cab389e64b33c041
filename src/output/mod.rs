//! Console rendering of measurements and run summaries

use crate::models::{HttpMeasure, Measure};
use crate::stats::PingStatistics;
use colored::*;
use std::fmt::Write as _;

/// How much to print per measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Summary only
    Quiet,
    /// One line per measurement
    #[default]
    Normal,
    /// Protocol details and latency contributions
    Verbose,
}

/// One row of the latency contribution tree
#[derive(Debug, Clone, PartialEq)]
struct TreeRow {
    label: &'static str,
    duration: Measure,
    depth: usize,
}

struct Node {
    label: &'static str,
    duration: Measure,
    children: Vec<Node>,
}

impl Node {
    fn leaf(label: &'static str, duration: Measure) -> Self {
        Self {
            label,
            duration,
            children: Vec::new(),
        }
    }

    /// Depth-first rows, skipping unmeasured entries
    fn flatten(&self, depth: usize, rows: &mut Vec<TreeRow>) {
        if self.duration.is_valid() {
            rows.push(TreeRow {
                label: self.label,
                duration: self.duration,
                depth,
            });
        }
        for child in &self.children {
            child.flatten(depth + 1, rows);
        }
    }
}

fn contribution_rows(measure: &HttpMeasure) -> Vec<TreeRow> {
    let tree = Node {
        label: "request and response",
        duration: measure.total_time,
        children: vec![
            Node {
                label: "connection setup",
                duration: measure.conn_establishment,
                children: vec![
                    Node::leaf("DNS resolution", measure.dns_resolution),
                    Node::leaf("TCP handshake", measure.tcp_handshake),
                    Node::leaf("TLS handshake", measure.tls_duration),
                ],
            },
            Node::leaf("request sending", measure.request_sending),
            Node::leaf("wait", measure.wait),
            Node::leaf("response ingestion", measure.response_ingesting),
        ],
    };

    let mut rows = Vec::new();
    tree.flatten(0, &mut rows);
    rows
}

/// Formats pinger output for a terminal
#[derive(Debug, Clone)]
pub struct OutputFormatter {
    use_color: bool,
    verbosity: Verbosity,
    audible_bell: bool,
}

impl OutputFormatter {
    pub fn new(use_color: bool, verbosity: Verbosity) -> Self {
        Self {
            use_color,
            verbosity,
            audible_bell: false,
        }
    }

    /// Ring the terminal bell on every successful answer
    pub fn with_audible_bell(mut self, enabled: bool) -> Self {
        self.audible_bell = enabled;
        self
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    fn paint(&self, text: String, color: Color) -> String {
        if self.use_color {
            text.color(color).to_string()
        } else {
            text
        }
    }

    pub fn banner(&self, url: &str, method: &str) -> String {
        let title = if self.use_color {
            "HTTP-PING".bold().to_string()
        } else {
            "HTTP-PING".to_string()
        };
        format!("{} {} {}\n", title, url, method)
    }

    pub fn redirect(&self, url: &str) -> String {
        format!("   ─→     Redirected to {}\n", self.paint(url.to_string(), Color::Cyan))
    }

    fn status_color(status: u16) -> Color {
        match status {
            200..=299 => Color::Green,
            300..=399 => Color::Cyan,
            400..=499 => Color::Yellow,
            _ => Color::Red,
        }
    }

    /// Render one measurement; empty in quiet mode
    pub fn measure(&self, index: u64, measure: &HttpMeasure) -> String {
        let mut out = String::new();
        if self.verbosity == Verbosity::Quiet {
            return out;
        }

        if measure.is_failure && measure.status_code == 0 {
            let _ = writeln!(
                out,
                "{:>8}: {}",
                index,
                self.paint(format!("Error: {}", measure.failure_cause), Color::Red)
            );
            return out;
        }

        let code = self.paint(measure.status_code.to_string(), Self::status_color(measure.status_code));
        let _ = write!(
            out,
            "{:>8}: {}, code={}, size={} bytes, time={:.1} ms",
            index,
            measure.remote_addr,
            code,
            measure.bytes,
            measure.total_time.as_millis_f64().unwrap_or_default()
        );
        if measure.is_failure {
            let _ = write!(out, " ({})", self.paint(measure.failure_cause.clone(), Color::Red));
        }
        out.push('\n');

        if self.verbosity == Verbosity::Verbose {
            let _ = writeln!(
                out,
                "          proto={}, socket reused={}, compressed={}",
                measure.proto, measure.socket_reused, measure.compressed
            );
            let _ = writeln!(
                out,
                "          network i/o: bytes read={}, bytes written={}",
                measure.in_bytes, measure.out_bytes
            );
            if measure.tls_enabled {
                let _ = writeln!(out, "          tls version={}", measure.tls_version);
            }
            out.push('\n');
            let _ = writeln!(out, "          latency contributions:");
            out.push_str(&self.latency_tree(measure));
            out.push('\n');
        }

        if self.audible_bell && !measure.is_failure {
            out.push('\x07');
        }
        out
    }

    /// The latency contribution tree, without unmeasured phases
    pub fn latency_tree(&self, measure: &HttpMeasure) -> String {
        let rows = contribution_rows(measure);
        let mut out = String::new();

        for (i, row) in rows.iter().enumerate() {
            out.push_str("          ");
            for level in 0..row.depth {
                let last_at_level = rows[i + 1..]
                    .iter()
                    .take_while(|next| next.depth > level)
                    .all(|next| next.depth != level + 1);
                let pipe = if level + 1 == row.depth {
                    if last_at_level { " └─" } else { " ├─" }
                } else if last_at_level {
                    "   "
                } else {
                    " │ "
                };
                let _ = write!(out, "{} ", pipe);
            }
            let _ = writeln!(
                out,
                "{:6.1} ms {}",
                row.duration.as_millis_f64().unwrap_or_default(),
                row.label
            );
        }
        out
    }

    pub fn summary(&self, url: &str, stats: &PingStatistics) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "--- {} ping statistics ---", url);

        let loss = format!("{:.1}% loss", stats.loss_percent());
        let loss = if stats.loss_percent() > 0.0 {
            self.paint(loss, Color::Red)
        } else {
            loss
        };
        let _ = writeln!(
            out,
            "{} requests sent, {} answers received, {}",
            stats.attempts(),
            stats.answers(),
            loss
        );

        if let Some(latencies) = stats.latencies() {
            let _ = writeln!(out, "{}", latencies);
        }
        out
    }
}
