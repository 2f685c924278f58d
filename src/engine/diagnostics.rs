use std::collections::HashMap;
use std::fmt::Write;
use std::time::{Duration, Instant};

use crate::engine::TaskGraph;

#[derive(Debug, Clone)]
pub struct TaskExecution {
    pub start: Instant,
    pub duration: Duration,
}

/// Execution metrics of a single [`Runner::run`](crate::Runner::run).
#[derive(Debug, Default)]
pub struct Diagnostics {
    /// Task name to its start time and duration.
    pub execution_times: HashMap<String, TaskExecution>,
}

impl Diagnostics {
    /// Renders the task graph as a Mermaid diagram, color-coded by execution duration.
    ///
    /// * **Green**: Fast
    /// * **Yellow**: Moderate
    /// * **Red**: Slow
    /// * **Blue**: Not part of the run
    pub fn render_mermaid(&self, graph: &TaskGraph) -> String {
        let mut f = String::new();
        writeln!(f, "graph LR").unwrap();

        let times = &self.execution_times;
        let min_time = times
            .values()
            .map(|t| t.duration.as_secs_f64())
            .fold(f64::MAX, f64::min);
        let mut max_time = times
            .values()
            .map(|t| t.duration.as_secs_f64())
            .fold(f64::MIN, f64::max);

        // Avoid divide by zero if all tasks took same time
        if times.is_empty() || (max_time - min_time).abs() < f64::EPSILON {
            max_time = min_time + 1.0;
        }

        for index in graph.graph.node_indices() {
            let name = graph.graph[index].name();

            let (label, color) = match times.get(name) {
                Some(exec) => {
                    let t = (exec.duration.as_secs_f64() - min_time) / (max_time - min_time);
                    (format!("{:.2?}", exec.duration), heat(t))
                }
                None => ("Skipped".to_string(), "#ADD8E6".to_string()),
            };

            let name = name.replace('"', "\\\"");
            writeln!(f, "    {:?}[\"{}\\n{}\"]", index.index(), name, label).unwrap();
            writeln!(f, "    style {:?} fill:{}", index.index(), color).unwrap();
        }

        for edge in graph.graph.raw_edges() {
            writeln!(
                f,
                "    {:?} --> {:?}",
                edge.source().index(),
                edge.target().index()
            )
            .unwrap();
        }

        f
    }
}

/// Green (0.0) -> Yellow (0.5) -> Red (1.0)
fn heat(t: f64) -> String {
    let t = t.clamp(0.0, 1.0);
    let (r, g, b) = if t < 0.5 {
        ((255.0 * t * 2.0) as u8, 255, 0)
    } else {
        (255, (255.0 * (1.0 - (t - 0.5) * 2.0)) as u8, 0)
    };

    format!("#{:02X}{:02X}{:02X}", r, g, b)
}
