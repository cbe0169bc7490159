use crate::config::WRITER_BUFFER_SIZE;
use crate::edgecache::Weight;
use crate::models::Message;
use anyhow::{Context, Result};
use csv::Writer;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge<W> {
    pub source: usize,
    pub target: usize,
    pub weight: W,
}

/// Attribute rendering for CSV export.
pub trait EdgeAttr {
    /// Numeric edge weight.
    fn weight(&self) -> u64;
    /// Value of the edge-label column.
    fn render(&self) -> String;
}

impl EdgeAttr for Weight<Message> {
    fn weight(&self) -> u64 {
        self.magnitude()
    }

    fn render(&self) -> String {
        match self {
            Weight::Count(n) => n.to_string(),
            Weight::Events(events) => events
                .iter()
                .map(|m| {
                    let ts = m
                        .timestamp
                        .map(|t| t.format("%Y-%m-%dT%H:%M:%SZ").to_string())
                        .unwrap_or_default();
                    if m.welcome {
                        format!("{}!", ts)
                    } else {
                        ts
                    }
                })
                .collect::<Vec<_>>()
                .join(";"),
        }
    }
}

impl EdgeAttr for Weight<()> {
    fn weight(&self) -> u64 {
        self.magnitude()
    }

    fn render(&self) -> String {
        self.magnitude().to_string()
    }
}

/// Directed graph with labelled vertices and one attribute per edge.
/// Read-only once built.
#[derive(Debug, Clone)]
pub struct DiGraph<W> {
    vertex_label: String,
    edge_label: String,
    vertices: Vec<String>,
    edges: Vec<Edge<W>>,
}

impl<W> DiGraph<W> {
    pub fn new(
        vertex_label: &str,
        edge_label: &str,
        vertices: Vec<String>,
        edges: Vec<Edge<W>>,
    ) -> Self {
        Self {
            vertex_label: vertex_label.to_string(),
            edge_label: edge_label.to_string(),
            vertices,
            edges,
        }
    }

    pub fn vertex_label(&self) -> &str {
        &self.vertex_label
    }

    pub fn edge_label(&self) -> &str {
        &self.edge_label
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn vertices(&self) -> &[String] {
        &self.vertices
    }

    pub fn edges(&self) -> &[Edge<W>] {
        &self.edges
    }

    pub fn vertex(&self, id: usize) -> Option<&str> {
        self.vertices.get(id).map(String::as_str)
    }

    pub fn find_vertex(&self, label: &str) -> Option<usize> {
        self.vertices.iter().position(|v| v == label)
    }

    /// First edge from `source` to `target`, by vertex label.
    pub fn edge_between(&self, source: &str, target: &str) -> Option<&Edge<W>> {
        let s = self.find_vertex(source)?;
        let t = self.find_vertex(target)?;
        self.edges.iter().find(|e| e.source == s && e.target == t)
    }

    pub fn self_loops(&self) -> usize {
        self.edges.iter().filter(|e| e.source == e.target).count()
    }
}

impl<W: EdgeAttr> DiGraph<W> {
    /// Writes `<name>_nodes.csv` and `<name>_edges.csv` into `output_dir`.
    pub fn write_csv(&self, output_dir: &str, name: &str) -> Result<()> {
        let dir = Path::new(output_dir);
        let nodes_path = dir.join(format!("{}_nodes.csv", name));
        let edges_path = dir.join(format!("{}_edges.csv", name));

        let mut nodes = Writer::from_writer(BufWriter::with_capacity(
            WRITER_BUFFER_SIZE,
            File::create(&nodes_path)
                .with_context(|| format!("Failed to create {:?}", nodes_path))?,
        ));
        nodes.write_record(["id:ID", self.vertex_label.as_str()])?;
        for (id, label) in self.vertices.iter().enumerate() {
            nodes.write_record([id.to_string().as_str(), label.as_str()])?;
        }
        nodes.flush()?;

        let mut edges = Writer::from_writer(BufWriter::with_capacity(
            WRITER_BUFFER_SIZE,
            File::create(&edges_path)
                .with_context(|| format!("Failed to create {:?}", edges_path))?,
        ));
        edges.write_record([":START_ID", ":END_ID", "weight:int", self.edge_label.as_str()])?;
        for edge in &self.edges {
            edges.write_record([
                edge.source.to_string(),
                edge.target.to_string(),
                edge.weight.weight().to_string(),
                edge.weight.render(),
            ])?;
        }
        edges.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    fn sample() -> DiGraph<Weight<Message>> {
        let ts = NaiveDate::from_ymd_opt(2010, 3, 7)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        DiGraph::new(
            "username",
            "timestamp",
            vec!["Alice".to_string(), "Bob".to_string()],
            vec![Edge {
                source: 1,
                target: 0,
                weight: Weight::Events(vec![
                    Message {
                        timestamp: Some(ts),
                        welcome: true,
                    },
                    Message {
                        timestamp: Some(ts),
                        welcome: false,
                    },
                ]),
            }],
        )
    }

    #[test]
    fn lookups_by_label() {
        let g = sample();
        assert_eq!(g.find_vertex("Bob"), Some(1));
        assert_eq!(g.edge_between("Bob", "Alice").unwrap().weight.weight(), 2);
        assert!(g.edge_between("Alice", "Bob").is_none());
        assert_eq!(g.self_loops(), 0);
    }

    #[test]
    fn writes_nodes_and_edges() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().to_str().unwrap();
        sample().write_csv(out, "utp").unwrap();

        let nodes = fs::read_to_string(dir.path().join("utp_nodes.csv")).unwrap();
        assert_eq!(nodes, "id:ID,username\n0,Alice\n1,Bob\n");

        let edges = fs::read_to_string(dir.path().join("utp_edges.csv")).unwrap();
        let lines: Vec<_> = edges.lines().collect();
        assert_eq!(lines[0], ":START_ID,:END_ID,weight:int,timestamp");
        assert_eq!(lines[1], "1,0,2,2010-03-07T12:00:00Z!;2010-03-07T12:00:00Z");
    }
}
