//! Mesh topology definitions
//!
//! A topology is an ordered list of nodes, each with its own neighbor list.
//! Adjacency is directed as declared: `A: [B]` lets A fan out to B, not the
//! reverse. The generators in [`TopologyBuilder`] always emit symmetric
//! lists.
//!
//! Topologies load from JSON, TOML or YAML and are validated for referential
//! integrity before any simulation is built from them.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::TopologyError;
use crate::identity::NodeId;

/// One node record: its id and the ids it fans out to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    #[serde(default)]
    pub neighbors: Vec<NodeId>,
}

impl NodeSpec {
    pub fn new(id: impl Into<NodeId>, neighbors: impl IntoIterator<Item = impl Into<NodeId>>) -> Self {
        Self {
            id: id.into(),
            neighbors: neighbors.into_iter().map(Into::into).collect(),
        }
    }
}

/// Serialized form of a topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyFormat {
    Json,
    Toml,
    Yaml,
}

impl TopologyFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Some(Self::Json),
            Some("toml") => Some(Self::Toml),
            Some("yaml" | "yml") => Some(Self::Yaml),
            _ => None,
        }
    }
}

/// A mesh network topology
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub nodes: Vec<NodeSpec>,
}

impl Topology {
    /// Create a topology from node records
    pub fn new(nodes: Vec<NodeSpec>) -> Self {
        Self { nodes }
    }

    /// Parse from a JSON document
    pub fn from_json_str(s: &str) -> Result<Self, TopologyError> {
        serde_json::from_str(s).map_err(|e| TopologyError::Parse(e.to_string()))
    }

    /// Parse from a TOML document (`[[nodes]]` tables)
    pub fn from_toml_str(s: &str) -> Result<Self, TopologyError> {
        toml::from_str(s).map_err(|e| TopologyError::Parse(e.to_string()))
    }

    /// Parse from a YAML document (`nodes:` sequence)
    pub fn from_yaml_str(s: &str) -> Result<Self, TopologyError> {
        serde_yaml::from_str(s).map_err(|e| TopologyError::Parse(e.to_string()))
    }

    /// Parse user-supplied text, trying JSON, then TOML, then YAML
    ///
    /// YAML goes last since it also accepts most JSON documents.
    pub fn from_str_auto(s: &str) -> Result<Self, TopologyError> {
        let json_err = match Self::from_json_str(s) {
            Ok(topology) => return Ok(topology),
            Err(e) => e,
        };
        let toml_err = match Self::from_toml_str(s) {
            Ok(topology) => return Ok(topology),
            Err(e) => e,
        };
        Self::from_yaml_str(s).map_err(|yaml_err| {
            TopologyError::Parse(format!(
                "not JSON ({json_err}), TOML ({toml_err}) or YAML ({yaml_err})"
            ))
        })
    }

    /// Load and validate a topology file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TopologyError> {
        let path = path.as_ref();
        let format = TopologyFormat::from_path(path)
            .ok_or_else(|| TopologyError::UnsupportedFormat(path.display().to_string()))?;
        let text = std::fs::read_to_string(path).map_err(|source| TopologyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let topology = match format {
            TopologyFormat::Json => Self::from_json_str(&text)?,
            TopologyFormat::Toml => Self::from_toml_str(&text)?,
            TopologyFormat::Yaml => Self::from_yaml_str(&text)?,
        };
        topology.validate()?;
        Ok(topology)
    }

    /// Serialize in the given format
    pub fn to_string_as(&self, format: TopologyFormat) -> Result<String, TopologyError> {
        match format {
            TopologyFormat::Json => {
                serde_json::to_string_pretty(self).map_err(|e| TopologyError::Parse(e.to_string()))
            }
            TopologyFormat::Toml => {
                toml::to_string_pretty(self).map_err(|e| TopologyError::Parse(e.to_string()))
            }
            TopologyFormat::Yaml => {
                serde_yaml::to_string(self).map_err(|e| TopologyError::Parse(e.to_string()))
            }
        }
    }

    /// Check ids are unique and non-empty, and every neighbor resolves
    ///
    /// A node may list itself; its own copies then come straight back to it.
    pub fn validate(&self) -> Result<(), TopologyError> {
        if self.nodes.is_empty() {
            return Err(TopologyError::Empty);
        }

        let mut declared = HashSet::with_capacity(self.nodes.len());
        for (idx, node) in self.nodes.iter().enumerate() {
            if node.id.is_empty() {
                return Err(TopologyError::EmptyId(idx));
            }
            if !declared.insert(node.id.as_str()) {
                return Err(TopologyError::DuplicateId(node.id.clone()));
            }
        }

        for node in &self.nodes {
            for neighbor in &node.neighbors {
                if !declared.contains(neighbor.as_str()) {
                    return Err(TopologyError::UnknownNeighbor {
                        node: node.id.clone(),
                        neighbor: neighbor.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// All node ids in declaration order
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }

    /// Neighbor list of a node
    pub fn neighbors(&self, id: &str) -> Option<&[NodeId]> {
        self.nodes
            .iter()
            .find(|n| n.id.as_str() == id)
            .map(|n| n.neighbors.as_slice())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of directed edges
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.neighbors.len()).sum()
    }

    /// Simple ASCII rendering of the adjacency
    pub fn visualize(&self) -> String {
        let mut output = String::new();
        output.push_str("Mesh Topology:\n");
        output.push_str(&format!("  Nodes: {}\n", self.node_count()));
        output.push_str(&format!("  Edges: {}\n\n", self.edge_count()));
        for node in &self.nodes {
            let neighbors: Vec<&str> = node.neighbors.iter().map(NodeId::as_str).collect();
            output.push_str(&format!("  {} -> [{}]\n", node.id, neighbors.join(", ")));
        }
        output
    }
}

/// List topology files (`.json`, `.toml`, `.yaml`, `.yml`) in a directory, sorted by name
pub fn list_topology_files(dir: impl AsRef<Path>) -> Result<Vec<String>, TopologyError> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir).map_err(|source| TopologyError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut names = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || TopologyFormat::from_path(&path).is_none() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Builder for generated topologies with symmetric adjacency
///
/// Node ids are `Node1..NodeN`.
pub struct TopologyBuilder {
    node_count: usize,
    seed: Option<u64>,
    connect_isolated: bool,
}

impl TopologyBuilder {
    /// Create a builder for `node_count` nodes
    pub fn new(node_count: usize) -> Self {
        Self {
            node_count,
            seed: None,
            connect_isolated: false,
        }
    }

    /// Fix the seed used by [`random`](Self::random)
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Make [`random`](Self::random) attach every isolated node to one
    /// random peer
    pub fn connect_isolated(mut self, enabled: bool) -> Self {
        self.connect_isolated = enabled;
        self
    }

    fn ids(&self) -> Vec<NodeId> {
        (1..=self.node_count)
            .map(|i| NodeId::new(format!("Node{i}")))
            .collect()
    }

    fn assemble(ids: Vec<NodeId>, edges: BTreeSet<(usize, usize)>) -> Topology {
        let mut adjacency: Vec<Vec<NodeId>> = vec![Vec::new(); ids.len()];
        for (a, b) in edges {
            adjacency[a].push(ids[b].clone());
            adjacency[b].push(ids[a].clone());
        }
        let nodes = ids
            .into_iter()
            .zip(adjacency)
            .map(|(id, neighbors)| NodeSpec { id, neighbors })
            .collect();
        Topology { nodes }
    }

    /// Ring: each node connected to the next, last wraps to first
    pub fn ring(self) -> Topology {
        let ids = self.ids();
        let n = ids.len();
        let mut edges = BTreeSet::new();
        if n > 1 {
            for i in 0..n {
                let j = (i + 1) % n;
                if i != j {
                    edges.insert((i.min(j), i.max(j)));
                }
            }
        }
        Self::assemble(ids, edges)
    }

    /// Line: Node1 - Node2 - ... - NodeN
    pub fn line(self) -> Topology {
        let ids = self.ids();
        let edges = (1..ids.len()).map(|i| (i - 1, i)).collect();
        Self::assemble(ids, edges)
    }

    /// Star: Node1 in the center, connected to every other node
    pub fn star(self) -> Topology {
        let ids = self.ids();
        let edges = (1..ids.len()).map(|i| (0, i)).collect();
        Self::assemble(ids, edges)
    }

    /// Full mesh: every node connected to every other
    pub fn full_mesh(self) -> Topology {
        let ids = self.ids();
        let n = ids.len();
        let mut edges = BTreeSet::new();
        for i in 0..n {
            for j in (i + 1)..n {
                edges.insert((i, j));
            }
        }
        Self::assemble(ids, edges)
    }

    /// Random: each unordered pair connected with probability `p_edge`
    ///
    /// Nodes left without any edge stay isolated unless
    /// [`connect_isolated`](Self::connect_isolated) is set.
    pub fn random(self, p_edge: f64) -> Topology {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let ids = self.ids();
        let n = ids.len();
        let mut edges = BTreeSet::new();

        for i in 0..n {
            for j in (i + 1)..n {
                if rng.random::<f64>() < p_edge {
                    edges.insert((i, j));
                }
            }
        }

        if self.connect_isolated && n > 1 {
            for i in 0..n {
                let isolated = !edges.iter().any(|&(a, b)| a == i || b == i);
                if isolated {
                    let mut other = rng.random_range(0..n - 1);
                    if other >= i {
                        other += 1;
                    }
                    edges.insert((i.min(other), i.max(other)));
                }
            }
        }

        Self::assemble(ids, edges)
    }
}
