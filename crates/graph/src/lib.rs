// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ward-graph: compiles a declared adjacency list into the enumeration of
//! its source-to-sink execution paths.
//!
//! Compilation is a pure function `adjacency -> (paths, hash)`; callers that
//! see the same graph repeatedly go through [`CompileCache`], keyed by the
//! content hash.

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use ward_core::{
    AdjacencyNode, Path, PathNode, CONDITION_DAG_NOT_READY, CONDITION_SET_NOT_READY,
    VIRTUAL_SOURCE_ID,
};

/// Ceiling on the number of enumerated paths per graph. Bounds the work a
/// pathological fan-out graph can demand before admission.
pub const DEFAULT_MAX_PATHS: usize = 1024;

/// Why an adjacency list failed to compile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("duplicate node id {0}")]
    DuplicateNode(u64),

    #[error("edge {from} -> {to} references an undefined node")]
    DanglingEdge { from: u64, to: u64 },

    #[error("node {0} has a self-loop")]
    SelfLoop(u64),

    #[error("adjacency list has no node {VIRTUAL_SOURCE_ID} (the virtual source)")]
    MissingSource,

    #[error("edge {from} -> {VIRTUAL_SOURCE_ID} targets the virtual source")]
    EdgeIntoSource { from: u64 },

    #[error("the virtual source must not name an operation")]
    SourceHasOperation,

    #[error("node {0} names no operation")]
    MissingOperation(u64),

    #[error("cycle detected at edge {from} -> {to}")]
    Cycle { from: u64, to: u64 },

    #[error("path count exceeds the ceiling of {limit}")]
    TooManyPaths { limit: usize },
}

impl GraphError {
    /// Condition kind a reconciler should surface for this error.
    pub fn condition_kind(&self) -> &'static str {
        match self {
            GraphError::Cycle { .. } | GraphError::SelfLoop(_) => CONDITION_DAG_NOT_READY,
            _ => CONDITION_SET_NOT_READY,
        }
    }
}

/// Result of compiling an adjacency list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compiled {
    /// All source-to-sink paths, virtual source dropped, in DFS order with
    /// children visited by ascending node id.
    pub paths: Vec<Path>,
    /// Content digest of the canonical adjacency list.
    pub hash: String,
}

/// Stable ordering: nodes by ascending id, each edge list ascending.
fn canonicalize(adjacency: &[AdjacencyNode]) -> Vec<AdjacencyNode> {
    let mut nodes = adjacency.to_vec();
    for node in &mut nodes {
        node.to.sort_unstable();
    }
    nodes.sort_by_key(|n| n.id);
    nodes
}

/// Content hash of an adjacency list: sha256 over the canonical JSON
/// encoding.
///
/// A pure function of the canonicalized graph: node and edge declaration
/// order do not affect it.
pub fn adjacency_hash(adjacency: &[AdjacencyNode]) -> String {
    let canonical = canonicalize(adjacency);
    let encoded = match serde_json::to_string(&canonical) {
        Ok(json) => json,
        // Invariant: plain structs of ids and names always encode.
        Err(_) => unreachable!("adjacency list failed to serialize"),
    };
    format!("{:x}", Sha256::digest(encoded.as_bytes()))
}

/// Compile with the default path ceiling.
pub fn compile(adjacency: &[AdjacencyNode]) -> Result<Compiled, GraphError> {
    compile_with_limit(adjacency, DEFAULT_MAX_PATHS)
}

/// Validate the declared graph and enumerate every execution path.
pub fn compile_with_limit(
    adjacency: &[AdjacencyNode],
    max_paths: usize,
) -> Result<Compiled, GraphError> {
    let canonical = canonicalize(adjacency);
    let nodes = validate(&canonical)?;
    check_acyclic(&nodes)?;
    let paths = enumerate_paths(&nodes, max_paths)?;

    Ok(Compiled { paths, hash: adjacency_hash(adjacency) })
}

fn validate(canonical: &[AdjacencyNode]) -> Result<BTreeMap<u64, &AdjacencyNode>, GraphError> {
    let mut nodes: BTreeMap<u64, &AdjacencyNode> = BTreeMap::new();
    for node in canonical {
        if nodes.insert(node.id, node).is_some() {
            return Err(GraphError::DuplicateNode(node.id));
        }
    }

    let source = nodes.get(&VIRTUAL_SOURCE_ID).ok_or(GraphError::MissingSource)?;
    if !source.operation.is_empty() {
        return Err(GraphError::SourceHasOperation);
    }

    for node in nodes.values() {
        if node.id != VIRTUAL_SOURCE_ID && node.operation.is_empty() {
            return Err(GraphError::MissingOperation(node.id));
        }
        for &to in &node.to {
            if to == node.id {
                return Err(GraphError::SelfLoop(node.id));
            }
            if to == VIRTUAL_SOURCE_ID {
                return Err(GraphError::EdgeIntoSource { from: node.id });
            }
            if !nodes.contains_key(&to) {
                return Err(GraphError::DanglingEdge { from: node.id, to });
            }
        }
    }

    Ok(nodes)
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// DFS tricolor cycle check. Reports the back edge that closes the cycle.
fn check_acyclic(nodes: &BTreeMap<u64, &AdjacencyNode>) -> Result<(), GraphError> {
    let mut colors: HashMap<u64, Color> = nodes.keys().map(|&id| (id, Color::White)).collect();

    fn visit(
        id: u64,
        nodes: &BTreeMap<u64, &AdjacencyNode>,
        colors: &mut HashMap<u64, Color>,
    ) -> Result<(), GraphError> {
        colors.insert(id, Color::Gray);
        for &to in &nodes[&id].to {
            match colors[&to] {
                Color::Gray => return Err(GraphError::Cycle { from: id, to }),
                Color::White => visit(to, nodes, colors)?,
                Color::Black => {}
            }
        }
        colors.insert(id, Color::Black);
        Ok(())
    }

    for &id in nodes.keys() {
        if colors[&id] == Color::White {
            visit(id, nodes, &mut colors)?;
        }
    }
    Ok(())
}

/// Enumerate all simple paths from the virtual source to each sink.
///
/// Children are walked in ascending id order (the canonical edge order), so
/// the emitted sequence is deterministic. The virtual source is dropped from
/// every path.
fn enumerate_paths(
    nodes: &BTreeMap<u64, &AdjacencyNode>,
    max_paths: usize,
) -> Result<Vec<Path>, GraphError> {
    fn walk(
        id: u64,
        nodes: &BTreeMap<u64, &AdjacencyNode>,
        trail: &mut Path,
        paths: &mut Vec<Path>,
        max_paths: usize,
    ) -> Result<(), GraphError> {
        let node = nodes[&id];
        if node.to.is_empty() {
            if paths.len() >= max_paths {
                return Err(GraphError::TooManyPaths { limit: max_paths });
            }
            paths.push(trail.clone());
            return Ok(());
        }
        for &to in &node.to {
            let next = nodes[&to];
            trail.push(PathNode { id: next.id, operation: next.operation.clone() });
            walk(to, nodes, trail, paths, max_paths)?;
            trail.pop();
        }
        Ok(())
    }

    let mut paths = Vec::new();
    let source = nodes[&VIRTUAL_SOURCE_ID];
    if source.to.is_empty() {
        return Ok(paths);
    }
    let mut trail = Path::new();
    walk(VIRTUAL_SOURCE_ID, nodes, &mut trail, &mut paths, max_paths)?;
    Ok(paths)
}

/// Compilation cache keyed by content hash, so each distinct graph compiles
/// once per process regardless of how many records reference it.
pub struct CompileCache {
    max_paths: usize,
    compiled: Mutex<HashMap<String, Arc<Compiled>>>,
}

impl CompileCache {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_PATHS)
    }

    pub fn with_limit(max_paths: usize) -> Self {
        Self { max_paths, compiled: Mutex::new(HashMap::new()) }
    }

    /// Look up the compiled form, compiling on a miss. Errors are not
    /// cached; a corrected graph has a different hash anyway.
    pub fn get_or_compile(&self, adjacency: &[AdjacencyNode]) -> Result<Arc<Compiled>, GraphError> {
        let hash = adjacency_hash(adjacency);
        if let Some(compiled) = self.compiled.lock().get(&hash) {
            return Ok(Arc::clone(compiled));
        }

        let compiled = Arc::new(compile_with_limit(adjacency, self.max_paths)?);
        self.compiled.lock().insert(hash, Arc::clone(&compiled));
        Ok(compiled)
    }

    pub fn len(&self) -> usize {
        self.compiled.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.lock().is_empty()
    }
}

impl Default for CompileCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "compile_tests.rs"]
mod compile_tests;
