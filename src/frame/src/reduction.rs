//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! The encoder dependency table and its transitive reduction.
//!
//! The compiler records one entry per (dependent encoder, producing encoder)
//! pair that exchanges data through any resource. Many of those entries are
//! redundant: if encoder 0 feeds encoder 1 and encoder 1 feeds encoder 2, a
//! direct 0→2 dependency adds nothing. Every surviving entry costs a fence,
//! so the table is reduced before fences are allocated: all-pairs shortest
//! paths over the encoder ordering, then removal of every edge bridged by
//! an intermediate encoder.
use nagare_base::{CmdIndex, StageFlags};

#[cfg(test)]
#[path = "./reduction_test.rs"]
mod reduction_test;

/// A point in the frame at which a dependency is signalled or awaited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyPoint {
    pub encoder: usize,
    pub index: CmdIndex,
    pub stages: StageFlags,
}

/// One inter-encoder dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    /// Where the producing encoder's relevant work ends.
    pub signal: DependencyPoint,
    /// Where the dependent encoder's relevant work begins.
    pub wait: DependencyPoint,
}

impl Dependency {
    /// Merge another dependency over the same encoder pair.
    ///
    /// The combined entry keeps the latest signal position and the earliest
    /// wait position, the minimal pair that still covers both underlying
    /// accesses. Stage sets are unioned.
    pub fn merge(&mut self, other: &Dependency) {
        if other.signal.index > self.signal.index {
            self.signal.index = other.signal.index;
        }
        self.signal.stages |= other.signal.stages;
        if other.wait.index < self.wait.index {
            self.wait.index = other.wait.index;
        }
        self.wait.stages |= other.wait.stages;
    }
}

/// A lower-triangular matrix of [`Dependency`] entries indexed by
/// (dependent encoder, producing encoder), dependent > producer.
#[derive(Debug)]
pub struct DependencyTable {
    num_encoders: usize,
    entries: Vec<Option<Dependency>>,
}

fn triangle_index(dependent: usize, producer: usize) -> usize {
    debug_assert!(dependent > producer);
    dependent * (dependent - 1) / 2 + producer
}

impl DependencyTable {
    pub fn new(num_encoders: usize) -> Self {
        Self {
            num_encoders,
            entries: vec![None; num_encoders * num_encoders.saturating_sub(1) / 2],
        }
    }

    pub fn num_encoders(&self) -> usize {
        self.num_encoders
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.is_none())
    }

    pub fn get(&self, dependent: usize, producer: usize) -> Option<&Dependency> {
        self.entries[triangle_index(dependent, producer)].as_ref()
    }

    /// Insert a dependency, merging with any existing entry for the pair.
    pub fn add(&mut self, dependency: Dependency) {
        let dependent = dependency.wait.encoder;
        let producer = dependency.signal.encoder;
        assert!(
            dependent > producer,
            "a dependent encoder must follow its producer"
        );
        let slot = &mut self.entries[triangle_index(dependent, producer)];
        match slot {
            Some(existing) => existing.merge(&dependency),
            None => *slot = Some(dependency),
        }
    }

    /// Drop every entry bridged by a path of other entries and return the
    /// survivors.
    ///
    /// Runs Floyd–Warshall over the strict triangle (composing path lengths
    /// by addition, `num_encoders + 1` meaning unreachable), then discards
    /// each edge (i, k) for which some intermediate j with k < j < i is
    /// reachable from i and reaches k.
    pub fn reduce(&self) -> Vec<Dependency> {
        let n = self.num_encoders;
        let max_distance = n + 1;

        let mut distance = vec![max_distance; n * n];
        for dependent in 1..n {
            for producer in 0..dependent {
                if self.get(dependent, producer).is_some() {
                    distance[dependent * n + producer] = 1;
                }
            }
        }

        for i in 0..n {
            for j in (i + 1)..n {
                if distance[j * n + i] >= max_distance {
                    continue;
                }
                for k in 0..i {
                    let through = distance[j * n + i] + distance[i * n + k];
                    if through < distance[j * n + k] {
                        distance[j * n + k] = through;
                    }
                }
            }
        }

        let reachable = |from: usize, to: usize| distance[from * n + to] < max_distance;

        let mut survivors = Vec::new();
        for dependent in 1..n {
            'edges: for producer in 0..dependent {
                let dependency = match self.get(dependent, producer) {
                    Some(x) => *x,
                    None => continue,
                };
                for intermediate in (producer + 1)..dependent {
                    if reachable(dependent, intermediate) && reachable(intermediate, producer) {
                        continue 'edges;
                    }
                }
                survivors.push(dependency);
            }
        }
        survivors
    }
}
