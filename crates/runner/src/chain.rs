// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The five native handles of one runner and their release order.
//!
//! Handles are recorded in the order they are created. [`HandleChain::release`]
//! walks that record backwards, so teardown order is an explicit sequence
//! rather than a consequence of field drop order.

use crate::{CompiledModel, ModelBuilder, ModelGraph, ProfileTable, ProfileTableBuilder};

/// One link of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ModelGraph,
    ProfileTableBuilder,
    ProfileTable,
    ModelBuilder,
    CompiledModel,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::ModelGraph => "model graph",
            Stage::ProfileTableBuilder => "profile table builder",
            Stage::ProfileTable => "profile table",
            Stage::ModelBuilder => "model builder",
            Stage::CompiledModel => "compiled model",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owns every handle created for a runner. Any subset may be absent.
#[derive(Debug, Default)]
pub struct HandleChain {
    graph: Option<ModelGraph>,
    table_builder: Option<ProfileTableBuilder>,
    table: Option<ProfileTable>,
    model_builder: Option<ModelBuilder>,
    model: Option<CompiledModel>,
    created: Vec<Stage>,
}

impl HandleChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, stage: Stage, replaced: bool) {
        if !replaced {
            self.created.push(stage);
        }
    }

    pub fn set_graph(&mut self, graph: ModelGraph) -> &mut ModelGraph {
        let replaced = self.graph.is_some();
        self.record(Stage::ModelGraph, replaced);
        self.graph.insert(graph)
    }

    pub fn set_table_builder(&mut self, builder: ProfileTableBuilder) -> &mut ProfileTableBuilder {
        let replaced = self.table_builder.is_some();
        self.record(Stage::ProfileTableBuilder, replaced);
        self.table_builder.insert(builder)
    }

    pub fn set_table(&mut self, table: ProfileTable) -> &mut ProfileTable {
        let replaced = self.table.is_some();
        self.record(Stage::ProfileTable, replaced);
        self.table.insert(table)
    }

    pub fn set_model_builder(&mut self, builder: ModelBuilder) -> &mut ModelBuilder {
        let replaced = self.model_builder.is_some();
        self.record(Stage::ModelBuilder, replaced);
        self.model_builder.insert(builder)
    }

    pub fn set_model(&mut self, model: CompiledModel) -> &mut CompiledModel {
        let replaced = self.model.is_some();
        self.record(Stage::CompiledModel, replaced);
        self.model.insert(model)
    }

    pub fn graph(&self) -> Option<&ModelGraph> {
        self.graph.as_ref()
    }

    /// Borrows the graph mutably and the profile table shared at once.
    pub fn graph_mut_and_table(&mut self) -> (Option<&mut ModelGraph>, Option<&ProfileTable>) {
        (self.graph.as_mut(), self.table.as_ref())
    }

    pub fn table_builder(&self) -> Option<&ProfileTableBuilder> {
        self.table_builder.as_ref()
    }

    pub fn table(&self) -> Option<&ProfileTable> {
        self.table.as_ref()
    }

    pub fn model_builder(&self) -> Option<&ModelBuilder> {
        self.model_builder.as_ref()
    }

    pub fn model(&self) -> Option<&CompiledModel> {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> Option<&mut CompiledModel> {
        self.model.as_mut()
    }

    /// Stages currently held, in creation order.
    pub fn stages(&self) -> &[Stage] {
        &self.created
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }

    /// Releases every held handle in reverse creation order and returns the
    /// stages in the order they were released. A second call releases
    /// nothing.
    pub fn release(&mut self) -> Vec<Stage> {
        let mut released = Vec::with_capacity(self.created.len());
        while let Some(stage) = self.created.pop() {
            match stage {
                Stage::CompiledModel => drop(self.model.take()),
                Stage::ModelBuilder => drop(self.model_builder.take()),
                Stage::ProfileTable => drop(self.table.take()),
                Stage::ProfileTableBuilder => drop(self.table_builder.take()),
                Stage::ModelGraph => drop(self.graph.take()),
            }
            tracing::trace!(stage = stage.as_str(), "released handle");
            released.push(stage);
        }
        released
    }
}

impl Drop for HandleChain {
    fn drop(&mut self) {
        if !self.created.is_empty() {
            let released = self.release();
            tracing::debug!("handle chain dropped, released {} handles", released.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_reverses_creation_order() {
        let mut chain = HandleChain::new();
        let graph = ModelGraph::empty().unwrap();
        chain.set_graph(graph);
        chain.set_table_builder(ProfileTableBuilder::new().unwrap());
        assert_eq!(chain.stages(), &[Stage::ModelGraph, Stage::ProfileTableBuilder]);

        let released = chain.release();
        assert_eq!(released, vec![Stage::ProfileTableBuilder, Stage::ModelGraph]);
        assert!(chain.graph().is_none());
        assert!(chain.table_builder().is_none());
        assert!(chain.is_empty());
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut chain = HandleChain::new();
        chain.set_graph(ModelGraph::empty().unwrap());
        assert_eq!(chain.release().len(), 1);
        assert!(chain.release().is_empty());
    }

    #[test]
    fn test_empty_chain_releases_nothing() {
        let mut chain = HandleChain::new();
        assert!(chain.release().is_empty());
    }

    #[test]
    fn test_replacing_a_handle_keeps_one_record() {
        let mut chain = HandleChain::new();
        chain.set_graph(ModelGraph::empty().unwrap());
        chain.set_graph(ModelGraph::empty().unwrap());
        assert_eq!(chain.stages(), &[Stage::ModelGraph]);
    }
}
