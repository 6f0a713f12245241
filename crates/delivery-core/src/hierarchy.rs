//! Label-addressed class hierarchy resolution.
//!
//! Given a root class and an ordered list of labels, [`ClassResolver`] follows
//! the longest existing path of children whose labels match, then creates one
//! new child per remaining label. Resolving the same labels twice from the
//! same root reaches the same node and creates nothing the second time.

use std::sync::Arc;

use delivery_state::{ClassNode, ResourceStore, ResourceUri};
use tracing::debug;

use crate::domain::Result;

pub struct ClassResolver {
    store: Arc<dyn ResourceStore>,
}

impl ClassResolver {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// Resolve `labels` below `root`, creating missing classes.
    ///
    /// An empty label list returns the root unchanged.
    pub async fn resolve(&self, root: &ResourceUri, labels: &[String]) -> Result<ClassNode> {
        let root = self.store.get_class(root).await?;
        let (mut current, missing) = self.deepest_match(root, labels).await?;

        for label in missing {
            current = self.store.create_sub_class(&current.uri, label).await?;
            debug!(class = %current.uri, label = %label, "created delivery class");
        }
        Ok(current)
    }

    /// Walk down while a direct child matches the next label. Returns the
    /// deepest matched node and the labels left unconsumed.
    async fn deepest_match<'a>(
        &self,
        mut current: ClassNode,
        mut labels: &'a [String],
    ) -> Result<(ClassNode, &'a [String])> {
        while let Some((next, rest)) = labels.split_first() {
            let children = self.store.sub_classes(&current.uri).await?;
            match children.into_iter().find(|c| &c.label == next) {
                Some(child) => {
                    current = child;
                    labels = rest;
                }
                None => break,
            }
        }
        Ok((current, labels))
    }
}
