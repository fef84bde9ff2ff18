//! WITH clause resolution

use crate::engine::{rename_columns, StatementResolver};
use crate::error::ResolutionError;
use crate::registry::RelationEntry;
use crate::relations::alias_columns;
use sqlparser::ast::With;
use indexmap::IndexMap;

impl StatementResolver<'_> {
    /// Resolve each CTE in textual order and make it visible to later ones
    ///
    /// Pushes a frame onto the CTE stack; the caller pops it once the query
    /// body that owns the WITH clause is resolved.
    pub(crate) fn resolve_with(&mut self, with: &With) -> Result<(), ResolutionError> {
        if with.recursive {
            tracing::debug!("recursive WITH resolved as a plain WITH");
        }
        self.cte_frames.push(IndexMap::new());

        for cte in &with.cte_tables {
            let name = cte.alias.name.value.clone();
            let defined_here = self
                .cte_frames
                .last()
                .is_some_and(|frame| frame.keys().any(|key| key.eq_ignore_ascii_case(&name)));
            if defined_here {
                return Err(ResolutionError::DuplicateRelation(name));
            }

            let output = self.resolve_query(&cte.query, false)?;
            let entry = RelationEntry {
                columns: rename_columns(output.columns, &alias_columns(&cte.alias)),
                base_tables: output.base_tables,
            };

            let registered = self.ctx.registry.unique_name(&name);
            tracing::debug!(
                cte = %name,
                relation = %registered,
                columns = entry.columns.len(),
                "resolved CTE"
            );
            self.ctx.registry.register(registered.clone(), entry)?;
            if let Some(frame) = self.cte_frames.last_mut() {
                frame.insert(name, registered);
            }
        }
        Ok(())
    }

    /// Registry name of a CTE visible from the current position
    pub(crate) fn visible_cte(&self, name: &str) -> Option<String> {
        self.cte_frames.iter().rev().find_map(|frame| {
            frame
                .get(name)
                .or_else(|| {
                    frame
                        .iter()
                        .find(|(key, _)| key.eq_ignore_ascii_case(name))
                        .map(|(_, registered)| registered)
                })
                .cloned()
        })
    }
}
