//! Merge of incremental rows with the live table
//!
//! Builds the union table for the large incremental path. A live row is
//! superseded when an incoming row shares its primary key and the live row's
//! freshness value is not newer; an incoming row is dropped when a live row
//! with the same key is strictly newer. Ties and unknown freshness go to the
//! incoming row, so each key appears exactly once in the union.

use tracing::debug;

use crate::store::{StoreResult, TargetStore, quote_list};

/// Tables and columns taking part in a merge
#[derive(Debug, Clone)]
pub struct MergePlan<'a> {
    pub target: &'a str,
    pub incremental: &'a str,
    pub merged: &'a str,
    pub columns: &'a [String],
    pub primary_key: &'a [String],
    pub freshness_column: &'a str,
}

impl MergePlan<'_> {
    /// Statement copying live rows that no incoming row supersedes
    pub fn surviving_rows_statement<S: TargetStore + ?Sized>(&self, store: &S) -> String {
        let mut sql = self.insert_select(store, self.target, "t");
        if !self.primary_key.is_empty() {
            let fresh_t = format!("t.{}", store.quote_identifier(self.freshness_column));
            let fresh_i = format!("i.{}", store.quote_identifier(self.freshness_column));
            sql.push_str(&format!(
                " WHERE NOT EXISTS (SELECT 1 FROM {} i WHERE {} AND ({} <= {} OR {} IS NULL OR {} IS NULL))",
                store.quote_identifier(self.incremental),
                self.key_match(store),
                fresh_t,
                fresh_i,
                fresh_t,
                fresh_i
            ));
        }
        sql
    }

    /// Statement copying incoming rows not older than a live row
    pub fn incoming_rows_statement<S: TargetStore + ?Sized>(&self, store: &S) -> String {
        let mut sql = self.insert_select(store, self.incremental, "i");
        if !self.primary_key.is_empty() {
            sql.push_str(&format!(
                " WHERE NOT EXISTS (SELECT 1 FROM {} t WHERE {} AND t.{} > i.{})",
                store.quote_identifier(self.target),
                self.key_match(store),
                store.quote_identifier(self.freshness_column),
                store.quote_identifier(self.freshness_column)
            ));
        }
        sql
    }

    fn insert_select<S: TargetStore + ?Sized>(&self, store: &S, source: &str, alias: &str) -> String {
        let projection = self
            .columns
            .iter()
            .map(|c| format!("{}.{}", alias, store.quote_identifier(c)))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) SELECT {} FROM {} {}",
            store.quote_identifier(self.merged),
            quote_list(store, self.columns),
            projection,
            store.quote_identifier(source),
            alias
        )
    }

    fn key_match<S: TargetStore + ?Sized>(&self, store: &S) -> String {
        self.primary_key
            .iter()
            .map(|k| {
                let k = store.quote_identifier(k);
                format!("i.{} = t.{}", k, k)
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Fill the (already created) union table
    pub fn execute<S: TargetStore + ?Sized>(&self, store: &mut S) -> StoreResult<(usize, usize)> {
        let surviving = store.execute(&self.surviving_rows_statement(&*store))?;
        let incoming = store.execute(&self.incoming_rows_statement(&*store))?;
        debug!(
            "Merged {} live rows and {} incoming rows into {}",
            surviving, incoming, self.merged
        );
        Ok((surviving, incoming))
    }
}
