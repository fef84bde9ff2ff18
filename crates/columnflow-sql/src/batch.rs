//! Batch lineage over many named statements
//!
//! Statements are parsed once, ordered by the relations they read, and
//! resolved one at a time. Each successful statement's output columns become
//! an input table for the statements after it.

use crate::collect::RelationReads;
use crate::engine::LineageEngine;
use crate::parser::ParsedSql;
use columnflow_catalog::{CatalogError, InMemoryCatalog, RelationName};
use columnflow_core::{
    is_placeholder, Config, DialectConfig, Diagnostic, InputTableDict, LineageReport, LineageResult,
    OutputConfig, Severity, StatementGraph, StatementRecord,
};
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// One named statement of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchStatement {
    pub name: String,
    pub sql: String,
    /// Dialect tried before the configured order
    pub dialect: Option<DialectConfig>,
}

impl BatchStatement {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
            dialect: None,
        }
    }

    pub fn with_dialect(mut self, dialect: DialectConfig) -> Self {
        self.dialect = Some(dialect);
        self
    }
}

/// Everything a batch run produced
#[derive(Debug)]
pub struct BatchOutcome {
    pub report: LineageReport,
    /// Resolved statements, in resolution order
    pub results: IndexMap<String, LineageResult>,
    /// Input tables after the run, including every statement's outputs
    pub inputs: InputTableDict,
    pub graph: StatementGraph,
}

/// Resolves a batch of statements in dependency order
pub struct BatchRunner {
    engine: LineageEngine,
    output: OutputConfig,
    inputs: InputTableDict,
}

impl BatchRunner {
    pub fn new(engine: LineageEngine) -> Self {
        Self {
            engine,
            output: OutputConfig::default(),
            inputs: InputTableDict::new(),
        }
    }

    /// Runner for a project config, loading its catalog file if one is set
    pub fn from_config(config: &Config) -> Result<Self, CatalogError> {
        let mut engine = LineageEngine::from_config(config);
        if let Some(path) = config.catalog_path() {
            let catalog = Arc::new(InMemoryCatalog::from_file(&path)?);
            tracing::info!(path = %path.display(), tables = catalog.table_count(), "loaded catalog");
            engine = engine.with_catalog(catalog.clone()).with_partitions(catalog);
        }

        Ok(Self {
            engine,
            output: config.output.clone(),
            inputs: InputTableDict::new(),
        })
    }

    /// Seed the run with known table schemas
    pub fn with_inputs(mut self, inputs: InputTableDict) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_output(mut self, output: OutputConfig) -> Self {
        self.output = output;
        self
    }

    pub fn engine(&self) -> &LineageEngine {
        &self.engine
    }

    /// Resolve every statement; failures are recorded, never fatal
    pub fn run(&self, statements: &[BatchStatement]) -> BatchOutcome {
        let mut report = LineageReport::new();
        let parsed = self.parse_all(statements, &mut report);

        let (graph, read_names) = statement_graph(&parsed);
        let ordering = graph.topological_order();
        if !ordering.cyclic.is_empty() {
            tracing::warn!(
                statements = ?ordering.cyclic,
                "statements read each other in a cycle; resolving them in input order"
            );
        }

        let mut inputs = self.inputs.clone();
        let mut results = IndexMap::new();
        for name in &ordering.order {
            let Some(statement) = parsed.get(name) else {
                continue;
            };

            match self.engine.resolve_statement(&statement.statement, &inputs) {
                Ok(result) => {
                    tracing::debug!(
                        statement = %name,
                        columns = result.column_dict.len(),
                        tables = result.table_list.len(),
                        "resolved statement"
                    );
                    register_outputs(&mut inputs, name, &result, read_names.get(name));
                    for diagnostic in &result.diagnostics {
                        report.add_diagnostic(diagnostic.clone().with_statement(name.as_str()));
                    }
                    results.insert(name.clone(), result);
                }
                Err(e) => {
                    tracing::warn!(statement = %name, error = %e, "statement left unprocessed");
                    report.add_diagnostic(
                        Diagnostic::new(e.code(), Severity::Error, e.to_string()).with_statement(name.as_str()),
                    );
                    report.add_unprocessed(name.as_str(), e.to_string());
                }
            }
        }

        let keys = self.record_keys(&results);
        for (name, result) in &results {
            let key = keys.get(name).cloned().unwrap_or_else(|| name.clone());
            report.add_statement(result.to_record(key));
        }
        if self.output.synthesize_base_tables {
            for record in self.base_table_records(&results, &keys, &read_names) {
                report.add_base_table(record);
            }
        }

        tracing::info!(
            processed = report.summary.statements_processed,
            unprocessed = report.summary.statements_unprocessed,
            base_tables = report.summary.base_tables,
            "batch complete"
        );

        BatchOutcome {
            report,
            results,
            inputs,
            graph,
        }
    }

    fn parse_all(&self, statements: &[BatchStatement], report: &mut LineageReport) -> IndexMap<String, ParsedSql> {
        let mut parsed = IndexMap::new();
        for statement in statements {
            match self.engine.parser().parse(&statement.sql, statement.dialect) {
                Ok(result) => {
                    tracing::trace!(statement = %statement.name, dialect = %result.dialect, "parsed statement");
                    if parsed.insert(statement.name.clone(), result).is_some() {
                        tracing::warn!(statement = %statement.name, "duplicate statement name; keeping the later one");
                    }
                }
                Err(e) => {
                    tracing::warn!(statement = %statement.name, error = %e, "statement could not be parsed");
                    report.add_diagnostic(e.to_diagnostic().with_statement(statement.name.as_str()));
                    report.add_unprocessed(statement.name.as_str(), e.to_string());
                }
            }
        }
        parsed
    }

    /// Statement name -> the key its record is stored under
    ///
    /// With schema-name guessing on, a bare statement name that matches the
    /// last segment of exactly one schema-qualified table read elsewhere is
    /// re-keyed under that qualified name.
    fn record_keys(&self, results: &IndexMap<String, LineageResult>) -> HashMap<String, String> {
        let mut keys = HashMap::new();
        if !self.output.guess_schema_names {
            return keys;
        }

        let qualified: BTreeSet<&String> = results
            .values()
            .flat_map(|result| result.table_list.iter())
            .filter(|table| table.contains('.'))
            .collect();

        for name in results.keys().filter(|name| !name.contains('.')) {
            let matches: Vec<&&String> = qualified
                .iter()
                .filter(|table| RelationName::parse(table).table().eq_ignore_ascii_case(name))
                .collect();
            if let [table] = matches.as_slice() {
                tracing::debug!(statement = %name, key = %table, "guessed schema-qualified name");
                keys.insert(name.clone(), (**table).clone());
            }
        }
        keys
    }

    /// Leaf records for tables that no statement defines
    fn base_table_records(
        &self,
        results: &IndexMap<String, LineageResult>,
        keys: &HashMap<String, String>,
        read_names: &ReadNames,
    ) -> Vec<StatementRecord> {
        let mut defined: BTreeSet<String> = results
            .iter()
            .flat_map(|(name, result)| {
                [Some(name.to_lowercase()), keys.get(name).map(|key| key.to_lowercase()), result.target.as_ref().map(|t| t.to_lowercase())]
            })
            .flatten()
            .collect();
        for (name, reads) in read_names {
            if results.contains_key(name) {
                defined.extend(reads.iter().map(|read| read.to_lowercase()));
            }
        }

        let reached: BTreeSet<&String> = results
            .values()
            .flat_map(|result| result.table_list.iter())
            .filter(|table| !defined.contains(&table.to_lowercase()))
            .collect();

        reached
            .into_iter()
            .map(|table| StatementRecord::base_table(table.clone(), self.base_table_columns(table, results)))
            .collect()
    }

    /// Catalog columns, then seeded inputs, then columns observed in dependencies
    fn base_table_columns(&self, table: &str, results: &IndexMap<String, LineageResult>) -> Vec<String> {
        if let Some(catalog) = self.engine.catalog() {
            if let Ok(columns) = catalog.lookup_columns(&RelationName::parse(table)) {
                if !columns.is_empty() {
                    return columns;
                }
            }
        }
        if let Some(columns) = self.inputs.get(table) {
            return columns.to_vec();
        }

        let prefix = format!("{}.", table);
        let observed: BTreeSet<String> = results
            .values()
            .flat_map(|result| result.column_dict.values())
            .flat_map(|deps| deps.all())
            .filter_map(|dep| dep.strip_prefix(&prefix))
            .filter(|column| !column.contains('.') && !is_placeholder(column))
            .map(str::to_string)
            .collect();
        observed.into_iter().collect()
    }
}

/// Statement name -> qualified names other statements read it under
type ReadNames = HashMap<String, BTreeSet<String>>;

/// Register a resolved statement's outputs for the statements after it
///
/// Outputs go in under the statement name, its DDL/DML target and every
/// qualified name it was read under. A statement with unexpanded star
/// placeholders has no reliable column list and is left out, so readers see
/// it as unknown.
fn register_outputs(
    inputs: &mut InputTableDict,
    name: &str,
    result: &LineageResult,
    read_as: Option<&BTreeSet<String>>,
) {
    let columns = result.column_names();
    if columns.iter().any(|column| is_placeholder(column)) {
        return;
    }

    let mut names: BTreeSet<&str> = read_as.into_iter().flatten().map(String::as_str).collect();
    if let Some(target) = &result.target {
        names.insert(target.as_str());
    }
    names.remove(name);
    for alias in names {
        inputs.insert(alias, columns.clone());
    }
    inputs.insert(name.to_string(), columns);
}

/// Edges from each statement to the batch statements it reads
///
/// A read like `mart.orders` that only matches the bare statement `orders`
/// by its last segment is remembered so the statement's outputs can be
/// registered under that name too.
fn statement_graph(parsed: &IndexMap<String, ParsedSql>) -> (StatementGraph, ReadNames) {
    let mut defined: HashMap<String, String> = HashMap::new();
    for (name, statement) in parsed {
        defined.insert(name.to_lowercase(), name.clone());
        if let Some(target) = statement.target() {
            defined.entry(target.to_lowercase()).or_insert_with(|| name.clone());
        }
    }

    let mut read_names = ReadNames::new();
    let mut reads = Vec::with_capacity(parsed.len());
    for (name, statement) in parsed {
        let target = statement.target().map(|target| target.to_lowercase());
        let mut parents = Vec::new();

        for read in RelationReads::of(&statement.statement) {
            let lowered = read.to_lowercase();
            if Some(&lowered) == target.as_ref() {
                continue;
            }
            if let Some(parent) = defined.get(&lowered) {
                parents.push(parent.clone());
                continue;
            }
            let short = RelationName::parse(&lowered).table().to_string();
            if let Some(parent) = defined.get(&short) {
                read_names.entry(parent.clone()).or_default().insert(read);
                parents.push(parent.clone());
            }
        }
        reads.push((name.clone(), parents));
    }

    (StatementGraph::from_reads(reads), read_names)
}
