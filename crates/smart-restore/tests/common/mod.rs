//! In-memory source and target stores plus a small fixture schema.
//!
//! `MemorySource` evaluates the structured predicates the engine builds;
//! `MemoryTarget` buffers writes per transaction and applies upsert
//! semantics on commit, so scheduling differences between the writers are
//! observable.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use smart_restore::core::RowIdentity;
use smart_restore::writer::build_writer;
use smart_restore::{
    Catalog, Column, FanoutSet, ForeignKey, Predicate, ProgressTracker, RestoreError, Restorer,
    Result, Row, RowReader, RowSource, SqlValue, Table, TargetConnection, TargetConnector,
    WriterMode,
};

// =============================================================================
// Schema builders
// =============================================================================

pub fn column(name: &str, data_type: &str) -> Column {
    Column {
        name: name.to_string(),
        data_type: data_type.to_string(),
        is_nullable: true,
        default: None,
        is_identity: false,
        is_generated: false,
    }
}

pub fn serial(name: &str, sequence: &str) -> Column {
    Column {
        is_nullable: false,
        default: Some(format!("nextval('{}'::regclass)", sequence)),
        ..column(name, "integer")
    }
}

pub fn identity(name: &str) -> Column {
    Column {
        is_nullable: false,
        is_identity: true,
        ..column(name, "integer")
    }
}

pub fn fk(constraint: &str, column: &str, ref_table: &str, ref_column: &str, position: i32) -> ForeignKey {
    ForeignKey {
        constraint: constraint.to_string(),
        column: column.to_string(),
        ref_table: ref_table.to_string(),
        ref_column: ref_column.to_string(),
        position,
    }
}

pub fn table(name: &str, columns: Vec<Column>, pk: &[&str], foreign_keys: Vec<ForeignKey>) -> Table {
    Table {
        schema: "public".to_string(),
        name: name.to_string(),
        columns,
        primary_key: pk.iter().map(|c| c.to_string()).collect(),
        foreign_keys,
    }
}

/// customers <- addresses, customers/addresses <- orders <- order_lines <- shipments,
/// orders <- order_tags, plus self-referencing employees.
pub fn shop_catalog() -> Catalog {
    Catalog::from_tables(
        "public",
        [
            table(
                "customers",
                vec![serial("id", "customers_id_seq"), column("name", "text")],
                &["id"],
                vec![],
            ),
            table(
                "addresses",
                vec![identity("id"), column("customer_id", "integer"), column("city", "text")],
                &["id"],
                vec![fk("addresses_customer_id_fkey", "customer_id", "customers", "id", 1)],
            ),
            table(
                "orders",
                vec![
                    serial("id", "orders_id_seq"),
                    column("customer_id", "integer"),
                    column("address_id", "integer"),
                    column("note", "text"),
                ],
                &["id"],
                vec![
                    fk("orders_customer_id_fkey", "customer_id", "customers", "id", 1),
                    fk("orders_address_id_fkey", "address_id", "addresses", "id", 1),
                ],
            ),
            table(
                "order_lines",
                vec![
                    column("order_id", "integer"),
                    column("line_no", "integer"),
                    column("sku", "text"),
                ],
                &["order_id", "line_no"],
                vec![fk("order_lines_order_id_fkey", "order_id", "orders", "id", 1)],
            ),
            table(
                "shipments",
                vec![
                    column("id", "integer"),
                    column("order_id", "integer"),
                    column("line_no", "integer"),
                ],
                &["id"],
                vec![
                    fk("shipments_line_fkey", "order_id", "order_lines", "order_id", 1),
                    fk("shipments_line_fkey", "line_no", "order_lines", "line_no", 2),
                ],
            ),
            table(
                "order_tags",
                vec![column("order_id", "integer"), column("tag", "text")],
                &["order_id", "tag"],
                vec![fk("order_tags_order_id_fkey", "order_id", "orders", "id", 1)],
            ),
            table(
                "employees",
                vec![
                    column("id", "integer"),
                    column("manager_id", "integer"),
                    column("name", "text"),
                ],
                &["id"],
                vec![fk("employees_manager_id_fkey", "manager_id", "employees", "id", 1)],
            ),
        ],
    )
}

pub fn customer(id: i32, name: &str) -> Row {
    Row::from_pairs([("id", SqlValue::I32(id)), ("name", name.into())])
}

pub fn address(id: i32, customer_id: i32, city: &str) -> Row {
    Row::from_pairs([
        ("id", SqlValue::I32(id)),
        ("customer_id", SqlValue::I32(customer_id)),
        ("city", city.into()),
    ])
}

pub fn order(id: i32, customer_id: i32, address_id: Option<i32>, note: &str) -> Row {
    Row::from_pairs([
        ("id", SqlValue::I32(id)),
        ("customer_id", SqlValue::I32(customer_id)),
        ("address_id", address_id.into()),
        ("note", note.into()),
    ])
}

pub fn order_line(order_id: i32, line_no: i32, sku: &str) -> Row {
    Row::from_pairs([
        ("order_id", SqlValue::I32(order_id)),
        ("line_no", SqlValue::I32(line_no)),
        ("sku", sku.into()),
    ])
}

pub fn shipment(id: i32, order_id: i32, line_no: i32) -> Row {
    Row::from_pairs([
        ("id", SqlValue::I32(id)),
        ("order_id", SqlValue::I32(order_id)),
        ("line_no", SqlValue::I32(line_no)),
    ])
}

pub fn employee(id: i32, manager_id: Option<i32>, name: &str) -> Row {
    Row::from_pairs([
        ("id", SqlValue::I32(id)),
        ("manager_id", manager_id.into()),
        ("name", name.into()),
    ])
}

/// Source data for [`shop_catalog`].
pub fn shop_source() -> MemorySource {
    MemorySource::new()
        .with_rows("customers", vec![customer(5, "ada"), customer(6, "bob")])
        .with_rows("addresses", vec![address(10, 5, "Paris"), address(11, 6, "Oslo")])
        .with_rows(
            "orders",
            vec![
                order(1, 5, Some(10), "first"),
                order(2, 6, Some(11), "second"),
                order(3, 5, None, "third"),
            ],
        )
        .with_rows(
            "order_lines",
            vec![
                order_line(1, 1, "A"),
                order_line(1, 2, "B"),
                order_line(3, 1, "C"),
                order_line(2, 1, "D"),
            ],
        )
        .with_rows(
            "shipments",
            vec![shipment(100, 1, 2), shipment(101, 3, 1), shipment(102, 1, 1)],
        )
        .with_rows(
            "order_tags",
            vec![Row::from_pairs([("order_id", SqlValue::I32(1)), ("tag", "gift".into())])],
        )
        .with_rows(
            "employees",
            vec![
                employee(1, None, "ceo"),
                employee(2, Some(1), "cto"),
                employee(3, Some(1), "cfo"),
                employee(4, Some(2), "engineer"),
            ],
        )
}

pub fn in_ids(values: &[i32]) -> Predicate {
    Predicate::In {
        column: "id".to_string(),
        values: values.iter().map(|v| SqlValue::I32(*v)).collect(),
    }
}

// =============================================================================
// Memory source
// =============================================================================

/// Row source over in-memory tables. Records every table it is asked for.
#[derive(Default)]
pub struct MemorySource {
    tables: HashMap<String, Vec<Row>>,
    queries: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, table: &str, rows: Vec<Row>) -> Self {
        self.tables.insert(table.to_string(), rows);
        self
    }

    /// Tables queried so far, in order, one entry per page.
    pub fn queried_tables(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn was_queried(&self, table: &str) -> bool {
        self.queries.lock().unwrap().iter().any(|t| t == table)
    }
}

pub fn evaluate(predicate: &Predicate, row: &Row) -> bool {
    match predicate {
        Predicate::All => true,
        Predicate::Raw(fragment) => panic!("memory source cannot evaluate raw SQL: {}", fragment),
        Predicate::In { column, values } => row
            .get(column)
            .map(|v| values.contains(v))
            .unwrap_or(false),
        Predicate::AnyOf(tuples) => tuples.iter().any(|tuple| {
            tuple
                .iter()
                .all(|(column, value)| row.get(column) == Some(value))
        }),
    }
}

#[async_trait]
impl RowSource for MemorySource {
    async fn fetch_page(
        &self,
        table: &Table,
        predicate: &Predicate,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Row>> {
        self.queries.lock().unwrap().push(table.name.clone());
        let rows = self.tables.get(&table.name).cloned().unwrap_or_default();
        Ok(rows
            .into_iter()
            .filter(|row| evaluate(predicate, row))
            .skip(offset)
            .take(limit)
            .collect())
    }
}

// =============================================================================
// Memory target
// =============================================================================

#[derive(Default)]
struct TargetState {
    /// table -> identity key -> row
    tables: HashMap<String, BTreeMap<Vec<(String, String)>, Row>>,
    /// Applied upserts in order: (table, row count).
    log: Vec<(String, usize)>,
    sequences: HashMap<String, i64>,
    fail_on: Option<String>,
    commits: usize,
}

impl TargetState {
    fn apply(&mut self, table: &Table, rows: &[Row]) {
        let stored = self.tables.entry(table.name.clone()).or_default();
        for row in rows {
            let key = RowIdentity::of(&table.name, &table.primary_key, row).key;
            let key_only = row.columns().iter().all(|c| table.is_pk_column(c));
            if key_only && stored.contains_key(&key) {
                continue;
            }
            stored.insert(key, row.clone());
        }
        self.log.push((table.name.clone(), rows.len()));
    }
}

/// Target store shared by every connection it hands out.
#[derive(Clone, Default)]
pub struct MemoryTarget {
    state: Arc<Mutex<TargetState>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every upsert into `table`.
    pub fn fail_on(&self, table: &str) {
        self.state.lock().unwrap().fail_on = Some(table.to_string());
    }

    /// Committed rows of `table`, ordered by key.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Integer ids of the committed rows of `table`.
    pub fn ids(&self, table: &str) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .rows(table)
            .iter()
            .filter_map(|row| row.get("id").and_then(SqlValue::as_i64))
            .collect();
        ids.sort();
        ids
    }

    /// Applied upserts in order.
    pub fn log(&self) -> Vec<(String, usize)> {
        self.state.lock().unwrap().log.clone()
    }

    /// Order in which tables first received rows.
    pub fn table_order(&self) -> Vec<String> {
        let mut order: Vec<String> = Vec::new();
        for (table, _) in self.log() {
            if !order.contains(&table) {
                order.push(table);
            }
        }
        order
    }

    pub fn commits(&self) -> usize {
        self.state.lock().unwrap().commits
    }

    /// Value `nextval` would return for `sequence`.
    pub fn next_value(&self, sequence: &str) -> i64 {
        self.state
            .lock()
            .unwrap()
            .sequences
            .get(sequence)
            .copied()
            .unwrap_or(0)
            + 1
    }
}

#[async_trait]
impl TargetConnector for MemoryTarget {
    async fn connect(&self) -> Result<Box<dyn TargetConnection>> {
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
            pending: None,
        }))
    }
}

struct MemoryConnection {
    state: Arc<Mutex<TargetState>>,
    pending: Option<Vec<(Table, Vec<Row>)>>,
}

#[async_trait]
impl TargetConnection for MemoryConnection {
    async fn begin(&mut self) -> Result<()> {
        self.pending = Some(Vec::new());
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let ops = self.pending.take().unwrap_or_default();
        let mut state = self.state.lock().unwrap();
        for (table, rows) in &ops {
            state.apply(table, rows);
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.pending = None;
        Ok(())
    }

    async fn upsert(&mut self, table: &Table, rows: &[Row]) -> Result<u64> {
        if !table.has_pk() {
            return Err(RestoreError::NoPrimaryKey(table.full_name()));
        }
        if self.state.lock().unwrap().fail_on.as_deref() == Some(table.name.as_str()) {
            return Err(RestoreError::write(&table.name, "injected failure"));
        }
        match self.pending.as_mut() {
            Some(pending) => pending.push((table.clone(), rows.to_vec())),
            None => self.state.lock().unwrap().apply(table, rows),
        }
        Ok(rows.len() as u64)
    }

    async fn serial_sequence(&mut self, table: &Table, column: &str) -> Result<Option<String>> {
        Ok(Some(format!("{}_{}_seq", table.name, column)))
    }

    async fn reset_sequence(
        &mut self,
        table: &Table,
        column: &str,
        sequence: &str,
    ) -> Result<Option<i64>> {
        let mut state = self.state.lock().unwrap();
        let max = state.tables.get(&table.name).and_then(|rows| {
            rows.values()
                .filter_map(|row| row.get(column).and_then(SqlValue::as_i64))
                .max()
        });
        if let Some(max) = max {
            state.sequences.insert(sequence.to_string(), max);
        }
        Ok(max)
    }
}

// =============================================================================
// Wiring
// =============================================================================

/// Build a restorer over the given stores with small pages and batches.
pub fn restorer(
    catalog: &Catalog,
    source: Arc<MemorySource>,
    target: &MemoryTarget,
    mode: WriterMode,
    exclude: &[&str],
) -> Restorer {
    let catalog = Arc::new(catalog.clone());
    let reader = RowReader::new(
        source,
        Arc::clone(&catalog),
        exclude.iter().map(|t| t.to_string()),
        2,
    );
    let writer = build_writer(
        mode,
        catalog,
        Arc::new(target.clone()),
        ProgressTracker::default(),
    );
    Restorer::new(reader, writer, 2)
}

pub fn fanout(tables: &[&str]) -> FanoutSet {
    FanoutSet::new(tables.iter().copied())
}

pub const PIPELINED: WriterMode = WriterMode::Pipelined {
    queue_capacity: None,
};
