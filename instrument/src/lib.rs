//! Captures planner trace events as column tables for analysis in tests.
//!
//! Every `info`-level event becomes one row in the table named after its
//! target; every field becomes a column. Rows that lack a field hold a null
//! in that column, so tables with optional fields still line up.
//!
//! ```ignore
//! tracing::info!(target: "allocation", tick, producer_id, workers);
//!
//! let recorder = instrument::record(|| run_ticks());
//! let allocation = recorder.table("allocation").unwrap().to_dataframe()?;
//! ```

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use polars::prelude::*;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Record};
use tracing::{Event, Id, Metadata, Subscriber};

/// Values of one field across every row of a table.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldColumn {
    U64(Vec<Option<u64>>),
    I64(Vec<Option<i64>>),
    F64(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    Str(Vec<Option<String>>),
}

impl FieldColumn {
    pub fn len(&self) -> usize {
        match self {
            FieldColumn::U64(v) => v.len(),
            FieldColumn::I64(v) => v.len(),
            FieldColumn::F64(v) => v.len(),
            FieldColumn::Bool(v) => v.len(),
            FieldColumn::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn pad_to(&mut self, rows: usize) {
        match self {
            FieldColumn::U64(v) => v.resize(rows, None),
            FieldColumn::I64(v) => v.resize(rows, None),
            FieldColumn::F64(v) => v.resize(rows, None),
            FieldColumn::Bool(v) => v.resize(rows, None),
            FieldColumn::Str(v) => v.resize(rows, None),
        }
    }

    fn to_column(&self, name: &str) -> Column {
        match self {
            FieldColumn::U64(v) => Column::new(name.into(), v),
            FieldColumn::I64(v) => Column::new(name.into(), v),
            FieldColumn::F64(v) => Column::new(name.into(), v),
            FieldColumn::Bool(v) => Column::new(name.into(), v),
            FieldColumn::Str(v) => Column::new(name.into(), v),
        }
    }
}

/// Rows recorded under one tracing target.
#[derive(Debug, Clone, Default)]
pub struct EventTable {
    pub columns: BTreeMap<String, FieldColumn>,
    pub rows: usize,
}

impl EventTable {
    fn pad(&mut self) {
        for column in self.columns.values_mut() {
            column.pad_to(self.rows);
        }
    }

    /// Numeric column as plain `f64`s, nulls dropped. Handy for quick asserts
    /// without going through polars.
    pub fn f64_values(&self, name: &str) -> Vec<f64> {
        match self.columns.get(name) {
            Some(FieldColumn::F64(v)) => v.iter().flatten().copied().collect(),
            Some(FieldColumn::U64(v)) => v.iter().flatten().map(|x| *x as f64).collect(),
            Some(FieldColumn::I64(v)) => v.iter().flatten().map(|x| *x as f64).collect(),
            _ => Vec::new(),
        }
    }

    /// String column, nulls dropped.
    pub fn str_values(&self, name: &str) -> Vec<String> {
        match self.columns.get(name) {
            Some(FieldColumn::Str(v)) => v.iter().flatten().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Columns come out in name order.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        DataFrame::new(
            self.columns
                .iter()
                .map(|(name, column)| column.to_column(name))
                .collect(),
        )
    }
}

/// Every table recorded on this thread, keyed by target.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    pub tables: HashMap<String, EventTable>,
}

impl Recorder {
    pub fn table(&self, target: &str) -> Option<&EventTable> {
        self.tables.get(target)
    }

    /// Tables that fail to convert are skipped.
    pub fn to_dataframes(&self) -> HashMap<String, DataFrame> {
        self.tables
            .iter()
            .filter_map(|(name, table)| table.to_dataframe().ok().map(|df| (name.clone(), df)))
            .collect()
    }
}

thread_local! {
    static RECORDER: RefCell<Recorder> = RefCell::default();
}

struct RowVisitor<'a> {
    table: &'a mut EventTable,
}

impl RowVisitor<'_> {
    /// Column for `field`, created null-filled for earlier rows on first sight.
    fn column(&mut self, field: &Field, empty: fn(usize) -> FieldColumn) -> &mut FieldColumn {
        let rows = self.table.rows;
        self.table
            .columns
            .entry(field.name().to_string())
            .or_insert_with(|| empty(rows))
    }
}

// A field whose type changes between rows keeps its first type; mismatched
// values are left null.
impl Visit for RowVisitor<'_> {
    fn record_u64(&mut self, field: &Field, value: u64) {
        if let FieldColumn::U64(v) = self.column(field, |n| FieldColumn::U64(vec![None; n])) {
            v.push(Some(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if let FieldColumn::I64(v) = self.column(field, |n| FieldColumn::I64(vec![None; n])) {
            v.push(Some(value));
        }
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let FieldColumn::F64(v) = self.column(field, |n| FieldColumn::F64(vec![None; n])) {
            v.push(Some(value));
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if let FieldColumn::Bool(v) = self.column(field, |n| FieldColumn::Bool(vec![None; n])) {
            v.push(Some(value));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if let FieldColumn::Str(v) = self.column(field, |n| FieldColumn::Str(vec![None; n])) {
            v.push(Some(value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record_str(field, &format!("{value:?}"));
    }
}

/// Subscriber that appends `info` and above events to the thread-local recorder.
/// Spans are ignored.
pub struct PlanRecorder;

impl Subscriber for PlanRecorder {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.is_event() && *metadata.level() <= tracing::Level::INFO
    }

    fn new_span(&self, _span: &Attributes<'_>) -> Id {
        Id::from_u64(1)
    }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        let target = event.metadata().target().to_string();
        RECORDER.with(|r| {
            let mut recorder = r.borrow_mut();
            let table = recorder.tables.entry(target).or_default();
            event.record(&mut RowVisitor {
                table: &mut *table,
            });
            table.rows += 1;
            table.pad();
        });
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

fn drain() -> Recorder {
    RECORDER.with(|r| std::mem::take(&mut *r.borrow_mut()))
}

fn clear() {
    RECORDER.with(|r| *r.borrow_mut() = Recorder::default());
}

/// Run `f` with [`PlanRecorder`] as this thread's subscriber and return only
/// what `f` emitted. Safe to use from tests running in parallel.
pub fn record(f: impl FnOnce()) -> Recorder {
    clear();
    tracing::subscriber::with_default(PlanRecorder, f);
    drain()
}
