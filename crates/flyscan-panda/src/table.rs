//! Sequencer pulse table.
//!
//! A SEQ block steps through up to 4096 rows. Each row waits for its trigger
//! condition, then drives outputs A-F for `time1` (phase 1) and `time2`
//! (phase 2) prescaled ticks, `repeats` times.
//!
//! Field ranges are carried by the field types (`u16` repeats, `i32`
//! position, `u32` phase times); the only structural check left for
//! [`SeqTable::new`] is the hardware table depth.

use flyscan_core::limits::MAX_SEQ_TABLE_ROWS;
use flyscan_core::{FlyscanError, FlyscanResult};
use serde::{Deserialize, Serialize};

/// Condition a row waits for before its first phase.
///
/// Serialized with the strings the controller uses on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SeqTrigger {
    /// Start immediately
    #[default]
    Immediate,
    /// Wait for input A low
    #[serde(rename = "BITA=0")]
    BitA0,
    /// Wait for input A high
    #[serde(rename = "BITA=1")]
    BitA1,
    /// Wait for input B low
    #[serde(rename = "BITB=0")]
    BitB0,
    /// Wait for input B high
    #[serde(rename = "BITB=1")]
    BitB1,
    /// Wait for input C low
    #[serde(rename = "BITC=0")]
    BitC0,
    /// Wait for input C high
    #[serde(rename = "BITC=1")]
    BitC1,
    /// Wait for position A >= `position`
    #[serde(rename = "POSA>=POSITION")]
    PosaGt,
    /// Wait for position A <= `position`
    #[serde(rename = "POSA<=POSITION")]
    PosaLt,
    /// Wait for position B >= `position`
    #[serde(rename = "POSB>=POSITION")]
    PosbGt,
    /// Wait for position B <= `position`
    #[serde(rename = "POSB<=POSITION")]
    PosbLt,
    /// Wait for position C >= `position`
    #[serde(rename = "POSC>=POSITION")]
    PoscGt,
    /// Wait for position C <= `position`
    #[serde(rename = "POSC<=POSITION")]
    PoscLt,
}

impl std::fmt::Display for SeqTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SeqTrigger::Immediate => "Immediate",
            SeqTrigger::BitA0 => "BITA=0",
            SeqTrigger::BitA1 => "BITA=1",
            SeqTrigger::BitB0 => "BITB=0",
            SeqTrigger::BitB1 => "BITB=1",
            SeqTrigger::BitC0 => "BITC=0",
            SeqTrigger::BitC1 => "BITC=1",
            SeqTrigger::PosaGt => "POSA>=POSITION",
            SeqTrigger::PosaLt => "POSA<=POSITION",
            SeqTrigger::PosbGt => "POSB>=POSITION",
            SeqTrigger::PosbLt => "POSB<=POSITION",
            SeqTrigger::PoscGt => "POSC>=POSITION",
            SeqTrigger::PoscLt => "POSC<=POSITION",
        };
        f.write_str(s)
    }
}

/// One sequencer row.
///
/// `Default` matches the controller's defaults: one repeat, immediate
/// trigger, zero-length phases, all outputs low.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct SeqTableRow {
    pub repeats: u16,
    pub trigger: SeqTrigger,
    pub position: i32,
    pub time1: u32,
    pub outa1: bool,
    pub outb1: bool,
    pub outc1: bool,
    pub outd1: bool,
    pub oute1: bool,
    pub outf1: bool,
    pub time2: u32,
    pub outa2: bool,
    pub outb2: bool,
    pub outc2: bool,
    pub outd2: bool,
    pub oute2: bool,
    pub outf2: bool,
}

impl Default for SeqTableRow {
    fn default() -> Self {
        Self {
            repeats: 1,
            trigger: SeqTrigger::Immediate,
            position: 0,
            time1: 0,
            outa1: false,
            outb1: false,
            outc1: false,
            outd1: false,
            oute1: false,
            outf1: false,
            time2: 0,
            outa2: false,
            outb2: false,
            outc2: false,
            outd2: false,
            oute2: false,
            outf2: false,
        }
    }
}

/// Ordered sequencer rows, at most [`MAX_SEQ_TABLE_ROWS`] of them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<SeqTableRow>", into = "Vec<SeqTableRow>")]
pub struct SeqTable {
    rows: Vec<SeqTableRow>,
}

impl SeqTable {
    /// Build a table, rejecting more rows than the hardware holds.
    pub fn new(rows: Vec<SeqTableRow>) -> FlyscanResult<Self> {
        if rows.len() > MAX_SEQ_TABLE_ROWS {
            return Err(FlyscanError::validation(
                "SeqTable",
                vec![format!(
                    "table has {} rows, the sequencer holds at most {MAX_SEQ_TABLE_ROWS}",
                    rows.len()
                )],
            ));
        }
        Ok(Self { rows })
    }

    /// Table without rows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Append the rows of `other`, re-checking the size limit.
    pub fn concat(self, other: SeqTable) -> FlyscanResult<Self> {
        let mut rows = self.rows;
        rows.extend(other.rows);
        Self::new(rows)
    }

    /// Rows in execution order.
    pub fn rows(&self) -> &[SeqTableRow] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl TryFrom<Vec<SeqTableRow>> for SeqTable {
    type Error = FlyscanError;

    fn try_from(rows: Vec<SeqTableRow>) -> Result<Self, Self::Error> {
        Self::new(rows)
    }
}

impl From<SeqTable> for Vec<SeqTableRow> {
    fn from(table: SeqTable) -> Self {
        table.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_defaults() {
        let row = SeqTableRow::default();
        assert_eq!(row.repeats, 1);
        assert_eq!(row.trigger, SeqTrigger::Immediate);
        assert!(!row.outa1 && !row.outf2);
    }

    #[test]
    fn test_table_depth_limit() {
        let full = SeqTable::new(vec![SeqTableRow::default(); MAX_SEQ_TABLE_ROWS]).unwrap();
        assert_eq!(full.len(), MAX_SEQ_TABLE_ROWS);

        let err = full.concat(SeqTable::new(vec![SeqTableRow::default()]).unwrap());
        match err {
            Err(FlyscanError::Validation { model, violations }) => {
                assert_eq!(model, "SeqTable");
                assert!(violations[0].contains("4097"));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_trigger_wire_names() {
        assert_eq!(
            serde_json::to_string(&SeqTrigger::PosaGt).unwrap(),
            "\"POSA>=POSITION\""
        );
        let trigger: SeqTrigger = serde_json::from_str("\"BITB=1\"").unwrap();
        assert_eq!(trigger, SeqTrigger::BitB1);
        assert_eq!(SeqTrigger::PoscLt.to_string(), "POSC<=POSITION");
    }

    #[test]
    fn test_deserialize_partial_rows() {
        let table: SeqTable = serde_json::from_str(
            r#"[{"trigger": "BITA=1", "time1": 5, "outa1": true}, {"repeats": 3}]"#,
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].time1, 5);
        assert!(table.rows()[0].outa1);
        assert_eq!(table.rows()[0].repeats, 1);
        assert_eq!(table.rows()[1].repeats, 3);
    }

    #[test]
    fn test_out_of_range_field_rejected_by_type() {
        let result: Result<SeqTable, _> = serde_json::from_str(r#"[{"repeats": 70000}]"#);
        assert!(result.is_err());
    }
}
