use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};

/// Factor naming the payload size in bytes.
pub const PAYLOAD_SIZE: &str = "PayloadSize";
/// Factor naming the interval between packets in nanoseconds.
pub const TRANSMISSION_INTERVAL: &str = "TransmissionInterval";
/// Factor naming the socket priority used by the talker.
pub const SO_PRIORITY: &str = "SO_PRIORITY";

/// One row of an experiment profile: factor name to value, in profile
/// column order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Factors {
    entries: Vec<(String, String)>,
}

impl Factors {
    /// Build a row from `(name, value)` pairs.
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Raw value of a factor, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Raw value of a factor that must be present.
    pub fn require(&self, name: &str) -> Result<&str> {
        self.get(name).ok_or_else(|| ControlError::Factor {
            name: name.to_string(),
            reason: "missing from parameter row".to_string(),
        })
    }

    /// Parse a required factor.
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        let raw = self.require(name)?;
        raw.trim().parse().map_err(|err: T::Err| ControlError::Factor {
            name: name.to_string(),
            reason: format!("invalid value '{raw}': {err}"),
        })
    }

    pub fn payload_size(&self) -> Result<u32> {
        self.parse(PAYLOAD_SIZE)
    }

    pub fn transmission_interval(&self) -> Result<u64> {
        let interval: u64 = self.parse(TRANSMISSION_INTERVAL)?;
        if interval == 0 {
            return Err(ControlError::Factor {
                name: TRANSMISSION_INTERVAL.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(interval)
    }

    pub fn so_priority(&self) -> Result<u32> {
        self.parse(SO_PRIORITY)
    }

    /// Factor names and values in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The full parameter sweep: one [`Factors`] row per iteration.
///
/// Built once by the talker and sent to the listener so both sides iterate
/// the same rows in the same order. Serialized as
/// `{"factors": [names...], "rows": [[values...], ...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "ParametersWire", into = "ParametersWire")]
pub struct ExperimentParameters {
    names: Vec<String>,
    rows: Vec<Factors>,
}

#[derive(Serialize, Deserialize)]
struct ParametersWire {
    factors: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ExperimentParameters {
    /// Build from a header of factor names and one value list per row.
    ///
    /// Every row must have exactly one value per factor.
    pub fn new(names: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        let mut factors = Vec::with_capacity(rows.len());
        for (idx, values) in rows.into_iter().enumerate() {
            if values.len() != names.len() {
                return Err(ControlError::Factor {
                    name: format!("row {}", idx + 1),
                    reason: format!(
                        "has {} values for {} factors",
                        values.len(),
                        names.len()
                    ),
                });
            }
            factors.push(Factors::new(names.iter().cloned().zip(values)));
        }
        Ok(Self {
            names,
            rows: factors,
        })
    }

    /// Factor names in profile column order.
    pub fn factor_names(&self) -> &[String] {
        &self.names
    }

    pub fn rows(&self) -> &[Factors] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Factors> {
        self.rows.iter()
    }

    /// Number of iterations in the sweep.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<'a> IntoIterator for &'a ExperimentParameters {
    type Item = &'a Factors;
    type IntoIter = std::slice::Iter<'a, Factors>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl TryFrom<ParametersWire> for ExperimentParameters {
    type Error = ControlError;

    fn try_from(wire: ParametersWire) -> Result<Self> {
        Self::new(wire.factors, wire.rows)
    }
}

impl From<ExperimentParameters> for ParametersWire {
    fn from(params: ExperimentParameters) -> Self {
        let rows = params
            .rows
            .into_iter()
            .map(|row| row.entries.into_iter().map(|(_, v)| v).collect())
            .collect();
        Self {
            factors: params.names,
            rows,
        }
    }
}

/// Per-packet sub-event timestamps captured by tracing on one side.
///
/// Rows are index-aligned with the listener's raw dataset: row `i`
/// describes the same packet as raw row `i`. Every row is exactly as wide
/// as the header.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "TraceWire", into = "TraceWire")]
pub struct IntermediateTrace {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

#[derive(Serialize, Deserialize)]
struct TraceWire {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl IntermediateTrace {
    /// Build from sub-event column names and one row per packet.
    pub fn new(header: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != header.len())
        {
            return Err(ControlError::RaggedTrace {
                row: idx + 1,
                found: row.len(),
                expected: header.len(),
            });
        }
        Ok(Self { header, rows })
    }

    /// Sub-event column names.
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// One row per packet.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of sub-event columns.
    pub fn width(&self) -> usize {
        self.header.len()
    }

    /// Number of packet rows, header excluded.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl TryFrom<TraceWire> for IntermediateTrace {
    type Error = ControlError;

    fn try_from(wire: TraceWire) -> Result<Self> {
        Self::new(wire.header, wire.rows)
    }
}

impl From<IntermediateTrace> for TraceWire {
    fn from(trace: IntermediateTrace) -> Self {
        Self {
            header: trace.header,
            rows: trace.rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep() -> ExperimentParameters {
        ExperimentParameters::new(
            vec![
                "PayloadSize".to_string(),
                "TransmissionInterval".to_string(),
                "SO_PRIORITY".to_string(),
            ],
            vec![
                vec!["64".into(), "1000000".into(), "3".into()],
                vec!["1500".into(), "500000".into(), "2".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn typed_accessors() {
        let params = sweep();
        let first = &params.rows()[0];
        assert_eq!(first.payload_size().unwrap(), 64);
        assert_eq!(first.transmission_interval().unwrap(), 1_000_000);
        assert_eq!(first.so_priority().unwrap(), 3);
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn missing_factor_is_named() {
        let row = Factors::new([("PayloadSize", "64")]);
        let err = row.so_priority().unwrap_err();
        assert!(err.to_string().contains("SO_PRIORITY"));
    }

    #[test]
    fn unparsable_factor_reports_value() {
        let row = Factors::new([("PayloadSize", "lots")]);
        let err = row.payload_size().unwrap_err();
        assert!(err.to_string().contains("'lots'"), "{err}");
    }

    #[test]
    fn zero_interval_rejected() {
        let row = Factors::new([("TransmissionInterval", "0")]);
        assert!(row.transmission_interval().is_err());
    }

    #[test]
    fn ragged_rows_rejected() {
        let err = ExperimentParameters::new(
            vec!["PayloadSize".into(), "SO_PRIORITY".into()],
            vec![vec!["64".into()]],
        )
        .unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn json_keeps_column_and_row_order() {
        let params = sweep();
        let json = serde_json::to_string(&params).unwrap();
        assert!(json.starts_with(r#"{"factors":["PayloadSize","TransmissionInterval","SO_PRIORITY"]"#));

        let back: ExperimentParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
        let names: Vec<&str> = back.rows()[1].iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["PayloadSize", "TransmissionInterval", "SO_PRIORITY"]);
    }

    #[test]
    fn json_with_ragged_rows_rejected() {
        let json = r#"{"factors":["PayloadSize"],"rows":[["64","extra"]]}"#;
        assert!(serde_json::from_str::<ExperimentParameters>(json).is_err());
    }

    #[test]
    fn trace_dimensions() {
        let trace = IntermediateTrace::new(
            vec!["sendto".into(), "dev_queue".into()],
            vec![vec!["1".into(), "2".into()]],
        )
        .unwrap();
        assert_eq!(trace.width(), 2);
        assert_eq!(trace.len(), 1);
        assert!(!trace.is_empty());
    }

    #[test]
    fn ragged_trace_rejected() {
        let err = IntermediateTrace::new(
            vec!["a".into(), "b".into()],
            vec![vec!["t0".into(), "t1".into()], vec!["t2".into()]],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ControlError::RaggedTrace {
                row: 2,
                found: 1,
                expected: 2
            }
        ));
    }

    #[test]
    fn json_trace_with_ragged_rows_rejected() {
        let json = r#"{"header":["a","b"],"rows":[["t0"],["t1","t2","t3"]]}"#;
        let err = serde_json::from_str::<IntermediateTrace>(json).unwrap_err();
        assert!(err.to_string().contains("trace row 1 has 1 values for 2 columns"), "{err}");
    }

    #[test]
    fn trace_json_shape() {
        let trace = IntermediateTrace::new(vec!["irq".into()], vec![vec!["5".into()]]).unwrap();
        assert_eq!(
            serde_json::to_string(&trace).unwrap(),
            r#"{"header":["irq"],"rows":[["5"]]}"#
        );
    }
}
