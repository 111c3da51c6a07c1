//! Row masking on a column of the frame itself.

use smio_common::{Column, Frame, SmioError, SmioResult, Value};
use tracing::debug;

use crate::descriptor::{MaskOp, Threshold};
use crate::Adapter;

/// Keeps rows where `column op threshold` holds and drops the rest.
#[derive(Debug, Clone)]
pub struct SelfMaskAdapter {
    column: String,
    op: MaskOp,
    threshold: Threshold,
}

impl SelfMaskAdapter {
    pub fn new(column: impl Into<String>, op: MaskOp, threshold: Threshold) -> Self {
        Self {
            column: column.into(),
            op,
            threshold,
        }
    }

    fn thresholds(&self) -> Vec<&Value> {
        match &self.threshold {
            Threshold::Scalar(v) => vec![v],
            Threshold::List(vs) => vs.iter().collect(),
        }
    }

    fn float_mask(&self, values: &[f64]) -> SmioResult<Vec<bool>> {
        let thresholds = self
            .thresholds()
            .into_iter()
            .map(Value::as_f64)
            .collect::<Option<Vec<f64>>>()
            .ok_or_else(|| self.type_mismatch("numeric", "text"))?;
        Ok(values.iter().map(|v| holds(self.op, v, &thresholds)).collect())
    }

    fn text_mask(&self, values: &[Option<String>]) -> SmioResult<Vec<bool>> {
        let thresholds = self
            .thresholds()
            .into_iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect::<Option<Vec<String>>>()
            .ok_or_else(|| self.type_mismatch("text", "numeric"))?;
        Ok(values
            .iter()
            .map(|v| match v {
                Some(s) => holds(self.op, s, &thresholds),
                None => self.op == MaskOp::Ne,
            })
            .collect())
    }

    fn type_mismatch(&self, column: &str, threshold: &str) -> SmioError {
        SmioError::adapter_precondition(
            self.kind(),
            format!(
                "column '{}' is {} but the threshold is {}",
                self.column, column, threshold
            ),
        )
    }
}

/// Evaluate `value op thresholds`. `thresholds` holds one value, the set
/// for `in`, or `[low, high]` for `between`.
fn holds<T: PartialOrd>(op: MaskOp, value: &T, thresholds: &[T]) -> bool {
    let Some(first) = thresholds.first() else {
        return false;
    };
    match op {
        MaskOp::Eq => value == first,
        MaskOp::Ne => value != first,
        MaskOp::Lt => value < first,
        MaskOp::Le => value <= first,
        MaskOp::Gt => value > first,
        MaskOp::Ge => value >= first,
        MaskOp::In => thresholds.iter().any(|t| value == t),
        MaskOp::Between => value >= first && thresholds.get(1).is_some_and(|hi| value <= hi),
    }
}

impl Adapter for SelfMaskAdapter {
    fn kind(&self) -> &'static str {
        "self_mask"
    }

    fn apply(&self, frame: &Frame) -> SmioResult<Frame> {
        if frame.is_empty() {
            return Ok(frame.clone());
        }
        let column = frame.column(&self.column).ok_or_else(|| {
            SmioError::adapter_precondition(
                self.kind(),
                format!("column '{}' not present", self.column),
            )
        })?;

        let mask = match column {
            Column::Float(values) => self.float_mask(values)?,
            Column::Text(values) => self.text_mask(values)?,
        };
        let out = frame.filter_rows(&mask);
        debug!(
            column = %self.column,
            op = %self.op,
            rows = frame.len(),
            kept = out.len(),
            "Applied self mask"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn frame() -> Frame {
        let t0 = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let index = (0..5).map(|d| t0 + chrono::Duration::days(d)).collect();
        Frame::from_columns(
            index,
            vec![
                ("sm".to_string(), Column::Float(vec![0.1, 0.2, 0.3, f64::NAN, 0.5])),
                ("flag".to_string(), Column::Float(vec![0.0, 1.0, 0.0, 0.0, 2.0])),
                (
                    "qc".to_string(),
                    Column::Text(vec![
                        Some("G".into()),
                        Some("D01".into()),
                        None,
                        Some("G".into()),
                        Some("M".into()),
                    ]),
                ),
            ],
        )
        .unwrap()
    }

    fn mask(column: &str, op: MaskOp, threshold: Threshold) -> Frame {
        SelfMaskAdapter::new(column, op, threshold)
            .apply(&frame())
            .unwrap()
    }

    #[test]
    fn test_numeric_ops() {
        assert_eq!(mask("flag", MaskOp::Eq, 0.0.into()).len(), 3);
        assert_eq!(mask("flag", MaskOp::Ne, 0.0.into()).len(), 2);
        assert_eq!(mask("sm", MaskOp::Gt, 0.2.into()).len(), 2);
        assert_eq!(mask("sm", MaskOp::Le, 0.2.into()).len(), 2);
        let between = mask(
            "sm",
            MaskOp::Between,
            Threshold::List(vec![0.2.into(), 0.5.into()]),
        );
        assert_eq!(between.float_column("sm").unwrap(), &[0.2, 0.3, 0.5]);
        let within = mask(
            "flag",
            MaskOp::In,
            Threshold::List(vec![1.0.into(), 2.0.into()]),
        );
        assert_eq!(within.len(), 2);
    }

    #[test]
    fn test_retained_rows_satisfy_mask() {
        let out = mask("flag", MaskOp::Eq, 0.0.into());
        assert!(out.float_column("flag").unwrap().iter().all(|f| *f == 0.0));
        // All columns drop the masked rows
        assert_eq!(out.column("qc").unwrap().len(), out.len());
    }

    #[test]
    fn test_text_ops() {
        let good = mask("qc", MaskOp::Eq, "G".into());
        assert_eq!(good.len(), 2);
        let not_good = mask("qc", MaskOp::Ne, "G".into());
        assert_eq!(not_good.len(), 3);
    }

    #[test]
    fn test_preconditions() {
        let err = SelfMaskAdapter::new("nope", MaskOp::Eq, 0.0.into())
            .apply(&frame())
            .unwrap_err();
        assert!(matches!(err, SmioError::AdapterPreconditionFailed { .. }));

        let err = SelfMaskAdapter::new("qc", MaskOp::Eq, 0.0.into())
            .apply(&frame())
            .unwrap_err();
        assert!(matches!(err, SmioError::AdapterPreconditionFailed { .. }));
    }

    #[test]
    fn test_empty_frame_passes_through() {
        let empty = Frame::empty_with_columns(&["sm", "flag"]);
        let out = SelfMaskAdapter::new("flag", MaskOp::Eq, 0.0.into())
            .apply(&empty)
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(out.column_names(), vec!["sm", "flag"]);
    }
}
