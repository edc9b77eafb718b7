use meter_client::Reading;
use time::macros::datetime;

use crate::pipeline::{Envelope, PipelineError, Transform};

/// Pure validation of a scraped balance reading.
///
/// Rules:
/// - balance must be finite and non-negative (a prepaid balance is never
///   below zero; the vendor page showing one means the parse went wrong).
/// - ts must be within a broad sanity window [2000-01-01, 2100-01-01].
pub fn validate_reading(env: Envelope<Reading>) -> Result<Envelope<Reading>, PipelineError> {
    let r = &env.payload;

    if !r.balance.is_finite() || r.balance < 0.0 {
        return Err(PipelineError::Validate(format!(
            "balance must be a non-negative number, got {}",
            r.balance
        )));
    }

    if r.meter_id.is_empty() {
        return Err(PipelineError::Validate("meter id must not be empty".to_string()));
    }

    let min_ts = datetime!(2000-01-01 00:00:00);
    let max_ts = datetime!(2100-01-01 00:00:00);

    if r.ts < min_ts || r.ts > max_ts {
        return Err(PipelineError::Validate("timestamp out of allowed range".to_string()));
    }

    Ok(env)
}

#[derive(Clone, Default)]
pub struct ReadingValidation;

impl Transform<Reading> for ReadingValidation {
    fn apply(&self, input: Envelope<Reading>) -> Result<Envelope<Reading>, PipelineError> {
        match validate_reading(input) {
            Ok(env) => Ok(env),
            Err(e) => {
                metrics::counter!("validation_reading_rejected_total").increment(1);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(balance: f64) -> Envelope<Reading> {
        Envelope::now(Reading {
            ts: datetime!(2024-03-05 08:00:00),
            meter_id: "M1".to_string(),
            balance,
        })
    }

    #[test]
    fn accepts_a_valid_reading() {
        assert!(validate_reading(envelope(42.5)).is_ok());
        assert!(validate_reading(envelope(0.0)).is_ok());
    }

    #[test]
    fn rejects_negative_and_non_finite_balances() {
        assert!(matches!(
            validate_reading(envelope(-0.1)),
            Err(PipelineError::Validate(_))
        ));
        assert!(matches!(
            validate_reading(envelope(f64::NAN)),
            Err(PipelineError::Validate(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_timestamps() {
        let env = Envelope::now(Reading {
            ts: datetime!(1999-12-31 23:59:59),
            meter_id: "M1".to_string(),
            balance: 1.0,
        });
        assert!(matches!(
            validate_reading(env),
            Err(PipelineError::Validate(_))
        ));
    }

    #[test]
    fn rejects_an_empty_meter_id() {
        let env = Envelope::now(Reading {
            ts: datetime!(2024-03-05 08:00:00),
            meter_id: String::new(),
            balance: 1.0,
        });
        assert!(matches!(
            validate_reading(env),
            Err(PipelineError::Validate(_))
        ));
    }
}
