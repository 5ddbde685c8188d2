use crate::error::ConvertError;
use crate::gains::GainRecord;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Merge rows sharing (asset, sale date, acquisition date), summing
/// amount, proceeds, cost basis and gain. Group order follows the first
/// occurrence in the input so output stays deterministic.
///
/// Rows in one group share both dates, so they must agree on their
/// short/long classification; a mismatch indicates a classification bug
/// and fails the run.
pub fn aggregate(records: Vec<GainRecord>) -> Result<Vec<GainRecord>, ConvertError> {
    let mut index: HashMap<(String, NaiveDate, NaiveDate), usize> = HashMap::new();
    let mut grouped: Vec<GainRecord> = Vec::new();

    for record in records {
        let key = (record.asset.clone(), record.sold, record.acquired);
        match index.get(&key) {
            Some(&i) => {
                let group = &mut grouped[i];
                if group.term != record.term {
                    return Err(ConvertError::AggregationInvariantViolation {
                        asset: record.asset,
                        sold: record.sold,
                        acquired: record.acquired,
                    });
                }
                group.amount += record.amount;
                group.proceeds_eur += record.proceeds_eur;
                group.cost_basis_eur += record.cost_basis_eur;
                group.gain_eur += record.gain_eur;
                for warning in record.warnings {
                    if !group.warnings.contains(&warning) {
                        group.warnings.push(warning);
                    }
                }
            }
            None => {
                index.insert(key, grouped.len());
                grouped.push(record);
            }
        }
    }

    log::debug!("compacted into {} group(s)", grouped.len());
    Ok(grouped)
}
