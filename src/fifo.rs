use crate::gains::{GainRecord, GainWarning, Term};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};

/// A filled execution from a raw-trade exchange export.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub executed_at: NaiveDateTime,
    pub side: Side,
    pub asset: String,
    pub quantity: Decimal,
    pub value_eur: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

/// An open acquisition for one asset.
#[derive(Debug, Clone)]
struct Lot {
    quantity: Decimal,
    acquired: NaiveDateTime,
    cost_eur: Decimal,
    unit_cost: Decimal,
    synthetic: bool,
}

/// One FIFO fragment consumed by a disposal.
#[derive(Debug, Clone)]
pub struct Sale {
    pub quantity: Decimal,
    pub acquired: NaiveDateTime,
    pub cost_basis_eur: Decimal,
    pub synthetic: bool,
}

/// Per-asset FIFO queues of open lots.
#[derive(Debug, Default)]
pub struct Portfolio {
    holdings: HashMap<String, VecDeque<Lot>>,
}

impl Portfolio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an acquisition.
    pub fn add(&mut self, asset: &str, quantity: Decimal, acquired: NaiveDateTime, cost_eur: Decimal) {
        self.push(asset, quantity, acquired, cost_eur, false);
    }

    /// Seed a zero-cost lot covering disposals with no recorded
    /// acquisition. Sales drawn from it are flagged.
    pub fn add_synthetic(&mut self, asset: &str, quantity: Decimal, acquired: NaiveDateTime) {
        self.push(asset, quantity, acquired, Decimal::ZERO, true);
    }

    fn push(
        &mut self,
        asset: &str,
        quantity: Decimal,
        acquired: NaiveDateTime,
        cost_eur: Decimal,
        synthetic: bool,
    ) {
        let unit_cost = if quantity.is_zero() {
            Decimal::ZERO
        } else {
            cost_eur / quantity
        };
        log::debug!("{asset} ADD qty={quantity} cost={cost_eur} acquired={acquired}");
        self.holdings.entry(asset.to_string()).or_default().push_back(Lot {
            quantity,
            acquired,
            cost_eur,
            unit_cost,
            synthetic,
        });
    }

    /// Consume `quantity` from the oldest open lots of `asset`, splitting
    /// the head lot on partial consumption. Returns the consumed fragments
    /// plus any quantity that could not be matched.
    pub fn remove(&mut self, asset: &str, quantity: Decimal) -> (Vec<Sale>, Decimal) {
        let mut sales = Vec::new();
        let mut to_sell = quantity;
        let lots = self.holdings.entry(asset.to_string()).or_default();
        while to_sell > Decimal::ZERO {
            let Some(mut lot) = lots.pop_front() else {
                break;
            };
            if lot.quantity <= to_sell {
                log::debug!(
                    "{asset} TAKE qty={} acquired={} cost={}",
                    lot.quantity,
                    lot.acquired,
                    lot.cost_eur
                );
                to_sell -= lot.quantity;
                sales.push(Sale {
                    quantity: lot.quantity,
                    acquired: lot.acquired,
                    cost_basis_eur: lot.cost_eur,
                    synthetic: lot.synthetic,
                });
            } else {
                let cost_of_sold = to_sell * lot.unit_cost;
                log::debug!(
                    "{asset} SPLIT qty={} of {} acquired={} cost={}",
                    to_sell,
                    lot.quantity,
                    lot.acquired,
                    cost_of_sold
                );
                sales.push(Sale {
                    quantity: to_sell,
                    acquired: lot.acquired,
                    cost_basis_eur: cost_of_sold,
                    synthetic: lot.synthetic,
                });
                lot.quantity -= to_sell;
                lot.cost_eur = lot.quantity * lot.unit_cost;
                lots.push_front(lot);
                to_sell = Decimal::ZERO;
            }
        }
        (sales, to_sell)
    }

    /// Remaining open quantity for an asset.
    #[cfg(test)]
    pub fn open_quantity(&self, asset: &str) -> Decimal {
        self.holdings
            .get(asset)
            .map(|lots| lots.iter().map(|l| l.quantity).sum())
            .unwrap_or(Decimal::ZERO)
    }
}

/// Outcome of a FIFO matching run.
#[derive(Debug, Default)]
pub struct MatchReport {
    pub gains: Vec<GainRecord>,
    /// Per-asset quantity disposed without a matching acquisition,
    /// whether covered by a seeded zero-cost lot (more sells than buys
    /// overall) or hit mid-stream (a sell preceding its buy).
    pub shortfalls: Vec<(String, Decimal)>,
}

/// Match a stream of executions FIFO and compute realized gains.
///
/// Executions are sorted by timestamp first. Sell quantities exceeding
/// the recorded buys for an asset are covered up front by a zero-cost
/// lot dated `placeholder` (well in the past, so those fragments come
/// out long-term), mirroring how the disposal would look if the missing
/// acquisition predated the export. A sell that precedes its buy can
/// still drain the queue mid-stream even with balanced totals; that
/// remainder realizes the same way and is counted in `shortfalls` too.
/// Each affected gain row carries a `MissingAcquisition` warning.
pub fn match_fifo(
    mut executions: Vec<Execution>,
    platform: &'static str,
    placeholder: NaiveDate,
) -> MatchReport {
    executions.sort_by_key(|e| e.executed_at);

    let mut report = MatchReport::default();
    let mut portfolio = Portfolio::new();

    // Pre-pass: seed zero-cost lots for historical shortfalls so the
    // matcher never runs dry mid-stream.
    let mut bought: HashMap<&str, Decimal> = HashMap::new();
    let mut sold: HashMap<&str, Decimal> = HashMap::new();
    for e in &executions {
        let totals = match e.side {
            Side::Buy => &mut bought,
            Side::Sell => &mut sold,
        };
        *totals.entry(e.asset.as_str()).or_default() += e.quantity;
    }
    let mut shortfalls: Vec<(String, Decimal)> = sold
        .iter()
        .filter_map(|(asset, sell_qty)| {
            let buy_qty = bought.get(asset).copied().unwrap_or(Decimal::ZERO);
            (*sell_qty > buy_qty).then(|| (asset.to_string(), sell_qty - buy_qty))
        })
        .collect();
    shortfalls.sort();
    let placeholder_dt = placeholder.and_hms_opt(0, 0, 0).unwrap();
    for (asset, missing) in &shortfalls {
        log::warn!(
            "{asset}: disposals exceed recorded acquisitions by {missing}, \
             inserting a zero-cost lot dated {placeholder}"
        );
        portfolio.add_synthetic(asset, *missing, placeholder_dt);
    }
    report.shortfalls = shortfalls;

    let mut residuals: HashMap<String, Decimal> = HashMap::new();
    for e in &executions {
        match e.side {
            Side::Buy => portfolio.add(&e.asset, e.quantity, e.executed_at, e.value_eur),
            Side::Sell => {
                let (sales, unmatched) = portfolio.remove(&e.asset, e.quantity);
                for sale in sales {
                    report
                        .gains
                        .push(gain_from_sale(e, sale, platform));
                }
                if unmatched > Decimal::ZERO {
                    // Totals can balance while a sell still precedes its
                    // buy, so the queue can run dry mid-stream.
                    log::warn!(
                        "{}: {unmatched} unmatched at {}, emitting zero-cost fragment",
                        e.asset,
                        e.executed_at
                    );
                    *residuals.entry(e.asset.clone()).or_default() += unmatched;
                    let sale = Sale {
                        quantity: unmatched,
                        acquired: placeholder_dt,
                        cost_basis_eur: Decimal::ZERO,
                        synthetic: true,
                    };
                    report.gains.push(gain_from_sale(e, sale, platform));
                }
            }
        }
    }

    if !residuals.is_empty() {
        for (asset, missing) in residuals {
            match report.shortfalls.iter_mut().find(|(a, _)| *a == asset) {
                Some((_, quantity)) => *quantity += missing,
                None => report.shortfalls.push((asset, missing)),
            }
        }
        report.shortfalls.sort();
    }

    report
}

fn gain_from_sale(disposal: &Execution, sale: Sale, platform: &'static str) -> GainRecord {
    // Pro-rate the aggregate sale value over this fragment.
    let proceeds = disposal.value_eur * sale.quantity / disposal.quantity;
    let acquired = sale.acquired.date();
    let sold = disposal.executed_at.date();
    let warnings = if sale.synthetic {
        vec![GainWarning::MissingAcquisition]
    } else {
        vec![]
    };
    GainRecord {
        asset: disposal.asset.clone(),
        amount: sale.quantity,
        sold,
        acquired,
        term: Term::classify(acquired, sold),
        buy_platform: platform,
        sell_platform: platform,
        proceeds_eur: proceeds,
        cost_basis_eur: sale.cost_basis_eur,
        gain_eur: proceeds - sale.cost_basis_eur,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn dt(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn buy(y: i32, m: u32, d: u32, qty: Decimal, eur: Decimal) -> Execution {
        Execution {
            executed_at: dt(y, m, d),
            side: Side::Buy,
            asset: "BTC".to_string(),
            quantity: qty,
            value_eur: eur,
        }
    }

    fn sell(y: i32, m: u32, d: u32, qty: Decimal, eur: Decimal) -> Execution {
        Execution {
            executed_at: dt(y, m, d),
            side: Side::Sell,
            asset: "BTC".to_string(),
            quantity: qty,
            value_eur: eur,
        }
    }

    #[test]
    fn disposal_consumes_oldest_lots_first() {
        let executions = vec![
            buy(2023, 1, 2, dec!(2), dec!(20000)),
            buy(2023, 1, 3, dec!(3), dec!(36000)),
            sell(2023, 6, 1, dec!(4), dec!(48000)),
        ];
        let placeholder = NaiveDate::from_ymd_opt(2021, 12, 31).unwrap();
        let report = match_fifo(executions, "BSDEX", placeholder);

        assert!(report.shortfalls.is_empty());
        assert_eq!(report.gains.len(), 2);

        let first = &report.gains[0];
        assert_eq!(first.amount, dec!(2));
        assert_eq!(first.acquired, NaiveDate::from_ymd_opt(2023, 1, 2).unwrap());
        assert_eq!(first.cost_basis_eur, dec!(20000));
        assert_eq!(first.proceeds_eur, dec!(24000));
        assert_eq!(first.gain_eur, dec!(4000));
        assert_eq!(first.term, Term::Short);

        let second = &report.gains[1];
        assert_eq!(second.amount, dec!(2));
        assert_eq!(second.acquired, NaiveDate::from_ymd_opt(2023, 1, 3).unwrap());
        assert_eq!(second.cost_basis_eur, dec!(24000));
        assert_eq!(second.proceeds_eur, dec!(24000));
        assert_eq!(second.gain_eur, dec!(0));
    }

    #[test]
    fn disposed_quantity_is_conserved() {
        let executions = vec![
            buy(2023, 1, 2, dec!(2), dec!(20000)),
            buy(2023, 1, 3, dec!(3), dec!(36000)),
            sell(2023, 6, 1, dec!(1), dec!(11000)),
            sell(2023, 8, 1, dec!(3), dec!(39000)),
            sell(2023, 9, 1, dec!(0.5), dec!(6500)),
        ];
        let placeholder = NaiveDate::from_ymd_opt(2021, 12, 31).unwrap();
        let report = match_fifo(executions, "BSDEX", placeholder);

        let total: Decimal = report.gains.iter().map(|g| g.amount).sum();
        assert_eq!(total, dec!(4.5));
        let proceeds: Decimal = report.gains.iter().map(|g| g.proceeds_eur).sum();
        assert_eq!(proceeds, dec!(56500));
    }

    #[test]
    fn unsorted_input_is_sorted_before_matching() {
        let executions = vec![
            sell(2023, 6, 1, dec!(1), dec!(15000)),
            buy(2023, 1, 2, dec!(1), dec!(10000)),
        ];
        let placeholder = NaiveDate::from_ymd_opt(2021, 12, 31).unwrap();
        let report = match_fifo(executions, "BSDEX", placeholder);

        assert!(report.shortfalls.is_empty());
        assert_eq!(report.gains.len(), 1);
        assert_eq!(report.gains[0].cost_basis_eur, dec!(10000));
    }

    #[test]
    fn shortfall_is_covered_by_zero_cost_lot() {
        let executions = vec![
            buy(2023, 1, 2, dec!(1), dec!(10000)),
            sell(2023, 6, 1, dec!(1.5), dec!(18000)),
        ];
        let placeholder = NaiveDate::from_ymd_opt(2021, 12, 31).unwrap();
        let report = match_fifo(executions, "BSDEX", placeholder);

        assert_eq!(report.shortfalls, vec![("BTC".to_string(), dec!(0.5))]);
        assert_eq!(report.gains.len(), 2);

        // Synthetic lot is oldest, consumed first, full gain, long-term.
        let synthetic = &report.gains[0];
        assert_eq!(synthetic.amount, dec!(0.5));
        assert_eq!(synthetic.cost_basis_eur, dec!(0));
        assert_eq!(synthetic.proceeds_eur, dec!(6000));
        assert_eq!(synthetic.gain_eur, dec!(6000));
        assert_eq!(synthetic.acquired, placeholder);
        assert_eq!(synthetic.term, Term::Long);
        assert_eq!(synthetic.warnings, vec![GainWarning::MissingAcquisition]);

        let real = &report.gains[1];
        assert_eq!(real.amount, dec!(1));
        assert_eq!(real.cost_basis_eur, dec!(10000));
        assert!(real.warnings.is_empty());
    }

    #[test]
    fn sell_before_buy_with_balanced_totals_is_a_shortfall() {
        // Per-asset totals balance, so the seeding pre-pass sees no
        // excess, but the January sell has nothing to draw on yet.
        let executions = vec![
            sell(2023, 1, 10, dec!(1), dec!(12000)),
            buy(2023, 2, 10, dec!(1), dec!(10000)),
        ];
        let placeholder = NaiveDate::from_ymd_opt(2021, 12, 31).unwrap();
        let report = match_fifo(executions, "BSDEX", placeholder);

        assert_eq!(report.shortfalls, vec![("BTC".to_string(), dec!(1))]);
        assert_eq!(report.gains.len(), 1);
        let gain = &report.gains[0];
        assert_eq!(gain.cost_basis_eur, dec!(0));
        assert_eq!(gain.gain_eur, dec!(12000));
        assert_eq!(gain.acquired, placeholder);
        assert_eq!(gain.warnings, vec![GainWarning::MissingAcquisition]);
    }

    #[test]
    fn partial_lot_split_keeps_unit_cost() {
        let mut portfolio = Portfolio::new();
        portfolio.add("ETH", dec!(4), dt(2023, 1, 1), dec!(8000));
        let (sales, unmatched) = portfolio.remove("ETH", dec!(1));
        assert_eq!(unmatched, dec!(0));
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].cost_basis_eur, dec!(2000));
        assert_eq!(portfolio.open_quantity("ETH"), dec!(3));

        // Remaining lot retains the proportional cost.
        let (sales, _) = portfolio.remove("ETH", dec!(3));
        assert_eq!(sales[0].cost_basis_eur, dec!(6000));
        assert_eq!(portfolio.open_quantity("ETH"), dec!(0));
    }

    #[test]
    fn remove_from_unknown_asset_reports_everything_unmatched() {
        let mut portfolio = Portfolio::new();
        let (sales, unmatched) = portfolio.remove("XRP", dec!(2));
        assert!(sales.is_empty());
        assert_eq!(unmatched, dec!(2));
    }
}
