use super::{usd_of, DepositRecord, Timed, WithdrawalRecord};

/// Sum `value` per `key`, keeping keys in first-seen order. `None` keys are skipped.
pub fn group_sums<'a, T: 'a>(
    items: impl IntoIterator<Item = &'a T>,
    key: impl Fn(&'a T) -> Option<&'a str>,
    value: impl Fn(&T) -> f64,
) -> Vec<(String, f64)> {
    let mut out: Vec<(String, f64)> = Vec::new();
    for item in items {
        let Some(k) = key(item) else {
            continue;
        };
        match out.iter_mut().find(|(name, _)| name == k) {
            Some((_, total)) => *total += value(item),
            None => out.push((k.to_string(), value(item))),
        }
    }
    out
}

/// Read-only view over a set of records and the rates that apply to them.
///
/// The same figures back the live bill, archived snapshots and per-date views.
#[derive(Clone, Copy, Debug)]
pub struct Book<'a> {
    pub deposits: &'a [DepositRecord],
    pub withdrawals: &'a [WithdrawalRecord],
    pub fee_rate: f64,
    pub fixed_rate: f64,
}

impl<'a> Book<'a> {
    pub fn new(
        deposits: &'a [DepositRecord],
        withdrawals: &'a [WithdrawalRecord],
        fee_rate: f64,
        fixed_rate: f64,
    ) -> Self {
        Self {
            deposits,
            withdrawals,
            fee_rate,
            fixed_rate,
        }
    }

    pub fn deposit_count(&self) -> usize {
        self.deposits.len()
    }

    pub fn withdrawal_count(&self) -> usize {
        self.withdrawals.len()
    }

    pub fn deposit_total(&self) -> f64 {
        self.deposits.iter().map(|d| d.amount).sum()
    }

    pub fn withdrawal_local(&self) -> f64 {
        self.withdrawals.iter().map(|w| w.amount).sum()
    }

    pub fn withdrawal_usdt(&self) -> f64 {
        self.withdrawals.iter().map(|w| w.usd_equivalent).sum()
    }

    /// Deposits converted at the current exchange rate.
    pub fn to_be_withdrawn(&self) -> f64 {
        usd_of(self.deposit_total(), self.fixed_rate)
    }

    pub fn not_yet_withdrawn(&self) -> f64 {
        self.to_be_withdrawn() - self.withdrawal_usdt()
    }

    pub fn pending_local(&self) -> f64 {
        self.deposit_total() - self.withdrawal_local()
    }

    pub fn usd_of(&self, amount: f64) -> f64 {
        usd_of(amount, self.fixed_rate)
    }

    pub fn per_user_deposits(&self) -> Vec<(String, f64)> {
        group_sums(self.deposits, |d| Some(d.user.as_str()), |d| d.amount)
    }

    pub fn per_user_withdrawals_usdt(&self) -> Vec<(String, f64)> {
        group_sums(self.withdrawals, |w| Some(w.user.as_str()), |w| {
            w.usd_equivalent
        })
    }

    pub fn per_user_withdrawals_local(&self) -> Vec<(String, f64)> {
        group_sums(self.withdrawals, |w| Some(w.user.as_str()), |w| w.amount)
    }

    /// Deposit totals per responder. Records without one (or with an empty one) are skipped.
    pub fn per_responder(&self) -> Vec<(String, f64)> {
        group_sums(
            self.deposits,
            |d| d.responder.as_deref().filter(|r| !r.is_empty()),
            |d| d.amount,
        )
    }

    /// Newest first. Ties keep append order.
    pub fn deposits_newest_first(&self) -> Vec<&'a DepositRecord> {
        let mut sorted: Vec<&DepositRecord> = self.deposits.iter().collect();
        sorted.sort_by(|a, b| b.time().cmp(a.time()));
        sorted
    }

    pub fn withdrawals_newest_first(&self) -> Vec<&'a WithdrawalRecord> {
        let mut sorted: Vec<&WithdrawalRecord> = self.withdrawals.iter().collect();
        sorted.sort_by(|a, b| b.time().cmp(a.time()));
        sorted
    }

    pub fn latest_deposits(&self, n: usize) -> Vec<&'a DepositRecord> {
        let mut sorted = self.deposits_newest_first();
        sorted.truncate(n);
        sorted
    }
}
