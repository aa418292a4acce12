//! Prize identifier to reward conversion
//!
//! Each identifier in a response indexes a fixed payout table. Entries pay
//! either tickets or tokens. Token amounts are tracked in hundredths, so
//! sums are exact and already at the two-decimal precision they are
//! reported with.

use serde::Serialize;
use std::fmt;

/// What a single prize identifier pays out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payout {
    Nothing,
    Tickets(u64),
    /// Token amount in hundredths of a token.
    TokenCents(u64),
}

/// Payout for every known prize identifier, indexed by identifier.
pub const PAYOUTS: [Payout; 8] = [
    Payout::Nothing,
    Payout::TokenCents(10),
    Payout::Tickets(1),
    Payout::TokenCents(25),
    Payout::Tickets(2),
    Payout::TokenCents(50),
    Payout::TokenCents(15),
    Payout::TokenCents(250),
];

/// Look up the payout of a prize identifier.
///
/// Identifiers outside the table pay nothing.
pub fn payout(prize_id: u64) -> Payout {
    usize::try_from(prize_id)
        .ok()
        .and_then(|i| PAYOUTS.get(i).copied())
        .unwrap_or(Payout::Nothing)
}

/// Accumulated reward: tickets plus a token amount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reward {
    pub tickets: u64,
    pub token_cents: u64,
}

impl Reward {
    /// Add the payouts of one sequence of prize identifiers.
    pub fn add_prizes(&mut self, prize_ids: &[u64]) {
        for &id in prize_ids {
            match payout(id) {
                Payout::Nothing => {}
                Payout::Tickets(n) => self.tickets += n,
                Payout::TokenCents(c) => self.token_cents += c,
            }
        }
    }
}

impl fmt::Display for Reward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tickets, {}.{:02} tokens",
            self.tickets,
            self.token_cents / 100,
            self.token_cents % 100
        )
    }
}

impl Serialize for Reward {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("Reward", 2)?;
        s.serialize_field("ticket", &self.tickets)?;
        s.serialize_field(
            "token",
            &format!("{}.{:02}", self.token_cents / 100, self.token_cents % 100),
        )?;
        s.end()
    }
}

/// Reward for a single response's prize identifiers.
pub fn reward_of(prize_ids: &[u64]) -> Reward {
    let mut reward = Reward::default();
    reward.add_prizes(prize_ids);
    reward
}

/// Reward summed across many responses, accumulated in place.
pub fn reward_of_all<'a, I>(prize_id_lists: I) -> Reward
where
    I: IntoIterator<Item = &'a [u64]>,
{
    let mut reward = Reward::default();
    for prize_ids in prize_id_lists {
        reward.add_prizes(prize_ids);
    }
    reward
}
