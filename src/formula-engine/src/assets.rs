//! Asset algebra over the six tracked categories.
//!
//! A state maps endpoint index to an amount per category. Absent keys mean zero/empty.
//! Combining two states applies the category's rule per key; keys present only on the
//! left-hand side pass through unchanged.

use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};
use formula_types::EndpointIndex;
use serde::{Serialize, Serializer};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Combine {
    Add,
    SubUnsigned,
    Max,
}

/// Value stored at a leaf (or inner node) of an [`AssetState`].
pub trait AssetAmount: Clone + Default {
    fn add(&self, other: &Self) -> Self;
    fn sub_unsigned(&self, other: &Self) -> Self;
    fn max(&self, other: &Self) -> Self;
    fn is_empty(&self) -> bool;

    /// Drop empty entries below this node.
    fn clean(&mut self) {}

    /// Number of non-empty leaves below this node.
    fn leaf_count(&self) -> usize {
        usize::from(!self.is_empty())
    }

    fn combine(&self, other: &Self, op: Combine) -> Self {
        match op {
            Combine::Add => self.add(other),
            Combine::SubUnsigned => self.sub_unsigned(other),
            Combine::Max => self.max(other),
        }
    }
}

impl AssetAmount for U256 {
    fn add(&self, other: &Self) -> Self {
        self.saturating_add(*other)
    }

    fn sub_unsigned(&self, other: &Self) -> Self {
        self.saturating_sub(*other)
    }

    fn max(&self, other: &Self) -> Self {
        *core::cmp::max(self, other)
    }

    fn is_empty(&self) -> bool {
        self.is_zero()
    }
}

/// ERC721 token ids held by one endpoint. Ownership is singular, so `add` de-duplicates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TokenIds(pub Vec<U256>);

impl TokenIds {
    pub fn one(token_id: U256) -> Self {
        TokenIds(vec![token_id])
    }
}

impl AssetAmount for TokenIds {
    fn add(&self, other: &Self) -> Self {
        let mut out: Vec<U256> = Vec::with_capacity(self.0.len() + other.0.len());
        for id in self.0.iter().chain(&other.0) {
            if !out.contains(id) {
                out.push(*id);
            }
        }
        TokenIds(out)
    }

    fn sub_unsigned(&self, other: &Self) -> Self {
        TokenIds(remove_occurrences(&self.0, &other.0))
    }

    fn max(&self, other: &Self) -> Self {
        TokenIds(multiset_max(&self.0, &other.0))
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// ERC721 approval needed by (or granted to) the settlement contract for one token contract.
/// Each transfer consumes one use, so finite lists keep multiplicity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Erc721Allowance {
    /// Operator approval over every token of the owner.
    Unlimited,
    Finite(Vec<U256>),
}

impl Default for Erc721Allowance {
    fn default() -> Self {
        Erc721Allowance::Finite(Vec::new())
    }
}

impl Erc721Allowance {
    pub fn one(token_id: U256) -> Self {
        Erc721Allowance::Finite(vec![token_id])
    }
}

impl Serialize for Erc721Allowance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Erc721Allowance::Unlimited => serializer.serialize_str("unlimited"),
            Erc721Allowance::Finite(ids) => ids.serialize(serializer),
        }
    }
}

impl AssetAmount for Erc721Allowance {
    fn add(&self, other: &Self) -> Self {
        match (self, other) {
            (Erc721Allowance::Finite(a), Erc721Allowance::Finite(b)) => {
                Erc721Allowance::Finite(a.iter().chain(b).copied().collect())
            }
            _ => Erc721Allowance::Unlimited,
        }
    }

    fn sub_unsigned(&self, other: &Self) -> Self {
        match (self, other) {
            (Erc721Allowance::Unlimited, _) => Erc721Allowance::Unlimited,
            (_, Erc721Allowance::Unlimited) => Erc721Allowance::default(),
            (Erc721Allowance::Finite(a), Erc721Allowance::Finite(b)) => {
                Erc721Allowance::Finite(remove_occurrences(a, b))
            }
        }
    }

    fn max(&self, other: &Self) -> Self {
        match (self, other) {
            (Erc721Allowance::Finite(a), Erc721Allowance::Finite(b)) => {
                Erc721Allowance::Finite(multiset_max(a, b))
            }
            _ => Erc721Allowance::Unlimited,
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Erc721Allowance::Finite(ids) if ids.is_empty())
    }
}

impl<K: Ord + Clone, T: AssetAmount> AssetAmount for BTreeMap<K, T> {
    fn add(&self, other: &Self) -> Self {
        combine_maps(self, other, Combine::Add)
    }

    fn sub_unsigned(&self, other: &Self) -> Self {
        combine_maps(self, other, Combine::SubUnsigned)
    }

    fn max(&self, other: &Self) -> Self {
        combine_maps(self, other, Combine::Max)
    }

    fn is_empty(&self) -> bool {
        self.values().all(AssetAmount::is_empty)
    }

    fn clean(&mut self) {
        self.values_mut().for_each(AssetAmount::clean);
        self.retain(|_, v| !AssetAmount::is_empty(v));
    }

    fn leaf_count(&self) -> usize {
        self.values().map(AssetAmount::leaf_count).sum()
    }
}

fn combine_maps<K: Ord + Clone, T: AssetAmount>(
    a: &BTreeMap<K, T>,
    b: &BTreeMap<K, T>,
    op: Combine,
) -> BTreeMap<K, T> {
    let mut out = a.clone();
    for (key, right) in b {
        let left = out.remove(key).unwrap_or_default();
        out.insert(key.clone(), left.combine(right, op));
    }
    out
}

/// For each id in `remove`, drop one matching occurrence from `from`.
fn remove_occurrences(from: &[U256], remove: &[U256]) -> Vec<U256> {
    let mut out = from.to_vec();
    for id in remove {
        if let Some(pos) = out.iter().position(|x| x == id) {
            out.remove(pos);
        }
    }
    out
}

/// Per id, keep `max(count in a, count in b)` occurrences. Order follows `a`, then new ids of `b`.
fn multiset_max(a: &[U256], b: &[U256]) -> Vec<U256> {
    let mut out = a.to_vec();
    let mut extra = b.to_vec();
    for id in a {
        if let Some(pos) = extra.iter().position(|x| x == id) {
            extra.remove(pos);
        }
    }
    out.extend(extra);
    out
}

pub type TokenMap<T> = BTreeMap<Address, T>;

/// Amounts per endpoint across the six categories.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetState {
    /// Ether held inside the settlement contract.
    pub ether_internal: BTreeMap<EndpointIndex, U256>,
    /// Ether held directly by the endpoint address.
    pub ether_external: BTreeMap<EndpointIndex, U256>,
    pub erc20_balance: BTreeMap<EndpointIndex, TokenMap<U256>>,
    pub erc20_allowance: BTreeMap<EndpointIndex, TokenMap<U256>>,
    pub erc721_balance: BTreeMap<EndpointIndex, TokenMap<TokenIds>>,
    pub erc721_allowance: BTreeMap<EndpointIndex, TokenMap<Erc721Allowance>>,
}

impl AssetState {
    pub fn combine(&self, other: &AssetState, op: Combine) -> AssetState {
        AssetState {
            ether_internal: self.ether_internal.combine(&other.ether_internal, op),
            ether_external: self.ether_external.combine(&other.ether_external, op),
            erc20_balance: self.erc20_balance.combine(&other.erc20_balance, op),
            erc20_allowance: self.erc20_allowance.combine(&other.erc20_allowance, op),
            erc721_balance: self.erc721_balance.combine(&other.erc721_balance, op),
            erc721_allowance: self.erc721_allowance.combine(&other.erc721_allowance, op),
        }
    }

    pub fn add(&self, other: &AssetState) -> AssetState {
        self.combine(other, Combine::Add)
    }

    pub fn sub_unsigned(&self, other: &AssetState) -> AssetState {
        self.combine(other, Combine::SubUnsigned)
    }

    pub fn max(&self, other: &AssetState) -> AssetState {
        self.combine(other, Combine::Max)
    }

    /// Copy without zero/empty entries.
    pub fn cleaned(&self) -> AssetState {
        let mut state = self.clone();
        state.ether_internal.clean();
        state.ether_external.clean();
        state.erc20_balance.clean();
        state.erc20_allowance.clean();
        state.erc721_balance.clean();
        state.erc721_allowance.clean();
        state
    }

    pub fn is_empty(&self) -> bool {
        AssetAmount::is_empty(&self.ether_internal)
            && AssetAmount::is_empty(&self.ether_external)
            && AssetAmount::is_empty(&self.erc20_balance)
            && AssetAmount::is_empty(&self.erc20_allowance)
            && AssetAmount::is_empty(&self.erc721_balance)
            && AssetAmount::is_empty(&self.erc721_allowance)
    }

    /// Non-empty `(endpoint)` entries for ether, `(endpoint, token)` entries for tokens.
    pub fn leaf_count(&self) -> usize {
        self.ether_internal.leaf_count()
            + self.ether_external.leaf_count()
            + self.erc20_balance.leaf_count()
            + self.erc20_allowance.leaf_count()
            + self.erc721_balance.leaf_count()
            + self.erc721_allowance.leaf_count()
    }
}

/// Fold any number of states with `max`.
pub fn max_states<'a>(states: impl IntoIterator<Item = &'a AssetState>) -> AssetState {
    states.into_iter().fold(AssetState::default(), |acc, s| acc.max(s))
}

/// Change caused by one or more operations, kept as two unsigned halves so transient peaks
/// are not hidden by later credits.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AssetDiff {
    pub positive: AssetState,
    pub negative: AssetState,
}

impl AssetDiff {
    pub fn add(&self, other: &AssetDiff) -> AssetDiff {
        AssetDiff {
            positive: self.positive.add(&other.positive),
            negative: self.negative.add(&other.negative),
        }
    }

    /// Cancel the overlap between the two halves.
    pub fn normalize(&self) -> AssetDiff {
        AssetDiff {
            positive: self.positive.sub_unsigned(&self.negative),
            negative: self.negative.sub_unsigned(&self.positive),
        }
    }

    /// Only the debit side of this diff.
    pub fn negative_only(&self) -> AssetDiff {
        AssetDiff { positive: AssetState::default(), negative: self.negative.clone() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetBalances {
    pub starting: AssetState,
    pub needed_extremes: AssetState,
    pub missing: AssetState,
}

impl AssetBalances {
    /// `missing = needed - starting`, all three cleaned.
    pub fn new(starting: AssetState, needed_extremes: AssetState) -> Self {
        let missing = needed_extremes.sub_unsigned(&starting).cleaned();
        AssetBalances {
            starting: starting.cleaned(),
            needed_extremes: needed_extremes.cleaned(),
            missing,
        }
    }
}
