//! `InfAdoptedStateVector` — per-participant operation counters and the
//! causal partial order they define.

use std::cmp::Ordering;
use std::fmt;

use crate::error::VectorParseError;

/// A mapping from user id to the number of `Do`/`Undo`/`Redo` requests that
/// user has issued. Absent users are implicitly at `0`.
///
/// Stored as a sorted `(user, count)` vector rather than a hash map: state
/// vectors in practice hold a handful of entries (one per connected
/// participant), `to_string`/`compare` both want ascending iteration, and a
/// flat vector keeps clone-on-write cheap — a state vector is small
/// (usually under 10 entries), so cloning it freely is fine.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct StateVector {
    components: Vec<(u32, u32)>,
}

impl StateVector {
    pub fn new() -> Self {
        Self { components: Vec::new() }
    }

    fn find(&self, user: u32) -> Result<usize, usize> {
        self.components.binary_search_by_key(&user, |&(u, _)| u)
    }

    pub fn get(&self, user: u32) -> u32 {
        match self.find(user) {
            Ok(idx) => self.components[idx].1,
            Err(_) => 0,
        }
    }

    /// Sets the component for `user` to `value`. A `value` of `0` removes
    /// the entry entirely, since absent components are implicitly `0` and
    /// we want a canonical (zero-free) representation for equality and
    /// string round-tripping.
    pub fn set(&mut self, user: u32, value: u32) {
        match self.find(user) {
            Ok(idx) => {
                if value == 0 {
                    self.components.remove(idx);
                } else {
                    self.components[idx].1 = value;
                }
            }
            Err(idx) => {
                if value != 0 {
                    self.components.insert(idx, (user, value));
                }
            }
        }
    }

    /// Adds `delta` to the component for `user`. Panics if the result would
    /// be negative — callers only ever add non-negative deltas (advancing a
    /// user's own counter) or subtract an amount already known to be `<=`
    /// the current value (computing a concurrency span `D(u)`).
    pub fn add(&mut self, user: u32, delta: i64) {
        let current = self.get(user) as i64;
        let next = current + delta;
        assert!(next >= 0, "state vector component for user {user} would go negative");
        self.set(user, next as u32);
    }

    pub fn foreach(&self, mut f: impl FnMut(u32, u32)) {
        for &(user, value) in &self.components {
            f(user, value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Runs `f` over the merged, ascending union of user ids present in
    /// either `self` or `other`, passing `(user, self[user], other[user])`.
    fn merge_foreach(&self, other: &StateVector, mut f: impl FnMut(u32, u32, u32)) {
        let (mut i, mut j) = (0, 0);
        let (a, b) = (&self.components, &other.components);
        while i < a.len() || j < b.len() {
            match (a.get(i), b.get(j)) {
                (Some(&(ua, va)), Some(&(ub, vb))) => match ua.cmp(&ub) {
                    Ordering::Less => {
                        f(ua, va, 0);
                        i += 1;
                    }
                    Ordering::Greater => {
                        f(ub, 0, vb);
                        j += 1;
                    }
                    Ordering::Equal => {
                        f(ua, va, vb);
                        i += 1;
                        j += 1;
                    }
                },
                (Some(&(ua, va)), None) => {
                    f(ua, va, 0);
                    i += 1;
                }
                (None, Some(&(ub, vb))) => {
                    f(ub, 0, vb);
                    j += 1;
                }
                (None, None) => unreachable!(),
            }
        }
    }

    /// Total lexicographic order over sorted `(user, value)` pairs, used to
    /// deterministically order otherwise-incomparable concurrent requests.
    pub fn compare(&self, other: &StateVector) -> Ordering {
        let mut result = Ordering::Equal;
        self.merge_foreach(other, |_, va, vb| {
            if result == Ordering::Equal {
                result = va.cmp(&vb);
            }
        });
        result
    }

    /// `V ⊑ W`: every component of `self` is `<=` the matching component of
    /// `other`. This is the plain componentwise test; whether the logs
    /// backing `other` still retain the requests this implies is a
    /// separate, log-aware check performed by
    /// [`crate::algorithm::Algorithm`], not here.
    pub fn causally_before(&self, other: &StateVector) -> bool {
        let mut ok = true;
        self.merge_foreach(other, |_, va, vb| {
            if va > vb {
                ok = false;
            }
        });
        ok
    }

    /// Like [`Self::causally_before`], but pretends `self[inc_component]` is
    /// one larger than it really is. Used to check whether a *specific next
    /// request* from `inc_component` (not yet issued) would already be
    /// covered by `other`.
    pub fn causally_before_including(&self, other: &StateVector, inc_component: u32) -> bool {
        let mut ok = true;
        self.merge_foreach(other, |user, va, vb| {
            let va = if user == inc_component { va + 1 } else { va };
            if va > vb {
                ok = false;
            }
        });
        ok
    }

    /// Sum of absolute per-component differences.
    pub fn vdiff(&self, other: &StateVector) -> u32 {
        let mut total: u32 = 0;
        self.merge_foreach(other, |_, va, vb| {
            total += va.abs_diff(vb);
        });
        total
    }

    pub fn to_string_canonical(&self) -> String {
        let mut out = String::new();
        for (i, &(user, value)) in self.components.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            out.push_str(&user.to_string());
            out.push(':');
            out.push_str(&value.to_string());
        }
        out
    }

    pub fn from_str_canonical(s: &str) -> Result<Self, VectorParseError> {
        let mut components = Vec::new();
        let mut last_user: Option<u32> = None;
        if s.is_empty() {
            return Ok(Self::new());
        }
        for part in s.split(';') {
            let (user_str, value_str) =
                part.split_once(':').ok_or(VectorParseError::MissingSeparator)?;
            let user: u32 = user_str.parse().map_err(|_| VectorParseError::NotANumber)?;
            let value: u32 = value_str.parse().map_err(|_| VectorParseError::NotANumber)?;
            match last_user {
                Some(prev) if prev == user => return Err(VectorParseError::DuplicateUser),
                Some(prev) if prev > user => return Err(VectorParseError::Unsorted),
                _ => {}
            }
            last_user = Some(user);
            if value != 0 {
                components.push((user, value));
            }
        }
        Ok(Self { components })
    }

    /// Wire-compact diff against `origin`: only components where `self` and
    /// `origin` differ appear, formatted as `self[u] - origin[u]` (so
    /// applying the diff onto `origin` via [`Self::from_str_diff`]
    /// reconstructs `self`).
    pub fn to_string_diff(&self, origin: &StateVector) -> String {
        let mut parts = Vec::new();
        self.merge_foreach(origin, |user, va, vb| {
            let diff = va as i64 - vb as i64;
            if diff != 0 {
                parts.push(format!("{user}:{diff}"));
            }
        });
        parts.join(";")
    }

    pub fn from_str_diff(s: &str, origin: &StateVector) -> Result<Self, VectorParseError> {
        let mut result = origin.clone();
        if s.is_empty() {
            return Ok(result);
        }
        let mut last_user: Option<u32> = None;
        for part in s.split(';') {
            let (user_str, diff_str) =
                part.split_once(':').ok_or(VectorParseError::MissingSeparator)?;
            let user: u32 = user_str.parse().map_err(|_| VectorParseError::NotANumber)?;
            let diff: i64 = diff_str.parse().map_err(|_| VectorParseError::NotANumber)?;
            match last_user {
                Some(prev) if prev == user => return Err(VectorParseError::DuplicateUser),
                Some(prev) if prev > user => return Err(VectorParseError::Unsorted),
                _ => {}
            }
            last_user = Some(user);
            let next = result.get(user) as i64 + diff;
            if next < 0 {
                return Err(VectorParseError::Underflow { user });
            }
            result.set(user, next as u32);
        }
        Ok(result)
    }
}

impl fmt::Display for StateVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_canonical())
    }
}

impl std::str::FromStr for StateVector {
    type Err = VectorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl Ord for StateVector {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for StateVector {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
